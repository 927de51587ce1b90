//! fusefix Core
//!
//! Core domain model shared by every fusefix crate.
//! Deprecation names are part of the JSON output - never rename them.

pub mod deprecation;
pub mod refactor;
pub mod report;
pub mod config;

pub use deprecation::DeprecationKind;
pub use refactor::{DeprecationRefactor, FileKind, RefactorResult, RuleResult};
pub use report::{FileReport, OutputMode, RunSummary};
pub use config::{Config, ConfigError, RulesConfig, SchemaConfig};
