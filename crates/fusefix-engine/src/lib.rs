//! fusefix engine - Refactoring rules and the run pipeline
//!
//! This crate implements the main business logic for fusefix:
//! - Text-level YAML cleanups (quotes, tabs, indentation)
//! - Structural YAML rules (duplicates, misplaced configs, resource names)
//! - dbt_project.yml rules (deprecated paths, flags, `+` prefixes)
//! - SQL rules (config calls, config accessors, stray block endings)
//! - Semantic layer migration into model YAML
//! - Rule ordering, file discovery and reporting for one run

pub mod error;
pub mod naming;
pub mod oracle;
pub mod text_rules;
pub mod yaml_rules;
pub mod project_rules;
pub mod sql_rules;
pub mod semantic;
pub mod pipeline;
pub mod output;

pub use error::RefactorError;
pub use oracle::{FilesystemOracle, KnownPaths, PathOracle};
pub use pipeline::{Pipeline, RuleContext, RuleSet, RunOptions, RunOutcome};
pub use output::OutputFormat;
