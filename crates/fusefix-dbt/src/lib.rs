//! dbt project model and Fusion schema specs
//!
//! This crate handles:
//! - Building allowed property/config specs from the Fusion JSON schemas
//! - Fetching those schemas (CDN or local directory)
//! - Reading dbt_project.yml and discovering resource files and packages
//! - Telling hub packages apart from private ones
//! - Scanning a project for duplicate YAML keys

pub mod schema;
pub mod fetch;
pub mod project;
pub mod hub;
pub mod duplicates;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use schema::{DictConfigAnalysis, ProjectNodeSpec, SchemaError, SchemaNodeSpec, SchemaSpecs};
pub use fetch::SchemaFetcher;
pub use project::{collect_files, DbtProject, PackageSelection, ProjectError, ResourceKind, ResourcePath, ResourcePaths, Selection};
pub use hub::HubIndex;
pub use duplicates::{scan_duplicates, DuplicateFound, DuplicateScan};
