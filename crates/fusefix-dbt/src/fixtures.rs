//! Offline schema fixtures
//!
//! A small hand-written schema pair shaped like the published Fusion
//! schemas, for tests that need [`SchemaSpecs`] without network access.

use crate::schema::SchemaSpecs;

/// Fixture YAML property files schema
pub const YAML_SCHEMA: &str = include_str!("../fixtures/fs-schema-dbt-yaml-files-fixture.json");

/// Fixture `dbt_project.yml` schema
pub const PROJECT_SCHEMA: &str = include_str!("../fixtures/fs-schema-dbt-project-fixture.json");

/// Version string the fixture files are named after
pub const VERSION: &str = "fixture";

/// Specs built from the fixture schemas
pub fn schema_specs() -> SchemaSpecs {
    match SchemaSpecs::from_json_text(YAML_SCHEMA, PROJECT_SCHEMA) {
        Ok(specs) => specs,
        Err(e) => panic!("fixture schemas are invalid: {}", e),
    }
}
