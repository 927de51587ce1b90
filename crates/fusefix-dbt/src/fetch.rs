//! Schema retrieval
//!
//! Fetches the Fusion schemas from the public CDN, or reads them from a
//! local directory holding files with the same names.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::schema::{SchemaError, SchemaSpecs};

/// Release index listing the latest Fusion version
pub const VERSIONS_URL: &str = "https://public.cdn.getdbt.com/fs/versions.json";

/// Base URL of the published schemas
pub const SCHEMAS_BASE_URL: &str = "https://public.cdn.getdbt.com/fs/schemas";

/// File name of the YAML property files schema for a version
pub fn yaml_schema_file_name(version: &str) -> String {
    format!("fs-schema-dbt-yaml-files-{}.json", version)
}

/// File name of the `dbt_project.yml` schema for a version
pub fn project_schema_file_name(version: &str) -> String {
    format!("fs-schema-dbt-project-{}.json", version)
}

#[derive(Debug, Deserialize)]
struct Versions {
    latest: Release,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag: String,
}

/// Where schemas come from
#[derive(Debug, Clone)]
enum Source {
    Remote(reqwest::Client),
    Local(PathBuf),
}

/// Loads [`SchemaSpecs`] for a Fusion version
#[derive(Debug, Clone)]
pub struct SchemaFetcher {
    source: Source,
}

impl SchemaFetcher {
    /// Fetch from the CDN
    pub fn remote(disable_ssl_verification: bool) -> Result<Self, SchemaError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(disable_ssl_verification)
            .build()
            .map_err(|e| SchemaError::FetchError(SCHEMAS_BASE_URL.to_string(), e.to_string()))?;

        Ok(Self {
            source: Source::Remote(client),
        })
    }

    /// Read from a directory laid out like the CDN
    ///
    /// Without an explicit version the directory must also contain
    /// `versions.json`.
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Local(dir.into()),
        }
    }

    /// Pick the source from the `[schema]` section of the config
    pub fn from_config(config: &fusefix_core::Config) -> Result<Self, SchemaError> {
        match config.local_schema_dir() {
            Some(dir) => Ok(Self::local(dir)),
            None => Self::remote(config.schema.disable_ssl_verification),
        }
    }

    /// Resolve the latest released version
    pub async fn latest_version(&self) -> Result<String, SchemaError> {
        let text = self.get_text(VERSIONS_URL, "versions.json").await?;
        let versions: Versions = serde_json::from_str(&text)
            .map_err(|e| SchemaError::ParseError(format!("versions.json: {}", e)))?;
        Ok(versions.latest.tag)
    }

    /// Load both schemas and build the specs
    pub async fn fetch_specs(&self, version: Option<&str>) -> Result<SchemaSpecs, SchemaError> {
        let version = match version {
            Some(v) => v.to_string(),
            None => self.latest_version().await?,
        };

        let yaml_file = yaml_schema_file_name(&version);
        let project_file = project_schema_file_name(&version);

        info!("Getting fusion yml schema for version {}", version);
        let yaml_schema = self
            .get_text(&format!("{}/{}", SCHEMAS_BASE_URL, yaml_file), &yaml_file)
            .await?;

        info!("Getting fusion dbt project schema for version {}", version);
        let project_schema = self
            .get_text(&format!("{}/{}", SCHEMAS_BASE_URL, project_file), &project_file)
            .await?;

        SchemaSpecs::from_json_text(&yaml_schema, &project_schema)
    }

    async fn get_text(&self, url: &str, file_name: &str) -> Result<String, SchemaError> {
        match &self.source {
            Source::Local(dir) => read_local(dir, file_name),
            Source::Remote(client) => {
                debug!("GET {}", url);
                let response = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| SchemaError::FetchError(url.to_string(), e.to_string()))?;
                response
                    .text()
                    .await
                    .map_err(|e| SchemaError::FetchError(url.to_string(), e.to_string()))
            }
        }
    }
}

fn read_local(dir: &Path, file_name: &str) -> Result<String, SchemaError> {
    let path = dir.join(file_name);
    debug!("Reading {}", path.display());
    std::fs::read_to_string(&path)
        .map_err(|e| SchemaError::IoError(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schema_dir(version: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(yaml_schema_file_name(version)),
            include_str!("../fixtures/fs-schema-dbt-yaml-files-fixture.json"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(project_schema_file_name(version)),
            include_str!("../fixtures/fs-schema-dbt-project-fixture.json"),
        )
        .unwrap();
        dir
    }

    #[test]
    fn file_names_follow_the_cdn() {
        assert_eq!(yaml_schema_file_name("2.0.0"), "fs-schema-dbt-yaml-files-2.0.0.json");
        assert_eq!(project_schema_file_name("2.0.0"), "fs-schema-dbt-project-2.0.0.json");
    }

    #[tokio::test]
    async fn local_directory_with_explicit_version() {
        let dir = schema_dir("2.0.0-beta.1");
        let specs = SchemaFetcher::local(dir.path())
            .fetch_specs(Some("2.0.0-beta.1"))
            .await
            .unwrap();
        assert!(specs.yaml_spec("models").is_some());
    }

    #[tokio::test]
    async fn local_directory_resolves_latest() {
        let dir = schema_dir("2.0.0-beta.2");
        std::fs::write(
            dir.path().join("versions.json"),
            r#"{"latest": {"tag": "2.0.0-beta.2"}, "all": []}"#,
        )
        .unwrap();

        let fetcher = SchemaFetcher::local(dir.path());
        assert_eq!(fetcher.latest_version().await.unwrap(), "2.0.0-beta.2");
        assert!(fetcher.fetch_specs(None).await.is_ok());
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = SchemaFetcher::local(dir.path())
            .fetch_specs(Some("9.9.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::IoError(_, _)));
    }
}
