//! Configuration schema (fusefix.toml)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the JSON schemas come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SchemaConfig {
    /// Schema version tag, `None` resolves to the latest published one
    pub version: Option<String>,

    /// Directory holding pre-downloaded schema files (skips the network)
    pub local_dir: Option<PathBuf>,

    /// Skip TLS certificate verification when fetching
    pub disable_ssl_verification: bool,
}

/// Which files and rules a run covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// Keep `log-path`/`target-path` when they hold the default values
    pub exclude_dbt_project_keys: bool,

    /// Only process files under these paths
    pub select: Vec<String>,

    /// Also process packages from the public hub
    pub include_packages: bool,

    /// Also process packages not on the public hub
    pub include_private_packages: bool,
}

impl RulesConfig {
    /// Combine with command-line values; flags win, lists are merged
    pub fn merged_with(mut self, other: &RulesConfig) -> Self {
        self.exclude_dbt_project_keys |= other.exclude_dbt_project_keys;
        self.include_packages |= other.include_packages;
        self.include_private_packages |= other.include_private_packages;
        for path in &other.select {
            if !self.select.contains(path) {
                self.select.push(path.clone());
            }
        }
        self
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Schema source
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Rule selection
    #[serde(default)]
    pub rules: RulesConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: SchemaConfig::default(),
            rules: RulesConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Default file name looked up at the project root
    pub const FILE_NAME: &'static str = "fusefix.toml";

    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Resolve the local schema directory against the project root
    pub fn local_schema_dir(&self) -> Option<PathBuf> {
        self.schema.local_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                self.project_root.join(dir)
            }
        })
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.schema.version, None);
        assert!(!config.rules.include_packages);
        assert!(config.rules.select.is_empty());
    }

    #[test]
    fn partial_sections() {
        let config = Config::from_toml(
            r#"
[schema]
version = "2.0.0-beta.10"

[rules]
select = ["models/staging"]
"#,
        )
        .unwrap();

        assert_eq!(config.schema.version.as_deref(), Some("2.0.0-beta.10"));
        assert!(!config.schema.disable_ssl_verification);
        assert_eq!(config.rules.select, vec!["models/staging".to_string()]);
        assert!(!config.rules.exclude_dbt_project_keys);
    }

    #[test]
    fn unknown_value_type_is_a_parse_error() {
        let err = Config::from_toml("[rules]\nselect = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn flags_merge_into_file_values() {
        let file = RulesConfig {
            select: vec!["models/a".to_string()],
            include_packages: true,
            ..RulesConfig::default()
        };
        let flags = RulesConfig {
            select: vec!["models/a".to_string(), "models/b".to_string()],
            exclude_dbt_project_keys: true,
            ..RulesConfig::default()
        };

        let merged = file.merged_with(&flags);
        assert_eq!(merged.select, vec!["models/a".to_string(), "models/b".to_string()]);
        assert!(merged.include_packages);
        assert!(merged.exclude_dbt_project_keys);
        assert!(!merged.include_private_packages);
    }

    #[test]
    fn file_sets_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Config::FILE_NAME);
        let mut config = Config::default();
        config.schema.local_dir = Some(PathBuf::from("schemas"));
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.project_root, dir.path());
        assert_eq!(loaded.local_schema_dir(), Some(dir.path().join("schemas")));
    }
}
