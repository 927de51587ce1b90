//! Deprecation categories
//!
//! IMPORTANT: The serialized names match the names dbt uses for its own
//! deprecation events. NEVER rename them - downstream tooling matches on
//! the exact strings in the JSON output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Deprecation category attached to a refactor log entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeprecationKind {
    /// `{% endmacro %}` / `{% endif %}` without an opening block
    UnexpectedJinjaBlock,

    /// Resource names (or SQL file names) containing spaces
    ResourceNamesWithSpaces,

    /// A config field set as a top-level property
    PropertyMovedToConfig,

    /// Unknown key on a resource object
    CustomKeyInObject,

    /// Generic test keyword arguments outside of `arguments`
    MissingGenericTestArgumentsProperty,

    /// The same key appears twice in one mapping
    DuplicateYamlKeys,

    /// Exposure names with characters other than letters, digits and underscores
    ExposureName,

    /// `log-path` in dbt_project.yml
    ConfigLogPath,

    /// `target-path` in dbt_project.yml
    ConfigTargetPath,

    /// `data-paths` in dbt_project.yml
    ConfigDataPath,

    /// `source-paths` in dbt_project.yml
    ConfigSourcePath,

    /// Nested config in dbt_project.yml without the `+` prefix
    MissingPlusPrefix,

    /// Unknown top-level key in a YAML property file
    CustomTopLevelKey,

    /// Unknown key inside a `config` block or `config()` call
    CustomKeyInConfig,

    /// `source_freshness_run_project_hooks` set to false
    SourceFreshnessProjectHooksNotRun,

    /// Any category not known to this version
    Other(String),
}

impl DeprecationKind {
    /// Get the stable name used in reports
    pub fn as_str(&self) -> &str {
        match self {
            Self::UnexpectedJinjaBlock => "UnexpectedJinjaBlockDeprecation",
            Self::ResourceNamesWithSpaces => "ResourceNamesWithSpacesDeprecation",
            Self::PropertyMovedToConfig => "PropertyMovedToConfigDeprecation",
            Self::CustomKeyInObject => "CustomKeyInObjectDeprecation",
            Self::MissingGenericTestArgumentsProperty => "MissingGenericTestArgumentsPropertyDeprecation",
            Self::DuplicateYamlKeys => "DuplicateYAMLKeysDeprecation",
            Self::ExposureName => "ExposureNameDeprecation",
            Self::ConfigLogPath => "ConfigLogPathDeprecation",
            Self::ConfigTargetPath => "ConfigTargetPathDeprecation",
            Self::ConfigDataPath => "ConfigDataPathDeprecation",
            Self::ConfigSourcePath => "ConfigSourcePathDeprecation",
            Self::MissingPlusPrefix => "MissingPlusPrefixDeprecation",
            Self::CustomTopLevelKey => "CustomTopLevelKeyDeprecation",
            Self::CustomKeyInConfig => "CustomKeyInConfigDeprecation",
            Self::SourceFreshnessProjectHooksNotRun => "SourceFreshnessProjectHooksNotRun",
            Self::Other(name) => name,
        }
    }

    /// Look up a category by its stable name
    pub fn from_name(name: &str) -> Self {
        match name {
            "UnexpectedJinjaBlockDeprecation" => Self::UnexpectedJinjaBlock,
            "ResourceNamesWithSpacesDeprecation" => Self::ResourceNamesWithSpaces,
            "PropertyMovedToConfigDeprecation" => Self::PropertyMovedToConfig,
            "CustomKeyInObjectDeprecation" => Self::CustomKeyInObject,
            "MissingGenericTestArgumentsPropertyDeprecation" => Self::MissingGenericTestArgumentsProperty,
            "DuplicateYAMLKeysDeprecation" => Self::DuplicateYamlKeys,
            "ExposureNameDeprecation" => Self::ExposureName,
            "ConfigLogPathDeprecation" => Self::ConfigLogPath,
            "ConfigTargetPathDeprecation" => Self::ConfigTargetPath,
            "ConfigDataPathDeprecation" => Self::ConfigDataPath,
            "ConfigSourcePathDeprecation" => Self::ConfigSourcePath,
            "MissingPlusPrefixDeprecation" => Self::MissingPlusPrefix,
            "CustomTopLevelKeyDeprecation" => Self::CustomTopLevelKey,
            "CustomKeyInConfigDeprecation" => Self::CustomKeyInConfig,
            "SourceFreshnessProjectHooksNotRun" => Self::SourceFreshnessProjectHooksNotRun,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DeprecationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for DeprecationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeprecationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_names() {
        assert_eq!(DeprecationKind::DuplicateYamlKeys.as_str(), "DuplicateYAMLKeysDeprecation");
        assert_eq!(
            DeprecationKind::SourceFreshnessProjectHooksNotRun.to_string(),
            "SourceFreshnessProjectHooksNotRun"
        );
    }

    #[test]
    fn unknown_names_are_kept() {
        let kind = DeprecationKind::from_name("SomeFutureDeprecation");
        assert_eq!(kind, DeprecationKind::Other("SomeFutureDeprecation".to_string()));
        assert_eq!(kind.as_str(), "SomeFutureDeprecation");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&DeprecationKind::MissingPlusPrefix).unwrap();
        assert_eq!(json, "\"MissingPlusPrefixDeprecation\"");

        let parsed: DeprecationKind = serde_json::from_str("\"CustomKeyInConfigDeprecation\"").unwrap();
        assert_eq!(parsed, DeprecationKind::CustomKeyInConfig);
    }
}
