//! Fusion schema specs
//!
//! Builds the allowed properties and config fields per node type from the
//! two JSON schemas published for each Fusion release: one for YAML property
//! files and one for `dbt_project.yml`.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Separator between the two schemas some releases ship in the YAML schema file
const SCHEMA_SEPARATOR: &str = "----------------------------------------------";

/// Node types with a YAML property spec
pub const YAML_NODE_TYPES: &[&str] = &[
    "models",
    "seeds",
    "sources",
    "snapshots",
    "tests",
    "data_tests",
    "exposures",
    "tables",
    "columns",
    "groups",
    "analyses",
    "unit_tests",
];

/// Node types with a `dbt_project.yml` spec
pub const PROJECT_NODE_TYPES: &[&str] = &[
    "models",
    "seeds",
    "snapshots",
    "sources",
    "tests",
    "data_tests",
    "exposures",
    "unit-tests",
];

/// Config keys accepted as aliases of database/schema on some adapters
const CONFIG_KEY_ALIASES: &[&str] = &["dataset", "project", "data_space"];

/// Node types that accept [`CONFIG_KEY_ALIASES`]
const NODE_TYPES_WITH_ALIASES: &[&str] = &["models", "seeds", "snapshots", "tests", "sources"];

/// Allowed fields for one YAML node type
///
/// Properties and config fields never overlap, and `meta` is always a
/// config field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaNodeSpec {
    /// Keys allowed directly on the node
    pub allowed_properties: BTreeSet<String>,

    /// Keys allowed under `config:`
    pub allowed_config_fields: BTreeSet<String>,

    /// `allowed_config_fields` without `meta`
    pub allowed_config_fields_without_meta: BTreeSet<String>,
}

impl SchemaNodeSpec {
    pub fn new(
        config_fields: impl IntoIterator<Item = String>,
        properties: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut allowed_config_fields: BTreeSet<String> = config_fields.into_iter().collect();
        allowed_config_fields.insert("meta".to_string());

        let allowed_properties = properties
            .into_iter()
            .filter(|p| !allowed_config_fields.contains(p))
            .collect();

        let allowed_config_fields_without_meta = allowed_config_fields
            .iter()
            .filter(|f| f.as_str() != "meta")
            .cloned()
            .collect();

        Self {
            allowed_properties,
            allowed_config_fields,
            allowed_config_fields_without_meta,
        }
    }

    pub fn is_property(&self, key: &str) -> bool {
        self.allowed_properties.contains(key)
    }

    pub fn is_config_field(&self, key: &str) -> bool {
        self.allowed_config_fields.contains(key)
    }
}

/// Allowed `+` configs for one `dbt_project.yml` node type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectNodeSpec {
    /// Config keys with their `+` prefix
    pub allowed_config_fields_with_plus: BTreeSet<String>,

    /// Same keys without the prefix
    pub allowed_config_fields: BTreeSet<String>,
}

impl ProjectNodeSpec {
    pub fn new(with_plus: impl IntoIterator<Item = String>) -> Self {
        let allowed_config_fields_with_plus: BTreeSet<String> = with_plus.into_iter().collect();
        let allowed_config_fields = allowed_config_fields_with_plus
            .iter()
            .map(|k| k.strip_prefix('+').unwrap_or(k).to_string())
            .collect();

        Self {
            allowed_config_fields_with_plus,
            allowed_config_fields,
        }
    }

    /// Check a key, with or without its `+`
    pub fn allows(&self, key: &str) -> bool {
        self.allowed_config_fields.contains(key.strip_prefix('+').unwrap_or(key))
    }
}

/// Which `+` configs take a mapping value, and what keys that mapping accepts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DictConfigAnalysis {
    /// Configs whose mapping has a fixed key set (e.g. `persist_docs`)
    pub specific_properties: BTreeMap<String, BTreeSet<String>>,

    /// Configs whose mapping accepts any key (e.g. `labels`, `grants`)
    pub open_ended: BTreeSet<String>,
}

impl DictConfigAnalysis {
    /// Analyse every `+` property of every definition in a project schema
    pub fn from_project_schema(schema: &Value) -> Self {
        let mut analysis = Self::default();
        let Some(definitions) = schema.get("definitions").and_then(Value::as_object) else {
            return analysis;
        };

        for definition in definitions.values() {
            let Some(properties) = definition.get("properties").and_then(Value::as_object) else {
                continue;
            };

            for (prop_name, prop_spec) in properties {
                let Some(config_name) = prop_name.strip_prefix('+') else {
                    continue;
                };

                if is_object_type(prop_spec) {
                    analysis.classify(config_name, prop_spec);
                } else if let Some(options) = prop_spec.get("anyOf").and_then(Value::as_array) {
                    let first_ref = options
                        .iter()
                        .find_map(|option| option.get("$ref").and_then(Value::as_str));
                    if let Some(referenced) = first_ref.and_then(|r| definitions.get(ref_name(r))) {
                        if referenced.get("type").and_then(Value::as_str) == Some("object") {
                            analysis.classify(config_name, referenced);
                        }
                    }
                }
            }
        }

        analysis
    }

    fn classify(&mut self, config_name: &str, spec: &Value) {
        if let Some(properties) = spec.get("properties").and_then(Value::as_object) {
            self.specific_properties
                .insert(config_name.to_string(), properties.keys().cloned().collect());
        } else if spec.get("additionalProperties") != Some(&Value::Bool(false)) {
            self.open_ended.insert(config_name.to_string());
        }
    }

    /// Sub-keys accepted by a specific-property config
    pub fn properties_of(&self, config_name: &str) -> Option<&BTreeSet<String>> {
        self.specific_properties.get(config_name)
    }

    pub fn is_open_ended(&self, config_name: &str) -> bool {
        self.open_ended.contains(config_name)
    }
}

fn is_object_type(spec: &Value) -> bool {
    match spec.get("type") {
        Some(Value::Array(types)) => types.iter().any(|t| t == "object"),
        _ => false,
    }
}

fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Every spec the rewriting rules consult
///
/// Built once per run and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaSpecs {
    yaml_specs: BTreeMap<String, SchemaNodeSpec>,
    project_specs: BTreeMap<String, ProjectNodeSpec>,
    valid_top_level_yaml_fields: Vec<String>,
    dict_configs: DictConfigAnalysis,
}

impl SchemaSpecs {
    /// Keys allowed in a group or exposure `owner`
    pub const OWNER_PROPERTIES: &'static [&'static str] = &["name", "email"];

    /// Node types that have an `owner`
    pub const NODES_WITH_OWNER: &'static [&'static str] = &["groups", "exposures"];

    /// Build specs from the raw schema texts
    ///
    /// The YAML schema text may contain two schemas separated by a dashed
    /// line, in which case the last one is used.
    pub fn from_json_text(yaml_schema: &str, project_schema: &str) -> Result<Self, SchemaError> {
        let yaml_text = yaml_schema.rsplit(SCHEMA_SEPARATOR).next().unwrap_or(yaml_schema);
        let yaml: Value = serde_json::from_str(yaml_text)
            .map_err(|e| SchemaError::ParseError(format!("YAML files schema: {}", e)))?;
        let project: Value = serde_json::from_str(project_schema)
            .map_err(|e| SchemaError::ParseError(format!("dbt_project schema: {}", e)))?;

        Self::from_schemas(&yaml, &project)
    }

    /// Build specs from parsed schemas
    pub fn from_schemas(yaml_schema: &Value, project_schema: &Value) -> Result<Self, SchemaError> {
        let resolver = YamlSchema(yaml_schema);
        let mut yaml_specs = BTreeMap::new();

        for node_type in ["models", "seeds", "sources", "snapshots", "exposures", "groups", "analyses", "unit_tests"] {
            let (properties, config) = resolver.top_level(node_type)?;
            yaml_specs.insert(node_type.to_string(), resolver.spec(node_type, &properties, &config)?);
        }

        let (test_properties, test_config) = resolver.top_level("tests").or_else(|_| resolver.top_level("data_tests"))?;
        let tests = resolver.spec("tests", &test_properties, &test_config)?;
        yaml_specs.insert("tests".to_string(), tests.clone());
        yaml_specs.insert("data_tests".to_string(), tests);

        let (source_properties, _) = resolver.top_level("sources")?;
        let (properties, config) = resolver.nested(&source_properties, "tables")?;
        yaml_specs.insert("tables".to_string(), resolver.spec("tables", &properties, &config)?);

        let (model_properties, _) = resolver.top_level("models")?;
        let (properties, config) = resolver.nested(&model_properties, "columns")?;
        yaml_specs.insert("columns".to_string(), resolver.spec("columns", &properties, &config)?);

        let mut project_specs = BTreeMap::new();
        for node_type in PROJECT_NODE_TYPES {
            if *node_type == "data_tests" {
                continue;
            }
            let definition = project_definition(project_schema, node_type)?;
            let mut fields = definition_keys(project_schema, &definition)?;
            if NODE_TYPES_WITH_ALIASES.contains(node_type) {
                fields.extend(CONFIG_KEY_ALIASES.iter().map(|a| format!("+{}", a)));
            }
            project_specs.insert(node_type.to_string(), ProjectNodeSpec::new(fields));
        }
        if let Some(tests) = project_specs.get("tests").cloned() {
            project_specs.insert("data_tests".to_string(), tests);
        }

        let valid_top_level_yaml_fields = yaml_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| p.keys().cloned().collect())
            .ok_or_else(|| SchemaError::MissingDefinition("properties".to_string()))?;

        Ok(Self {
            yaml_specs,
            project_specs,
            valid_top_level_yaml_fields,
            dict_configs: DictConfigAnalysis::from_project_schema(project_schema),
        })
    }

    /// Spec for a YAML node type
    pub fn yaml_spec(&self, node_type: &str) -> Option<&SchemaNodeSpec> {
        self.yaml_specs.get(node_type)
    }

    /// Spec for a `dbt_project.yml` node type
    pub fn project_spec(&self, node_type: &str) -> Option<&ProjectNodeSpec> {
        self.project_specs.get(node_type)
    }

    pub fn yaml_specs(&self) -> impl Iterator<Item = (&str, &SchemaNodeSpec)> {
        self.yaml_specs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn project_specs(&self) -> impl Iterator<Item = (&str, &ProjectNodeSpec)> {
        self.project_specs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys allowed at the top level of a YAML property file
    pub fn valid_top_level_yaml_fields(&self) -> &[String] {
        &self.valid_top_level_yaml_fields
    }

    pub fn is_valid_top_level(&self, key: &str) -> bool {
        self.valid_top_level_yaml_fields.iter().any(|k| k == key)
    }

    /// Union of config fields across every YAML node type
    pub fn all_config_fields(&self) -> BTreeSet<String> {
        self.yaml_specs
            .values()
            .flat_map(|spec| spec.allowed_config_fields.iter().cloned())
            .collect()
    }

    /// Union of `+` configs across every project node type
    pub fn all_project_config_fields_with_plus(&self) -> BTreeSet<String> {
        self.project_specs
            .values()
            .flat_map(|spec| spec.allowed_config_fields_with_plus.iter().cloned())
            .collect()
    }

    pub fn dict_configs(&self) -> &DictConfigAnalysis {
        &self.dict_configs
    }
}

/// Resolves `$ref` chains in the YAML files schema
struct YamlSchema<'a>(&'a Value);

impl<'a> YamlSchema<'a> {
    /// (properties definition, config definition) for a top-level node type
    fn top_level(&self, node_type: &str) -> Result<(String, String), SchemaError> {
        let properties = self
            .0
            .pointer(&format!("/properties/{}/items/$ref", node_type))
            .and_then(Value::as_str)
            .map(|r| ref_name(r).to_string())
            .ok_or_else(|| SchemaError::MissingDefinition(format!("properties.{}.items", node_type)))?;
        let config = self.config_of(&properties)?;
        Ok((properties, config))
    }

    /// (properties definition, config definition) for a list nested in another definition
    fn nested(&self, parent: &str, node_type: &str) -> Result<(String, String), SchemaError> {
        let properties = self
            .0
            .pointer(&format!("/definitions/{}/properties/{}/items/$ref", parent, node_type))
            .and_then(Value::as_str)
            .map(|r| ref_name(r).to_string())
            .ok_or_else(|| SchemaError::MissingDefinition(format!("{}.{}.items", parent, node_type)))?;
        let config = self.config_of(&properties)?;
        Ok((properties, config))
    }

    fn config_of(&self, definition: &str) -> Result<String, SchemaError> {
        self.0
            .pointer(&format!("/definitions/{}/properties/config/anyOf/0/$ref", definition))
            .and_then(Value::as_str)
            .map(|r| ref_name(r).to_string())
            .ok_or_else(|| SchemaError::MissingDefinition(format!("{}.config", definition)))
    }

    fn spec(&self, node_type: &str, properties: &str, config: &str) -> Result<SchemaNodeSpec, SchemaError> {
        let mut config_fields = definition_keys(self.0, config)?;
        if NODE_TYPES_WITH_ALIASES.contains(&node_type) {
            config_fields.extend(CONFIG_KEY_ALIASES.iter().map(|a| a.to_string()));
        }
        Ok(SchemaNodeSpec::new(config_fields, definition_keys(self.0, properties)?))
    }
}

fn definition_keys(schema: &Value, definition: &str) -> Result<Vec<String>, SchemaError> {
    schema
        .pointer(&format!("/definitions/{}/properties", definition))
        .and_then(Value::as_object)
        .map(|p| p.keys().cloned().collect())
        .ok_or_else(|| SchemaError::MissingDefinition(format!("definitions.{}", definition)))
}

fn project_definition(schema: &Value, node_type: &str) -> Result<String, SchemaError> {
    // Older releases spell the unit test section with a dash
    let candidates = [node_type.to_string(), node_type.replace('-', "_")];
    candidates
        .iter()
        .find_map(|key| {
            schema
                .get("properties")?
                .get(key)?
                .pointer("/anyOf/0/$ref")?
                .as_str()
                .map(|r| ref_name(r).to_string())
        })
        .ok_or_else(|| SchemaError::MissingDefinition(format!("dbt_project properties.{}", node_type)))
}

/// Errors building or fetching schema specs
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to fetch {0}: {1}")]
    FetchError(String, String),

    #[error("Failed to read schema file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse {0}")]
    ParseError(String),

    #[error("Schema has no {0}")]
    MissingDefinition(String),
}
