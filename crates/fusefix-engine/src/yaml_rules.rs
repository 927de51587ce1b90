//! Structural rules for YAML property files
//!
//! Every rule parses the file leniently, edits the document tree and
//! serializes it back. Entries that are not touched keep their original
//! text and comments.

use fusefix_core::{DeprecationKind, DeprecationRefactor, RuleResult};
use fusefix_dbt::schema::YAML_NODE_TYPES;
use fusefix_dbt::{SchemaNodeSpec, SchemaSpecs};
use fusefix_yaml::{find_duplicate_keys, Document, Mapping, Node};
use tracing::debug;

use crate::error::RefactorError;
use crate::naming::{
    config_misspelling, pretty_node_type, property_misspelling, remove_non_alpha_outside_jinja,
    replace_spaces_outside_jinja,
};

/// Merge key, never treated as a field
const MERGE_KEY: &str = "<<";

/// Minimum similarity for suggesting an allowed field
const CLOSE_MATCH_CUTOFF: f64 = 0.6;

/// Test that takes `partition_by` as an argument rather than a config
const PARTITION_BY_TEST: &str = "dbt_utils.mutually_exclusive_ranges";

/// Test keys that are never custom arguments
const TEST_RESERVED_KEYS: &[&str] = &[
    "config",
    "arguments",
    "test_name",
    "name",
    "description",
    "column_name",
    MERGE_KEY,
];

/// Keys holding test lists
const TEST_KEYS: &[&str] = &["tests", "data_tests"];

/// Parse `yml`, let `edit` change the root mapping and serialize when it logged anything
fn with_document(
    rule: &'static str,
    yml: &str,
    edit: impl FnOnce(&mut Mapping, &mut Vec<DeprecationRefactor>),
) -> Result<RuleResult, RefactorError> {
    let mut document = Document::parse_lenient(yml)?;
    let Some(root) = document.as_mapping_mut() else {
        return Ok(RuleResult::unchanged(rule, yml));
    };

    let mut refactors = Vec::new();
    edit(root, &mut refactors);

    if refactors.is_empty() {
        return Ok(RuleResult::unchanged(rule, yml));
    }
    debug!(rule, changes = refactors.len(), "YAML rule applied");
    Ok(RuleResult::new(rule, yml, document.serialize(), refactors))
}

/// Remove repeated keys, keeping the first occurrence at every depth
pub fn remove_duplicate_keys(yml: &str) -> Result<RuleResult, RefactorError> {
    const RULE: &str = "remove_duplicate_keys";

    let duplicates = find_duplicate_keys(yml);
    if duplicates.is_empty() {
        return Ok(RuleResult::unchanged(RULE, yml));
    }

    let refactors: Vec<DeprecationRefactor> = duplicates
        .iter()
        .map(|dup| {
            DeprecationRefactor::new(
                format!("Found duplicate keys: line {} - {}", dup.line, dup.message()),
                DeprecationKind::DuplicateYamlKeys,
            )
        })
        .collect();

    let mut document = Document::parse_lenient(yml)?;
    document.root_mut().remove_duplicate_keys();

    Ok(RuleResult::new(RULE, yml, document.serialize(), refactors))
}

/// Remove repeated model definitions, keeping the last one
pub fn remove_duplicate_models(yml: &str) -> Result<RuleResult, RefactorError> {
    with_document("remove_duplicate_models", yml, |root, refactors| {
        let Some(models) = root.get_sequence_mut("models") else {
            return;
        };

        let mut occurrences: Vec<(String, Vec<usize>)> = Vec::new();
        for (i, model) in models.iter().enumerate() {
            let Some(name) = model.as_mapping().and_then(|m| m.get_str("name")) else {
                continue;
            };
            match occurrences.iter_mut().find(|(n, _)| n == name) {
                Some((_, indices)) => indices.push(i),
                None => occurrences.push((name.to_string(), vec![i])),
            }
        }

        let mut to_remove = Vec::new();
        for (name, indices) in &occurrences {
            if let Some((_, earlier)) = indices.split_last() {
                if earlier.is_empty() {
                    continue;
                }
                to_remove.extend_from_slice(earlier);
                refactors.push(DeprecationRefactor::new(
                    format!(
                        "Model '{}' - Found duplicate definition, removed first occurrence (keeping the second one).",
                        name
                    ),
                    DeprecationKind::DuplicateYamlKeys,
                ));
            }
        }

        to_remove.sort_unstable();
        for i in to_remove.into_iter().rev() {
            models.remove(i);
        }
    })
}

/// Put every key where Fusion expects it
///
/// Custom top-level keys are removed. On every node, configs written as
/// properties move under `config`, unknown keys and the legacy `meta` move
/// under `config.meta`, and generic test arguments move under `arguments`.
pub fn restructure_yaml_keys(yml: &str, specs: &SchemaSpecs) -> Result<RuleResult, RefactorError> {
    with_document("restructure_yaml_keys", yml, |root, refactors| {
        let custom_keys: Vec<String> = root
            .keys()
            .filter(|k| *k != MERGE_KEY && !specs.is_valid_top_level(k))
            .map(str::to_string)
            .collect();
        for key in custom_keys {
            root.remove(&key);
            refactors.push(DeprecationRefactor::new(
                format!("Removed custom top-level key: '{}'", key),
                DeprecationKind::CustomTopLevelKey,
            ));
        }

        let tests_spec = specs.yaml_spec("tests");
        let columns_spec = specs.yaml_spec("columns");

        for node_type in YAML_NODE_TYPES {
            let Some(spec) = specs.yaml_spec(node_type) else {
                continue;
            };
            let Some(nodes) = root.get_sequence_mut(node_type) else {
                continue;
            };

            for node in nodes.iter_mut().filter_map(Node::as_mapping_mut) {
                restructure_node(node, node_type, spec, refactors);
                if let Some(columns_spec) = columns_spec {
                    restructure_columns(node, columns_spec, tests_spec, refactors);
                }
                restructure_tests(node, tests_spec, refactors);

                if let Some(versions) = node.get_sequence_mut("versions") {
                    for version in versions.iter_mut().filter_map(Node::as_mapping_mut) {
                        restructure_tests(version, tests_spec, refactors);
                    }
                }
            }
        }

        // Source tables carry their own config, one level down
        let Some(tables_spec) = specs.yaml_spec("tables") else {
            return;
        };
        let Some(sources) = root.get_sequence_mut("sources") else {
            return;
        };
        for source in sources.iter_mut().filter_map(Node::as_mapping_mut) {
            let Some(tables) = source.get_sequence_mut("tables") else {
                continue;
            };
            for table in tables.iter_mut().filter_map(Node::as_mapping_mut) {
                restructure_node(table, "tables", tables_spec, refactors);
                restructure_tests(table, tests_spec, refactors);
                if let Some(columns_spec) = columns_spec {
                    restructure_columns(table, columns_spec, tests_spec, refactors);
                }
            }
        }
    })
}

fn restructure_columns(
    node: &mut Mapping,
    columns_spec: &SchemaNodeSpec,
    tests_spec: Option<&SchemaNodeSpec>,
    refactors: &mut Vec<DeprecationRefactor>,
) {
    let Some(columns) = node.get_sequence_mut("columns") else {
        return;
    };
    for column in columns.iter_mut().filter_map(Node::as_mapping_mut) {
        restructure_node(column, "columns", columns_spec, refactors);
        restructure_tests(column, tests_spec, refactors);
    }
}

fn restructure_tests(
    node: &mut Mapping,
    tests_spec: Option<&SchemaNodeSpec>,
    refactors: &mut Vec<DeprecationRefactor>,
) {
    let Some(tests_spec) = tests_spec else {
        return;
    };
    for key in TEST_KEYS {
        if let Some(tests) = node.get_sequence_mut(key) {
            for test in tests.iter_mut() {
                restructure_test(test, tests_spec, refactors);
            }
        }
    }
}

/// `config.meta` of a node, created when missing
///
/// `None` when `config` or `meta` holds something other than a mapping.
pub(crate) fn config_meta(node: &mut Mapping) -> Option<&mut Mapping> {
    node.get_or_insert_mapping("config")?.get_or_insert_mapping("meta")
}

/// Rename `from` to `to`, overwriting `to` if it already exists
pub(crate) fn rename_or_overwrite(mapping: &mut Mapping, from: &str, to: &str) {
    if mapping.contains_key(to) {
        if let Some(value) = mapping.remove(from) {
            mapping.insert(to, value);
        }
    } else {
        mapping.rename_key(from, to);
    }
}

/// Closest allowed field, if one is similar enough
fn closest_match<'a>(field: &str, candidates: impl IntoIterator<Item = &'a String>) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::normalized_levenshtein(field, candidate);
        if score >= CLOSE_MATCH_CUTOFF && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate.as_str(), score));
        }
    }
    best.map(|(c, _)| c)
}

fn restructure_node(
    node: &mut Mapping,
    node_type: &str,
    spec: &SchemaNodeSpec,
    refactors: &mut Vec<DeprecationRefactor>,
) {
    let pretty = pretty_node_type(node_type);
    let name = node.get_str("name").unwrap_or_default().to_string();

    // Unknown keys under config
    let config_fields: Vec<String> = node
        .get_mapping("config")
        .map(|config| {
            config
                .keys()
                .filter(|k| {
                    !spec.is_config_field(k) && !matches!(*k, "target_schema" | "target_database" | MERGE_KEY)
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for field in config_fields {
        let Some(config) = node.get_mapping_mut("config") else {
            break;
        };

        if let Some(correct) = config_misspelling(&field) {
            rename_or_overwrite(config, &field, correct);
            refactors.push(DeprecationRefactor::new(
                format!(
                    "{} '{}' - Config '{}' is a common misspelling of '{}', it has been renamed.",
                    pretty, name, field, correct
                ),
                DeprecationKind::CustomKeyInConfig,
            ));
            continue;
        }

        if config.get_or_insert_mapping("meta").is_none() {
            continue;
        }
        if let Some(entry) = config.remove_entry(&field) {
            if let Some(meta) = config.get_mapping_mut("meta") {
                meta.push_entry(entry);
            }
        }
        refactors.push(DeprecationRefactor::new(
            format!(
                "{} '{}' - Config '{}' is not an allowed config - Moved under config.meta.",
                pretty, name, field
            ),
            DeprecationKind::CustomKeyInConfig,
        ));
    }

    // Keys on the node itself
    let fields: Vec<String> = node
        .keys()
        .filter(|k| !matches!(*k, "config" | MERGE_KEY) && !spec.is_property(k))
        .map(str::to_string)
        .collect();

    for field in fields {
        if let Some(correct) = property_misspelling(&field) {
            rename_or_overwrite(node, &field, correct);
            refactors.push(DeprecationRefactor::new(
                format!(
                    "{} '{}' - Field '{}' is a common misspelling of '{}', it has been renamed.",
                    pretty, name, field, correct
                ),
                DeprecationKind::CustomKeyInObject,
            ));
            continue;
        }

        if spec.allowed_config_fields_without_meta.contains(&field) {
            let Some(config) = node.get_or_insert_mapping("config") else {
                continue;
            };
            let log = if config.contains_key(&field) {
                node.remove(&field);
                format!(
                    "{} '{}' - Field '{}' is already under config, it has been removed from the top level.",
                    pretty, name, field
                )
            } else {
                if let Some(entry) = node.remove_entry(&field) {
                    if let Some(config) = node.get_mapping_mut("config") {
                        config.push_entry(entry);
                    }
                }
                format!("{} '{}' - Field '{}' moved under config.", pretty, name, field)
            };
            refactors.push(DeprecationRefactor::new(log, DeprecationKind::PropertyMovedToConfig));
            continue;
        }

        if spec.is_config_field(&field) {
            continue;
        }

        if config_meta(node).is_none() {
            continue;
        }
        let log = match closest_match(&field, spec.allowed_config_fields.iter().chain(&spec.allowed_properties)) {
            Some(suggestion) => format!(
                "{} '{}' - Field '{}' is not allowed, but '{}' is. Moved as-is under config.meta but you might want to rename it and move it under config.",
                pretty, name, field, suggestion
            ),
            None => format!(
                "{} '{}' - Field '{}' is not an allowed config - Moved under config.meta.",
                pretty, name, field
            ),
        };
        if let Some(entry) = node.remove_entry(&field) {
            if let Some(meta) = config_meta(node) {
                meta.push_entry(entry);
            }
        }
        refactors.push(DeprecationRefactor::new(log, DeprecationKind::CustomKeyInObject));
    }

    // Legacy top-level meta, merged over config.meta
    let has_meta = node.get_mapping("meta").is_some_and(|m| !m.is_empty());
    if has_meta && config_meta(node).is_some() {
        if let Some(Node::Mapping(legacy)) = node.remove("meta") {
            if let Some(meta) = config_meta(node) {
                for entry in legacy.entries() {
                    meta.push_entry(entry.clone());
                }
            }
        }
        refactors.push(DeprecationRefactor::new(
            format!(
                "{} '{}' - Moved all the meta fields under config.meta and merged with existing config.meta.",
                pretty, name
            ),
            DeprecationKind::CustomKeyInObject,
        ));
    }
}

/// Restructure one entry of a test list
///
/// `- unique` is left alone. `- relationships: {...}` is named by its only
/// key; the alternative syntax is named by `test_name`.
fn restructure_test(test: &mut Node, spec: &SchemaNodeSpec, refactors: &mut Vec<DeprecationRefactor>) {
    let Some(test) = test.as_mapping_mut() else {
        return;
    };
    let Some(first_key) = test.keys().next().map(str::to_string) else {
        return;
    };

    if test.get(&first_key).is_some_and(Node::is_mapping) {
        if let Some(definition) = test.get_mapping_mut(&first_key) {
            restructure_test_definition(definition, &first_key, spec, refactors);
        }
    } else if let Some(test_name) = test.get_str("test_name").map(str::to_string) {
        restructure_test_definition(test, &test_name, spec, refactors);
    }
}

fn restructure_test_definition(
    definition: &mut Mapping,
    test_name: &str,
    spec: &SchemaNodeSpec,
    refactors: &mut Vec<DeprecationRefactor>,
) {
    let misspelled: Vec<(String, &str)> = definition
        .keys()
        .filter_map(|k| property_misspelling(k).map(|c| (k.to_string(), c)))
        .collect();
    for (field, correct) in misspelled {
        rename_or_overwrite(definition, &field, correct);
        refactors.push(DeprecationRefactor::new(
            format!(
                "Test '{}' - Field '{}' is a common misspelling of '{}', it has been renamed.",
                test_name, field, correct
            ),
            DeprecationKind::CustomKeyInObject,
        ));
    }

    let config_fields: Vec<String> = definition
        .keys()
        .filter(|k| !(*k == "partition_by" && test_name == PARTITION_BY_TEST))
        .filter(|k| spec.allowed_config_fields_without_meta.contains(*k) && !spec.is_property(k))
        .map(str::to_string)
        .collect();
    for field in config_fields {
        let Some(config) = definition.get_or_insert_mapping("config") else {
            break;
        };
        let existed = config.contains_key(&field);
        if let Some(entry) = definition.remove_entry(&field) {
            if let Some(config) = definition.get_mapping_mut("config") {
                config.push_entry(entry);
            }
        }
        let log = if existed {
            format!(
                "Test '{}' - Field '{}' is already under config, it has been overwritten and removed from the top level.",
                test_name, field
            )
        } else {
            format!("Test '{}' - Field '{}' moved under config.", test_name, field)
        };
        refactors.push(DeprecationRefactor::new(log, DeprecationKind::CustomKeyInObject));
    }

    if definition.get("arguments").is_some_and(|a| !a.is_mapping()) {
        return;
    }
    let arguments: Vec<String> = definition
        .keys()
        .filter(|k| !TEST_RESERVED_KEYS.contains(k))
        .map(str::to_string)
        .collect();
    for field in arguments {
        if definition.get_or_insert_mapping("arguments").is_none() {
            break;
        }
        if let Some(entry) = definition.remove_entry(&field) {
            if let Some(args) = definition.get_mapping_mut("arguments") {
                args.push_entry(entry);
            }
        }
        refactors.push(DeprecationRefactor::new(
            format!("Test '{}' - Custom test argument '{}' moved under 'arguments'.", test_name, field),
            DeprecationKind::MissingGenericTestArgumentsProperty,
        ));
    }
}

/// Move `owner` keys other than name and email under `config.meta`
pub fn restructure_owner_properties(yml: &str) -> Result<RuleResult, RefactorError> {
    with_document("restructure_owner_properties", yml, |root, refactors| {
        for node_type in SchemaSpecs::NODES_WITH_OWNER {
            let Some(nodes) = root.get_sequence_mut(node_type) else {
                continue;
            };
            let pretty = pretty_node_type(node_type);

            for node in nodes.iter_mut().filter_map(Node::as_mapping_mut) {
                let name = node.get_str("name").unwrap_or_default().to_string();
                let fields: Vec<String> = match node.get_mapping("owner") {
                    Some(owner) => owner
                        .keys()
                        .filter(|k| !SchemaSpecs::OWNER_PROPERTIES.contains(k))
                        .map(str::to_string)
                        .collect(),
                    None => continue,
                };

                for field in fields {
                    if config_meta(node).is_none() {
                        break;
                    }
                    let entry = node.get_mapping_mut("owner").and_then(|o| o.remove_entry(&field));
                    if let (Some(entry), Some(meta)) = (entry, config_meta(node)) {
                        meta.push_entry(entry);
                    }
                    refactors.push(DeprecationRefactor::new(
                        format!("{} '{}' - Owner field '{}' moved under config.meta.", pretty, name, field),
                        DeprecationKind::CustomKeyInObject,
                    ));
                }
            }
        }
    })
}

/// Replace spaces in resource names; exposure names also lose punctuation
pub fn remove_spaces_in_resource_names(yml: &str, specs: &SchemaSpecs) -> Result<RuleResult, RefactorError> {
    with_document("remove_spaces_in_resource_names", yml, |root, refactors| {
        for node_type in YAML_NODE_TYPES {
            if specs.yaml_spec(node_type).is_none() {
                continue;
            }
            let Some(nodes) = root.get_sequence_mut(node_type) else {
                continue;
            };
            let pretty = pretty_node_type(node_type);

            for node in nodes.iter_mut().filter_map(Node::as_mapping_mut) {
                let Some(name) = node.get_mut("name").and_then(Node::as_scalar_mut) else {
                    continue;
                };
                if name.is_null() || name.value().is_empty() {
                    continue;
                }

                let old = name.value().to_string();
                let (new, deprecation) = if *node_type == "exposures" {
                    (
                        remove_non_alpha_outside_jinja(&replace_spaces_outside_jinja(&old)),
                        DeprecationKind::ExposureName,
                    )
                } else {
                    (replace_spaces_outside_jinja(&old), DeprecationKind::ResourceNamesWithSpaces)
                };

                if new != old {
                    name.set_value(new.clone());
                    refactors.push(DeprecationRefactor::new(
                        format!("{} '{}' - Updated 'name' from '{}' to '{}'.", pretty, old, old, new),
                        deprecation,
                    ));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusefix_dbt::fixtures::schema_specs;
    use pretty_assertions::assert_eq;

    fn logs(result: &RuleResult) -> Vec<&str> {
        result.logs().collect()
    }

    fn json(yml: &str) -> serde_json::Value {
        Document::parse(yml).unwrap().to_json()
    }

    #[test]
    fn configs_move_under_config() {
        let yml = "\
models:
  - name: orders
    materialized: table
    database: analytics
    description: Orders
";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert!(result.refactored);
        assert_eq!(
            json(&result.refactored_content),
            serde_json::json!({
                "models": [{
                    "name": "orders",
                    "description": "Orders",
                    "config": {"materialized": "table", "database": "analytics"}
                }]
            })
        );
        assert_eq!(
            logs(&result),
            vec![
                "Model 'orders' - Field 'materialized' moved under config.",
                "Model 'orders' - Field 'database' moved under config.",
            ]
        );
        assert!(result
            .refactors
            .iter()
            .all(|r| r.deprecation == Some(DeprecationKind::PropertyMovedToConfig)));
    }

    #[test]
    fn existing_config_wins() {
        let yml = "\
models:
  - name: orders
    materialized: view
    config:
      materialized: table
";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            json(&result.refactored_content)["models"][0],
            serde_json::json!({"name": "orders", "config": {"materialized": "table"}})
        );
        assert_eq!(
            logs(&result),
            vec!["Model 'orders' - Field 'materialized' is already under config, it has been removed from the top level."]
        );
    }

    #[test]
    fn unknown_fields_and_legacy_meta_go_to_config_meta() {
        let yml = "\
models:
  - name: orders
    owner_team: finance
    meta:
      tier: 1
    config:
      meta:
        tier: 2
        pii: false
      my_flag: true
";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            json(&result.refactored_content)["models"][0],
            serde_json::json!({
                "name": "orders",
                "config": {"meta": {"tier": 1, "pii": false, "my_flag": true, "owner_team": "finance"}}
            })
        );
        assert_eq!(
            logs(&result),
            vec![
                "Model 'orders' - Config 'my_flag' is not an allowed config - Moved under config.meta.",
                "Model 'orders' - Field 'owner_team' is not an allowed config - Moved under config.meta.",
                "Model 'orders' - Moved all the meta fields under config.meta and merged with existing config.meta.",
            ]
        );
    }

    #[test]
    fn close_matches_are_suggested() {
        let yml = "models:\n  - name: orders\n    materialised: table\n";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            logs(&result),
            vec!["Model 'orders' - Field 'materialised' is not allowed, but 'materialized' is. Moved as-is under config.meta but you might want to rename it and move it under config."]
        );
    }

    #[test]
    fn misspellings_are_renamed_in_place() {
        let yml = "models:\n  - name: orders\n    desciption: Orders\n    config:\n      post-hook: grant\n";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            result.refactored_content,
            "models:\n  - name: orders\n    description: Orders\n    config:\n      post_hook: grant\n"
        );
        assert_eq!(
            logs(&result),
            vec![
                "Model 'orders' - Config 'post-hook' is a common misspelling of 'post_hook', it has been renamed.",
                "Model 'orders' - Field 'desciption' is a common misspelling of 'description', it has been renamed.",
            ]
        );
    }

    #[test]
    fn custom_top_level_keys_are_removed() {
        let yml = "version: 2\nmy_anchors:\n  a: 1\nmodels:\n  - name: orders\n";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(result.refactored_content, "version: 2\nmodels:\n  - name: orders\n");
        assert_eq!(logs(&result), vec!["Removed custom top-level key: 'my_anchors'"]);
        assert_eq!(result.refactors[0].deprecation, Some(DeprecationKind::CustomTopLevelKey));
    }

    #[test]
    fn column_tests_get_arguments_and_config() {
        let yml = "\
models:
  - name: orders
    columns:
      - name: status
        tests:
          - not_null
          - accepted_values:
              values: ['placed', 'shipped']
              severity: warn
";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            json(&result.refactored_content)["models"][0]["columns"][0]["tests"],
            serde_json::json!([
                "not_null",
                {"accepted_values": {"config": {"severity": "warn"}, "arguments": {"values": ["placed", "shipped"]}}}
            ])
        );
        assert_eq!(
            logs(&result),
            vec![
                "Test 'accepted_values' - Field 'severity' moved under config.",
                "Test 'accepted_values' - Custom test argument 'values' moved under 'arguments'.",
            ]
        );
        assert_eq!(
            result.refactors[1].deprecation,
            Some(DeprecationKind::MissingGenericTestArgumentsProperty)
        );
    }

    #[test]
    fn alternative_test_syntax_uses_test_name() {
        let yml = "\
models:
  - name: orders
    data_tests:
      - test_name: dbt_utils.mutually_exclusive_ranges
        name: ranges_ok
        partition_by: customer_id
        where: \"status = 'x'\"
";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            logs(&result),
            vec![
                "Test 'dbt_utils.mutually_exclusive_ranges' - Field 'where' moved under config.",
                "Test 'dbt_utils.mutually_exclusive_ranges' - Custom test argument 'partition_by' moved under 'arguments'.",
            ]
        );
    }

    #[test]
    fn string_arguments_are_left_alone() {
        let yml = "models:\n  - name: a\n    tests:\n      - custom:\n          arguments: x\n          column: id\n";
        assert!(!restructure_yaml_keys(yml, &schema_specs()).unwrap().refactored);
    }

    #[test]
    fn source_tables_and_their_columns() {
        let yml = "\
sources:
  - name: raw
    tables:
      - name: orders
        loaded_at_field: _loaded_at
        columns:
          - name: id
            tags: [pk]
";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert_eq!(
            logs(&result),
            vec![
                "Table 'orders' - Field 'loaded_at_field' moved under config.",
                "Column 'id' - Field 'tags' moved under config.",
            ]
        );
    }

    #[test]
    fn clean_file_is_untouched() {
        let yml = "# comment\nmodels:\n  - name: orders\n    config:\n      materialized: table\n";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert!(!result.refactored);
        assert_eq!(result.refactored_content, yml);
    }

    #[test]
    fn byte_order_mark_keeps_the_models_section() {
        let yml = "\u{feff}models:\n  - name: orders\n    description: kept\n";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert!(!result.refactored);
        assert_eq!(result.refactored_content, yml);

        let yml = "\u{feff}models:\n  - name: orders\n    materialized: table\n";
        let result = restructure_yaml_keys(yml, &schema_specs()).unwrap();
        assert!(result.refactored_content.starts_with("\u{feff}models:"));
        assert_eq!(
            json(&result.refactored_content),
            serde_json::json!({"models": [{"name": "orders", "config": {"materialized": "table"}}]})
        );
    }

    #[test]
    fn duplicate_keys_keep_the_first() {
        let yml = "models:\n  - name: a\n    description: x\n    description: y\n";
        let result = remove_duplicate_keys(yml).unwrap();
        assert_eq!(result.refactored_content, "models:\n  - name: a\n    description: x\n");
        assert_eq!(
            logs(&result),
            vec!["Found duplicate keys: line 4 - duplication of key \"description\" in mapping"]
        );
    }

    #[test]
    fn duplicate_models_keep_the_last() {
        let yml = "models:\n  - name: a\n    description: old\n  - name: b\n  - name: a\n    description: new\n";
        let result = remove_duplicate_models(yml).unwrap();
        assert_eq!(
            json(&result.refactored_content),
            serde_json::json!({"models": [{"name": "b"}, {"name": "a", "description": "new"}]})
        );
        assert_eq!(
            logs(&result),
            vec!["Model 'a' - Found duplicate definition, removed first occurrence (keeping the second one)."]
        );
    }

    #[test]
    fn owner_extras_move_to_meta() {
        let yml = "exposures:\n  - name: dash\n    owner:\n      name: Ana\n      slack: '#data'\n";
        let result = restructure_owner_properties(yml).unwrap();
        assert_eq!(
            json(&result.refactored_content)["exposures"][0],
            serde_json::json!({"name": "dash", "owner": {"name": "Ana"}, "config": {"meta": {"slack": "#data"}}})
        );
        assert_eq!(logs(&result), vec!["Exposure 'dash' - Owner field 'slack' moved under config.meta."]);
    }

    #[test]
    fn resource_names_with_spaces() {
        let yml = "models:\n  - name: my model\nexposures:\n  - name: Weekly KPI (v2)\n";
        let result = remove_spaces_in_resource_names(yml, &schema_specs()).unwrap();
        assert_eq!(
            json(&result.refactored_content),
            serde_json::json!({"models": [{"name": "my_model"}], "exposures": [{"name": "Weekly_KPI_v2"}]})
        );
        assert_eq!(
            logs(&result),
            vec![
                "Model 'my model' - Updated 'name' from 'my model' to 'my_model'.",
                "Exposure 'Weekly KPI (v2)' - Updated 'name' from 'Weekly KPI (v2)' to 'Weekly_KPI_v2'.",
            ]
        );
        assert_eq!(result.refactors[1].deprecation, Some(DeprecationKind::ExposureName));
    }
}
