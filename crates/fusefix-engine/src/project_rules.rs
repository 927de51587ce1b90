//! Rules for dbt_project.yml
//!
//! Besides the text and duplicate-key cleanups shared with property files,
//! the project file gets its deprecated paths removed, its behavior flags
//! set and its resource configs `+`-prefixed.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use fusefix_core::{DeprecationKind, DeprecationRefactor, RuleResult};
use fusefix_dbt::project::DEFAULT_PACKAGES_PATH;
use fusefix_dbt::schema::PROJECT_NODE_TYPES;
use fusefix_dbt::{DictConfigAnalysis, ProjectNodeSpec, SchemaSpecs};
use fusefix_yaml::{Document, Mapping, Node};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::RefactorError;
use crate::oracle::PathOracle;
use crate::pipeline::RuleContext;
use crate::yaml_rules::rename_or_overwrite;

const TEST_ARGUMENTS_FLAG: &str = "require_generic_test_arguments_property";

/// Behavior flags flipped in behavior-change mode, with what they change
const BEHAVIOR_FLAGS: &[(&str, &str, DeprecationKind)] = &[(
    "source_freshness_run_project_hooks",
    "run project hooks (on-run-start/on-run-end) as part of source freshness commands",
    DeprecationKind::SourceFreshnessProjectHooksNotRun,
)];

/// Deprecated keys that are dropped, with their default value
const DEPRECATED_WITH_DEFAULTS: &[(&str, &str, DeprecationKind)] = &[
    ("log-path", "logs", DeprecationKind::ConfigLogPath),
    ("target-path", "target", DeprecationKind::ConfigTargetPath),
];

/// Deprecated keys that have a new name
const RENAMED_PATHS: &[(&str, &str, DeprecationKind)] = &[
    ("data-paths", "seed-paths", DeprecationKind::ConfigDataPath),
    ("source-paths", "model-paths", DeprecationKind::ConfigSourcePath),
];

const PLUS_META: &str = "+meta";

static SPACE_AFTER_PLUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)\+[ \t]+(\w+)([ \t]*:)").unwrap());

fn with_project(
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
    debug!(rule, changes = refactors.len(), "project rule applied");
    Ok(RuleResult::new(rule, yml, document.serialize(), refactors))
}

/// Set `flags.require_generic_test_arguments_property` unless it is already true
pub fn changeset_dbt_project_flip_test_arguments_behavior_flag(yml: &str) -> Result<RuleResult, RefactorError> {
    with_project(
        "changeset_dbt_project_flip_test_arguments_behavior_flag",
        yml,
        |root, refactors| {
            let needs_flag = match root.get("flags") {
                None => true,
                Some(flags) if flags.is_null() => true,
                Some(Node::Mapping(flags)) => match flags.get(TEST_ARGUMENTS_FLAG) {
                    None => true,
                    Some(value) => value.as_bool() == Some(false),
                },
                Some(_) => false,
            };
            if !needs_flag {
                return;
            }

            if let Some(flags) = root.get_or_insert_mapping("flags") {
                flags.insert(TEST_ARGUMENTS_FLAG, Node::bool(true));
                refactors.push(DeprecationRefactor::new(
                    format!(
                        "Set flag '{}' to 'True' - This will parse the values defined within the `arguments` property of test definition as the test keyword arguments.",
                        TEST_ARGUMENTS_FLAG
                    ),
                    DeprecationKind::MissingGenericTestArgumentsProperty,
                ));
            }
        },
    )
}

/// Turn behavior flags explicitly set to false on
pub fn flip_behavior_flags(yml: &str) -> Result<RuleResult, RefactorError> {
    with_project("flip_behavior_flags", yml, |root, refactors| {
        let Some(flags) = root.get_mapping_mut("flags") else {
            return;
        };
        for (flag, effect, deprecation) in BEHAVIOR_FLAGS {
            if flags.get(flag).and_then(Node::as_bool) == Some(false) {
                flags.insert(*flag, Node::bool(true));
                refactors.push(DeprecationRefactor::new(
                    format!("Set flag '{}' to 'True' - This will {}.", flag, effect),
                    deprecation.clone(),
                ));
            }
        }
    })
}

/// Drop `log-path`/`target-path` and rename the old `*-paths` keys
///
/// With `exclude_dbt_project_keys`, the dropped keys are kept when they
/// hold their default value.
pub fn remove_deprecated_config(yml: &str, exclude_dbt_project_keys: bool) -> Result<RuleResult, RefactorError> {
    with_project("remove_deprecated_config", yml, |root, refactors| {
        for (field, default, deprecation) in DEPRECATED_WITH_DEFAULTS {
            if !root.contains_key(field) {
                continue;
            }
            let log = if !exclude_dbt_project_keys {
                format!("Removed the deprecated field '{}'", field)
            } else if root.get_str(field) != Some(*default) {
                format!("Removed the deprecated field '{}' that wasn't set to the default value", field)
            } else {
                continue;
            };
            root.remove(field);
            refactors.push(DeprecationRefactor::new(log, deprecation.clone()));
        }

        for (deprecated, new, deprecation) in RENAMED_PATHS {
            if !root.contains_key(deprecated) {
                continue;
            }
            if !root.contains_key(new) {
                root.rename_key(deprecated, *new);
                refactors.push(DeprecationRefactor::new(
                    format!("Renamed the deprecated field '{}' to '{}'", deprecated, new),
                    deprecation.clone(),
                ));
                continue;
            }

            let Some(old_paths) = root.get_sequence(deprecated).map(|s| s.iter().cloned().collect::<Vec<_>>()) else {
                warn!(field = deprecated, "deprecated path is not a list, leaving it in place");
                continue;
            };
            let Some(paths) = root.get_sequence_mut(new) else {
                warn!(field = new, "path is not a list, leaving the deprecated one in place");
                continue;
            };
            for path in old_paths {
                paths.push(path);
            }
            root.remove(deprecated);
            refactors.push(DeprecationRefactor::new(
                format!("Added the config of the deprecated field '{}' to '{}'", deprecated, new),
                deprecation.clone(),
            ));
        }
    })
}

/// Fix `+ key:` into `+key:`, or drop the entry when `+key` is not a config
pub fn fix_space_after_plus(yml: &str, specs: &SchemaSpecs) -> RuleResult {
    const RULE: &str = "fix_space_after_plus";

    let found: Vec<(std::ops::Range<usize>, String, String, String, usize)> = SPACE_AFTER_PLUS
        .captures_iter(yml)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let line = yml[..whole.start()].matches('\n').count() + 1;
            Some((
                whole.range(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str().to_string(),
                caps.get(3)?.as_str().to_string(),
                line,
            ))
        })
        .collect();
    if found.is_empty() {
        return RuleResult::unchanged(RULE, yml);
    }

    let valid = specs.all_project_config_fields_with_plus();
    let mut content = yml.to_string();
    let mut refactors = Vec::new();

    for (span, indent, key, colon, line) in found.iter().rev() {
        let corrected = format!("+{}", key);
        if valid.contains(&corrected) {
            content.replace_range(span.clone(), &format!("{}{}{}", indent, corrected, colon));
            refactors.push(DeprecationRefactor::log_only(format!(
                "Removed space after '+' in key '+ {}' on line {}, changed to '{}'",
                key, line, corrected
            )));
        } else {
            let end = entry_end(&content, span.start, indent.len());
            content.replace_range(span.start..end, "");
            refactors.push(DeprecationRefactor::log_only(format!(
                "Removed invalid key '+ {}' on line {} (not a valid config key)",
                key, line
            )));
        }
    }
    refactors.reverse();

    RuleResult::new(RULE, yml, content, refactors)
}

/// End of the entry starting at `start`: its line, plus following lines that
/// are blank or indented deeper, plus the final newline
fn entry_end(content: &str, start: usize, indent: usize) -> usize {
    let lines: Vec<&str> = content[start..].split('\n').collect();
    let mut count = 1;
    for line in &lines[1..] {
        if line.trim().is_empty() || line.len() - line.trim_start().len() > indent {
            count += 1;
        } else {
            break;
        }
    }

    let mut end = start + lines[..count].join("\n").len();
    if content[end..].starts_with('\n') {
        end += 1;
    }
    end
}

/// Add the `+` prefix to configs under the resource sections
///
/// Keys that name a directory or file of the project are path segments and
/// are walked into. Anything else that is not a config is moved to `+meta`.
pub fn prefix_plus_for_config(yml: &str, ctx: &RuleContext<'_>) -> Result<RuleResult, RefactorError> {
    with_project("prefix_plus_for_config", yml, |root, refactors| {
        let project_name = root.get_str("name").map(str::to_string);
        let packages_path = root
            .get_str("packages-install-path")
            .or_else(|| root.get_str("packages-paths"))
            .unwrap_or(DEFAULT_PACKAGES_PATH)
            .to_string();

        let mut logs = Vec::new();
        for node_type in PROJECT_NODE_TYPES {
            let Some(spec) = ctx.specs.project_spec(node_type) else {
                continue;
            };
            let Some(section) = root.get_mapping_mut(node_type) else {
                continue;
            };
            let walker = PlusPrefixWalker {
                spec,
                dict_configs: ctx.specs.dict_configs(),
                oracle: ctx.oracle,
            };

            let keys: Vec<String> = section.keys().map(str::to_string).collect();
            for key in keys {
                if project_name.as_deref() == Some(key.as_str()) {
                    if let Some(configs) = section.get_mapping_mut(&key) {
                        walker.walk(configs, &ctx.project_root.join(node_type), &mut logs);
                    }
                } else if spec.allows(&key) {
                    if !key.starts_with('+') {
                        rename_or_overwrite(section, &key, &format!("+{}", key));
                        logs.push(format!("Added '+' in front of top level config '{}'", key));
                    }
                } else if let Some(configs) = section.get_mapping_mut(&key) {
                    let package_dir = ctx.project_root.join(&packages_path).join(&key).join(node_type);
                    walker.walk(configs, &package_dir, &mut logs);
                }
            }
        }

        refactors.extend(
            logs.into_iter()
                .map(|log| DeprecationRefactor::new(log, DeprecationKind::MissingPlusPrefix)),
        );
    })
}

/// Recursive walk of one resource section
struct PlusPrefixWalker<'a> {
    spec: &'a ProjectNodeSpec,
    dict_configs: &'a DictConfigAnalysis,
    oracle: &'a dyn PathOracle,
}

impl PlusPrefixWalker<'_> {
    fn walk(&self, configs: &mut Mapping, path: &Path, logs: &mut Vec<String>) {
        let keys: Vec<String> = configs.keys().map(str::to_string).collect();
        for key in keys {
            let child: PathBuf = path.join(&key);

            if self.oracle.exists(&child) {
                let is_config = key.starts_with('+') && self.spec.allows(&key);
                if !is_config {
                    if let Some(nested) = configs.get_mapping_mut(&key) {
                        self.walk(nested, &child, logs);
                    }
                }
                continue;
            }

            match key.strip_prefix('+') {
                None => self.unprefixed(configs, &key, &child, logs),
                Some(bare) if self.spec.allows(bare) => self.dict_config(configs, &key, bare, logs),
                Some(bare) => {
                    if configs.get_or_insert_mapping(PLUS_META).is_none() {
                        continue;
                    }
                    if let Some(value) = configs.remove(&key) {
                        if let Some(meta) = configs.get_mapping_mut(PLUS_META) {
                            meta.insert(bare, value);
                        }
                    }
                    logs.push(format!("Moved unrecognized config '{}' to '+meta'", key));
                }
            }
        }
    }

    fn unprefixed(&self, configs: &mut Mapping, key: &str, child: &Path, logs: &mut Vec<String>) {
        if self.spec.allows(key) {
            rename_or_overwrite(configs, key, &format!("+{}", key));
            logs.push(format!("Added '+' in front of the nested config '{}'", key));
        } else if let Some(nested) = configs.get_mapping_mut(key) {
            self.walk(nested, child, logs);
        } else {
            if configs.get_or_insert_mapping(PLUS_META).is_none() {
                return;
            }
            if let Some(entry) = configs.remove_entry(key) {
                if let Some(meta) = configs.get_mapping_mut(PLUS_META) {
                    meta.push_entry(entry);
                }
            }
            logs.push(format!("Moved custom config '{}' to '+meta'", key));
        }
    }

    /// Sub-keys of a mapping config that it does not accept move to the sibling `+meta`
    fn dict_config(&self, configs: &mut Mapping, key: &str, bare: &str, logs: &mut Vec<String>) {
        let Some(allowed) = self.dict_configs.properties_of(bare) else {
            return;
        };
        let Some(value) = configs.get_mapping(key) else {
            return;
        };

        let misplaced: Vec<(String, String)> = value
            .keys()
            .filter_map(|sub| {
                if sub.starts_with('+') {
                    Some((
                        sub.to_string(),
                        format!("Moved '{}' from '{}' to '+meta' (subkeys shouldn't be +prefixed)", sub, key),
                    ))
                } else if !allowed.contains(sub) {
                    Some((
                        sub.to_string(),
                        format!("Moved '{}' from '{}' to '+meta' (not a valid property for {})", sub, key, bare),
                    ))
                } else {
                    None
                }
            })
            .collect();

        for (sub, log) in misplaced {
            if configs.get_or_insert_mapping(PLUS_META).is_none() {
                return;
            }
            let entry = configs.get_mapping_mut(key).and_then(|m| m.remove_entry(&sub));
            if let (Some(entry), Some(meta)) = (entry, configs.get_mapping_mut(PLUS_META)) {
                meta.push_entry(entry);
            }
            logs.push(log);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::KnownPaths;
    use fusefix_dbt::fixtures::schema_specs;
    use fusefix_jinja::ConfigRenderer;
    use pretty_assertions::assert_eq;

    fn logs(result: &RuleResult) -> Vec<&str> {
        result.logs().collect()
    }

    fn json(yml: &str) -> serde_json::Value {
        Document::parse(yml).unwrap().to_json()
    }

    fn prefix(yml: &str, files: &[&str]) -> RuleResult {
        let specs = schema_specs();
        let root = Path::new("/project");
        let oracle = KnownPaths::new(root, files.iter().copied());
        let renderer = ConfigRenderer::new();
        let ctx = RuleContext::new(&specs, root, &oracle, &renderer);
        prefix_plus_for_config(yml, &ctx).unwrap()
    }

    #[test]
    fn test_arguments_flag_is_added() {
        let result = changeset_dbt_project_flip_test_arguments_behavior_flag("name: shop\n").unwrap();
        assert_eq!(
            json(&result.refactored_content),
            serde_json::json!({"name": "shop", "flags": {"require_generic_test_arguments_property": true}})
        );
        assert_eq!(
            result.refactors[0].deprecation,
            Some(DeprecationKind::MissingGenericTestArgumentsProperty)
        );

        let set = "name: shop\nflags:\n  require_generic_test_arguments_property: true\n";
        assert!(!changeset_dbt_project_flip_test_arguments_behavior_flag(set).unwrap().refactored);

        let unset = "name: shop\nflags:\n  require_generic_test_arguments_property: false\n";
        let result = changeset_dbt_project_flip_test_arguments_behavior_flag(unset).unwrap();
        assert_eq!(
            result.refactored_content,
            "name: shop\nflags:\n  require_generic_test_arguments_property: true\n"
        );
    }

    #[test]
    fn behavior_flags_flip_only_when_false() {
        let yml = "flags:\n  source_freshness_run_project_hooks: false\n";
        let result = flip_behavior_flags(yml).unwrap();
        assert_eq!(result.refactored_content, "flags:\n  source_freshness_run_project_hooks: true\n");
        assert_eq!(
            logs(&result),
            vec!["Set flag 'source_freshness_run_project_hooks' to 'True' - This will run project hooks (on-run-start/on-run-end) as part of source freshness commands."]
        );

        assert!(!flip_behavior_flags("name: shop\n").unwrap().refactored);
    }

    #[test]
    fn deprecated_paths() {
        let yml = "name: shop\nlog-path: logs\ntarget-path: build\nsource-paths: [models]\n";
        let result = remove_deprecated_config(yml, false).unwrap();
        assert_eq!(result.refactored_content, "name: shop\nmodel-paths: [models]\n");
        assert_eq!(
            logs(&result),
            vec![
                "Removed the deprecated field 'log-path'",
                "Removed the deprecated field 'target-path'",
                "Renamed the deprecated field 'source-paths' to 'model-paths'",
            ]
        );

        let kept = remove_deprecated_config(yml, true).unwrap();
        assert_eq!(
            logs(&kept),
            vec![
                "Removed the deprecated field 'target-path' that wasn't set to the default value",
                "Renamed the deprecated field 'source-paths' to 'model-paths'",
            ]
        );
    }

    #[test]
    fn deprecated_paths_merge_into_new_key() {
        let yml = "seed-paths:\n  - seeds\ndata-paths:\n  - data\n";
        let result = remove_deprecated_config(yml, false).unwrap();
        assert_eq!(json(&result.refactored_content), serde_json::json!({"seed-paths": ["seeds", "data"]}));
        assert_eq!(
            logs(&result),
            vec!["Added the config of the deprecated field 'data-paths' to 'seed-paths'"]
        );
    }

    #[test]
    fn space_after_plus() {
        let yml = "models:\n  + tags: [a]\n  + bogus:\n      x: 1\n\n  +schema: s\n";
        let result = fix_space_after_plus(yml, &schema_specs());
        assert_eq!(result.refactored_content, "models:\n  +tags: [a]\n  +schema: s\n");
        assert_eq!(
            logs(&result),
            vec![
                "Removed space after '+' in key '+ tags' on line 2, changed to '+tags'",
                "Removed invalid key '+ bogus' on line 3 (not a valid config key)",
            ]
        );
    }

    #[test]
    fn top_level_and_nested_configs_get_a_plus() {
        let yml = "\
name: shop
models:
  materialized: view
  shop:
    materialized: table
    staging:
      schema: stg
      owner: data-team
";
        let result = prefix(yml, &["models/staging/stg_orders.sql"]);
        assert_eq!(
            json(&result.refactored_content)["models"],
            serde_json::json!({
                "+materialized": "view",
                "shop": {"+materialized": "table", "staging": {"+schema": "stg", "+meta": {"owner": "data-team"}}}
            })
        );
        assert_eq!(
            logs(&result),
            vec![
                "Added '+' in front of top level config 'materialized'",
                "Added '+' in front of the nested config 'materialized'",
                "Added '+' in front of the nested config 'schema'",
                "Moved custom config 'owner' to '+meta'",
            ]
        );
        assert!(result
            .refactors
            .iter()
            .all(|r| r.deprecation == Some(DeprecationKind::MissingPlusPrefix)));
    }

    #[test]
    fn logical_groupings_are_walked_and_bad_plus_keys_moved() {
        let yml = "\
name: shop
models:
  shop:
    marts:
      +owner: finance
      +persist_docs:
        relation: true
        +columns: true
        comment: x
";
        let result = prefix(yml, &[]);
        assert_eq!(
            logs(&result),
            vec![
                "Moved unrecognized config '+owner' to '+meta'",
                "Moved '+columns' from '+persist_docs' to '+meta' (subkeys shouldn't be +prefixed)",
                "Moved 'comment' from '+persist_docs' to '+meta' (not a valid property for persist_docs)",
            ]
        );
        assert_eq!(
            json(&result.refactored_content)["models"]["shop"]["marts"],
            serde_json::json!({
                "+persist_docs": {"relation": true},
                "+meta": {"owner": "finance", "+columns": true, "comment": "x"}
            })
        );
    }

    #[test]
    fn open_ended_configs_and_existing_paths_are_kept() {
        let yml = "\
name: shop
models:
  shop:
    staging:
      +labels:
        team: core
";
        assert!(!prefix(yml, &["models/staging/a.sql"]).refactored);
    }

    #[test]
    fn package_sections_use_the_packages_path() {
        let yml = "\
name: shop
packages-install-path: deps
models:
  audit:
    enabled: false
    reports:
      tags: [x]
";
        let result = prefix(yml, &["deps/audit/models/reports/r.sql"]);
        assert_eq!(
            logs(&result),
            vec![
                "Added '+' in front of the nested config 'enabled'",
                "Added '+' in front of the nested config 'tags'",
            ]
        );
    }
}
