//! Rules for SQL files
//!
//! SQL rules work on the raw text. Only the `{{ config(...) }}` call and the
//! `config.get` / `config.require` calls are rewritten; everything else in
//! the file is kept as written.

use std::collections::BTreeSet;
use std::path::Path;

use fusefix_core::{DeprecationKind, DeprecationRefactor, RuleResult};
use fusefix_dbt::ResourceKind;
use fusefix_sql::{
    parse_meta_literal, render_config_call, rewrite_config_access, ConfigCallExtractor, ConfigValue, Literal,
};
use tracing::debug;

use crate::error::RefactorError;
use crate::naming::config_misspelling;
use crate::pipeline::RuleContext;

/// Snapshot configs that the YAML schema does not list
const SNAPSHOT_EXTRA_CONFIGS: &[&str] = &["target_schema", "target_database"];

/// Remove `{% endmacro %}` and `{% endif %}` tags that close nothing
pub fn remove_unmatched_endings(sql: &str) -> RuleResult {
    const RULE: &str = "remove_unmatched_endings";

    let result = fusefix_sql::remove_unmatched_endings(sql);
    let refactors: Vec<DeprecationRefactor> = result
        .removed
        .iter()
        .map(|tag| {
            DeprecationRefactor::new(
                format!("Removed unmatched {} near line {}", tag.kind, tag.line),
                DeprecationKind::UnexpectedJinjaBlock,
            )
        })
        .collect();

    RuleResult::new(RULE, sql, result.content, refactors)
}

/// Config fields a `{{ config() }}` call may set for a resource kind
fn allowed_sql_configs(kind: ResourceKind, ctx: &RuleContext<'_>) -> BTreeSet<String> {
    let mut allowed = match (kind, ctx.specs.yaml_spec(kind.as_str())) {
        (ResourceKind::Macros, _) | (_, None) => ctx.specs.all_config_fields(),
        (_, Some(spec)) => spec.allowed_config_fields.clone(),
    };
    if kind == ResourceKind::Snapshots {
        allowed.extend(SNAPSHOT_EXTRA_CONFIGS.iter().map(|s| s.to_string()));
    }
    allowed
}

/// Rewrite the config call so custom keys live under `meta`
///
/// Misspelled keys are renamed and moved to the end of the call. Keys the
/// node type does not allow are added to `meta`, which keeps its position
/// when it already exists.
pub fn move_custom_configs_to_meta_sql(
    sql: &str,
    kind: ResourceKind,
    ctx: &RuleContext<'_>,
) -> Result<RuleResult, RefactorError> {
    const RULE: &str = "move_custom_configs_to_meta_sql";

    let Some(call) = ConfigCallExtractor::find(sql) else {
        return Ok(RuleResult::unchanged(RULE, sql));
    };
    let arguments = ConfigCallExtractor::arguments(&call);
    if arguments.is_empty() {
        return Ok(RuleResult::unchanged(RULE, sql));
    }

    let mut warnings = Vec::new();
    if let Some(warning) = ctx
        .renderer
        .cross_check(call.text, arguments.iter().map(|a| a.key.as_str()))
    {
        warnings.push(warning);
    }

    let allowed = allowed_sql_configs(kind, ctx);
    let mut items: Vec<(String, ConfigValue)> = arguments
        .iter()
        .map(|arg| (arg.key.clone(), value_of(&arg.source)))
        .collect();

    let mut renamed: Vec<(&str, &str)> = Vec::new();
    let mut moved: Vec<&str> = Vec::new();

    for arg in &arguments {
        if let Some(correct) = config_misspelling(&arg.key) {
            items.retain(|(k, _)| k != &arg.key);
            let value = value_of(&arg.source);
            match items.iter_mut().find(|(k, _)| k == correct) {
                Some((_, existing)) => *existing = value,
                None => items.push((correct.to_string(), value)),
            }
            renamed.push((arg.key.as_str(), correct));
        } else if !allowed.contains(&arg.key) {
            items.retain(|(k, _)| k != &arg.key);

            let meta_index = match items.iter().position(|(k, _)| k == "meta") {
                Some(i) => i,
                None => {
                    items.push(("meta".to_string(), ConfigValue::Meta(Vec::new())));
                    items.len() - 1
                }
            };
            let meta = &mut items[meta_index].1;
            if let ConfigValue::Source(source) = meta {
                match parse_meta_literal(source) {
                    Some(entries) => *meta = ConfigValue::Meta(entries),
                    None => {
                        debug!(key = %arg.key, "Existing meta is not a literal dict, skipping");
                        warnings.push(format!(
                            "Could not move custom config '{}' to 'meta': the existing 'meta' value is not a plain dict",
                            arg.key
                        ));
                        return Ok(RuleResult::unchanged(RULE, sql).with_warnings(warnings));
                    }
                }
            }

            let ConfigValue::Meta(entries) = meta else {
                warnings.push(format!(
                    "Could not move custom config '{}' to 'meta': the existing 'meta' value could not be read",
                    arg.key
                ));
                return Ok(RuleResult::unchanged(RULE, sql).with_warnings(warnings));
            };
            let source = arg
                .source
                .clone()
                .ok_or_else(|| fusefix_sql::SqlError::UnextractableValue(arg.key.clone()))?;
            match entries.iter_mut().find(|(k, _)| k == &arg.key) {
                Some((_, existing)) => *existing = source,
                None => entries.push((arg.key.clone(), source)),
            }
            moved.push(arg.key.as_str());
        }
    }

    if renamed.is_empty() && moved.is_empty() {
        return Ok(RuleResult::unchanged(RULE, sql).with_warnings(warnings));
    }

    // The call is rebuilt from keyword arguments only
    let unsupported = ConfigCallExtractor::unsupported_arguments(&call);
    if !unsupported.is_empty() {
        debug!(arguments = ?unsupported, "Config call has arguments that cannot be rebuilt, skipping");
        warnings.push(format!(
            "Could not move custom configs to 'meta': the config call also passes {}, which cannot be carried over. Move the custom configs under 'meta' by hand.",
            unsupported.join(", ")
        ));
        return Ok(RuleResult::unchanged(RULE, sql).with_warnings(warnings));
    }

    let mut refactors: Vec<DeprecationRefactor> = renamed
        .iter()
        .map(|(wrong, right)| {
            DeprecationRefactor::new(
                format!("Config '{}' is a common misspelling of '{}', it has been renamed.", wrong, right),
                DeprecationKind::CustomKeyInConfig,
            )
        })
        .collect();
    if !moved.is_empty() {
        let listed: Vec<String> = moved.iter().map(|k| Literal::Str(k.to_string()).repr()).collect();
        refactors.push(DeprecationRefactor::new(
            format!(
                "Moved custom config{} [{}] to 'meta'",
                if moved.len() > 1 { "s" } else { "" },
                listed.join(", ")
            ),
            DeprecationKind::CustomKeyInConfig,
        ));
    }

    let rendered = render_config_call(&items)?;
    let mut content = sql.to_string();
    content.replace_range(call.span.clone(), &rendered);

    Ok(RuleResult::new(RULE, sql, content, refactors).with_warnings(warnings))
}

fn value_of(source: &Option<String>) -> ConfigValue {
    source.clone().map_or(ConfigValue::Unextracted, ConfigValue::Source)
}

/// Read custom configs through `config.meta_get` / `config.meta_require`
pub fn move_custom_config_access_to_meta_sql_improved(sql: &str, ctx: &RuleContext<'_>) -> RuleResult {
    const RULE: &str = "move_custom_config_access_to_meta_sql_improved";

    let known = ctx.specs.all_config_fields();
    let rewrite = rewrite_config_access(sql, |key| known.contains(key));

    let refactors: Vec<DeprecationRefactor> = rewrite
        .replacements
        .iter()
        .rev()
        .map(|r| {
            DeprecationRefactor::new(
                format!("Refactored \"{}\" to \"{}\"", r.original, r.replacement),
                DeprecationKind::CustomKeyInConfig,
            )
        })
        .collect();

    RuleResult::new(RULE, sql, rewrite.content, refactors).with_warnings(rewrite.warnings)
}

/// Replace spaces in the file name with underscores
pub fn rename_sql_files_with_spaces(sql: &str, path: &Path) -> RuleResult {
    const RULE: &str = "rename_sql_files_with_spaces";

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return RuleResult::unchanged(RULE, sql);
    };
    if !name.contains(' ') {
        return RuleResult::unchanged(RULE, sql);
    }

    let new_name = name.replace(' ', "_");
    let refactor = DeprecationRefactor::new(
        format!("Renamed '{}' to '{}'", name, new_name),
        DeprecationKind::ResourceNamesWithSpaces,
    );
    RuleResult::new(RULE, sql, sql.to_string(), vec![refactor]).with_renamed_path(path.with_file_name(new_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusefix_dbt::fixtures::schema_specs;
    use fusefix_jinja::ConfigRenderer;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    use crate::oracle::KnownPaths;

    fn run_config_rule(sql: &str, kind: ResourceKind) -> RuleResult {
        let specs = schema_specs();
        let oracle = KnownPaths::new(Path::new("."), Vec::<&str>::new());
        let renderer = ConfigRenderer::new();
        let ctx = RuleContext::new(&specs, Path::new("."), &oracle, &renderer);
        move_custom_configs_to_meta_sql(sql, kind, &ctx).unwrap()
    }

    fn run_access_rule(sql: &str) -> RuleResult {
        let specs = schema_specs();
        let oracle = KnownPaths::new(Path::new("."), Vec::<&str>::new());
        let renderer = ConfigRenderer::new();
        let ctx = RuleContext::new(&specs, Path::new("."), &oracle, &renderer);
        move_custom_config_access_to_meta_sql_improved(sql, &ctx)
    }

    #[test]
    fn unmatched_endings_are_logged_by_line() {
        let result = remove_unmatched_endings("select 1\n{% endif %}\n");
        assert!(result.refactored);
        assert_eq!(result.refactored_content, "select 1\n\n");
        assert_eq!(result.logs().collect::<Vec<_>>(), vec!["Removed unmatched {% endif %} near line 2"]);
        assert_eq!(
            result.refactors[0].deprecation,
            Some(DeprecationKind::UnexpectedJinjaBlock)
        );
    }

    #[test]
    fn custom_config_moves_to_meta() {
        let sql = "{{ config(custom_key=env_var('X')) }}\nselect 1\n";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert!(result.refactored);
        assert!(result.refactored_content.contains("meta={'custom_key': env_var('X')}"));
        assert!(result.refactored_content.ends_with("\nselect 1\n"));
        assert_eq!(result.logs().collect::<Vec<_>>(), vec!["Moved custom config ['custom_key'] to 'meta'"]);
    }

    #[test]
    fn allowed_configs_are_kept_in_order() {
        let sql = "{{ config(materialized='table', owner_team='core', tags=['a']) }}";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert_eq!(
            result.refactored_content,
            "{{ config(\n    materialized=\"table\", \n    tags=['a'], \n    meta={'owner_team': 'core'}\n) }}"
        );
    }

    #[test]
    fn existing_meta_keeps_its_position() {
        let sql = "{{ config(meta={'a': 1}, custom='x', materialized='view') }}";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert_eq!(
            result.refactored_content,
            "{{ config(\n    meta={'a': 1, 'custom': 'x'}, \n    materialized=\"view\"\n) }}"
        );
    }

    #[test]
    fn several_moved_keys_are_listed() {
        let sql = "{{ config(first=1, second=2) }}";
        let result = run_config_rule(sql, ResourceKind::Models);
        assert_eq!(
            result.logs().collect::<Vec<_>>(),
            vec!["Moved custom configs ['first', 'second'] to 'meta'"]
        );
    }

    #[test]
    fn misspelled_hooks_are_renamed() {
        let sql = "{{ config({'post-hook': 'grant select', 'materialized': 'table'}) }}";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert!(result.refactored);
        assert!(result.refactored_content.contains("post_hook=\"grant select\""));
        assert!(!result.refactored_content.contains("post-hook"));
        assert_eq!(
            result.logs().collect::<Vec<_>>(),
            vec!["Config 'post-hook' is a common misspelling of 'post_hook', it has been renamed."]
        );
    }

    #[test]
    fn snapshots_allow_target_schema() {
        let sql = "{{ config(target_schema='snapshots', unique_key='id') }}";
        let result = run_config_rule(sql, ResourceKind::Snapshots);
        assert!(!result.refactored_content.contains("meta="));
    }

    #[test]
    fn dynamic_meta_is_left_alone_with_a_warning() {
        let sql = "{{ config(meta=var('m'), custom='x') }}";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert!(!result.refactored);
        assert_eq!(result.refactored_content, sql);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn kwargs_unpacking_is_left_alone_with_a_warning() {
        let sql = "{{ config(**base_config, custom_key='x') }}\nselect 1";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert!(!result.refactored);
        assert_eq!(result.refactored_content, sql);
        assert!(result.warnings.iter().any(|w| w.contains("**base_config")));
    }

    #[test]
    fn positional_argument_is_left_alone_with_a_warning() {
        let sql = "{{ config(var('cfg'), custom_key='x') }}\nselect 1";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert!(!result.refactored);
        assert_eq!(result.refactored_content, sql);
        assert!(result.warnings.iter().any(|w| w.contains("var('cfg')")));
    }

    #[test]
    fn kwargs_without_custom_keys_stay_quiet() {
        let sql = "{{ config(**base_config, materialized='table') }}\nselect 1";
        let result = run_config_rule(sql, ResourceKind::Models);

        assert!(!result.refactored);
        assert!(!result.warnings.iter().any(|w| w.contains("cannot be carried over")));
    }

    #[test]
    fn files_without_config_call_are_unchanged() {
        let result = run_config_rule("select * from {{ ref('a') }}", ResourceKind::Models);
        assert!(!result.refactored);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn custom_config_access_is_rewritten() {
        let sql = "{{ config.get('custom_key', 'x') }} {{ config.require(\"materialized\") }}";
        let result = run_access_rule(sql);

        assert_eq!(
            result.refactored_content,
            "{{ config.meta_get('custom_key', 'x') }} {{ config.require(\"materialized\") }}"
        );
        assert_eq!(result.refactors.len(), 1);
        assert!(result.logs().next().unwrap().starts_with("Refactored \"config.get('custom_key'"));
    }

    #[test]
    fn file_names_with_spaces_are_renamed() {
        let path = PathBuf::from("models/my model.sql");
        let result = rename_sql_files_with_spaces("select 1", &path);

        assert!(result.refactored);
        assert_eq!(result.refactored_file_path, Some(PathBuf::from("models/my_model.sql")));
        assert_eq!(result.logs().collect::<Vec<_>>(), vec!["Renamed 'my model.sql' to 'my_model.sql'"]);

        let untouched = rename_sql_files_with_spaces("select 1", Path::new("models/orders.sql"));
        assert!(!untouched.refactored);
    }
}
