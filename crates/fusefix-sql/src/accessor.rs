//! `config.get` / `config.require` rewrites for custom configs
//!
//! Custom keys now live under `meta`, so their accessors become
//! `config.meta_get` / `config.meta_require`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static SET_CONFIG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{%\s*set\s+config\s*=").unwrap());
static CONFIG_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%\s*set\s+\w+\s*=\s*config\s*%\}").unwrap());
static CONFIG_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"config\.(get|require)\s*\((?P<pre_ws>\s*)(?:"(?P<dkey>[^"']+)"|'(?P<skey>[^"']+)')(?P<rest>(?s:.*?))\)"#,
    )
    .unwrap()
});
static CHAINED_ACCESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"config\.(get|require)\s*\([^)]+\)\s*\.").unwrap());
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"']+)"|'([^"']+)'"#).unwrap());

pub const SHADOWING_WARNING: &str =
    "Detected potential config variable shadowing. Skipping refactor to avoid false positives.";

/// One rewritten accessor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReplacement {
    pub original: String,
    pub replacement: String,
}

/// Output of [`rewrite_config_access`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigAccessRewrite {
    pub content: String,

    /// Replacements in source order
    pub replacements: Vec<AccessReplacement>,

    pub warnings: Vec<String>,
}

/// Rewrite accessors whose key is not a known config field
///
/// Nothing is rewritten when `config` may be shadowed by a `{% set %}`.
/// Chained accesses such as `config.get('x').y` are only reported.
pub fn rewrite_config_access(sql: &str, is_known_config: impl Fn(&str) -> bool) -> ConfigAccessRewrite {
    if SET_CONFIG.is_match(sql) || CONFIG_ALIAS.is_match(sql) {
        return ConfigAccessRewrite {
            content: sql.to_string(),
            replacements: Vec::new(),
            warnings: vec![SHADOWING_WARNING.to_string()],
        };
    }

    let mut replacements = Vec::new();
    let content = CONFIG_ACCESS.replace_all(sql, |caps: &Captures| {
        let original = caps[0].to_string();
        if caps.get(0).is_some_and(|m| !starts_a_name(sql, m.start())) {
            return original;
        }
        let (quote, key) = match (caps.name("dkey"), caps.name("skey")) {
            (Some(key), _) => ('"', key.as_str()),
            (None, Some(key)) => ('\'', key.as_str()),
            (None, None) => return original,
        };
        if is_known_config(key) {
            return original;
        }

        let replacement = format!(
            "config.meta_{}({}{quote}{}{quote}{})",
            &caps[1],
            &caps["pre_ws"],
            key,
            &caps["rest"],
        );
        replacements.push(AccessReplacement {
            original: original.clone(),
            replacement: replacement.clone(),
        });
        replacement
    });

    let mut warnings = Vec::new();
    for chained in CHAINED_ACCESS.find_iter(sql).filter(|m| starts_a_name(sql, m.start())) {
        let text = chained.as_str();
        let key = QUOTED
            .captures(text)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str());
        if key.is_some_and(|key| !is_known_config(key)) {
            let preview: String = text.chars().take(50).collect();
            warnings.push(format!(
                "Detected chained config access: {}... These patterns require manual review as the structure may need to be adjusted.",
                preview
            ));
        }
    }

    ConfigAccessRewrite {
        content: content.into_owned(),
        replacements,
        warnings,
    }
}

/// `config` at `start` is the variable itself, not the tail of `my_config` or `x.config`
fn starts_a_name(sql: &str, start: usize) -> bool {
    sql[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn known(key: &str) -> bool {
        matches!(key, "materialized" | "unique_key" | "meta")
    }

    #[test]
    fn custom_keys_are_rewritten() {
        let sql = "{% if config.get('materialized') == 'table' and config.get( \"custom_flag\", default=false) %}\n{{ config.require('owner') }}";
        let result = rewrite_config_access(sql, known);
        assert_eq!(
            result.content,
            "{% if config.get('materialized') == 'table' and config.meta_get( \"custom_flag\", default=false) %}\n{{ config.meta_require('owner') }}"
        );
        assert_eq!(
            result.replacements,
            vec![
                AccessReplacement {
                    original: "config.get( \"custom_flag\", default=false)".to_string(),
                    replacement: "config.meta_get( \"custom_flag\", default=false)".to_string(),
                },
                AccessReplacement {
                    original: "config.require('owner')".to_string(),
                    replacement: "config.meta_require('owner')".to_string(),
                },
            ]
        );
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn shadowed_config_is_skipped() {
        let sql = "{% set config = {'a': 1} %}{{ config.get('custom') }}";
        let result = rewrite_config_access(sql, known);
        assert_eq!(result.content, sql);
        assert!(result.replacements.is_empty());
        assert_eq!(result.warnings, vec![SHADOWING_WARNING.to_string()]);

        let aliased = "{% set cfg = config %}{{ cfg.get('custom') }}";
        assert_eq!(rewrite_config_access(aliased, known).warnings.len(), 1);
    }

    #[test]
    fn chained_access_warns_for_custom_keys_only() {
        let sql = "{{ config.get('custom_dict').items() }} {{ config.get('meta').keys() }}";
        let result = rewrite_config_access(sql, known);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Detected chained config access: config.get('custom_dict')."));
    }

    #[test]
    fn other_objects_named_like_config_are_ignored() {
        let sql = "{{ my_config.get('custom') }} {{ model.config.get('custom') }} {{ config.get('custom') }}";
        let result = rewrite_config_access(sql, known);
        assert_eq!(
            result.content,
            "{{ my_config.get('custom') }} {{ model.config.get('custom') }} {{ config.meta_get('custom') }}"
        );
        assert_eq!(result.replacements.len(), 1);

        let chained = "{{ my_config.get('custom_dict').items() }}";
        assert!(rewrite_config_access(chained, known).warnings.is_empty());
    }
}
