//! `{{ config(...) }}` extraction and rendering
//!
//! Works on source text only: values are kept as the exact source of each
//! argument, so Jinja expressions such as `env_var('X')` survive a rewrite
//! untouched.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlError;
use crate::literal::Literal;

static CONFIG_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*config\s*\(").unwrap());
static CALL_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\}\}").unwrap());
static KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=").unwrap());

/// Characters that mark a quoted value as more than a plain string
const EXPRESSION_CHARS: &[char] = &['(', ')', '[', ']', '{', '}', '+', '-', '*', '/', '%'];

/// A `{{ config(...) }}` call located in a SQL file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCall<'a> {
    /// Byte range of the whole call, braces included
    pub span: Range<usize>,

    /// Source of the whole call
    pub text: &'a str,

    /// Source between `config(` and the matching `)`
    pub arguments: &'a str,
}

/// How an argument was passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentForm {
    /// `config(key=value)`
    Keyword,

    /// `config({'key': value})`
    DictEntry,
}

/// One statically extracted config argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArgument {
    pub key: String,

    /// Source text of the value, `None` if it could not be isolated
    pub source: Option<String>,

    pub form: ArgumentForm,
}

/// Extracts config calls and their arguments without rendering them
pub struct ConfigCallExtractor;

impl ConfigCallExtractor {
    /// Locate the first `{{ config(...) }}` call
    ///
    /// Parentheses inside string literals are ignored. A `)` that brings
    /// the depth back to zero only ends the call when `}}` follows it.
    pub fn find(sql: &str) -> Option<ConfigCall<'_>> {
        let start = CONFIG_START.find(sql)?;
        let args_start = start.end();

        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        let mut prev: Option<char> = sql[..args_start].chars().last();

        for (offset, c) in sql[args_start..].char_indices() {
            let i = args_start + offset;

            if (c == '"' || c == '\'') && prev != Some('\\') {
                match quote {
                    None => quote = Some(c),
                    Some(q) if q == c => quote = None,
                    Some(_) => {}
                }
            } else if quote.is_none() {
                if c == '(' {
                    depth += 1;
                } else if c == ')' {
                    depth -= 1;
                    if depth == 0 {
                        let after = &sql[i + 1..];
                        let window: String = after.chars().take(9).collect();
                        match CALL_END.find(&window) {
                            Some(close) => {
                                let end = i + 1 + close.end();
                                return Some(ConfigCall {
                                    span: start.start()..end,
                                    text: &sql[start.start()..end],
                                    arguments: &sql[args_start..i],
                                });
                            }
                            None => depth = 1,
                        }
                    }
                }
            }

            prev = Some(c);
        }

        None
    }

    /// Keyword and dict-literal arguments of a call, in source order
    ///
    /// Positional arguments other than a dict literal are ignored. A key
    /// given twice keeps its first position and its last value.
    pub fn arguments(call: &ConfigCall<'_>) -> Vec<ConfigArgument> {
        parse_arguments(call).0
    }

    /// Argument pieces [`Self::arguments`] cannot represent
    ///
    /// Positional expressions such as `var('cfg')`, `**kwargs` unpacking and
    /// dict entries without a quoted key. A call holding any of these cannot
    /// be rebuilt from its keyword arguments alone.
    pub fn unsupported_arguments<'a>(call: &ConfigCall<'a>) -> Vec<&'a str> {
        parse_arguments(call).1
    }
}

fn parse_arguments<'a>(call: &ConfigCall<'a>) -> (Vec<ConfigArgument>, Vec<&'a str>) {
    let mut arguments: Vec<ConfigArgument> = Vec::new();
    let mut unsupported = Vec::new();
    let mut push = |argument: ConfigArgument| {
        match arguments.iter_mut().find(|a| a.key == argument.key) {
            Some(existing) => *existing = argument,
            None => arguments.push(argument),
        }
    };

    for piece in split_top_level(call.arguments, ',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        if let Some(inner) = piece.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            for entry in split_top_level(inner, ',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                match dict_entry(entry) {
                    Some((key, value)) => push(ConfigArgument {
                        key,
                        source: non_empty(value),
                        form: ArgumentForm::DictEntry,
                    }),
                    None => unsupported.push(entry),
                }
            }
            continue;
        }

        let keyword = KEYWORD
            .captures(piece)
            .and_then(|captures| Some((captures.get(0)?, captures.get(1)?)))
            .filter(|(whole, _)| !piece[whole.end()..].starts_with('='));
        match keyword {
            Some((whole, key)) => push(ConfigArgument {
                key: key.as_str().to_string(),
                source: non_empty(&piece[whole.end()..]),
                form: ArgumentForm::Keyword,
            }),
            None => unsupported.push(piece),
        }
    }

    (arguments, unsupported)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim().trim_end_matches(',').trim_end();
    (!value.is_empty()).then(|| value.to_string())
}

/// `'key': value` or `"key": value`
fn dict_entry(entry: &str) -> Option<(String, &str)> {
    let quote = entry.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let close = entry[1..].find(quote)? + 1;
    let key = entry[1..close].to_string();
    let value = entry[close + 1..].trim_start().strip_prefix(':')?;
    Some((key, value))
}

/// Split on a delimiter outside strings and brackets
pub(crate) fn split_top_level(text: &str, delimiter: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if (c == '"' || c == '\'') && prev != Some('\\') {
            match quote {
                None => quote = Some(c),
                Some(q) if q == c => quote = None,
                Some(_) => {}
            }
        } else if quote.is_none() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                c if c == delimiter && depth == 0 => {
                    pieces.push(&text[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            }
        }
        prev = Some(c);
    }
    pieces.push(&text[start..]);
    pieces
}

/// A value in a rewritten config call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Source text carried over from the original call
    Source(String),

    /// A value whose source could not be isolated
    Unextracted,

    /// A `meta` dict as `(key, source)` pairs
    Meta(Vec<(String, String)>),
}

impl ConfigValue {
    fn render(&self, key: &str) -> Result<String, SqlError> {
        match self {
            ConfigValue::Source(source) => Ok(render_source(source)),
            ConfigValue::Unextracted => Err(SqlError::UnextractableValue(key.to_string())),
            ConfigValue::Meta(entries) => {
                let items: Vec<String> = entries.iter().map(|(k, v)| format!("'{}': {}", k, v)).collect();
                Ok(format!("{{{}}}", items.join(", ")))
            }
        }
    }
}

/// Plain quoted strings are normalised to double quotes
fn render_source(source: &str) -> String {
    let quoted = source.len() >= 2
        && ((source.starts_with('\'') && source.ends_with('\''))
            || (source.starts_with('"') && source.ends_with('"')));

    if quoted && !source.contains(EXPRESSION_CHARS) {
        let content = &source[1..source.len() - 1];
        if !content.contains('"') {
            return format!("\"{}\"", content);
        }
    }
    source.to_string()
}

/// Render a config call
///
/// Keyword form puts each argument on its own line. Keys that are not
/// valid identifiers force the dict-literal form.
pub fn render_config_call(items: &[(String, ConfigValue)]) -> Result<String, SqlError> {
    let body = if items.iter().any(|(k, _)| k.contains('-')) {
        let entries = items
            .iter()
            .map(|(k, v)| Ok(format!("'{}': {}", k, v.render(k)?)))
            .collect::<Result<Vec<_>, SqlError>>()?;
        format!("{{{}}}", entries.join(", "))
    } else {
        items
            .iter()
            .map(|(k, v)| Ok(format!("\n    {}={}", k, v.render(k)?)))
            .collect::<Result<Vec<_>, SqlError>>()?
            .join(", ")
    };

    Ok(format!("{{{{ config({}\n) }}}}", body))
}

/// Entries of a `meta` value written as a plain dict literal
///
/// Values are returned as source text: strings single-quoted, everything
/// else in literal notation. Anything that is not a constant dict (Jinja
/// calls, variables) yields `None`.
pub fn parse_meta_literal(source: &str) -> Option<Vec<(String, String)>> {
    match Literal::parse(source)? {
        Literal::Dict(entries) => Some(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Literal::Str(s) => s,
                        other => other.repr(),
                    };
                    let value = match v {
                        Literal::Str(s) => format!("'{}'", s),
                        other => other.repr(),
                    };
                    (key, value)
                })
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(sql: &str) -> Vec<(String, Option<String>)> {
        let call = ConfigCallExtractor::find(sql).unwrap();
        ConfigCallExtractor::arguments(&call)
            .into_iter()
            .map(|a| (a.key, a.source))
            .collect()
    }

    #[test]
    fn finds_call_with_nested_jinja() {
        let sql = "{{ config(materialized='incremental', incremental_predicates=[\"d = '{{ var('run_date') }}'\"]) }}\nselect 1";
        let call = ConfigCallExtractor::find(sql).unwrap();
        assert_eq!(call.span.start, 0);
        assert!(call.text.ends_with("\"]) }}"));
        assert_eq!(&sql[call.span.end..], "\nselect 1");
    }

    #[test]
    fn paren_not_followed_by_braces_keeps_scanning() {
        let sql = "{{ config(x=1) ~ y) }}";
        let call = ConfigCallExtractor::find(sql).unwrap();
        assert_eq!(call.text, sql);
        assert_eq!(call.arguments, "x=1) ~ y");
    }

    #[test]
    fn no_call() {
        assert!(ConfigCallExtractor::find("select config from t").is_none());
        assert!(ConfigCallExtractor::find("{{ config(a='b'").is_none());
    }

    #[test]
    fn keyword_arguments() {
        let sql = "{{\n  config(\n    materialized = 'table',\n    custom_key=env_var('X', 'd'),\n    post_hook=\"grant select on {{ this }} to role r\",\n  )\n}}";
        assert_eq!(
            keys(sql),
            vec![
                ("materialized".to_string(), Some("'table'".to_string())),
                ("custom_key".to_string(), Some("env_var('X', 'd')".to_string())),
                (
                    "post_hook".to_string(),
                    Some("\"grant select on {{ this }} to role r\"".to_string())
                ),
            ]
        );
    }

    #[test]
    fn dict_literal_arguments() {
        let sql = "{{ config({'pre-hook': 'select 1', \"materialized\": 'view'}) }}";
        let call = ConfigCallExtractor::find(sql).unwrap();
        let arguments = ConfigCallExtractor::arguments(&call);
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[0].key, "pre-hook");
        assert_eq!(arguments[0].source.as_deref(), Some("'select 1'"));
        assert_eq!(arguments[0].form, ArgumentForm::DictEntry);
        assert_eq!(arguments[1].key, "materialized");
    }

    #[test]
    fn comparison_is_not_a_keyword() {
        assert_eq!(keys("{{ config(enabled=(a == b)) }}").len(), 1);
        assert!(keys("{{ config(a == b) }}").is_empty());
    }

    #[test]
    fn pieces_that_are_not_keywords_are_reported() {
        let sql = "{{ config(**base_config, var('cfg'), {'a': 1, **extra}, b=2, enabled=(x == y)) }}";
        let call = ConfigCallExtractor::find(sql).unwrap();
        assert_eq!(
            ConfigCallExtractor::unsupported_arguments(&call),
            vec!["**base_config", "var('cfg')", "**extra"]
        );
        assert_eq!(
            keys(sql),
            vec![
                ("a".to_string(), Some("1".to_string())),
                ("b".to_string(), Some("2".to_string())),
                ("enabled".to_string(), Some("(x == y)".to_string())),
            ]
        );

        let plain = ConfigCallExtractor::find("{{ config(materialized='table') }}").unwrap();
        assert!(ConfigCallExtractor::unsupported_arguments(&plain).is_empty());
    }

    #[test]
    fn missing_value_is_unextracted() {
        assert_eq!(keys("{{ config(a=) }}"), vec![("a".to_string(), None)]);
    }

    #[test]
    fn render_keyword_form() {
        let items = vec![
            ("materialized".to_string(), ConfigValue::Source("'table'".to_string())),
            ("tags".to_string(), ConfigValue::Source("['a']".to_string())),
            (
                "meta".to_string(),
                ConfigValue::Meta(vec![("custom_key".to_string(), "env_var('X')".to_string())]),
            ),
        ];
        assert_eq!(
            render_config_call(&items).unwrap(),
            "{{ config(\n    materialized=\"table\", \n    tags=['a'], \n    meta={'custom_key': env_var('X')}\n) }}"
        );
    }

    #[test]
    fn render_dict_form() {
        let items = vec![("pre-hook".to_string(), ConfigValue::Source("'select 1'".to_string()))];
        assert_eq!(
            render_config_call(&items).unwrap(),
            "{{ config({'pre-hook': \"select 1\"}\n) }}"
        );
    }

    #[test]
    fn quoted_expressions_are_left_alone() {
        assert_eq!(render_source("'a-b'"), "'a-b'");
        assert_eq!(render_source("'say \"hi\"'"), "'say \"hi\"'");
        assert_eq!(render_source("\"x\""), "\"x\"");
        assert_eq!(render_source("true"), "true");
    }

    #[test]
    fn unextracted_value_is_an_error() {
        let items = vec![("a".to_string(), ConfigValue::Unextracted)];
        assert_eq!(
            render_config_call(&items).unwrap_err(),
            SqlError::UnextractableValue("a".to_string())
        );
    }

    #[test]
    fn meta_literals() {
        assert_eq!(
            parse_meta_literal("{'owner': 'data', \"n\": 1, 'flags': [True, None]}"),
            Some(vec![
                ("owner".to_string(), "'data'".to_string()),
                ("n".to_string(), "1".to_string()),
                ("flags".to_string(), "[True, None]".to_string()),
            ])
        );
        assert_eq!(parse_meta_literal("{'a': var('x')}"), None);
        assert_eq!(parse_meta_literal("var('meta')"), None);
    }
}
