//! Static parsing of `ref(...)` expressions

use crate::config_macro::split_top_level;

/// Arguments of a `ref()` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RefArgs {
    pub name: String,

    pub package: Option<String>,

    /// Model version, as written (`3` and `'3'` both give `"3"`)
    pub version: Option<String>,
}

impl RefArgs {
    /// Parse a ref expression
    ///
    /// Examples:
    /// - ref('orders')
    /// - ref("finance", "orders")
    /// - ref('orders', version=3) or ref('orders', v=3)
    ///
    /// Jinja braces around the call are accepted.
    pub fn parse(expression: &str) -> Option<RefArgs> {
        let mut trimmed = expression.trim();
        if let Some(inner) = trimmed.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
            trimmed = inner.trim();
        }

        let inner = trimmed.strip_prefix("ref")?.trim_start().strip_prefix('(')?.strip_suffix(')')?;

        let mut positional = Vec::new();
        let mut version = None;

        for argument in split_top_level(inner, ',') {
            let argument = argument.trim();
            if argument.is_empty() {
                continue;
            }

            match argument.split_once('=') {
                Some((key, value)) if matches!(key.trim(), "version" | "v") => {
                    let value = value.trim();
                    version = Some(Self::extract_string_literal(value).unwrap_or(value).to_string());
                }
                Some(_) => return None,
                None => positional.push(Self::extract_string_literal(argument)?.to_string()),
            }
        }

        let mut positional = positional.into_iter();
        match (positional.next(), positional.next(), positional.next()) {
            (Some(name), None, None) => Some(RefArgs { name, package: None, version }),
            (Some(package), Some(name), None) => Some(RefArgs {
                name,
                package: Some(package),
                version,
            }),
            _ => None,
        }
    }

    /// Extract string literal from quoted string
    ///
    /// Handles both single and double quotes.
    fn extract_string_literal(s: &str) -> Option<&str> {
        let trimmed = s.trim();

        if let Some(content) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Some(content);
        }

        if let Some(content) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return Some(content);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_ref() {
        assert_eq!(
            RefArgs::parse("ref('orders')"),
            Some(RefArgs {
                name: "orders".to_string(),
                package: None,
                version: None,
            })
        );
        assert_eq!(RefArgs::parse("{{ ref(\"orders\") }}").unwrap().name, "orders");
    }

    #[test]
    fn package_and_version() {
        let parsed = RefArgs::parse("ref('finance', 'orders', version=3)").unwrap();
        assert_eq!(parsed.package.as_deref(), Some("finance"));
        assert_eq!(parsed.name, "orders");
        assert_eq!(parsed.version.as_deref(), Some("3"));

        assert_eq!(RefArgs::parse("ref('orders', v='2')").unwrap().version.as_deref(), Some("2"));
    }

    #[test]
    fn not_a_static_ref() {
        assert_eq!(RefArgs::parse("source('raw', 'orders')"), None);
        assert_eq!(RefArgs::parse("ref(var('model'))"), None);
        assert_eq!(RefArgs::parse("ref('a', 'b', 'c')"), None);
        assert_eq!(RefArgs::parse("orders"), None);
    }
}
