//! Key and resource name helpers shared by the rules

/// Misspelled property names and their fix, matched case-insensitively
pub const COMMON_PROPERTY_MISSPELLINGS: &[(&str, &str)] = &[
    ("desciption", "description"),
    ("descrption", "description"),
    ("descritption", "description"),
    ("desscription", "description"),
];

/// Hyphenated config names and their fix
pub const COMMON_CONFIG_MISSPELLINGS: &[(&str, &str)] = &[
    ("post-hook", "post_hook"),
    ("pre-hook", "pre_hook"),
];

/// Correct spelling of a property, if `key` is a known misspelling
pub fn property_misspelling(key: &str) -> Option<&'static str> {
    let lower = key.to_lowercase();
    COMMON_PROPERTY_MISSPELLINGS
        .iter()
        .find(|(wrong, _)| *wrong == lower)
        .map(|(_, right)| *right)
}

/// Correct spelling of a config, if `key` is a known misspelling
pub fn config_misspelling(key: &str) -> Option<&'static str> {
    COMMON_CONFIG_MISSPELLINGS
        .iter()
        .find(|(wrong, _)| *wrong == key)
        .map(|(_, right)| *right)
}

/// Singular, title-cased node type used in log lines
///
/// `models` becomes `Model`, `data_tests` becomes `Data_Test`.
pub fn pretty_node_type(node_type: &str) -> String {
    let mut chars = node_type.chars();
    chars.next_back();

    let mut out = String::with_capacity(node_type.len());
    let mut start_of_word = true;
    for c in chars {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

/// Replace spaces with underscores, leaving `{{ ... }}` blocks untouched
pub fn replace_spaces_outside_jinja(text: &str) -> String {
    rewrite_outside_jinja(text, |c| Some(if c == ' ' { '_' } else { c }))
}

/// Drop anything but alphanumerics and underscores, leaving `{{ ... }}` blocks untouched
pub fn remove_non_alpha_outside_jinja(text: &str) -> String {
    rewrite_outside_jinja(text, |c| (c.is_alphanumeric() || c == '_').then_some(c))
}

fn rewrite_outside_jinja(text: &str, mut outside: impl FnMut(char) -> Option<char>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth: isize = 0;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("{{") {
            depth += 1;
            out.push_str("{{");
            rest = &rest[2..];
            continue;
        }
        if rest.starts_with("}}") {
            depth -= 1;
            out.push_str("}}");
            rest = &rest[2..];
            continue;
        }

        if depth > 0 {
            out.push(c);
        } else if let Some(c) = outside(c) {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_type_titles() {
        assert_eq!(pretty_node_type("models"), "Model");
        assert_eq!(pretty_node_type("data_tests"), "Data_Test");
        assert_eq!(pretty_node_type("unit_tests"), "Unit_Test");
        assert_eq!(pretty_node_type("analyses"), "Analyse");
    }

    #[test]
    fn misspellings() {
        assert_eq!(property_misspelling("Desciption"), Some("description"));
        assert_eq!(property_misspelling("description"), None);
        assert_eq!(config_misspelling("post-hook"), Some("post_hook"));
        assert_eq!(config_misspelling("Post-hook"), None);
    }

    #[test]
    fn spaces_inside_jinja_are_kept() {
        assert_eq!(
            replace_spaces_outside_jinja("my model {{ env_var('X') | lower }} v2"),
            "my_model_{{ env_var('X') | lower }}_v2"
        );
    }

    #[test]
    fn non_alpha_removal() {
        assert_eq!(remove_non_alpha_outside_jinja("Weekly KPI (v2)!"), "WeeklyKPIv2");
        assert_eq!(
            remove_non_alpha_outside_jinja("kpi-{{ var('x') }}"),
            "kpi{{ var('x') }}"
        );
    }
}
