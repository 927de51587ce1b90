//! Jinja block tag matching
//!
//! Finds `{% endmacro %}` and `{% endif %}` tags that close nothing and
//! removes them.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{%-?\s*((?s:.*?))\s*-?%\}").unwrap());
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{#.*?#\}").unwrap());
static MACRO_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^macro\s+[^\s(]+").unwrap());
static IF_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^if[(\s]+").unwrap());

/// Closing tag kinds that are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    /// `{% endmacro %}`
    Endmacro,

    /// `{% endif %}`
    Endif,
}

impl BlockEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockEnd::Endmacro => "endmacro",
            BlockEnd::Endif => "endif",
        }
    }
}

impl std::fmt::Display for BlockEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{% {} %}}", self.as_str())
    }
}

/// An unmatched closing tag that was removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedTag {
    pub kind: BlockEnd,

    /// 1-based line of the tag in the input
    pub line: usize,

    /// Byte range of the tag in the input
    pub span: Range<usize>,
}

/// Output of [`remove_unmatched_endings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedEndings {
    pub content: String,

    /// Removed tags, in source order
    pub removed: Vec<RemovedTag>,
}

/// Remove closing tags without an opening tag
///
/// Tags inside `{# #}` comments, or after a `{#` that is never closed,
/// are ignored.
pub fn remove_unmatched_endings(sql: &str) -> UnmatchedEndings {
    let comments: Vec<Range<usize>> = COMMENT.find_iter(sql).map(|m| m.range()).collect();
    let mut open_comments = CommentDepth::default();

    let mut macros = 0usize;
    let mut ifs = 0usize;
    let mut removed = Vec::new();

    for captures in TAG.captures_iter(sql) {
        let (Some(tag), Some(content)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let start = tag.start();

        if comments.iter().any(|c| c.contains(&start)) || open_comments.depth_at(sql, start) > 0 {
            continue;
        }

        let content = content.as_str();
        let unmatched = if MACRO_START.is_match(content) {
            macros += 1;
            None
        } else if IF_START.is_match(content) {
            ifs += 1;
            None
        } else if content.starts_with("endmacro") {
            close(&mut macros, BlockEnd::Endmacro)
        } else if content.starts_with("endif") {
            close(&mut ifs, BlockEnd::Endif)
        } else {
            None
        };

        if let Some(kind) = unmatched {
            removed.push(RemovedTag {
                kind,
                line: sql[..start].matches('\n').count() + 1,
                span: tag.range(),
            });
        }
    }

    let mut content = sql.to_string();
    for tag in removed.iter().rev() {
        content.replace_range(tag.span.clone(), "");
    }

    UnmatchedEndings { content, removed }
}

fn close(open: &mut usize, kind: BlockEnd) -> Option<BlockEnd> {
    if *open == 0 {
        Some(kind)
    } else {
        *open -= 1;
        None
    }
}

/// Running count of `{#` not yet closed by `#}`
///
/// Positions must be queried in increasing order.
#[derive(Debug, Default)]
struct CommentDepth {
    pos: usize,
    depth: usize,
}

impl CommentDepth {
    fn depth_at(&mut self, text: &str, until: usize) -> usize {
        let bytes = text.as_bytes();
        while self.pos + 2 <= until {
            match &bytes[self.pos..self.pos + 2] {
                b"{#" => {
                    self.depth += 1;
                    self.pos += 2;
                }
                b"#}" => {
                    self.depth = self.depth.saturating_sub(1);
                    self.pos += 2;
                }
                _ => self.pos += 1,
            }
        }
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unmatched_endmacro_is_removed() {
        let sql = "select 1\n{% endmacro %}\nfrom x\n";
        let result = remove_unmatched_endings(sql);
        assert_eq!(result.content, "select 1\n\nfrom x\n");
        assert_eq!(result.removed.len(), 1);
        assert_eq!(result.removed[0].kind, BlockEnd::Endmacro);
        assert_eq!(result.removed[0].line, 2);
    }

    #[test]
    fn balanced_blocks_are_kept() {
        let sql = "{% macro m(a) %}\n{%- if(a) -%}x{% endif %}\n{% endmacro %}";
        let result = remove_unmatched_endings(sql);
        assert_eq!(result.content, sql);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn extra_endif_with_whitespace_control() {
        let sql = "{% if a %}x{% endif %}\n\n{%- endif -%}";
        let result = remove_unmatched_endings(sql);
        assert_eq!(result.content, "{% if a %}x{% endif %}\n\n");
        assert_eq!(result.removed[0].line, 3);
        assert_eq!(result.removed[0].kind.to_string(), "{% endif %}");
    }

    #[test]
    fn multi_line_tags() {
        let sql = "a\n{%\n  endmacro\n%}\nb";
        let result = remove_unmatched_endings(sql);
        assert_eq!(result.content, "a\n\nb");
        assert_eq!(result.removed[0].line, 2);
    }

    #[test]
    fn commented_tags_are_ignored() {
        let sql = "{# {% endif %} #}\nselect 1";
        assert!(remove_unmatched_endings(sql).removed.is_empty());

        let unclosed = "{#\n{% if a %}\nselect 1\n{% endif %}\n";
        assert!(remove_unmatched_endings(unclosed).removed.is_empty());
    }

    #[test]
    fn several_removals_keep_offsets() {
        let sql = "{% endif %}a{% endmacro %}b{% endif %}";
        let result = remove_unmatched_endings(sql);
        assert_eq!(result.content, "ab");
        let kinds: Vec<_> = result.removed.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![BlockEnd::Endif, BlockEnd::Endmacro, BlockEnd::Endif]);
    }
}
