//! Duplicate key lint
//!
//! A single pass over the lines that tracks the keys seen per mapping
//! column. It does not build a document, so it also works on files the
//! strict parser rejects.

use std::collections::HashSet;

use crate::parser::{find_closing_quote, indent_of, is_dash, is_trivia, parse_key};

/// A key that appears more than once in the same mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    /// 1-based line of the repeated key
    pub line: usize,

    /// 1-based column of the repeated key
    pub column: usize,

    pub key: String,
}

impl DuplicateKey {
    /// Lint message
    pub fn message(&self) -> String {
        format!("duplication of key \"{}\" in mapping", self.key)
    }
}

/// Find every repeated key, in line order
pub fn find_duplicate_keys(text: &str) -> Vec<DuplicateKey> {
    let mut duplicates = Vec::new();
    let mut frames: Vec<(usize, HashSet<String>)> = Vec::new();
    let mut block_scalar_owner: Option<usize> = None;
    let mut open_quote: Option<char> = None;
    let mut flow_depth = 0i32;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    for (i, line) in text.lines().enumerate() {
        if let Some(owner) = block_scalar_owner {
            if line.trim().is_empty() || indent_of(line) > owner {
                continue;
            }
            block_scalar_owner = None;
        }
        if let Some(quote) = open_quote {
            if find_closing_quote(line.trim_start(), quote).is_some() {
                open_quote = None;
            }
            continue;
        }
        if flow_depth > 0 {
            flow_depth = (flow_depth + flow_delta(line)).max(0);
            continue;
        }
        if is_trivia(line) {
            continue;
        }

        let mut column = indent_of(line);
        let mut content = &line[column..];
        while is_dash(content) {
            frames.retain(|(c, _)| *c <= column);
            let after = &content[1..];
            let body = after.trim_start();
            column += 1 + after.len() - body.len();
            content = body;
        }
        if content.is_empty() {
            continue;
        }
        let Some((key, _, offset)) = parse_key(content) else {
            continue;
        };

        frames.retain(|(c, _)| *c <= column);
        match frames.last_mut() {
            Some((c, keys)) if *c == column => {
                if key != "<<" && !keys.insert(key.clone()) {
                    duplicates.push(DuplicateKey {
                        line: i + 1,
                        column: column + 1,
                        key,
                    });
                }
            }
            _ => frames.push((column, HashSet::from([key]))),
        }

        let mut value = content[offset..].trim_start();
        while value.starts_with('&') || value.starts_with('!') {
            value = value
                .find(char::is_whitespace)
                .map_or("", |end| value[end..].trim_start());
        }
        match value.chars().next() {
            Some('|') | Some('>') => block_scalar_owner = Some(column),
            Some(quote @ ('"' | '\'')) => {
                if find_closing_quote(&value[1..], quote).is_none() {
                    open_quote = Some(quote);
                }
            }
            Some('[') | Some('{') => flow_depth = flow_delta(value).max(0),
            _ => {}
        }
    }

    duplicates
}

/// Net bracket depth change of a line, ignoring quoted text
fn flow_delta(line: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '{') => depth += 1,
            (None, ']' | '}') => depth -= 1,
            (None, '#') => break,
            _ => {}
        }
    }
    depth
}
