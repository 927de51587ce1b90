//! Line-level YAML cleanups
//!
//! These rules run before any parsing: each one fixes something that would
//! otherwise stop the YAML parser or make Fusion reject the file.

use std::sync::LazyLock;

use fusefix_core::{DeprecationRefactor, RuleResult};
use regex::Regex;

const LEFT_FANCY_QUOTE: char = '\u{201c}';
const RIGHT_FANCY_QUOTE: char = '\u{201d}';

/// Spaces written in place of one indentation tab
const SPACES_PER_TAB: &str = "  ";

static INDENTED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*version\s*:\s*2\s*$").unwrap());

/// Replace curly double quotes used as string delimiters
///
/// Curly quotes inside a regular double-quoted string are content and
/// stay as they are.
pub fn replace_fancy_quotes(yml: &str) -> RuleResult {
    const RULE: &str = "replace_fancy_quotes";

    if !yml.contains([LEFT_FANCY_QUOTE, RIGHT_FANCY_QUOTE]) {
        return RuleResult::unchanged(RULE, yml);
    }

    let mut refactors = Vec::new();
    let lines: Vec<String> = yml
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if !line.contains([LEFT_FANCY_QUOTE, RIGHT_FANCY_QUOTE]) {
                return line.to_string();
            }
            let (fixed, replaced) = fix_line_quotes(line);
            if replaced > 0 {
                refactors.push(DeprecationRefactor::log_only(format!(
                    "Replaced {} fancy quotes with regular quotes on line {}",
                    replaced,
                    i + 1
                )));
            }
            fixed
        })
        .collect();

    RuleResult::new(RULE, yml, lines.join("\n"), refactors)
}

/// Rewrite one line, returning it with the number of replaced quotes
fn fix_line_quotes(line: &str) -> (String, usize) {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut opened_by: Option<char> = None;
    let mut replaced = 0;

    for (i, &c) in chars.iter().enumerate() {
        let escaped = i > 0 && chars[i - 1] == '\\';
        match c {
            '"' if !escaped => {
                match opened_by {
                    None => opened_by = Some('"'),
                    Some('"') => opened_by = None,
                    Some(_) => {}
                }
                out.push(c);
            }
            LEFT_FANCY_QUOTE => match opened_by {
                Some('"') => out.push(c),
                None => {
                    opened_by = Some(LEFT_FANCY_QUOTE);
                    replaced += 1;
                    out.push('"');
                }
                Some(_) => {
                    replaced += 1;
                    out.push('"');
                }
            },
            RIGHT_FANCY_QUOTE => match opened_by {
                None => {
                    replaced += 1;
                    out.push('"');
                }
                Some('"') if chars[i + 1..].contains(&'"') => out.push(c),
                Some(_) => {
                    opened_by = None;
                    replaced += 1;
                    out.push('"');
                }
            },
            c => out.push(c),
        }
    }

    (out, replaced)
}

/// Empty out lines that hold nothing but tabs and spaces
pub fn remove_tab_only_lines(yml: &str) -> RuleResult {
    const RULE: &str = "remove_tab_only_lines";

    let mut refactors = Vec::new();
    let lines: Vec<&str> = yml
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if line.contains('\t') && line.trim().is_empty() {
                refactors.push(DeprecationRefactor::log_only(format!(
                    "Removed line containing only tabs on line {}",
                    i + 1
                )));
                ""
            } else {
                line
            }
        })
        .collect();

    RuleResult::new(RULE, yml, lines.join("\n"), refactors)
}

/// Write `version: 2` at column zero with a single space
pub fn removed_extra_indentation(yml: &str) -> RuleResult {
    const RULE: &str = "removed_extra_indentation";
    const CANONICAL: &str = "version: 2";

    let mut refactors = Vec::new();
    let lines: Vec<&str> = yml
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if line != CANONICAL && INDENTED_VERSION.is_match(line) {
                refactors.push(DeprecationRefactor::log_only(format!(
                    "Removed the extra indentation around 'version: 2' on line {}",
                    i + 1
                )));
                CANONICAL
            } else {
                line
            }
        })
        .collect();

    RuleResult::new(RULE, yml, lines.join("\n"), refactors)
}

/// Replace tabs used as indentation with spaces
///
/// Fixes one tab at a time, first occurrence first, until none is left.
pub fn remove_extra_tabs(yml: &str) -> RuleResult {
    const RULE: &str = "remove_extra_tabs";

    let mut current = yml.to_string();
    let mut refactors = Vec::new();

    while let Some((line, column)) = first_indentation_tab(&current) {
        refactors.push(DeprecationRefactor::log_only(format!(
            "Found extra tabs: line {} - column {}",
            line + 1,
            column + 1
        )));

        let mut lines: Vec<String> = current.split('\n').map(str::to_string).collect();
        lines[line].replace_range(column..column + 1, SPACES_PER_TAB);
        current = lines.join("\n");
    }

    RuleResult::new(RULE, yml, current, refactors)
}

/// 0-based line and byte column of the first tab in a line's indentation
///
/// Only lines with content after the indentation count.
fn first_indentation_tab(text: &str) -> Option<(usize, usize)> {
    text.split('\n').enumerate().find_map(|(i, line)| {
        let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
        if indent_len == line.len() {
            return None;
        }
        line[..indent_len].find('\t').map(|col| (i, col))
    })
}
