//! YAML emitter
//!
//! Unchanged entries and items are copied from their source lines, shifted
//! when they moved to another column. Changed ones are rendered in block
//! style with the document's detected indentation.

use crate::node::{shift_line, Entry, Item, Mapping, Node, RawText, Scalar, ScalarStyle, Sequence, Trivia};

/// Indentation used for re-rendered collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indent {
    /// Columns between a key and the keys of its nested mapping
    pub mapping: usize,

    /// Columns between a key and the dashes of its nested sequence
    pub sequence: usize,
}

impl Default for Indent {
    fn default() -> Self {
        Self {
            mapping: 2,
            sequence: 2,
        }
    }
}

pub(crate) struct Emitter {
    indent: Indent,
    out: Vec<String>,
}

impl Emitter {
    pub(crate) fn new(indent: Indent) -> Self {
        Self {
            indent,
            out: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<String> {
        self.out
    }

    pub(crate) fn verbatim(&mut self, lines: &[String]) {
        self.out.extend(lines.iter().cloned());
    }

    pub(crate) fn root(&mut self, node: &Node, column: usize) {
        match node {
            Node::Mapping(m) if !m.flow && m.props.is_none() => self.mapping(m, column, false),
            Node::Sequence(s) if !s.flow && s.props.is_none() && !s.is_empty() => self.sequence(s, column, false),
            other => {
                let lines = self.inline(other, column);
                self.push_value_lines(" ".repeat(column), lines, None);
            }
        }
    }

    fn trivia(&mut self, trivia: &Trivia, column: usize) {
        let delta = column as isize - trivia.column as isize;
        for line in &trivia.lines {
            self.out.push(shift_line(line, delta));
        }
    }

    fn raw(&mut self, raw: &RawText, column: usize) {
        self.out.push(format!("{}{}", " ".repeat(column), raw.first));
        let delta = column as isize - raw.column as isize;
        for line in &raw.rest {
            self.out.push(shift_line(line, delta));
        }
    }

    fn mapping(&mut self, mapping: &Mapping, column: usize, skip_first_leading: bool) {
        for (i, entry) in mapping.entries.iter().enumerate() {
            self.entry(entry, column, skip_first_leading && i == 0);
        }
    }

    fn sequence(&mut self, sequence: &Sequence, column: usize, skip_first_leading: bool) {
        for (i, item) in sequence.items.iter().enumerate() {
            self.item(item, column, skip_first_leading && i == 0);
        }
    }

    fn entry(&mut self, entry: &Entry, column: usize, skip_leading: bool) {
        if !skip_leading {
            self.trivia(&entry.leading, column);
        }
        if entry.is_pristine() {
            if let Some(raw) = &entry.raw {
                self.raw(raw, column);
                return;
            }
        }

        let pad = " ".repeat(column);
        let key = render_key(&entry.key, entry.key_style);
        let comment = entry.inline_comment.as_deref().unwrap_or_default();

        match &entry.value {
            Node::Mapping(m) if !m.flow && !m.is_empty() => {
                self.out.push(format!("{pad}{key}:{}{comment}", props_suffix(&m.props)));
                self.mapping(m, column + self.indent.mapping, false);
            }
            Node::Sequence(s) if !s.flow && !s.is_empty() => {
                self.out.push(format!("{pad}{key}:{}{comment}", props_suffix(&s.props)));
                self.sequence(s, column + self.indent.sequence, false);
            }
            value => {
                let lines = self.inline(value, column);
                let gap = if entry.gap.is_empty() { " " } else { entry.gap.as_str() };
                self.push_value_lines(format!("{pad}{key}:{gap}"), lines, entry.inline_comment.as_deref());
            }
        }
    }

    fn item(&mut self, item: &Item, column: usize, skip_leading: bool) {
        if !skip_leading {
            self.trivia(&item.leading, column);
        }
        if item.is_pristine() {
            if let Some(raw) = &item.raw {
                self.raw(raw, column);
                return;
            }
        }

        let inner = column + 2;
        match &item.value {
            Node::Mapping(m) if !m.flow && !m.is_empty() && m.props.is_none() => {
                self.trivia(&m.entries[0].leading, inner);
                let start = self.out.len();
                self.mapping(m, inner, true);
                self.splice_dash(start, column);
            }
            Node::Sequence(s) if !s.flow && !s.is_empty() && s.props.is_none() => {
                self.trivia(&s.items[0].leading, inner);
                let start = self.out.len();
                self.sequence(s, inner, true);
                self.splice_dash(start, column);
            }
            Node::Mapping(m) if !m.flow && !m.is_empty() => {
                self.out.push(format!("{}-{}", " ".repeat(column), props_suffix(&m.props)));
                self.mapping(m, inner, false);
            }
            Node::Sequence(s) if !s.flow && !s.is_empty() => {
                self.out.push(format!("{}-{}", " ".repeat(column), props_suffix(&s.props)));
                self.sequence(s, inner, false);
            }
            value => {
                let lines = self.inline(value, column);
                self.push_value_lines(format!("{}- ", " ".repeat(column)), lines, item.inline_comment.as_deref());
            }
        }
    }

    /// Replace the indentation of line `start` by a `- ` at `column`
    fn splice_dash(&mut self, start: usize, column: usize) {
        if let Some(line) = self.out.get_mut(start) {
            let content = line.get(column + 2..).unwrap_or_default().to_string();
            *line = format!("{}- {}", " ".repeat(column), content);
        }
    }

    fn push_value_lines(&mut self, prefix: String, mut lines: Vec<String>, comment: Option<&str>) {
        let first = if lines.is_empty() { String::new() } else { lines.remove(0) };
        if first.is_empty() {
            self.out.push(prefix.trim_end().to_string());
        } else {
            self.out.push(format!("{prefix}{first}"));
        }
        self.out.extend(lines);
        if let (Some(comment), Some(last)) = (comment, self.out.last_mut()) {
            last.push_str(comment);
        }
    }

    /// Lines of a value written after `key:` or `- `
    ///
    /// The first line has no indentation, the others are complete lines.
    fn inline(&self, value: &Node, column: usize) -> Vec<String> {
        match value {
            Node::Scalar(s) => match &s.raw {
                Some(raw) => {
                    let delta = column as isize - raw.column as isize;
                    let mut lines = vec![raw.first.clone()];
                    lines.extend(raw.rest.iter().map(|l| shift_line(l, delta)));
                    lines
                }
                None => self.scalar(s, column),
            },
            Node::Mapping(_) | Node::Sequence(_) => vec![flow(value)],
        }
    }

    fn scalar(&self, scalar: &Scalar, column: usize) -> Vec<String> {
        let props = scalar.props.as_ref().map(|p| format!("{p} ")).unwrap_or_default();
        match scalar.style {
            ScalarStyle::Plain if scalar.value.is_empty() => vec![props.trim_end().to_string()],
            ScalarStyle::Plain => vec![format!("{props}{}", scalar.value)],
            ScalarStyle::Alias => vec![format!("{props}*{}", scalar.value)],
            ScalarStyle::SingleQuoted if !scalar.value.contains('\n') => {
                vec![format!("{props}{}", single_quoted(&scalar.value))]
            }
            ScalarStyle::Literal | ScalarStyle::Folded
                if scalar.value.contains('\n') && !scalar.value.starts_with([' ', '\n']) =>
            {
                let (text, chomp) = match scalar.value.strip_suffix('\n') {
                    Some(t) if t.ends_with('\n') => (t, "+"),
                    Some(t) => (t, ""),
                    None => (scalar.value.as_str(), "-"),
                };
                let pad = " ".repeat(column + self.indent.mapping);
                let mut lines = vec![format!("{props}|{chomp}")];
                lines.extend(text.split('\n').map(|l| {
                    if l.is_empty() {
                        String::new()
                    } else {
                        format!("{pad}{l}")
                    }
                }));
                lines
            }
            _ => vec![format!("{props}{}", double_quoted(&scalar.value))],
        }
    }
}

fn props_suffix(props: &Option<String>) -> String {
    props.as_ref().map(|p| format!(" {p}")).unwrap_or_default()
}

fn key_is_plain_safe(key: &str) -> bool {
    if key.is_empty() || key.trim() != key || key == "-" || key.starts_with("- ") {
        return false;
    }
    let first = key.chars().next().unwrap_or(' ');
    !"?:,[]{}#&*!|>'\"%@`".contains(first)
        && !key.contains(": ")
        && !key.ends_with(':')
        && !key.contains(" #")
        && !key.chars().any(|c| c.is_control())
}

fn render_key(key: &str, style: ScalarStyle) -> String {
    match style {
        ScalarStyle::SingleQuoted if !key.contains('\n') => single_quoted(key),
        ScalarStyle::DoubleQuoted => double_quoted(key),
        _ if key_is_plain_safe(key) => key.to_string(),
        _ => double_quoted(key),
    }
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a node in flow style on one line
fn flow(node: &Node) -> String {
    match node {
        Node::Scalar(s) => flow_scalar(s),
        Node::Mapping(m) => {
            let body: Vec<String> = m
                .entries
                .iter()
                .map(|e| format!("{}: {}", flow_key(&e.key, e.key_style), flow(&e.value)))
                .collect();
            format!("{}{{{}}}", props_prefix(&m.props), body.join(", "))
        }
        Node::Sequence(s) => {
            let body: Vec<String> = s.items.iter().map(|i| flow(&i.value)).collect();
            format!("{}[{}]", props_prefix(&s.props), body.join(", "))
        }
    }
}

fn props_prefix(props: &Option<String>) -> String {
    props.as_ref().map(|p| format!("{p} ")).unwrap_or_default()
}

fn flow_safe(value: &str) -> bool {
    !value.contains([',', '[', ']', '{', '}'])
}

fn flow_key(key: &str, style: ScalarStyle) -> String {
    if style == ScalarStyle::Plain && key_is_plain_safe(key) && flow_safe(key) {
        key.to_string()
    } else if style == ScalarStyle::SingleQuoted {
        single_quoted(key)
    } else {
        double_quoted(key)
    }
}

fn flow_scalar(scalar: &Scalar) -> String {
    let props = props_prefix(&scalar.props);
    let value = &scalar.value;
    let text = match scalar.style {
        ScalarStyle::Plain if value.is_empty() => "null".to_string(),
        ScalarStyle::Plain if flow_safe(value) => value.clone(),
        ScalarStyle::Plain => double_quoted(value),
        ScalarStyle::Alias => format!("*{value}"),
        ScalarStyle::SingleQuoted if !value.contains('\n') => single_quoted(value),
        _ => double_quoted(value),
    };
    format!("{props}{text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(node: &Node) -> String {
        let mut emitter = Emitter::new(Indent::default());
        emitter.root(node, 0);
        emitter.finish().join("\n")
    }

    #[test]
    fn block_rendering() {
        let mut tags = Sequence::new();
        tags.push(Node::string("a"));
        tags.push(Node::string("b"));
        let mut config = Mapping::new();
        config.insert("meta", Node::mapping());
        config.insert("tags", Node::Sequence(tags));
        let mut model = Mapping::new();
        model.insert("name", Node::string("orders"));
        model.insert("config", Node::Mapping(config));
        let mut models = Sequence::new();
        models.push(Node::Mapping(model));
        let mut root = Mapping::new();
        root.insert("models", Node::Sequence(models));

        assert_eq!(
            render(&Node::Mapping(root)),
            "models:\n  - name: orders\n    config:\n      meta: {}\n      tags:\n        - a\n        - b"
        );
    }

    #[test]
    fn quoting() {
        assert_eq!(double_quoted("a\"b\nc"), "\"a\\\"b\\nc\"");
        assert_eq!(single_quoted("it's"), "'it''s'");
        assert_eq!(render_key("+materialized", ScalarStyle::Plain), "+materialized");
        assert_eq!(render_key("a: b", ScalarStyle::Plain), "\"a: b\"");
    }

    #[test]
    fn literal_blocks() {
        let mut mapping = Mapping::new();
        mapping.insert("description", Node::Scalar(Scalar::new("line one\nline two\n", ScalarStyle::Literal)));
        assert_eq!(render(&Node::Mapping(mapping)), "description: |\n  line one\n  line two");
    }

    #[test]
    fn flow_values() {
        let node = Node::from_json(&serde_json::json!({"a": [1, "x, y"], "b": {}}));
        assert_eq!(flow(&node), "{a: [1, \"x, y\"], b: {}}");
    }
}
