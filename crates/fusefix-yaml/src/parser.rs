//! Line-based YAML parser
//!
//! Covers the subset of YAML found in dbt projects: block mappings and
//! sequences (including indentless and compact forms), flow collections,
//! plain, quoted and block scalars, comments, anchors, tags and aliases.
//! Complex keys and multi-document streams are rejected.
//!
//! Every entry and item records the source lines it spans so the emitter can
//! write untouched parts back verbatim.

use std::collections::HashMap;

use crate::emitter::Indent;
use crate::error::YamlError;
use crate::node::{Entry, Item, Mapping, Node, RawText, Scalar, ScalarStyle, Sequence, Trivia};

/// Result of parsing a document
pub(crate) struct Parsed {
    pub header: Vec<String>,
    pub root: Node,
    pub root_column: usize,
    pub trailing: Vec<String>,
    pub indent: Indent,
}

pub(crate) struct Parser {
    /// Working copy; the `- ` of compact sequence items is blanked here
    lines: Vec<String>,
    original: Vec<String>,
    pos: usize,
    /// Last line consumed by content (trivia excluded)
    last: usize,
    /// Comment and blank lines waiting for the next entry or item
    pending: Vec<String>,
    strict: bool,
    mapping_steps: HashMap<usize, usize>,
    sequence_steps: HashMap<usize, usize>,
}

/// Inline value: node, gap before it and trailing comment
type InlineValue = (Node, String, Option<String>);

impl Parser {
    pub(crate) fn new(text: &str, strict: bool) -> Self {
        let mut original: Vec<String> = text.split('\n').map(str::to_string).collect();
        if text.ends_with('\n') || text.is_empty() {
            original.pop();
        }
        Self {
            lines: original.clone(),
            original,
            pos: 0,
            last: 0,
            pending: Vec::new(),
            strict,
            mapping_steps: HashMap::new(),
            sequence_steps: HashMap::new(),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Parsed, YamlError> {
        let mut header = Vec::new();
        while self.pos < self.lines.len() {
            let line = &self.lines[self.pos];
            if is_trivia(line) || line.trim_end() == "---" || line.starts_with('%') {
                header.push(self.original[self.pos].clone());
                self.pos += 1;
            } else {
                break;
            }
        }

        let (root, root_column) = match self.peek_content()? {
            None => (Node::mapping(), 0),
            Some(idx) => {
                let column = indent_of(&self.lines[idx]);
                let text = self.lines[idx][column..].to_string();
                let node = if is_dash(&text) {
                    Node::Sequence(self.parse_sequence(column)?)
                } else if parse_key(&text).is_some() {
                    Node::Mapping(self.parse_mapping(column)?)
                } else {
                    self.pos = idx + 1;
                    self.last = idx;
                    let (node, _, _) = self.parse_inline(&text, idx, column, false)?;
                    node
                };
                (node, column)
            }
        };

        let mut trailing = Vec::new();
        if let Some(idx) = self.peek_content()? {
            match self.lines[idx].trim_end() {
                "---" => return Err(YamlError::MultipleDocuments { line: idx + 1 }),
                "..." => {
                    trailing.append(&mut self.pending);
                    trailing.extend(self.original[idx..].iter().cloned());
                    self.pos = self.lines.len();
                }
                _ => {
                    return Err(YamlError::syntax(
                        idx + 1,
                        "did not find expected key (bad indentation?)",
                    ))
                }
            }
        }
        let mut rest = std::mem::take(&mut self.pending);
        rest.append(&mut trailing);

        let indent = Indent {
            mapping: most_common(&self.mapping_steps).unwrap_or(2),
            sequence: most_common(&self.sequence_steps).unwrap_or(2),
        };

        Ok(Parsed {
            header,
            root,
            root_column,
            trailing: rest,
            indent,
        })
    }

    /// Skip trivia into `pending` and return the next content line
    fn peek_content(&mut self) -> Result<Option<usize>, YamlError> {
        while self.pos < self.lines.len() && is_trivia(&self.lines[self.pos]) {
            self.pending.push(self.original[self.pos].clone());
            self.pos += 1;
        }
        if self.pos >= self.lines.len() {
            return Ok(None);
        }
        let line = &self.lines[self.pos];
        if line[indent_of(line)..].starts_with('\t') {
            return Err(YamlError::TabIndentation { line: self.pos + 1 });
        }
        Ok(Some(self.pos))
    }

    fn take_leading(&mut self, column: usize) -> Trivia {
        Trivia::new(std::mem::take(&mut self.pending), column)
    }

    fn span(&self, idx: usize, column: usize) -> RawText {
        let first = self.original[idx].get(column..).unwrap_or_default();
        let rest = if self.last > idx {
            self.original[idx + 1..=self.last].to_vec()
        } else {
            Vec::new()
        };
        RawText::new(first, rest, column)
    }

    fn parse_mapping(&mut self, column: usize) -> Result<Mapping, YamlError> {
        let mut mapping = Mapping::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        while let Some(idx) = self.peek_content()? {
            let indent = indent_of(&self.lines[idx]);
            if indent < column {
                break;
            }
            if indent > column {
                return Err(YamlError::syntax(idx + 1, "bad indentation of a mapping entry"));
            }
            let text = &self.lines[idx][column..];
            if is_dash(text) || matches!(text.trim_end(), "---" | "...") {
                break;
            }

            let entry = self.parse_entry(idx, column)?;
            if self.strict && entry.key != "<<" {
                if seen.contains_key(&entry.key) {
                    return Err(YamlError::DuplicateKey {
                        line: idx + 1,
                        key: entry.key,
                    });
                }
                seen.insert(entry.key.clone(), idx + 1);
            }
            mapping.entries.push(entry);
        }

        Ok(mapping)
    }

    fn parse_entry(&mut self, idx: usize, column: usize) -> Result<Entry, YamlError> {
        let leading = self.take_leading(column);
        let line = self.lines[idx].clone();
        let text = &line[column..];
        let (key, key_style, offset) = match parse_key(text) {
            Some(parsed) => parsed,
            None if text.starts_with("? ") => {
                return Err(YamlError::syntax(idx + 1, "complex mapping keys are not supported"))
            }
            None => return Err(YamlError::syntax(idx + 1, "could not find expected ':'")),
        };

        self.pos = idx + 1;
        self.last = idx;
        let (value, gap, inline_comment) = self.parse_inline(&text[offset..], idx, column, true)?;

        let mut entry = Entry::new(key, value);
        entry.key_style = key_style;
        entry.leading = leading;
        entry.gap = gap;
        entry.inline_comment = inline_comment;
        entry.raw = Some(self.span(idx, column));
        entry.seal();
        Ok(entry)
    }

    fn parse_sequence(&mut self, column: usize) -> Result<Sequence, YamlError> {
        let mut sequence = Sequence::new();

        while let Some(idx) = self.peek_content()? {
            let indent = indent_of(&self.lines[idx]);
            if indent < column {
                break;
            }
            if indent > column {
                return Err(YamlError::syntax(idx + 1, "bad indentation of a sequence entry"));
            }
            let text = self.lines[idx][column..].to_string();
            if !is_dash(&text) {
                break;
            }

            let leading = self.take_leading(column);
            self.pos = idx + 1;
            self.last = idx;

            let after = &text[1..];
            let body = after.trim_start();
            let inner = column + 1 + (after.len() - body.len());

            let (value, inline_comment) = if body.is_empty() || body.starts_with('#') {
                let comment = (!body.is_empty()).then(|| after.to_string());
                (self.parse_nested(column, false, None)?, comment)
            } else if is_dash(body) || parse_key(body).is_some() {
                // compact form: re-read this line as a nested block at `inner`
                let blanked = format!("{}{}", " ".repeat(inner), &self.lines[idx][inner..]);
                self.lines[idx] = blanked;
                self.pos = idx;
                let node = if is_dash(body) {
                    Node::Sequence(self.parse_sequence(inner)?)
                } else {
                    Node::Mapping(self.parse_mapping(inner)?)
                };
                (node, None)
            } else {
                let (node, _, comment) = self.parse_inline(after, idx, column, false)?;
                (node, comment)
            };

            let mut item = Item::new(value);
            item.leading = leading;
            item.inline_comment = inline_comment;
            item.raw = Some(self.span(idx, column));
            item.seal();
            sequence.items.push(item);
        }

        Ok(sequence)
    }

    /// Parse a value whose lines follow the key or dash line
    fn parse_nested(&mut self, owner: usize, in_mapping: bool, props: Option<String>) -> Result<Node, YamlError> {
        let empty = |props: Option<String>| {
            let mut scalar = Scalar::null();
            scalar.props = props;
            Node::Scalar(scalar)
        };

        let Some(idx) = self.peek_content()? else {
            return Ok(empty(props));
        };
        let indent = indent_of(&self.lines[idx]);
        let text = self.lines[idx][indent..].to_string();
        if matches!(text.trim_end(), "---" | "...") {
            return Ok(empty(props));
        }

        if is_dash(&text) && (indent > owner || (in_mapping && indent == owner)) {
            if in_mapping {
                *self.sequence_steps.entry(indent - owner).or_default() += 1;
            }
            let mut sequence = self.parse_sequence(indent)?;
            sequence.props = props;
            return Ok(Node::Sequence(sequence));
        }
        if indent <= owner {
            return Ok(empty(props));
        }
        if parse_key(&text).is_some() {
            if in_mapping {
                *self.mapping_steps.entry(indent - owner).or_default() += 1;
            }
            let mut mapping = self.parse_mapping(indent)?;
            mapping.props = props;
            return Ok(Node::Mapping(mapping));
        }

        // a scalar or flow collection on its own line
        self.pos = idx + 1;
        self.last = idx;
        let (mut node, _, _) = self.parse_inline(&text, idx, owner, false)?;
        if let Node::Scalar(scalar) = &mut node {
            scalar.raw = None;
            if props.is_some() {
                scalar.props = props;
            }
        }
        Ok(node)
    }

    /// Parse a value starting on line `idx`
    ///
    /// `rest` is the text after the `:` or `-` indicator; `owner` is the
    /// column of the key or dash owning the value.
    fn parse_inline(&mut self, rest: &str, idx: usize, owner: usize, in_mapping: bool) -> Result<InlineValue, YamlError> {
        let body = rest.trim_start();
        let gap = rest[..rest.len() - body.len()].to_string();

        if body.is_empty() || body.starts_with('#') {
            let comment = (!body.is_empty()).then(|| rest.to_string());
            let node = self.parse_nested(owner, in_mapping, None)?;
            return Ok((node, " ".to_string(), comment));
        }

        let (props, after_props) = split_props(body);
        let value_text = after_props.trim_start();
        if value_text.is_empty() || value_text.starts_with('#') {
            let comment = (!value_text.is_empty()).then(|| after_props.to_string());
            let node = self.parse_nested(owner, in_mapping, props)?;
            return Ok((node, gap, comment));
        }
        let prefix_len = body.len() - value_text.len();

        match value_text.as_bytes()[0] {
            b'|' | b'>' => {
                let (value, style) = self.read_block_scalar(owner, value_text, idx)?;
                let mut scalar = Scalar::new(value, style);
                scalar.props = props;
                scalar.raw = Some(self.span_from(idx, body, owner));
                Ok((Node::Scalar(scalar), gap, None))
            }
            quote @ (b'"' | b'\'') => {
                let quote = quote as char;
                let quoted = self.read_quoted(value_text, idx)?;
                let comment = trailing_comment(&quoted.remainder, quoted.last_line)?;
                self.pos = quoted.last_line + 1;
                self.last = quoted.last_line;

                let raw = if quoted.last_line == idx {
                    RawText::new(&body[..body.len() - quoted.remainder.len()], Vec::new(), owner)
                } else {
                    let mut rest: Vec<String> = self.original[idx + 1..quoted.last_line].to_vec();
                    let last = &self.original[quoted.last_line];
                    rest.push(last[..last.len() - quoted.remainder.len()].to_string());
                    RawText::new(body.trim_end(), rest, owner)
                };

                let style = if quote == '"' {
                    ScalarStyle::DoubleQuoted
                } else {
                    ScalarStyle::SingleQuoted
                };
                let mut scalar = Scalar::new(quoted.value, style);
                scalar.props = props;
                scalar.raw = Some(raw);
                Ok((Node::Scalar(scalar), gap, comment))
            }
            b'[' | b'{' => {
                let (flow_text, last_line, remainder) = self.read_flow(value_text, idx)?;
                let comment = trailing_comment(&remainder, last_line)?;
                self.pos = last_line + 1;
                self.last = last_line;
                let mut node = FlowParser::new(&flow_text, idx + 1).parse()?;
                match &mut node {
                    Node::Mapping(m) => m.props = props,
                    Node::Sequence(s) => s.props = props,
                    Node::Scalar(_) => {}
                }
                Ok((node, gap, comment))
            }
            b'*' => {
                let end = value_text.find(char::is_whitespace).unwrap_or(value_text.len());
                let comment = trailing_comment(&value_text[end..], idx)?;
                let mut scalar = Scalar::new(&value_text[1..end], ScalarStyle::Alias);
                scalar.props = props;
                scalar.raw = Some(RawText::new(&body[..prefix_len + end], Vec::new(), owner));
                Ok((Node::Scalar(scalar), gap, comment))
            }
            _ => {
                let (text, _) = split_comment(value_text);
                let first = text.trim_end();
                let mut comment = (first.len() < value_text.len() && value_text[first.len()..].trim_start().starts_with('#'))
                    .then(|| value_text[first.len()..].to_string());
                let mut value = first.to_string();
                let mut rest = Vec::new();

                while comment.is_none() && self.pos < self.lines.len() {
                    let line = &self.lines[self.pos];
                    if is_trivia(line) || indent_of(line) <= owner {
                        break;
                    }
                    let trimmed = line.trim();
                    if in_mapping && parse_key(trimmed).is_some() {
                        return Err(YamlError::syntax(self.pos + 1, "mapping values are not allowed here"));
                    }
                    let (continued, _) = split_comment(trimmed);
                    let continued = continued.trim_end();
                    value.push(' ');
                    value.push_str(continued);

                    let original = &self.original[self.pos];
                    let keep = original.len() - (trimmed.len() - continued.len()) - (original.len() - original.trim_end().len());
                    if continued.len() < trimmed.len() {
                        comment = Some(original[keep..].to_string());
                    }
                    rest.push(original[..keep].to_string());
                    self.last = self.pos;
                    self.pos += 1;
                }

                let mut scalar = Scalar::new(value, ScalarStyle::Plain);
                scalar.props = props;
                scalar.raw = Some(RawText::new(&body[..prefix_len + first.len()], rest, owner));
                Ok((Node::Scalar(scalar), gap, comment))
            }
        }
    }

    /// Raw text from `body` on line `idx` through the last consumed line
    fn span_from(&self, idx: usize, body: &str, owner: usize) -> RawText {
        let rest = if self.last > idx {
            self.original[idx + 1..=self.last].to_vec()
        } else {
            Vec::new()
        };
        RawText::new(body, rest, owner)
    }

    fn read_block_scalar(&mut self, owner: usize, header: &str, idx: usize) -> Result<(String, ScalarStyle), YamlError> {
        let style = if header.starts_with('|') {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };

        let mut chomp = Chomp::Clip;
        let mut explicit = None;
        for ch in header[1..].chars() {
            match ch {
                '-' => chomp = Chomp::Strip,
                '+' => chomp = Chomp::Keep,
                '1'..='9' => explicit = ch.to_digit(10).map(|d| owner + d as usize),
                ' ' | '\t' | '#' => break,
                _ => return Err(YamlError::syntax(idx + 1, "invalid block scalar header")),
            }
        }

        let mut content_indent = explicit;
        let mut collected: Vec<String> = Vec::new();
        let mut i = self.pos;
        while i < self.original.len() {
            let line = &self.original[i];
            if line.trim().is_empty() {
                collected.push(String::new());
                i += 1;
                continue;
            }
            let indent = indent_of(line);
            let content = *content_indent.get_or_insert(indent);
            if indent <= owner || indent < content {
                break;
            }
            collected.push(line[content..].to_string());
            i += 1;
        }

        let mut trailing_blanks = 0;
        while collected.last().is_some_and(String::is_empty) {
            collected.pop();
            trailing_blanks += 1;
        }
        if !collected.is_empty() {
            self.pos += collected.len();
            self.last = self.pos - 1;
        }

        let mut value = match style {
            ScalarStyle::Literal => collected.join("\n"),
            _ => fold_lines(&collected),
        };
        if !value.is_empty() {
            match chomp {
                Chomp::Clip => value.push('\n'),
                Chomp::Keep => value.push_str(&"\n".repeat(trailing_blanks + 1)),
                Chomp::Strip => {}
            }
        }
        Ok((value, style))
    }

    fn read_quoted(&self, text: &str, idx: usize) -> Result<Quoted, YamlError> {
        let quote = text.chars().next().unwrap_or('"');
        let mut pieces: Vec<String> = Vec::new();
        let mut segment = text[1..].to_string();
        let mut line = idx;

        loop {
            if let Some(close) = find_closing_quote(&segment, quote) {
                pieces.push(segment[..close].to_string());
                return Ok(Quoted {
                    value: fold_quoted(&pieces, quote),
                    last_line: line,
                    remainder: segment[close + 1..].to_string(),
                });
            }
            pieces.push(segment);
            line += 1;
            if line >= self.lines.len() {
                return Err(YamlError::syntax(idx + 1, "found unterminated quoted scalar"));
            }
            segment = self.lines[line].trim_start().to_string();
        }
    }

    /// Collect a flow collection that may span lines
    ///
    /// Returns the collection text on one line, the last line it used and
    /// what follows it on that line.
    fn read_flow(&self, text: &str, idx: usize) -> Result<(String, usize, String), YamlError> {
        let mut collected = String::new();
        let mut depth = 0i32;
        let mut quote: Option<u8> = None;
        let mut line = idx;
        let mut segment = text.to_string();

        loop {
            let bytes = segment.as_bytes();
            let mut cut = None;
            let mut i = 0;
            while i < bytes.len() {
                let b = bytes[i];
                match quote {
                    Some(b'"') => {
                        if b == b'\\' {
                            i += 2;
                            continue;
                        }
                        if b == b'"' {
                            quote = None;
                        }
                    }
                    Some(_) => {
                        if b == b'\'' {
                            if bytes.get(i + 1) == Some(&b'\'') {
                                i += 2;
                                continue;
                            }
                            quote = None;
                        }
                    }
                    None => match b {
                        b'"' | b'\'' => quote = Some(b),
                        b'[' | b'{' => depth += 1,
                        b']' | b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                collected.push_str(&segment[..=i]);
                                return Ok((collected, line, segment[i + 1..].to_string()));
                            }
                        }
                        b'#' if i > 0 && bytes[i - 1].is_ascii_whitespace() => {
                            cut = Some(i);
                            break;
                        }
                        _ => {}
                    },
                }
                i += 1;
            }
            if let Some(cut) = cut {
                segment.truncate(cut);
            }
            collected.push_str(segment.trim_end());
            collected.push(' ');

            line += 1;
            if line >= self.lines.len() {
                return Err(YamlError::syntax(idx + 1, "found unterminated flow collection"));
            }
            segment = self.lines[line].trim_start().to_string();
        }
    }
}

struct Quoted {
    value: String,
    last_line: usize,
    remainder: String,
}

#[derive(Clone, Copy)]
enum Chomp {
    Clip,
    Strip,
    Keep,
}

fn most_common(counts: &HashMap<usize, usize>) -> Option<usize> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(step, _)| *step)
}

pub(crate) fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

pub(crate) fn is_trivia(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

pub(crate) fn is_dash(text: &str) -> bool {
    text.trim_end() == "-" || text.starts_with("- ") || text.starts_with("-\t")
}

/// Anchors and tags in front of a value
fn split_props(body: &str) -> (Option<String>, &str) {
    let mut props: Vec<&str> = Vec::new();
    let mut rest = body;
    while rest.starts_with('&') || rest.starts_with('!') {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        props.push(&rest[..end]);
        let after = &rest[end..];
        let trimmed = after.trim_start();
        if trimmed.starts_with('&') || trimmed.starts_with('!') {
            rest = trimmed;
        } else {
            rest = after;
            break;
        }
    }
    if props.is_empty() {
        (None, body)
    } else {
        (Some(props.join(" ")), rest)
    }
}

/// Split off a ` # comment`
pub(crate) fn split_comment(text: &str) -> (&str, Option<&str>) {
    let bytes = text.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            return (&text[..i], Some(&text[i..]));
        }
    }
    (text, None)
}

fn trailing_comment(remainder: &str, line: usize) -> Result<Option<String>, YamlError> {
    let trimmed = remainder.trim_start();
    if trimmed.is_empty() {
        Ok(None)
    } else if trimmed.starts_with('#') {
        Ok(Some(remainder.to_string()))
    } else {
        Err(YamlError::syntax(line + 1, "unexpected characters after value"))
    }
}

/// Split `key: rest` at the mapping indicator
///
/// Returns the decoded key, its quoting and the byte offset just past `:`.
pub(crate) fn parse_key(text: &str) -> Option<(String, ScalarStyle, usize)> {
    let first = text.chars().next()?;
    match first {
        '"' | '\'' => {
            let close = find_closing_quote(&text[1..], first)? + 1;
            let after = &text[close + 1..];
            let trimmed = after.trim_start_matches(' ');
            let colon = close + 1 + (after.len() - trimmed.len());
            let tail = trimmed.strip_prefix(':')?;
            if !(tail.is_empty() || tail.starts_with([' ', '\t'])) {
                return None;
            }
            let style = if first == '"' {
                ScalarStyle::DoubleQuoted
            } else {
                ScalarStyle::SingleQuoted
            };
            Some((unescape(&text[1..close], first), style, colon + 1))
        }
        '[' | '{' | '*' | '&' | '!' | '|' | '>' | '#' | '%' | '@' | '`' | '?' => None,
        _ if is_dash(text) => None,
        _ => {
            let bytes = text.as_bytes();
            for i in 0..bytes.len() {
                match bytes[i] {
                    b':' if i + 1 == bytes.len() || bytes[i + 1] == b' ' || bytes[i + 1] == b'\t' => {
                        let key = text[..i].trim_end();
                        return (!key.is_empty()).then(|| (key.to_string(), ScalarStyle::Plain, i + 1));
                    }
                    b'#' if i > 0 && (bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') => return None,
                    _ => {}
                }
            }
            None
        }
    }
}

/// Byte offset of the quote closing `segment` (which starts after the opening one)
pub(crate) fn find_closing_quote(segment: &str, quote: char) -> Option<usize> {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match (quote, bytes[i]) {
            ('"', b'\\') => {
                i += 2;
                continue;
            }
            ('"', b'"') => return Some(i),
            ('\'', b'\'') => {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                return Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn unescape(text: &str, quote: char) -> String {
    if quote == '\'' {
        return text.replace("''", "'");
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') | Some('\t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\u{07}'),
            Some('b') => out.push('\u{08}'),
            Some('e') => out.push('\u{1b}'),
            Some('f') => out.push('\u{0c}'),
            Some('v') => out.push('\u{0b}'),
            Some('N') => out.push('\u{85}'),
            Some('_') => out.push('\u{a0}'),
            Some(h @ ('x' | 'u' | 'U')) => {
                let width = match h {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.by_ref().take(width).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(h);
                        out.push_str(&digits);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Fold the per-line pieces of a multi-line quoted scalar
fn fold_quoted(pieces: &[String], quote: char) -> String {
    let mut out = String::new();
    let mut breaks = 0;
    let mut join_with_space = true;
    let count = pieces.len();

    for (i, piece) in pieces.iter().enumerate() {
        let mut text = piece.as_str();
        if i > 0 {
            text = text.trim_start();
        }
        if i + 1 < count {
            text = text.trim_end();
        }
        if i > 0 && i + 1 < count && text.is_empty() {
            breaks += 1;
            continue;
        }
        if i > 0 && join_with_space {
            if breaks == 0 {
                out.push(' ');
            } else {
                out.push_str(&"\n".repeat(breaks));
            }
        }
        breaks = 0;

        let escaped_break = quote == '"' && i + 1 < count && ends_with_escape(text);
        let text = if escaped_break { &text[..text.len() - 1] } else { text };
        out.push_str(&unescape(text, quote));
        join_with_space = !escaped_break;
    }
    out
}

fn ends_with_escape(text: &str) -> bool {
    let slashes = text.len() - text.trim_end_matches('\\').len();
    slashes % 2 == 1
}

/// Fold the content lines of a `>` block scalar
fn fold_lines(lines: &[String]) -> String {
    let mut out = String::new();
    let mut breaks = 0;
    let mut previous_more_indented: Option<bool> = None;

    for line in lines {
        if line.is_empty() {
            breaks += 1;
            continue;
        }
        let more_indented = line.starts_with(' ') || line.starts_with('\t');
        match previous_more_indented {
            None => out.push_str(&"\n".repeat(breaks)),
            Some(previous) => {
                let keep_break = previous || more_indented;
                if breaks == 0 {
                    out.push(if keep_break { '\n' } else { ' ' });
                } else {
                    out.push_str(&"\n".repeat(breaks + usize::from(keep_break)));
                }
            }
        }
        breaks = 0;
        out.push_str(line);
        previous_more_indented = Some(more_indented);
    }
    out
}

/// Parser for a single-line flow collection
struct FlowParser<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> FlowParser<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self { text, pos: 0, line }
    }

    fn parse(mut self) -> Result<Node, YamlError> {
        let node = self.node()?;
        self.skip_ws();
        if self.pos < self.text.len() {
            return Err(self.error("unexpected characters after flow collection"));
        }
        Ok(node)
    }

    fn error(&self, message: &str) -> YamlError {
        YamlError::syntax(self.line, message)
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn node(&mut self) -> Result<Node, YamlError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence(),
            Some('{') => self.mapping(),
            Some(_) => Ok(Node::Scalar(self.scalar(false)?)),
            None => Err(self.error("unexpected end of flow collection")),
        }
    }

    fn sequence(&mut self) -> Result<Node, YamlError> {
        self.bump();
        let mut sequence = Sequence::new();
        sequence.flow = true;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    break;
                }
                None => return Err(self.error("unterminated flow sequence")),
                _ => {}
            }
            let node = self.node()?;
            sequence.push(node);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.bump(),
                Some(']') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error("expected ',' or ']' in flow sequence")),
            }
        }
        Ok(Node::Sequence(sequence))
    }

    fn mapping(&mut self) -> Result<Node, YamlError> {
        self.bump();
        let mut mapping = Mapping::new();
        mapping.flow = true;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    break;
                }
                None => return Err(self.error("unterminated flow mapping")),
                _ => {}
            }
            let key = self.scalar(true)?;
            self.skip_ws();
            let value = if self.peek() == Some(':') {
                self.bump();
                self.skip_ws();
                match self.peek() {
                    Some(',') | Some('}') => Node::null(),
                    _ => self.node()?,
                }
            } else {
                Node::null()
            };
            let mut entry = Entry::new(key.value, value);
            entry.key_style = key.style;
            mapping.entries.push(entry);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.bump(),
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.error("expected ',' or '}' in flow mapping")),
            }
        }
        Ok(Node::Mapping(mapping))
    }

    fn scalar(&mut self, is_key: bool) -> Result<Scalar, YamlError> {
        let rest = &self.text[self.pos..];
        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let close = find_closing_quote(&rest[1..], quote)
                .ok_or_else(|| self.error("unterminated quoted scalar in flow collection"))?;
            let value = unescape(&rest[1..close + 1], quote);
            self.pos += close + 2;
            let style = if quote == '"' {
                ScalarStyle::DoubleQuoted
            } else {
                ScalarStyle::SingleQuoted
            };
            return Ok(Scalar::new(value, style));
        }

        let bytes = rest.as_bytes();
        let mut end = bytes.len();
        for i in 0..bytes.len() {
            let stop = match bytes[i] {
                b',' | b']' | b'}' | b'[' | b'{' => true,
                b':' => is_key && bytes.get(i + 1).map_or(true, |n| n.is_ascii_whitespace() || *n == b','),
                _ => false,
            };
            if stop {
                end = i;
                break;
            }
        }
        let raw = rest[..end].trim();
        self.pos += end;
        if let Some(alias) = raw.strip_prefix('*') {
            return Ok(Scalar::new(alias, ScalarStyle::Alias));
        }
        Ok(Scalar::plain(raw))
    }
}
