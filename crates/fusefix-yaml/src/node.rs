//! YAML node model
//!
//! Nodes keep the source text they were parsed from. An entry whose key,
//! value and comments still fingerprint the same as at parse time is
//! written back verbatim; anything else is re-rendered.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// How a scalar is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScalarStyle {
    /// Unquoted
    #[default]
    Plain,

    /// 'quoted'
    SingleQuoted,

    /// "quoted"
    DoubleQuoted,

    /// `|` block
    Literal,

    /// `>` block
    Folded,

    /// `*anchor` reference
    Alias,
}

/// Comment and blank lines attached before an entry or item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trivia {
    /// Full source lines
    pub(crate) lines: Vec<String>,

    /// Column of the entry the lines were attached to
    pub(crate) column: usize,
}

impl Trivia {
    pub(crate) fn new(lines: Vec<String>, column: usize) -> Self {
        Self { lines, column }
    }

    /// Comment lines, without their indentation
    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|l| l.trim_start())
            .filter(|l| l.starts_with('#'))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Source text of a node
///
/// `first` is the text from the node's start column to the end of its first
/// line; `rest` are the following source lines, unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText {
    pub(crate) first: String,
    pub(crate) rest: Vec<String>,
    pub(crate) column: usize,
}

impl RawText {
    pub(crate) fn new(first: impl Into<String>, rest: Vec<String>, column: usize) -> Self {
        Self {
            first: first.into(),
            rest,
            column,
        }
    }
}

/// Shift a source line by `delta` columns
///
/// Only leading spaces are removed when shifting left.
pub(crate) fn shift_line(line: &str, delta: isize) -> String {
    if delta == 0 || line.trim().is_empty() {
        return line.to_string();
    }
    if delta > 0 {
        return format!("{}{}", " ".repeat(delta as usize), line);
    }
    let spaces = line.len() - line.trim_start_matches(' ').len();
    let removed = spaces.min(delta.unsigned_abs());
    line[removed..].to_string()
}

/// A scalar value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub(crate) value: String,
    pub(crate) style: ScalarStyle,
    pub(crate) props: Option<String>,
    pub(crate) raw: Option<RawText>,
}

impl Scalar {
    pub fn new(value: impl Into<String>, style: ScalarStyle) -> Self {
        Self {
            value: value.into(),
            style,
            props: None,
            raw: None,
        }
    }

    /// An unquoted scalar written exactly as given (numbers, booleans)
    pub fn plain(value: impl Into<String>) -> Self {
        Self::new(value, ScalarStyle::Plain)
    }

    /// A string scalar, quoted when the plain form would read differently
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        let style = string_style(&value);
        Self::new(value, style)
    }

    /// An empty value (`key:`)
    pub fn null() -> Self {
        Self::plain("")
    }

    /// Decoded value
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn style(&self) -> ScalarStyle {
        self.style
    }

    /// Anchor or tag written before the value
    pub fn props(&self) -> Option<&str> {
        self.props.as_deref()
    }

    /// Replace the value, choosing a style that keeps it a string
    pub fn set_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.style = match self.style {
            ScalarStyle::Literal | ScalarStyle::Folded if value.contains('\n') => ScalarStyle::Literal,
            ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted
                if !value.contains('\n') && !(self.style == ScalarStyle::SingleQuoted && value.contains('\'')) =>
            {
                self.style
            }
            _ => string_style(&value),
        };
        self.value = value;
        self.raw = None;
    }

    pub fn is_null(&self) -> bool {
        self.style == ScalarStyle::Plain && is_null_word(&self.value)
    }

    /// JSON value of the scalar, resolving plain scalars to their types
    pub fn to_json(&self) -> Value {
        match self.style {
            ScalarStyle::Plain => resolve_plain(&self.value),
            ScalarStyle::Alias => Value::String(format!("*{}", self.value)),
            _ => Value::String(self.value.clone()),
        }
    }
}

fn is_null_word(value: &str) -> bool {
    matches!(value, "" | "~" | "null" | "Null" | "NULL")
}

fn is_bool_word(value: &str) -> Option<bool> {
    match value {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Words a YAML 1.1 reader would treat as booleans
fn is_legacy_bool_word(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "yes" | "no" | "on" | "off" | "y" | "n"
    )
}

fn is_number(value: &str) -> bool {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    if digits.is_empty() {
        return false;
    }
    if matches!(digits, ".inf" | ".Inf" | ".INF" | ".nan" | ".NaN" | ".NAN") {
        return true;
    }
    let (mantissa, exponent) = match digits.find(['e', 'E']) {
        Some(i) => (&digits[..i], Some(&digits[i + 1..])),
        None => (digits, None),
    };
    let mut parts = mantissa.splitn(2, '.');
    let int_part = parts.next().unwrap_or_default();
    let frac_part = parts.next();
    let int_ok = int_part.chars().all(|c| c.is_ascii_digit());
    let frac_ok = frac_part.map_or(true, |f| f.chars().all(|c| c.is_ascii_digit()));
    let has_digit = !int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty());
    let exp_ok = exponent.map_or(true, |e| {
        let e = e.strip_prefix(['-', '+']).unwrap_or(e);
        !e.is_empty() && e.chars().all(|c| c.is_ascii_digit())
    });
    int_ok && frac_ok && has_digit && exp_ok
}

fn resolve_plain(value: &str) -> Value {
    if is_null_word(value) {
        return Value::Null;
    }
    if let Some(b) = is_bool_word(value) {
        return Value::Bool(b);
    }
    if is_number(value) {
        if let Ok(i) = value.parse::<i64>() {
            return Value::from(i);
        }
        if let Some(f) = value.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(f);
        }
    }
    Value::String(value.to_string())
}

/// Check if a string can be written without quotes and still read back as
/// the same string
pub(crate) fn is_plain_safe(value: &str) -> bool {
    if value.is_empty() || value.trim() != value {
        return false;
    }
    if is_null_word(value) || is_bool_word(value).is_some() || is_legacy_bool_word(value) || is_number(value) {
        return false;
    }
    let first = value.chars().next().unwrap_or(' ');
    if "?:,[]{}#&*!|>'\"%@`".contains(first) {
        return false;
    }
    if value == "-" || value.starts_with("- ") || value.starts_with("---") {
        return false;
    }
    if value.contains(": ") || value.ends_with(':') || value.contains(" #") {
        return false;
    }
    !value.chars().any(|c| c.is_control())
}

fn string_style(value: &str) -> ScalarStyle {
    if is_plain_safe(value) {
        ScalarStyle::Plain
    } else if value.contains('"') && !value.contains('\'') && !value.chars().any(|c| c.is_control()) {
        ScalarStyle::SingleQuoted
    } else {
        ScalarStyle::DoubleQuoted
    }
}

/// A `key: value` pair of a mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub(crate) key: String,
    pub(crate) key_style: ScalarStyle,
    pub(crate) value: Node,
    pub(crate) leading: Trivia,
    pub(crate) inline_comment: Option<String>,
    pub(crate) gap: String,
    pub(crate) raw: Option<RawText>,
    pub(crate) origin: u64,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: Node) -> Self {
        Self {
            key: key.into(),
            key_style: ScalarStyle::Plain,
            value,
            leading: Trivia::default(),
            inline_comment: None,
            gap: " ".to_string(),
            raw: None,
            origin: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Node {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Node {
        &mut self.value
    }

    pub fn into_value(self) -> Node {
        self.value
    }

    /// Comments written before the entry
    pub fn leading(&self) -> &Trivia {
        &self.leading
    }

    /// Comment on the key line
    pub fn inline_comment(&self) -> Option<&str> {
        self.inline_comment.as_deref()
    }

    pub(crate) fn seal(&mut self) {
        self.origin = self.fingerprint();
    }

    pub(crate) fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.key.hash(&mut h);
        self.key_style.hash(&mut h);
        self.gap.hash(&mut h);
        self.inline_comment.hash(&mut h);
        hash_node(&self.value, &mut h);
        h.finish()
    }

    /// Whether the entry can be written from its source text
    pub(crate) fn is_pristine(&self) -> bool {
        self.raw.is_some() && self.fingerprint() == self.origin
    }
}

/// A sequence item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub(crate) value: Node,
    pub(crate) leading: Trivia,
    pub(crate) inline_comment: Option<String>,
    pub(crate) raw: Option<RawText>,
    pub(crate) origin: u64,
}

impl Item {
    pub fn new(value: Node) -> Self {
        Self {
            value,
            leading: Trivia::default(),
            inline_comment: None,
            raw: None,
            origin: 0,
        }
    }

    pub fn value(&self) -> &Node {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Node {
        &mut self.value
    }

    pub(crate) fn seal(&mut self) {
        self.origin = self.fingerprint();
    }

    pub(crate) fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.inline_comment.hash(&mut h);
        hash_node(&self.value, &mut h);
        h.finish()
    }

    pub(crate) fn is_pristine(&self) -> bool {
        self.raw.is_some() && self.fingerprint() == self.origin
    }
}

pub(crate) fn hash_node(node: &Node, h: &mut DefaultHasher) {
    match node {
        Node::Scalar(s) => {
            0u8.hash(h);
            s.value.hash(h);
            s.style.hash(h);
            s.props.hash(h);
        }
        Node::Mapping(m) => {
            1u8.hash(h);
            m.flow.hash(h);
            m.props.hash(h);
            m.entries.len().hash(h);
            for e in &m.entries {
                e.leading.lines.hash(h);
                e.key.hash(h);
                e.key_style.hash(h);
                e.gap.hash(h);
                e.inline_comment.hash(h);
                hash_node(&e.value, h);
            }
        }
        Node::Sequence(s) => {
            2u8.hash(h);
            s.flow.hash(h);
            s.props.hash(h);
            s.items.len().hash(h);
            for item in &s.items {
                item.leading.lines.hash(h);
                item.inline_comment.hash(h);
                hash_node(&item.value, h);
            }
        }
    }
}

/// An ordered mapping; duplicate keys are kept only by the lenient parser
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mapping {
    pub(crate) entries: Vec<Entry>,
    pub(crate) flow: bool,
    pub(crate) props: Option<String>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the mapping is written `{ ... }`
    pub fn is_flow(&self) -> bool {
        self.flow
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries.iter_mut().find(|e| e.key == key).map(|e| &mut e.value)
    }

    /// String value of a key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    pub fn get_mapping(&self, key: &str) -> Option<&Mapping> {
        self.get(key).and_then(Node::as_mapping)
    }

    pub fn get_mapping_mut(&mut self, key: &str) -> Option<&mut Mapping> {
        self.get_mut(key).and_then(Node::as_mapping_mut)
    }

    pub fn get_sequence(&self, key: &str) -> Option<&Sequence> {
        self.get(key).and_then(Node::as_sequence)
    }

    pub fn get_sequence_mut(&mut self, key: &str) -> Option<&mut Sequence> {
        self.get_mut(key).and_then(Node::as_sequence_mut)
    }

    /// Set a value; an existing key keeps its position and comments
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].value, value)),
            None => {
                self.entries.push(Entry::new(key, value));
                None
            }
        }
    }

    /// Remove the first entry with this key
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.remove_entry(key).map(Entry::into_value)
    }

    pub fn remove_entry(&mut self, key: &str) -> Option<Entry> {
        let i = self.position(key)?;
        Some(self.entries.remove(i))
    }

    /// Append an entry (moved from another mapping, for instance)
    ///
    /// An existing entry with the same key gets the new value instead.
    pub fn push_entry(&mut self, entry: Entry) {
        match self.position(&entry.key) {
            Some(i) => self.entries[i].value = entry.value,
            None => self.entries.push(entry),
        }
    }

    /// Rename a key in place; returns false when the key is missing
    pub fn rename_key(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.position(from) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.key = to.into();
                entry.key_style = ScalarStyle::Plain;
                true
            }
            None => false,
        }
    }

    /// Get the mapping under `key`, creating it (at the end) when missing or null
    ///
    /// Returns `None` when the key holds a non-mapping value.
    pub fn get_or_insert_mapping(&mut self, key: &str) -> Option<&mut Mapping> {
        let i = match self.position(key) {
            Some(i) => i,
            None => {
                self.entries.push(Entry::new(key, Node::mapping()));
                self.entries.len() - 1
            }
        };
        let value = &mut self.entries[i].value;
        if value.is_null() {
            *value = Node::mapping();
        }
        value.as_mapping_mut()
    }

    /// Get the sequence under `key`, creating it when missing or null
    pub fn get_or_insert_sequence(&mut self, key: &str) -> Option<&mut Sequence> {
        let i = match self.position(key) {
            Some(i) => i,
            None => {
                self.entries.push(Entry::new(key, Node::sequence()));
                self.entries.len() - 1
            }
        };
        let value = &mut self.entries[i].value;
        if value.is_null() {
            *value = Node::sequence();
        }
        value.as_sequence_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Node)> {
        self.entries.iter_mut().map(|e| (e.key.as_str(), &mut e.value))
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn retain(&mut self, f: impl FnMut(&Entry) -> bool) {
        self.entries.retain(f);
    }

    /// Drop later entries whose key was already seen, at every depth
    ///
    /// Returns the number of removed entries.
    pub fn remove_duplicate_keys(&mut self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let before = self.entries.len();
        self.entries.retain(|e| e.key == "<<" || seen.insert(e.key.clone()));
        let mut removed = before - self.entries.len();
        for entry in &mut self.entries {
            removed += entry.value.remove_duplicate_keys();
        }
        removed
    }

    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in self.iter() {
            map.insert(k.to_string(), v.to_json());
        }
        Value::Object(map)
    }
}

/// An ordered sequence
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub(crate) items: Vec<Item>,
    pub(crate) flow: bool,
    pub(crate) props: Option<String>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.items.get(index).map(|i| &i.value)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.items.get_mut(index).map(|i| &mut i.value)
    }

    pub fn push(&mut self, value: Node) {
        self.items.push(Item::new(value));
    }

    pub fn remove(&mut self, index: usize) -> Node {
        self.items.remove(index).value
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.items.iter().map(|i| &i.value)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.items.iter_mut().map(|i| &mut i.value)
    }

    pub fn retain(&mut self, mut f: impl FnMut(&Node) -> bool) {
        self.items.retain(|i| f(&i.value));
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.iter().map(Node::to_json).collect())
    }
}

/// A YAML node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Sequence),
    Mapping(Mapping),
}

impl Node {
    /// An empty block mapping
    pub fn mapping() -> Self {
        Self::Mapping(Mapping::new())
    }

    /// An empty block sequence
    pub fn sequence() -> Self {
        Self::Sequence(Sequence::new())
    }

    /// A string scalar
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::string(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::Scalar(Scalar::plain(if value { "true" } else { "false" }))
    }

    pub fn null() -> Self {
        Self::Scalar(Scalar::null())
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar_mut(&mut self) -> Option<&mut Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Value of a non-null scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) if !s.is_null() => Some(&s.value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(s) if s.style == ScalarStyle::Plain => is_bool_word(&s.value),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Sequence> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(s) if s.is_null())
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence(_))
    }

    /// Drop duplicate keys in every nested mapping, keeping the first
    pub fn remove_duplicate_keys(&mut self) -> usize {
        match self {
            Self::Mapping(m) => m.remove_duplicate_keys(),
            Self::Sequence(s) => s.iter_mut().map(Node::remove_duplicate_keys).sum(),
            Self::Scalar(_) => 0,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::Sequence(s) => s.to_json(),
            Self::Mapping(m) => m.to_json(),
        }
    }

    /// Build a node from JSON; strings get quoted when needed
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Scalar(Scalar::plain("null")),
            Value::Bool(b) => Self::bool(*b),
            Value::Number(n) => Self::Scalar(Scalar::plain(n.to_string())),
            Value::String(s) => Self::string(s.as_str()),
            Value::Array(items) => {
                let mut seq = Sequence::new();
                for item in items {
                    seq.push(Self::from_json(item));
                }
                Self::Sequence(seq)
            }
            Value::Object(map) => {
                let mut mapping = Mapping::new();
                for (k, v) in map {
                    mapping.insert(k.as_str(), Self::from_json(v));
                }
                Self::Mapping(mapping)
            }
        }
    }
}

impl From<Mapping> for Node {
    fn from(m: Mapping) -> Self {
        Self::Mapping(m)
    }
}

impl From<Sequence> for Node {
    fn from(s: Sequence) -> Self {
        Self::Sequence(s)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_scalars_resolve_types() {
        assert_eq!(Scalar::plain("true").to_json(), json!(true));
        assert_eq!(Scalar::plain("42").to_json(), json!(42));
        assert_eq!(Scalar::plain("-1.5").to_json(), json!(-1.5));
        assert_eq!(Scalar::plain("~").to_json(), Value::Null);
        assert_eq!(Scalar::plain("table").to_json(), json!("table"));
        assert_eq!(Scalar::new("true", ScalarStyle::SingleQuoted).to_json(), json!("true"));
    }

    #[test]
    fn strings_are_quoted_when_ambiguous() {
        assert_eq!(Scalar::string("orders").style(), ScalarStyle::Plain);
        assert_eq!(Scalar::string("true").style(), ScalarStyle::DoubleQuoted);
        assert_eq!(Scalar::string("123").style(), ScalarStyle::DoubleQuoted);
        assert_eq!(Scalar::string("{{ doc('x') }}").style(), ScalarStyle::DoubleQuoted);
        assert_eq!(Scalar::string("say \"hi\": now").style(), ScalarStyle::SingleQuoted);
        assert_eq!(Scalar::string("").style(), ScalarStyle::DoubleQuoted);
    }

    #[test]
    fn mapping_insert_keeps_position() {
        let mut m = Mapping::new();
        m.insert("a", Node::string("1"));
        m.insert("b", Node::string("2"));
        m.insert("a", Node::string("3"));
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(m.get_str("a"), Some("3"));
    }

    #[test]
    fn rename_in_place() {
        let mut m = Mapping::new();
        m.insert("desciption", Node::string("x"));
        m.insert("columns", Node::sequence());
        assert!(m.rename_key("desciption", "description"));
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["description", "columns"]);
        assert!(!m.rename_key("missing", "x"));
    }

    #[test]
    fn get_or_insert_mapping_replaces_null() {
        let mut m = Mapping::new();
        m.insert("config", Node::null());
        m.insert("name", Node::string("a"));
        m.get_or_insert_mapping("config")
            .unwrap()
            .insert("materialized", Node::string("table"));
        assert_eq!(m.to_json(), json!({"config": {"materialized": "table"}, "name": "a"}));
        assert!(m.get_or_insert_mapping("name").is_none());
    }

    #[test]
    fn json_conversion() {
        let value = json!({"name": "a", "tags": ["x", "y"], "enabled": true, "n": 3});
        let node = Node::from_json(&value);
        assert_eq!(node.to_json(), value);
    }

    #[test]
    fn duplicate_keys_keep_first() {
        let mut m = Mapping::new();
        m.entries.push(Entry::new("a", Node::string("1")));
        m.entries.push(Entry::new("a", Node::string("2")));
        let mut inner = Mapping::new();
        inner.entries.push(Entry::new("b", Node::string("1")));
        inner.entries.push(Entry::new("b", Node::string("2")));
        m.entries.push(Entry::new("c", Node::Mapping(inner)));

        assert_eq!(m.remove_duplicate_keys(), 2);
        assert_eq!(m.to_json(), json!({"a": "1", "c": {"b": "1"}}));
    }

    #[test]
    fn shift_only_removes_spaces() {
        assert_eq!(shift_line("    a", -2), "  a");
        assert_eq!(shift_line(" a", -4), "a");
        assert_eq!(shift_line("a", 2), "  a");
        assert_eq!(shift_line("", 2), "");
    }
}
