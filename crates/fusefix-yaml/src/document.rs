//! Round-trippable YAML documents

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::emitter::{Emitter, Indent};
use crate::error::YamlError;
use crate::node::{hash_node, Mapping, Node};
use crate::parser::Parser;

const BOM: char = '\u{feff}';

/// A parsed YAML document
///
/// Serializing a document that was not modified returns the source text
/// byte for byte.
#[derive(Debug, Clone)]
pub struct Document {
    header: Vec<String>,
    root: Node,
    root_column: usize,
    trailing: Vec<String>,
    indent: Indent,
    source: String,
    origin: u64,
    crlf: bool,
    bom: bool,
    final_newline: bool,
}

impl Document {
    /// Parse a document, rejecting duplicate keys
    pub fn parse(text: &str) -> Result<Self, YamlError> {
        Self::parse_with(text, true)
    }

    /// Parse a document, keeping duplicate keys as separate entries
    pub fn parse_lenient(text: &str) -> Result<Self, YamlError> {
        Self::parse_with(text, false)
    }

    fn parse_with(text: &str, strict: bool) -> Result<Self, YamlError> {
        // A byte order mark is not part of the first key
        let (bom, body) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let crlf = body.contains("\r\n");
        let normalized = if crlf { body.replace("\r\n", "\n") } else { body.to_string() };
        let parsed = Parser::new(&normalized, strict).parse()?;

        let mut document = Self {
            header: parsed.header,
            root: parsed.root,
            root_column: parsed.root_column,
            trailing: parsed.trailing,
            indent: parsed.indent,
            source: text.to_string(),
            origin: 0,
            crlf,
            bom,
            final_newline: normalized.ends_with('\n') || normalized.is_empty(),
        };
        document.origin = document.fingerprint();
        Ok(document)
    }

    /// An empty document holding a mapping
    pub fn new() -> Self {
        let mut document = Self {
            header: Vec::new(),
            root: Node::mapping(),
            root_column: 0,
            trailing: Vec::new(),
            indent: Indent::default(),
            source: String::new(),
            origin: 0,
            crlf: false,
            bom: false,
            final_newline: true,
        };
        document.origin = document.fingerprint();
        document
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    /// Root mapping, if the document is one
    pub fn as_mapping(&self) -> Option<&Mapping> {
        self.root.as_mapping()
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        self.root.as_mapping_mut()
    }

    /// Indentation detected in the source
    pub fn indent(&self) -> Indent {
        self.indent
    }

    /// Whether anything changed since parsing
    pub fn is_modified(&self) -> bool {
        self.fingerprint() != self.origin
    }

    pub fn to_json(&self) -> Value {
        self.root.to_json()
    }

    /// Write the document back to text
    pub fn serialize(&self) -> String {
        if !self.is_modified() {
            return self.source.clone();
        }

        let mut emitter = Emitter::new(self.indent);
        emitter.verbatim(&self.header);
        emitter.root(&self.root, self.root_column);
        emitter.verbatim(&self.trailing);

        let mut text = emitter.finish().join("\n");
        if self.final_newline && !text.is_empty() {
            text.push('\n');
        }
        if self.crlf {
            text = text.replace('\n', "\r\n");
        }
        if self.bom {
            text.insert(0, BOM);
        }
        text
    }

    fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.header.hash(&mut h);
        self.trailing.hash(&mut h);
        hash_node(&self.root, &mut h);
        h.finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}
