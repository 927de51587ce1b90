//! fusefix YAML
//!
//! Comment-preserving YAML documents for dbt property files and
//! `dbt_project.yml`. Parsing keeps the source text of every entry so that
//! rewriting one key leaves the rest of the file as it was.

pub mod document;
pub mod error;
pub mod lint;
pub mod node;
mod emitter;
mod parser;

pub use document::Document;
pub use emitter::Indent;
pub use error::YamlError;
pub use lint::{find_duplicate_keys, DuplicateKey};
pub use node::{Entry, Item, Mapping, Node, Scalar, ScalarStyle, Sequence, Trivia};
