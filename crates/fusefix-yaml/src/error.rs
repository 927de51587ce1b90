//! YAML errors

/// Errors raised while parsing a YAML document
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum YamlError {
    #[error("line {line}: found duplicate key \"{key}\"")]
    DuplicateKey { line: usize, key: String },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: found a tab character where an indentation space is expected")]
    TabIndentation { line: usize },

    #[error("line {line}: only single-document files are supported")]
    MultipleDocuments { line: usize },
}

impl YamlError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    /// Line the error was found on
    pub fn line(&self) -> usize {
        match self {
            Self::DuplicateKey { line, .. }
            | Self::Syntax { line, .. }
            | Self::TabIndentation { line }
            | Self::MultipleDocuments { line } => *line,
        }
    }
}
