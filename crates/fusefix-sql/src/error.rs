use thiserror::Error;

/// Errors raised while rewriting SQL files
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// A config value that has to be written back could not be isolated
    /// from the source of the original call
    #[error("Could not extract the value of config '{0}' from the source of the config call")]
    UnextractableValue(String),
}
