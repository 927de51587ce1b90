//! Errors raised while applying rules

use std::path::{Path, PathBuf};

use fusefix_core::FileKind;
use fusefix_dbt::ProjectError;
use fusefix_sql::SqlError;
use fusefix_yaml::YamlError;

/// Errors that stop a rule (and, outside `--all`, the run)
#[derive(Debug, thiserror::Error)]
pub enum RefactorError {
    #[error(transparent)]
    Yaml(#[from] YamlError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("Failed to read {}: {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write {}: {}", .0.display(), .1)]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Error processing YAML at path {}: {source}", .path.display())]
    YamlFile {
        path: PathBuf,
        #[source]
        source: Box<RefactorError>,
    },

    #[error("Error processing {}: {source}", .path.display())]
    SqlFile {
        path: PathBuf,
        #[source]
        source: Box<RefactorError>,
    },
}

impl RefactorError {
    /// Attach the file a rule failed on
    pub fn in_file(self, kind: FileKind, path: &Path) -> Self {
        let path = path.to_path_buf();
        let source = Box::new(self);
        match kind {
            FileKind::Yaml => Self::YamlFile { path, source },
            FileKind::Sql => Self::SqlFile { path, source },
        }
    }
}
