//! Existence checks for project-relative paths
//!
//! `prefix_plus_for_config` needs to know whether a key under `models:`
//! names a directory or file of the project. Tests swap the filesystem
//! for a fixed set of paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extensions a dbt resource file can carry
const RESOURCE_EXTENSIONS: &[&str] = &["py", "sql", "csv"];

/// Answers whether a path exists in the project
pub trait PathOracle {
    fn exists(&self, path: &Path) -> bool;
}

/// Oracle backed by the real filesystem
///
/// A path also counts as existing when a resource file with that stem
/// does (`models/orders` matches `models/orders.sql`).
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemOracle;

impl PathOracle for FilesystemOracle {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
            || RESOURCE_EXTENSIONS
                .iter()
                .any(|ext| path.with_extension(ext).exists())
    }
}

/// Oracle over a fixed list of files, relative to a root
#[derive(Debug, Clone)]
pub struct KnownPaths {
    paths: BTreeSet<PathBuf>,
}

impl KnownPaths {
    pub fn new<P: AsRef<Path>>(root: &Path, relative: impl IntoIterator<Item = P>) -> Self {
        Self {
            paths: relative.into_iter().map(|p| root.join(p)).collect(),
        }
    }
}

impl PathOracle for KnownPaths {
    fn exists(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p.starts_with(path))
            || RESOURCE_EXTENSIONS
                .iter()
                .any(|ext| self.paths.contains(&path.with_extension(ext)))
    }
}
