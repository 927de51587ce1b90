//! Duplicate key scan across a project
//!
//! Read-only: lists duplicate keys in the project's own YAML files and,
//! separately, in installed packages.

use std::path::{Path, PathBuf};

use fusefix_yaml::find_duplicate_keys;

use crate::project::{collect_files, DbtProject, ProjectError};

/// A duplicate key found in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFound {
    pub file: PathBuf,

    /// 1-based line of the repeated key
    pub line: usize,

    pub key: String,

    /// Lint description
    pub description: String,
}

impl std::fmt::Display for DuplicateFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} -- {}", self.file.display(), self.line, self.description)
    }
}

/// Result of [`scan_duplicates`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateScan {
    /// Duplicates in the project's own files
    pub project: Vec<DuplicateFound>,

    /// Duplicates in installed packages
    pub packages: Vec<DuplicateFound>,
}

impl DuplicateScan {
    pub fn is_empty(&self) -> bool {
        self.project.is_empty() && self.packages.is_empty()
    }
}

/// Scan every YAML file under a project root
///
/// `target/` is skipped. Package files are reported separately, without
/// their `integration_tests` folders.
pub fn scan_duplicates(root: &Path) -> Result<DuplicateScan, ProjectError> {
    let project = DbtProject::load(root)?;
    let target_dir = root.join("target");
    let packages_dir = root.join(project.packages_path());

    let mut scan = DuplicateScan::default();

    for file in collect_files(root, &["yml", "yaml"]) {
        if file.starts_with(&target_dir) || file.starts_with(&packages_dir) {
            continue;
        }
        scan.project.extend(scan_file(&file)?);
    }

    for file in collect_files(&packages_dir, &["yml", "yaml"]) {
        if file.components().any(|c| c.as_os_str() == "integration_tests") {
            continue;
        }
        scan.packages.extend(scan_file(&file)?);
    }

    Ok(scan)
}

fn scan_file(file: &Path) -> Result<Vec<DuplicateFound>, ProjectError> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| ProjectError::IoError(file.display().to_string(), e.to_string()))?;

    Ok(find_duplicate_keys(&contents)
        .into_iter()
        .map(|dup| DuplicateFound {
            file: file.to_path_buf(),
            line: dup.line,
            description: dup.message(),
            key: dup.key,
        })
        .collect())
}
