//! dbt_project.yml model
//!
//! Reads the parts of `dbt_project.yml` that drive file discovery: the
//! project name, the resource paths per node type and the packages folder.

use std::path::{Path, PathBuf};

use fusefix_yaml::{Document, YamlError};
use serde_json::Value;
use walkdir::WalkDir;

use crate::hub::HubIndex;

/// File name of the project definition
pub const PROJECT_FILE: &str = "dbt_project.yml";

/// Packages folder when the project does not set one
pub const DEFAULT_PACKAGES_PATH: &str = "dbt_packages";

/// Resource folder kinds listed in `dbt_project.yml`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// `model-paths`
    Models,

    /// `seed-paths`
    Seeds,

    /// `macro-paths`
    Macros,

    /// `test-paths`
    Tests,

    /// `analysis-paths`
    Analyses,

    /// `snapshot-paths`
    Snapshots,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::Models,
        Self::Seeds,
        Self::Macros,
        Self::Tests,
        Self::Analyses,
        Self::Snapshots,
    ];

    /// Node type name, also the default folder name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Models => "models",
            Self::Seeds => "seeds",
            Self::Macros => "macros",
            Self::Tests => "tests",
            Self::Analyses => "analyses",
            Self::Snapshots => "snapshots",
        }
    }

    /// Key listing the folders in `dbt_project.yml`
    pub fn path_key(&self) -> &'static str {
        match self {
            Self::Models => "model-paths",
            Self::Seeds => "seed-paths",
            Self::Macros => "macro-paths",
            Self::Tests => "test-paths",
            Self::Analyses => "analysis-paths",
            Self::Snapshots => "snapshot-paths",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resource folder and the node type of what it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    /// Folder, joined onto the project root
    pub path: PathBuf,

    pub kind: ResourceKind,
}

/// Resource folders of a project plus the keys that could not be read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePaths {
    pub paths: Vec<ResourcePath>,

    /// One message per `*-paths` key whose value is not a list
    pub warnings: Vec<String>,
}

impl ResourcePaths {
    pub fn extend(&mut self, other: ResourcePaths) {
        self.paths.extend(other.paths);
        self.warnings.extend(other.warnings);
    }
}

/// Which installed packages take part in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageSelection {
    /// Only the root project
    #[default]
    None,

    /// Packages published on the dbt hub
    Hub,

    /// Packages that are not on the hub
    Private,
}

impl PackageSelection {
    /// Private selection wins when both flags are set
    pub fn from_flags(include_packages: bool, include_private_packages: bool) -> Self {
        if include_private_packages {
            Self::Private
        } else if include_packages {
            Self::Hub
        } else {
            Self::None
        }
    }
}

/// A loaded `dbt_project.yml`
#[derive(Debug, Clone)]
pub struct DbtProject {
    root: PathBuf,
    config: Value,
}

impl DbtProject {
    /// Load `<root>/dbt_project.yml`
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let path = root.join(PROJECT_FILE);
        if !path.exists() {
            return Err(ProjectError::NotFound(root.display().to_string()));
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ProjectError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(root, &contents)
            .map_err(|e| match e {
                ProjectError::YamlError(_, source) => ProjectError::YamlError(path.display().to_string(), source),
                other => other,
            })
    }

    /// Parse project text for a root folder
    pub fn from_str(root: &Path, contents: &str) -> Result<Self, ProjectError> {
        let document = Document::parse_lenient(contents)
            .map_err(|e| ProjectError::YamlError(PROJECT_FILE.to_string(), e))?;

        Ok(Self {
            root: root.to_path_buf(),
            config: document.to_json(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project `name`
    pub fn name(&self) -> Option<&str> {
        self.config.get("name").and_then(Value::as_str)
    }

    /// Raw value of a top-level key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Packages folder, relative to the root
    ///
    /// Reads `packages-install-path`, then the older `packages-paths`.
    pub fn packages_path(&self) -> &str {
        ["packages-install-path", "packages-paths"]
            .iter()
            .find_map(|key| self.config.get(*key).and_then(Value::as_str))
            .unwrap_or(DEFAULT_PACKAGES_PATH)
    }

    /// Resource folders declared by this project, joined onto its root
    pub fn resource_paths(&self) -> ResourcePaths {
        let mut result = ResourcePaths::default();

        for kind in ResourceKind::ALL {
            match self.config.get(kind.path_key()) {
                None | Some(Value::Null) => result.paths.push(ResourcePath {
                    path: self.root.join(kind.as_str()),
                    kind,
                }),
                Some(Value::Array(paths)) => {
                    for path in paths {
                        let path = match path {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        result.paths.push(ResourcePath {
                            path: self.root.join(path),
                            kind,
                        });
                    }
                }
                Some(other) => result.warnings.push(format!(
                    "Paths '{}' for '{}' cannot be autofixed",
                    display_value(other),
                    kind.path_key()
                )),
            }
        }

        result
    }

    /// Package folders that take part in a run, sorted
    pub fn package_roots(&self, selection: PackageSelection, hub: &HubIndex) -> Vec<PathBuf> {
        if selection == PackageSelection::None {
            return Vec::new();
        }

        let packages_dir = self.root.join(self.packages_path());
        let Ok(entries) = std::fs::read_dir(&packages_dir) else {
            return Vec::new();
        };

        let mut roots: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| !hub.should_skip(path, selection))
            .collect();
        roots.sort();
        roots
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Files under `dir` with one of the extensions, sorted
///
/// A missing directory yields nothing.
pub fn collect_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
        })
        .collect();
    files.sort();
    files
}

/// `--select` filter
///
/// A file is kept when any selected path, made absolute, appears in the
/// file's absolute path. An empty selection keeps everything.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    paths: Vec<String>,
}

impl Selection {
    pub fn new<S: AsRef<str>>(select: &[S]) -> Self {
        Self {
            paths: select.iter().map(|s| absolute_string(Path::new(s.as_ref()))).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn matches(&self, file: &Path) -> bool {
        if self.paths.is_empty() {
            return true;
        }
        let file = absolute_string(file);
        self.paths.iter().any(|selected| file.contains(selected.as_str()))
    }
}

fn absolute_string(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize(&absolute).to_string_lossy().replace('\\', "/")
}

/// Drop `.` components and fold `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Errors loading a project
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("dbt_project.yml not found in {0}")]
    NotFound(String),

    #[error("Failed to read {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse {0}: {1}")]
    YamlError(String, #[source] YamlError),
}
