//! dbt hub package index
//!
//! Tells public hub packages apart from private ones by project name.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::project::{DbtProject, PackageSelection};

/// Index of every package published on the hub
pub const HUB_INDEX_URL: &str = "https://hub.getdbt.com/api/v1/index.json";

/// Names of the packages on the hub
///
/// When the index could not be fetched, no package counts as a hub package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubIndex {
    names: Option<HashSet<String>>,
}

impl HubIndex {
    /// Fetch the index, falling back to an empty one on any failure
    pub async fn fetch(disable_ssl_verification: bool) -> Self {
        match Self::try_fetch(disable_ssl_verification).await {
            Ok(index) => index,
            Err(e) => {
                warn!("Could not fetch the dbt hub index: {}", e);
                Self::unavailable()
            }
        }
    }

    async fn try_fetch(disable_ssl_verification: bool) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(disable_ssl_verification)
            .build()?;
        let entries: serde_json::Value = client
            .get(HUB_INDEX_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(match entries.as_array() {
            Some(list) => Self::from_entries(list.iter().filter_map(|e| e.as_str())),
            None => Self::unavailable(),
        })
    }

    /// Build from `org/name` index entries
    pub fn from_entries<S: AsRef<str>>(entries: impl IntoIterator<Item = S>) -> Self {
        let names = entries
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref();
                entry.rsplit('/').next().unwrap_or(entry).to_string()
            })
            .collect();
        Self { names: Some(names) }
    }

    pub fn unavailable() -> Self {
        Self { names: None }
    }

    pub fn is_available(&self) -> bool {
        self.names.is_some()
    }

    pub fn contains(&self, package_name: &str) -> bool {
        self.names.as_ref().is_some_and(|names| names.contains(package_name))
    }

    /// Check the `name` in a package folder's `dbt_project.yml`
    pub fn is_hub_package(&self, package_dir: &Path) -> bool {
        match DbtProject::load(package_dir) {
            Ok(project) => project.name().is_some_and(|name| self.contains(name)),
            Err(e) => {
                debug!("Treating {} as private: {}", package_dir.display(), e);
                false
            }
        }
    }

    /// Whether a package folder is left out of a run
    pub fn should_skip(&self, package_dir: &Path, selection: PackageSelection) -> bool {
        match selection {
            PackageSelection::None => true,
            PackageSelection::Hub => !self.is_hub_package(package_dir),
            PackageSelection::Private => self.is_hub_package(package_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::PROJECT_FILE;
    use tempfile::TempDir;

    #[test]
    fn names_are_the_last_segment() {
        let index = HubIndex::from_entries(["dbt-labs/dbt_utils", "calogica/dbt_expectations"]);
        assert!(index.contains("dbt_utils"));
        assert!(index.contains("dbt_expectations"));
        assert!(!index.contains("dbt-labs"));
    }

    #[test]
    fn unavailable_index_treats_everything_as_private() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), "name: dbt_utils\n").unwrap();

        let index = HubIndex::unavailable();
        assert!(!index.is_available());
        assert!(!index.is_hub_package(dir.path()));
        assert!(index.should_skip(dir.path(), PackageSelection::Hub));
        assert!(!index.should_skip(dir.path(), PackageSelection::Private));
    }

    #[test]
    fn package_without_project_file_is_private() {
        let dir = TempDir::new().unwrap();
        let index = HubIndex::from_entries(["dbt-labs/dbt_utils"]);
        assert!(!index.is_hub_package(dir.path()));
    }
}
