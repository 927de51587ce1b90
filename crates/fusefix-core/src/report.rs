//! Report output (JSON lines)
//!
//! One JSON object per reported file, followed by a completion marker.
//! The field names are STABLE - tools diff this output.

use serde::{Deserialize, Serialize};

use crate::refactor::{DeprecationRefactor, RefactorResult};

/// Run mode recorded in each JSON line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Changes computed but not written
    DryRun,

    /// Changes written to disk
    Applied,

    /// Final line of a run
    Complete,
}

/// JSON report for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// Run mode
    pub mode: OutputMode,

    /// File path as discovered
    pub file_path: String,

    /// Logged changes of all rules that changed something
    pub refactors: Vec<DeprecationRefactor>,

    /// Warnings of all rules
    pub warnings: Vec<String>,
}

impl FileReport {
    /// Build the report for one file result
    pub fn from_result(result: &RefactorResult) -> Self {
        Self {
            mode: if result.dry_run { OutputMode::DryRun } else { OutputMode::Applied },
            file_path: result.file_path.display().to_string(),
            refactors: result.refactors().cloned().collect(),
            warnings: result.warnings().map(str::to_string).collect(),
        }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Completion marker printed after all file reports
pub fn completion_line() -> String {
    serde_json::json!({ "mode": OutputMode::Complete }).to_string()
}

/// Aggregate outcome of a run, used for the exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Files with changes
    pub files_refactored: usize,

    /// Files with warnings
    pub files_with_warnings: usize,

    /// Whether nothing was written
    pub dry_run: bool,
}

impl RunSummary {
    /// Summarize a set of file results
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a RefactorResult>, dry_run: bool) -> Self {
        let mut summary = Self { dry_run, ..Self::default() };
        for result in results {
            if result.refactored {
                summary.files_refactored += 1;
            }
            if result.has_warnings() {
                summary.files_with_warnings += 1;
            }
        }
        summary
    }

    /// Check if the run should exit non-zero
    ///
    /// A dry run fails when it found work to do; an applied run fails when
    /// warnings remain.
    pub fn has_issues(&self) -> bool {
        (self.dry_run && self.files_refactored > 0) || self.files_with_warnings > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deprecation::DeprecationKind;
    use crate::refactor::{FileKind, RuleResult};
    use pretty_assertions::assert_eq;

    fn refactored_result(dry_run: bool) -> RefactorResult {
        let mut result = RefactorResult::new(FileKind::Yaml, "models/schema.yml", "a: 1\n", dry_run);
        result.record(RuleResult::new(
            "restructure_yaml_keys",
            "a: 1\n",
            "b: 1\n".to_string(),
            vec![DeprecationRefactor::new("moved a", DeprecationKind::CustomKeyInObject)],
        ));
        result
    }

    #[test]
    fn json_shape() {
        let report = FileReport::from_result(&refactored_result(true));
        assert_eq!(
            report.to_json().unwrap(),
            r#"{"mode":"dry_run","file_path":"models/schema.yml","refactors":[{"deprecation":"CustomKeyInObjectDeprecation","log":"moved a"}],"warnings":[]}"#
        );
    }

    #[test]
    fn null_deprecation_is_serialized() {
        let mut result = RefactorResult::new(FileKind::Sql, "models/a.sql", "x", false);
        result.record(RuleResult::new("r", "x", "y".to_string(), vec![DeprecationRefactor::log_only("changed")]));
        let json = FileReport::from_result(&result).to_json().unwrap();
        assert!(json.contains(r#"{"deprecation":null,"log":"changed"}"#));
        assert!(json.starts_with(r#"{"mode":"applied""#));
    }

    #[test]
    fn completion_marker() {
        assert_eq!(completion_line(), r#"{"mode":"complete"}"#);
    }

    #[test]
    fn exit_status() {
        let dry = [refactored_result(true)];
        assert!(RunSummary::from_results(&dry, true).has_issues());

        let applied = [refactored_result(false)];
        assert!(!RunSummary::from_results(&applied, false).has_issues());

        let mut warned = RefactorResult::new(FileKind::Sql, "models/a.sql", "x", false);
        warned.record(RuleResult::unchanged("r", "x").with_warnings(vec!["w".to_string()]));
        assert!(RunSummary::from_results([&warned], false).has_issues());
    }
}
