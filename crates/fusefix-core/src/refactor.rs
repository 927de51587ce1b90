//! Refactor results
//!
//! Every rule produces a [`RuleResult`]; the results of all rules applied to
//! one file are folded into a [`RefactorResult`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::deprecation::DeprecationKind;

/// One logged change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationRefactor {
    /// Deprecation category, `None` for log-only entries
    pub deprecation: Option<DeprecationKind>,

    /// Human-readable description of the change
    pub log: String,
}

impl DeprecationRefactor {
    /// Create a refactor entry tagged with a deprecation category
    pub fn new(log: impl Into<String>, deprecation: DeprecationKind) -> Self {
        Self {
            deprecation: Some(deprecation),
            log: log.into(),
        }
    }

    /// Create a refactor entry without a category
    pub fn log_only(log: impl Into<String>) -> Self {
        Self {
            deprecation: None,
            log: log.into(),
        }
    }
}

/// Effect of one rule on one file
///
/// A result that is not `refactored` never carries refactors and its
/// content is identical to its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    /// Stable rule name (shown in human output)
    pub rule_name: &'static str,

    /// Whether the rule changed anything
    pub refactored: bool,

    /// Content the rule received
    pub original_content: String,

    /// Content the rule produced
    pub refactored_content: String,

    /// Changes made, in order
    pub refactors: Vec<DeprecationRefactor>,

    /// Things found but deliberately left alone
    pub warnings: Vec<String>,

    /// New file name, for rules that rename files
    pub refactored_file_path: Option<PathBuf>,
}

impl RuleResult {
    /// Build a result from the rule's output
    ///
    /// `refactored` is derived: it is set when the content changed or any
    /// refactor was logged.
    pub fn new(
        rule_name: &'static str,
        original: &str,
        refactored_content: String,
        refactors: Vec<DeprecationRefactor>,
    ) -> Self {
        let refactored = refactored_content != original || !refactors.is_empty();
        Self {
            rule_name,
            refactored,
            original_content: original.to_string(),
            refactored_content,
            refactors,
            warnings: Vec::new(),
            refactored_file_path: None,
        }
    }

    /// A rule that found nothing to do
    pub fn unchanged(rule_name: &'static str, content: &str) -> Self {
        Self::new(rule_name, content, content.to_string(), Vec::new())
    }

    /// Attach warnings
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Record a file rename
    pub fn with_renamed_path(mut self, path: PathBuf) -> Self {
        self.refactored = true;
        self.refactored_file_path = Some(path);
        self
    }

    /// Log lines of this rule
    pub fn logs(&self) -> impl Iterator<Item = &str> {
        self.refactors.iter().map(|r| r.log.as_str())
    }
}

/// File type a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// YAML property file or dbt_project.yml
    Yaml,

    /// SQL model, macro, test or snapshot
    Sql,
}

/// Accumulated effect of all rules on one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactorResult {
    /// File type
    pub kind: FileKind,

    /// Whether this run only reports
    pub dry_run: bool,

    /// Path as discovered
    pub file_path: PathBuf,

    /// Path after renames (equal to `file_path` unless a rule renamed the file)
    pub refactored_file_path: PathBuf,

    /// OR of all rule results
    pub refactored: bool,

    /// Content read from disk
    pub original_content: String,

    /// Output of the last rule
    pub refactored_content: String,

    /// Recorded rule results, in application order
    pub rules: Vec<RuleResult>,
}

impl RefactorResult {
    /// Start accumulating results for a file
    pub fn new(kind: FileKind, file_path: impl Into<PathBuf>, content: impl Into<String>, dry_run: bool) -> Self {
        let file_path = file_path.into();
        let content = content.into();
        Self {
            kind,
            dry_run,
            refactored_file_path: file_path.clone(),
            file_path,
            refactored: false,
            original_content: content.clone(),
            refactored_content: content,
            rules: Vec::new(),
        }
    }

    /// Fold one rule result into the file result
    ///
    /// Results that neither changed anything nor warned are dropped.
    pub fn record(&mut self, rule: RuleResult) {
        if !rule.refactored && rule.warnings.is_empty() {
            return;
        }

        if rule.refactored {
            self.refactored = true;
            self.refactored_content = rule.refactored_content.clone();
            if let Some(path) = &rule.refactored_file_path {
                self.refactored_file_path = path.clone();
            }
        }

        self.rules.push(rule);
    }

    /// Current content, the input for the next rule
    pub fn content(&self) -> &str {
        &self.refactored_content
    }

    /// Current path, the input for renaming rules
    pub fn current_path(&self) -> &Path {
        &self.refactored_file_path
    }

    /// All logged changes across rules
    pub fn refactors(&self) -> impl Iterator<Item = &DeprecationRefactor> {
        self.rules
            .iter()
            .filter(|r| r.refactored)
            .flat_map(|r| r.refactors.iter())
    }

    /// All warnings across rules
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().flat_map(|r| r.warnings.iter().map(String::as_str))
    }

    /// Check if any rule left a warning
    pub fn has_warnings(&self) -> bool {
        self.rules.iter().any(|r| !r.warnings.is_empty())
    }

    /// Whether the file should be reported at all
    pub fn is_reportable(&self) -> bool {
        self.refactored || self.has_warnings()
    }

    /// Write the refactored content, renaming the file first if needed
    pub fn write(&self) -> Result<(), std::io::Error> {
        if self.refactored_file_path != self.file_path {
            std::fs::rename(&self.file_path, &self.refactored_file_path)?;
        }
        std::fs::write(&self.refactored_file_path, &self.refactored_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_rule_is_not_refactored() {
        let rule = RuleResult::unchanged("noop", "a: 1\n");
        assert!(!rule.refactored);
        assert!(rule.refactors.is_empty());
        assert_eq!(rule.original_content, rule.refactored_content);
    }

    #[test]
    fn logged_refactor_marks_rule_refactored() {
        let rule = RuleResult::new(
            "rename",
            "a: 1\n",
            "b: 1\n".to_string(),
            vec![DeprecationRefactor::log_only("renamed a to b")],
        );
        assert!(rule.refactored);
        assert_eq!(rule.logs().collect::<Vec<_>>(), vec!["renamed a to b"]);
    }

    #[test]
    fn file_result_chains_content() {
        let mut result = RefactorResult::new(FileKind::Yaml, "models/schema.yml", "a: 1\n", true);
        result.record(RuleResult::new("first", "a: 1\n", "a: 2\n".to_string(), vec![]));
        result.record(RuleResult::unchanged("second", "a: 2\n"));
        result.record(RuleResult::new("third", "a: 2\n", "a: 3\n".to_string(), vec![]));

        assert!(result.refactored);
        assert_eq!(result.content(), "a: 3\n");
        assert_eq!(result.original_content, "a: 1\n");
        let names: Vec<_> = result.rules.iter().map(|r| r.rule_name).collect();
        assert_eq!(names, vec!["first", "third"]);
    }

    #[test]
    fn warnings_are_kept_without_changes() {
        let mut result = RefactorResult::new(FileKind::Sql, "models/a.sql", "select 1", false);
        result.record(RuleResult::unchanged("access", "select 1").with_warnings(vec!["careful".to_string()]));

        assert!(!result.refactored);
        assert!(result.has_warnings());
        assert!(result.is_reportable());
        assert_eq!(result.warnings().collect::<Vec<_>>(), vec!["careful"]);
    }

    #[test]
    fn rename_updates_path() {
        let mut result = RefactorResult::new(FileKind::Sql, "models/my model.sql", "select 1", false);
        result.record(
            RuleResult::unchanged("rename", "select 1").with_renamed_path(PathBuf::from("models/my_model.sql")),
        );
        assert!(result.refactored);
        assert_eq!(result.current_path(), Path::new("models/my_model.sql"));
    }

    #[test]
    fn write_renames_then_writes() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("my model.sql");
        std::fs::write(&original, "select 1").unwrap();

        let mut result = RefactorResult::new(FileKind::Sql, original.clone(), "select 1", false);
        result.record(
            RuleResult::new("rewrite", "select 1", "select 2".to_string(), vec![])
                .with_renamed_path(dir.path().join("my_model.sql")),
        );
        result.write().unwrap();

        assert!(!original.exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("my_model.sql")).unwrap(), "select 2");
    }
}
