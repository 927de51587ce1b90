//! Rule ordering and the run over one project
//!
//! A run goes through the project in this order:
//! 1. `dbt_project.yml` of the project and of each selected package,
//!    written right away outside a dry run
//! 2. SQL files under the resource paths
//! 3. YAML files under the resource paths, or the semantic layer phases
//!
//! Outside `--all`, the first failing file stops the run.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use fusefix_core::{FileKind, RefactorResult, RuleResult, RunSummary};
use fusefix_dbt::project::PROJECT_FILE;
use fusefix_dbt::{collect_files, DbtProject, HubIndex, PackageSelection, ResourceKind, ResourcePath, SchemaSpecs, Selection};
use fusefix_jinja::ConfigRenderer;
use tracing::{debug, warn};

use crate::error::RefactorError;
use crate::oracle::{FilesystemOracle, PathOracle};
use crate::semantic::{SemanticDefinitions, PHASES};
use crate::{project_rules, sql_rules, text_rules, yaml_rules};

const YAML_EXTENSIONS: &[&str] = &["yml", "yaml"];
const SQL_EXTENSIONS: &[&str] = &["sql"];

/// What rules need besides the file content
pub struct RuleContext<'a> {
    /// Allowed properties and configs per node type
    pub specs: &'a SchemaSpecs,

    /// Folder holding the `dbt_project.yml` being processed
    pub project_root: &'a Path,

    /// Existence checks for project paths
    pub oracle: &'a dyn PathOracle,

    /// Jinja evaluation of config calls
    pub renderer: &'a ConfigRenderer,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        specs: &'a SchemaSpecs,
        project_root: &'a Path,
        oracle: &'a dyn PathOracle,
        renderer: &'a ConfigRenderer,
    ) -> Self {
        Self {
            specs,
            project_root,
            oracle,
            renderer,
        }
    }
}

/// Which rules take part in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSet {
    /// Fixes that keep the project's behavior
    #[default]
    Safe,

    /// Only the fixes that change behavior
    BehaviorChange,

    /// Both, with per-file failures downgraded to warnings
    All,
}

impl RuleSet {
    /// `--all` wins over `--behavior-change`
    pub fn from_flags(behavior_change: bool, all: bool) -> Self {
        if all {
            Self::All
        } else if behavior_change {
            Self::BehaviorChange
        } else {
            Self::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::BehaviorChange => "behavior_change",
            Self::All => "all",
        }
    }

    fn includes_safe(&self) -> bool {
        matches!(self, Self::Safe | Self::All)
    }

    fn includes_behavior_change(&self) -> bool {
        matches!(self, Self::BehaviorChange | Self::All)
    }

    /// Whether a failing file is skipped instead of stopping the run
    pub fn continues_on_error(&self) -> bool {
        *self == Self::All
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings of one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Report changes without writing them
    pub dry_run: bool,

    pub rule_set: RuleSet,

    /// `--select` paths
    pub select: Vec<String>,

    /// Installed packages to process
    pub packages: PackageSelection,

    /// Run only the semantic layer migration
    pub semantic_layer: bool,

    /// Keep deprecated `dbt_project.yml` keys that are removed otherwise
    pub exclude_dbt_project_keys: bool,
}

impl RunOptions {
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_set = rule_set;
        self
    }

    pub fn with_select(mut self, select: Vec<String>) -> Self {
        self.select = select;
        self
    }

    pub fn with_packages(mut self, packages: PackageSelection) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_semantic_layer(mut self, semantic_layer: bool) -> Self {
        self.semantic_layer = semantic_layer;
        self
    }

    pub fn with_exclude_dbt_project_keys(mut self, exclude: bool) -> Self {
        self.exclude_dbt_project_keys = exclude;
        self
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Property files with changes or warnings, sorted by path
    pub yaml: Vec<RefactorResult>,

    /// `dbt_project.yml` results, root project first
    pub project: Vec<RefactorResult>,

    /// SQL files with changes or warnings
    pub sql: Vec<RefactorResult>,

    /// Problems outside any single rule (missing paths, skipped files)
    pub warnings: Vec<String>,

    pub dry_run: bool,
}

impl RunOutcome {
    /// All file results in report order
    pub fn results(&self) -> impl Iterator<Item = &RefactorResult> {
        self.yaml.iter().chain(&self.project).chain(&self.sql)
    }

    /// File results worth printing
    pub fn reportable(&self) -> impl Iterator<Item = &RefactorResult> {
        self.results().filter(|r| r.is_reportable())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(self.results(), self.dry_run)
    }
}

type YamlRule<'r> = Box<dyn Fn(&str) -> Result<RuleResult, RefactorError> + 'r>;
type SqlRule<'r> = Box<dyn Fn(&str, &Path) -> Result<RuleResult, RefactorError> + 'r>;

/// Runs the rules over a dbt project
pub struct Pipeline<'a> {
    root: PathBuf,
    specs: &'a SchemaSpecs,
    options: RunOptions,
    hub: HubIndex,
}

impl<'a> Pipeline<'a> {
    pub fn new(root: impl Into<PathBuf>, specs: &'a SchemaSpecs, options: RunOptions) -> Self {
        Self {
            root: root.into(),
            specs,
            options,
            hub: HubIndex::unavailable(),
        }
    }

    /// Hub index used to tell hub packages from private ones
    pub fn with_hub_index(mut self, hub: HubIndex) -> Self {
        self.hub = hub;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Process the project, writing changes unless this is a dry run
    pub fn run(&self) -> Result<RunOutcome, RefactorError> {
        let mut outcome = RunOutcome {
            dry_run: self.options.dry_run,
            ..RunOutcome::default()
        };
        let renderer = ConfigRenderer::new();
        let oracle = FilesystemOracle;

        let package_roots = DbtProject::load(&self.root)?.package_roots(self.options.packages, &self.hub);
        debug!(
            root = %self.root.display(),
            packages = package_roots.len(),
            rule_set = %self.options.rule_set,
            "Starting run"
        );

        if !self.options.semantic_layer {
            let roots = std::iter::once(self.root.as_path()).chain(package_roots.iter().map(PathBuf::as_path));
            for root in roots {
                let ctx = RuleContext::new(self.specs, root, &oracle, &renderer);
                let Some(result) = self.process_project_file(&ctx, &mut outcome.warnings)? else {
                    continue;
                };
                if !self.options.dry_run && result.refactored {
                    write_result(&result)?;
                }
                outcome.project.push(result);
            }
        }

        let resource_paths = self.resource_paths(&package_roots, &mut outcome.warnings)?;
        let selection = Selection::new(&self.options.select);

        if !self.options.semantic_layer {
            let ctx = RuleContext::new(self.specs, &self.root, &oracle, &renderer);
            self.process_sql_files(&resource_paths, &selection, &ctx, &mut outcome)?;
        }

        let yaml_files = files_under(&resource_paths, YAML_EXTENSIONS, &selection);
        outcome.yaml = if self.options.semantic_layer {
            let definition_files = files_under(&resource_paths, YAML_EXTENSIONS, &Selection::default());
            let mut definitions = SemanticDefinitions::collect(&definition_files);
            self.process_semantic_layer(&yaml_files, &mut definitions, &mut outcome.warnings)?
        } else {
            self.process_yaml_files(&yaml_files, &mut outcome.warnings)?
        };

        if !self.options.dry_run {
            for result in outcome.yaml.iter().chain(&outcome.sql).filter(|r| r.refactored) {
                write_result(result)?;
            }
        }

        Ok(outcome)
    }

    /// Turn a per-file failure into a warning, or stop the run
    fn recover(
        &self,
        error: RefactorError,
        kind: FileKind,
        path: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<(), RefactorError> {
        if !self.options.rule_set.continues_on_error() {
            return Err(error.in_file(kind, path));
        }
        let warning = format!("Could not apply fixes to {}: {}", path.display(), error);
        warn!("{}", warning);
        warnings.push(warning);
        Ok(())
    }

    fn project_rules<'r>(&self, ctx: &'r RuleContext<'r>) -> Vec<YamlRule<'r>> {
        let mut rules: Vec<YamlRule<'r>> = Vec::new();
        let exclude_keys = self.options.exclude_dbt_project_keys;

        if self.options.rule_set.includes_behavior_change() {
            rules.push(Box::new(project_rules::flip_behavior_flags));
        }
        if self.options.rule_set.includes_safe() {
            rules.push(Box::new(|yml: &str| Ok(text_rules::replace_fancy_quotes(yml))));
            rules.push(Box::new(yaml_rules::remove_duplicate_keys));
            rules.push(Box::new(project_rules::changeset_dbt_project_flip_test_arguments_behavior_flag));
            rules.push(Box::new(move |yml: &str| project_rules::remove_deprecated_config(yml, exclude_keys)));
            rules.push(Box::new(move |yml: &str| Ok(project_rules::fix_space_after_plus(yml, ctx.specs))));
            rules.push(Box::new(move |yml: &str| project_rules::prefix_plus_for_config(yml, ctx)));
        }
        rules
    }

    fn yaml_rules(&self) -> Vec<YamlRule<'a>> {
        let mut rules: Vec<YamlRule<'a>> = Vec::new();
        let specs = self.specs;

        if self.options.rule_set.includes_safe() {
            rules.push(Box::new(|yml: &str| Ok(text_rules::replace_fancy_quotes(yml))));
            rules.push(Box::new(|yml: &str| Ok(text_rules::remove_tab_only_lines(yml))));
            rules.push(Box::new(|yml: &str| Ok(text_rules::removed_extra_indentation(yml))));
            rules.push(Box::new(|yml: &str| Ok(text_rules::remove_extra_tabs(yml))));
            rules.push(Box::new(yaml_rules::remove_duplicate_keys));
            rules.push(Box::new(yaml_rules::remove_duplicate_models));
            rules.push(Box::new(move |yml: &str| yaml_rules::restructure_yaml_keys(yml, specs)));
            rules.push(Box::new(yaml_rules::restructure_owner_properties));
        }
        if self.options.rule_set.includes_behavior_change() {
            rules.push(Box::new(move |yml: &str| yaml_rules::remove_spaces_in_resource_names(yml, specs)));
        }
        rules
    }

    fn sql_rules<'r>(&self, kind: ResourceKind, ctx: &'r RuleContext<'r>) -> Vec<SqlRule<'r>> {
        let mut rules: Vec<SqlRule<'r>> = Vec::new();

        if self.options.rule_set.includes_behavior_change() {
            rules.push(Box::new(|sql: &str, path: &Path| {
                Ok(sql_rules::rename_sql_files_with_spaces(sql, path))
            }));
        }
        if self.options.rule_set.includes_safe() {
            rules.push(Box::new(|sql: &str, _: &Path| Ok(sql_rules::remove_unmatched_endings(sql))));
            rules.push(Box::new(move |sql: &str, _: &Path| {
                sql_rules::move_custom_configs_to_meta_sql(sql, kind, ctx)
            }));
            rules.push(Box::new(move |sql: &str, _: &Path| {
                Ok(sql_rules::move_custom_config_access_to_meta_sql_improved(sql, ctx))
            }));
        }
        rules
    }

    /// Run the project rules over `<root>/dbt_project.yml`
    ///
    /// `None` when the folder has no project file or it could not be read.
    fn process_project_file(
        &self,
        ctx: &RuleContext<'_>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<RefactorResult>, RefactorError> {
        let path = ctx.project_root.join(PROJECT_FILE);
        if !path.exists() {
            debug!("No {} in {}", PROJECT_FILE, ctx.project_root.display());
            return Ok(None);
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                self.recover(RefactorError::Read(path.clone(), e), FileKind::Yaml, &path, warnings)?;
                return Ok(None);
            }
        };

        let mut result = RefactorResult::new(FileKind::Yaml, &path, content, self.options.dry_run);
        for rule in self.project_rules(ctx) {
            match rule(result.content()) {
                Ok(rule_result) => result.record(rule_result),
                Err(e) => {
                    self.recover(e, FileKind::Yaml, &path, warnings)?;
                    break;
                }
            }
        }

        debug!(file = %path.display(), refactored = result.refactored, "Processed project file");
        Ok(Some(result))
    }

    /// Resource folders of the project and its packages that exist
    ///
    /// Read after the project files were processed, so fixed files are used.
    fn resource_paths(
        &self,
        package_roots: &[PathBuf],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<ResourcePath>, RefactorError> {
        let mut paths = DbtProject::load(&self.root)?.resource_paths();
        for root in package_roots {
            match DbtProject::load(root) {
                Ok(package) => paths.extend(package.resource_paths()),
                Err(e) => debug!("Skipping package {}: {}", root.display(), e),
            }
        }

        let mut existing = Vec::new();
        for resource in paths.paths {
            if resource.path.exists() {
                existing.push(resource);
            } else {
                paths.warnings.push(format!("Path {} does not exist", resource.path.display()));
            }
        }

        for warning in &paths.warnings {
            warn!("{}", warning);
        }
        warnings.extend(paths.warnings);
        Ok(existing)
    }

    fn process_sql_files(
        &self,
        resource_paths: &[ResourcePath],
        selection: &Selection,
        ctx: &RuleContext<'_>,
        outcome: &mut RunOutcome,
    ) -> Result<(), RefactorError> {
        for resource in resource_paths {
            let rules = self.sql_rules(resource.kind, ctx);
            for file in collect_files(&resource.path, SQL_EXTENSIONS) {
                if !selection.matches(&file) {
                    continue;
                }
                match self.process_sql_file(&file, &rules) {
                    Ok(result) if result.is_reportable() => outcome.sql.push(result),
                    Ok(_) => {}
                    Err(e) => self.recover(e, FileKind::Sql, &file, &mut outcome.warnings)?,
                }
            }
        }
        Ok(())
    }

    fn process_sql_file(&self, file: &Path, rules: &[SqlRule<'_>]) -> Result<RefactorResult, RefactorError> {
        let content = std::fs::read_to_string(file).map_err(|e| RefactorError::Read(file.to_path_buf(), e))?;
        let mut result = RefactorResult::new(FileKind::Sql, file, content, self.options.dry_run);

        for rule in rules {
            let rule_result = rule(result.content(), result.current_path())?;
            result.record(rule_result);
        }

        debug!(file = %file.display(), refactored = result.refactored, "Processed SQL file");
        Ok(result)
    }

    fn process_yaml_files(
        &self,
        files: &[PathBuf],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RefactorResult>, RefactorError> {
        let rules = self.yaml_rules();
        let mut results = BTreeMap::new();
        let mut failed = BTreeSet::new();

        self.yaml_phase(files, &mut results, &mut failed, warnings, |result| {
            for rule in &rules {
                let rule_result = rule(result.content())?;
                result.record(rule_result);
            }
            Ok(())
        })?;

        Ok(results.into_values().filter(RefactorResult::is_reportable).collect())
    }

    /// Semantic layer migration, one phase at a time over every file
    fn process_semantic_layer(
        &self,
        files: &[PathBuf],
        definitions: &mut SemanticDefinitions,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RefactorResult>, RefactorError> {
        let mut results = BTreeMap::new();
        let mut failed = BTreeSet::new();

        for (index, phase) in PHASES.iter().enumerate() {
            debug!(phase = index + 1, files = files.len(), "Running semantic layer phase");
            self.yaml_phase(files, &mut results, &mut failed, warnings, |result| {
                for rule in phase.iter() {
                    let rule_result = rule(result.content(), definitions)?;
                    result.record(rule_result);
                }
                Ok(())
            })?;
        }

        Ok(results.into_values().filter(RefactorResult::is_reportable).collect())
    }

    /// Apply `rules` to each file, continuing from earlier phases' results
    ///
    /// A file that failed once is dropped along with its earlier changes and
    /// skipped by later phases.
    fn yaml_phase(
        &self,
        files: &[PathBuf],
        results: &mut BTreeMap<PathBuf, RefactorResult>,
        failed: &mut BTreeSet<PathBuf>,
        warnings: &mut Vec<String>,
        mut rules: impl FnMut(&mut RefactorResult) -> Result<(), RefactorError>,
    ) -> Result<(), RefactorError> {
        for file in files {
            if failed.contains(file) {
                continue;
            }

            let result = match results.entry(file.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match std::fs::read_to_string(file) {
                    Ok(content) => entry.insert(RefactorResult::new(FileKind::Yaml, file, content, self.options.dry_run)),
                    Err(e) => {
                        self.recover(RefactorError::Read(file.clone(), e), FileKind::Yaml, file, warnings)?;
                        failed.insert(file.clone());
                        continue;
                    }
                },
            };

            if let Err(e) = rules(result) {
                self.recover(e, FileKind::Yaml, file, warnings)?;
                results.remove(file);
                failed.insert(file.clone());
            }
        }
        Ok(())
    }
}

/// Files with the given extensions under the folders, deduplicated and sorted
fn files_under(paths: &[ResourcePath], extensions: &[&str], selection: &Selection) -> Vec<PathBuf> {
    let files: BTreeSet<PathBuf> = paths
        .iter()
        .flat_map(|resource| collect_files(&resource.path, extensions))
        .filter(|file| selection.matches(file))
        .collect();
    files.into_iter().collect()
}

fn write_result(result: &RefactorResult) -> Result<(), RefactorError> {
    result
        .write()
        .map_err(|e| RefactorError::Write(result.refactored_file_path.clone(), e))?;
    debug!(file = %result.refactored_file_path.display(), "Wrote file");
    Ok(())
}
