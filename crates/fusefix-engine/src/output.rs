//! Printing run results
//!
//! Human output goes to stdout with colors; the dry-run banner and run
//! warnings go to stderr. JSON output is one line per file followed by a
//! completion line.

use colored::Colorize;
use fusefix_core::report::completion_line;
use fusefix_core::{FileReport, RefactorResult};

use crate::pipeline::RunOutcome;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Human
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

pub const DRY_RUN_BANNER: &str = "-- Dry run mode, not applying changes --";

/// Human-readable block for one file
pub fn render_human(result: &RefactorResult) -> String {
    let prefix = if result.dry_run { "DRY RUN - NOT APPLIED: " } else { "" };
    let mut lines = vec![format!("\n{}Refactored {}:", prefix, result.file_path.display())
        .green()
        .to_string()];

    for rule in &result.rules {
        lines.push(format!("  {}", rule.rule_name).yellow().to_string());
        lines.extend(rule.logs().map(|log| format!("    {}", log)));
        lines.extend(
            rule.warnings
                .iter()
                .map(|w| format!("    Warning: {}", w).red().to_string()),
        );
    }

    lines.join("\n")
}

/// Print every reportable file of a run, then the completion line for JSON
pub fn print_outcome(outcome: &RunOutcome, format: OutputFormat) -> Result<(), serde_json::Error> {
    if format == OutputFormat::Human {
        if outcome.dry_run {
            eprintln!("{}", DRY_RUN_BANNER.red());
        }
        for warning in &outcome.warnings {
            eprintln!("{}", format!("Warning: {}", warning).yellow());
        }
    }

    for result in outcome.reportable() {
        match format {
            OutputFormat::Human => println!("{}", render_human(result)),
            OutputFormat::Json => println!("{}", FileReport::from_result(result).to_json()?),
        }
    }

    if format == OutputFormat::Json {
        println!("{}", completion_line());
    }
    Ok(())
}
