use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fusefix_core::{Config, RulesConfig};
use fusefix_dbt::{scan_duplicates, HubIndex, PackageSelection, SchemaFetcher};
use fusefix_engine::output::print_outcome;
use fusefix_engine::{OutputFormat, Pipeline, RuleSet, RunOptions};

/// fusefix - Fix dbt project deprecations ahead of the Fusion engine
#[derive(Parser)]
#[command(name = "fusefix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: <path>/fusefix.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List duplicate YAML keys in the project and its packages
    ListDuplicates {
        /// The path to the dbt project
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },

    /// Fix deprecations in YAML and SQL files
    Deprecations(DeprecationsArgs),
}

#[derive(Args)]
struct DeprecationsArgs {
    /// The path to the dbt project
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// In dry run mode, do not apply changes
    #[arg(short, long)]
    dry_run: bool,

    /// Output in JSON format
    #[arg(short, long)]
    json: bool,

    /// Exclude specific dbt project keys
    #[arg(short, long, hide = true)]
    exclude_dbt_project_keys: bool,

    /// Specific version of the JSON schema to use
    #[arg(long)]
    json_schema_version: Option<String>,

    /// Select specific paths to refactor
    #[arg(short, long)]
    select: Vec<String>,

    /// Include all packages (private or public/hub) in the refactoring
    #[arg(short, long)]
    include_packages: bool,

    /// Include only private packages (non-hub packages) in the refactoring
    #[arg(long)]
    include_private_packages: bool,

    /// Run fixes to deprecations that may require a behavior change
    #[arg(long)]
    behavior_change: bool,

    /// Run all fixes, including those that may require a behavior change
    #[arg(long)]
    all: bool,

    /// Run fixes to semantic layer
    #[arg(long, conflicts_with = "include_packages")]
    semantic_layer: bool,

    /// Disable SSL verification
    #[arg(long, hide = true)]
    disable_ssl_verification: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::ListDuplicates { path } => list_duplicates_command(&path),
        Commands::Deprecations(args) => deprecations_command(cli.config.as_deref(), args).await,
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// List-duplicates command - read-only duplicate key report
fn list_duplicates_command(path: &Path) -> Result<()> {
    println!("{}\n", format!("Identifying duplicates in {}", path.display()).green());

    let scan = scan_duplicates(path).with_context(|| format!("Failed to scan {}", path.display()))?;

    if !scan.project.is_empty() {
        println!("\n{}", "There are issues in your project YML files".bold().red());
        println!("Please remove duplicates by hand. dbt's default behavior is to keep the last occurence of a key.");
        println!("If you want to keep the same behaviour remove or comment the earlier lines for the same key.");
        println!("Once you have done all the changes in the files, run the tool again.\n");
        for duplicate in &scan.project {
            println!("{}", duplicate);
        }
    }

    if !scan.packages.is_empty() {
        println!(
            "\n{}\n",
            "Those packages might have issues. If those are not maintained by you, check if there are updates \
             available. If they are private packages, remove duplicates in their own repository and publish a new \
             version."
                .bold()
                .red()
        );
        for duplicate in &scan.packages {
            println!("{}", duplicate);
        }
    }

    if scan.is_empty() {
        println!("{}", "✓ No duplicate keys found".green());
    }

    Ok(())
}

/// Deprecations command - run the rules over a project
async fn deprecations_command(config_path: Option<&Path>, args: DeprecationsArgs) -> Result<()> {
    let mut config = load_config(config_path, &args.path)?;

    let rules = RulesConfig {
        exclude_dbt_project_keys: args.exclude_dbt_project_keys,
        select: args.select.clone(),
        include_packages: args.include_packages,
        include_private_packages: args.include_private_packages,
    }
    .merged_with(&config.rules);

    if args.semantic_layer && rules.include_packages {
        anyhow::bail!("--include-packages is not supported with --semantic-layer");
    }

    config.schema.disable_ssl_verification |= args.disable_ssl_verification;
    let version = args.json_schema_version.clone().or_else(|| config.schema.version.clone());

    let fetcher = SchemaFetcher::from_config(&config).context("Failed to set up the schema source")?;
    let specs = fetcher
        .fetch_specs(version.as_deref())
        .await
        .context("Failed to load the Fusion JSON schemas")?;
    info!("Loaded schema specs");

    let packages = PackageSelection::from_flags(rules.include_packages, rules.include_private_packages);
    let hub = match packages {
        PackageSelection::None => HubIndex::unavailable(),
        _ => HubIndex::fetch(config.schema.disable_ssl_verification).await,
    };

    let options = RunOptions::default()
        .with_dry_run(args.dry_run)
        .with_rule_set(RuleSet::from_flags(args.behavior_change, args.all))
        .with_select(rules.select)
        .with_packages(packages)
        .with_semantic_layer(args.semantic_layer)
        .with_exclude_dbt_project_keys(rules.exclude_dbt_project_keys);
    debug!("Running with {:?}", options);

    let outcome = match Pipeline::new(&args.path, &specs, options).with_hub_index(hub).run() {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e.to_string().bold().red());
            std::process::exit(1);
        }
    };

    print_outcome(&outcome, OutputFormat::from_json_flag(args.json))?;

    // Exit with error code if work remains
    if outcome.summary().has_issues() {
        std::process::exit(1);
    }

    Ok(())
}

/// Explicit `--config`, else `<path>/fusefix.toml`, else defaults
fn load_config(explicit: Option<&Path>, project_root: &Path) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default_path = project_root.join(Config::FILE_NAME);
    if default_path.exists() {
        return Config::from_file(&default_path)
            .with_context(|| format!("Failed to load config {}", default_path.display()));
    }

    debug!("No config file found, using defaults");
    Ok(Config {
        project_root: project_root.to_path_buf(),
        ..Config::default()
    })
}
