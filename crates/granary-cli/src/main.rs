use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use granary_core::{BuildStatus, Config, Diagnostic, Report, Severity};
use granary_design::{discover_relations, order_by_dependencies, RelationDescriptor, Selector};
use granary_load::{
    build_relations, vacuum_relations, validate_relation, BuildOptions, ValidateOptions,
};
use granary_warehouse::{ddl, RedshiftClient};

/// Granary - ETL orchestrator for a columnar SQL warehouse
#[derive(Parser)]
#[command(name = "granary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: granary.toml)
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
    /// Resolve and print the build order of the selected relations
    Resolve {
        /// Relation patterns, e.g. `www` or `www.order*` (empty: everything)
        patterns: Vec<String>,
    },

    /// Print the DDL the selected relations would be created with
    Ddl {
        /// Relation patterns (empty: everything)
        patterns: Vec<String>,
    },

    /// Check designs of derived relations against the warehouse catalog
    Validate {
        /// Relation patterns (empty: everything)
        patterns: Vec<String>,

        /// Report mismatches as warnings instead of errors
        #[arg(short, long)]
        keep_going: bool,

        /// EXPLAIN each query and log the plan
        #[arg(long)]
        explain: bool,

        /// Output file for the run report
        #[arg(short, long, default_value = "granary-report.json")]
        output: PathBuf,
    },

    /// Build and load the selected relations in dependency order
    Load(LoadArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// Relation patterns (empty: everything)
    patterns: Vec<String>,

    /// Log the planned statements without executing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Continue with later relations after a failure
    #[arg(short, long)]
    keep_going: bool,

    /// Drop each relation before creating it (forced rebuild)
    #[arg(long)]
    drop: bool,

    /// EXPLAIN each transformation query before staging it
    #[arg(long)]
    explain: bool,

    /// Validate designs against the catalog before building anything
    #[arg(long)]
    validate: bool,

    /// Output file for the run report
    #[arg(short, long, default_value = "granary-report.json")]
    output: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("granary.toml").exists() {
        Config::from_file(Path::new("granary.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Resolve { patterns } => resolve_command(&config, &patterns),
        Commands::Ddl { patterns } => ddl_command(&config, &patterns),
        Commands::Validate {
            patterns,
            keep_going,
            explain,
            output,
        } => validate_command(&config, &patterns, keep_going, explain, &output),
        Commands::Load(args) => load_command(&config, &args, cli.verbose),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The DSN comes from the environment, never from the config file, so
/// passwords stay out of version control.
fn warehouse_dsn(config: &Config) -> Result<String> {
    std::env::var(&config.warehouse.dsn_env).map_err(|_| {
        anyhow::anyhow!(
            "environment variable '{}' is not set; it must hold the warehouse DSN",
            config.warehouse.dsn_env
        )
    })
}

fn discover_and_select(config: &Config, patterns: &[String]) -> Result<Vec<RelationDescriptor>> {
    let selector = Selector::from_patterns(patterns)?;
    let relations = discover_relations(&config.design.dir)?;
    let selected: Vec<_> = relations
        .into_iter()
        .filter(|descriptor| selector.matches(&descriptor.name))
        .collect();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "no relations under '{}' match [{}]",
            config.design.dir.display(),
            selector.descriptions().join(", ")
        ));
    }
    Ok(selected)
}

/// Resolve command - print the computed build order
fn resolve_command(config: &Config, patterns: &[String]) -> Result<()> {
    let relations = discover_and_select(config, patterns)?;
    let resolution = order_by_dependencies(relations)?;

    for warning in &resolution.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning.message);
    }
    for descriptor in &resolution.relations {
        let design = descriptor.design()?;
        println!(
            "{:>4}  {:<12} {}",
            descriptor.order().unwrap_or(0),
            design.source_name.label(),
            descriptor.identifier()
        );
    }
    Ok(())
}

/// Ddl command - print creation DDL in build order
fn ddl_command(config: &Config, patterns: &[String]) -> Result<()> {
    let relations = discover_and_select(config, patterns)?;
    let resolution = order_by_dependencies(relations)?;

    for descriptor in &resolution.relations {
        let design = descriptor.design()?;
        let statement = if design.source_name.is_view() {
            ddl::build_view(design, &descriptor.name, descriptor.query()?)
        } else {
            ddl::build_table(design, &descriptor.name.to_string(), false)
        };
        println!("{statement}\n;\n");
    }
    Ok(())
}

/// Validate command - check derived designs against the live catalog
fn validate_command(
    config: &Config,
    patterns: &[String],
    keep_going: bool,
    explain: bool,
    output: &Path,
) -> Result<()> {
    let relations = discover_and_select(config, patterns)?;
    let resolution = order_by_dependencies(relations)?;

    let dsn = warehouse_dsn(config)?;
    let mut warehouse = RedshiftClient::connect("warehouse", &dsn)?;

    let options = ValidateOptions {
        keep_going,
        with_explain: explain,
    };
    let mut diagnostics = resolution.warnings.clone();
    for descriptor in &resolution.relations {
        diagnostics.extend(validate_relation(&mut warehouse, descriptor, &options)?);
    }

    for diagnostic in &diagnostics {
        print_diagnostic(diagnostic);
    }
    let errors = diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == Severity::Error)
        .count();
    let report = Report::from_run(Vec::new(), diagnostics, false);
    report.save_to_file(output)?;
    if errors > 0 {
        eprintln!("{}", format!("{errors} design error(s)").red().bold());
        std::process::exit(1);
    }
    println!("{}", "✓ designs and warehouse agree".green());
    Ok(())
}

/// Load command - the full pipeline: resolve, optionally validate, build,
/// vacuum, report
fn load_command(config: &Config, args: &LoadArgs, verbose: bool) -> Result<()> {
    let relations = discover_and_select(config, &args.patterns)?;
    let resolution = order_by_dependencies(relations)?;
    let mut diagnostics = resolution.warnings.clone();

    let dsn = warehouse_dsn(config)?;
    let mut warehouse = RedshiftClient::connect("warehouse", &dsn)?;

    if args.validate {
        let validate_options = ValidateOptions {
            keep_going: args.keep_going,
            with_explain: false,
        };
        for descriptor in &resolution.relations {
            diagnostics.extend(validate_relation(
                &mut warehouse,
                descriptor,
                &validate_options,
            )?);
        }
        let design_errors = diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Error)
            .count();
        if design_errors > 0 {
            let report = Report::from_run(Vec::new(), diagnostics, args.dry_run);
            report.save_to_file(&args.output)?;
            print_summary(&report);
            eprintln!("{}", "validation failed, nothing was built".red().bold());
            std::process::exit(1);
        }
    }

    let options = BuildOptions {
        dry_run: args.dry_run,
        keep_going: args.keep_going,
        drop_first: args.drop,
        with_explain: args.explain,
        owner: config.warehouse.owner.clone(),
        etl_group: config.warehouse.etl_group.clone(),
        reader_group: config.warehouse.reader_group.clone(),
        iam_role: config.load.iam_role.clone(),
        bucket: config.load.bucket.clone(),
        prefix: config.load.prefix.clone(),
    };
    let mut output = build_relations(&mut warehouse, &resolution.relations, &options)?;

    // The deferred VACUUMs need a connection with no transaction history;
    // in dry-run mode nothing executes, so the main connection can stand in.
    if args.dry_run {
        vacuum_relations(&mut warehouse, &mut output, true)?;
    } else if !output.vacuumable.is_empty() {
        let mut vacuum_warehouse = RedshiftClient::connect("vacuum", &dsn)?;
        if let Err(error) = vacuum_relations(&mut vacuum_warehouse, &mut output, false) {
            tracing::warn!("deferred vacuum did not finish: {error}");
        }
    }

    diagnostics.extend(output.diagnostics);
    let report = Report::from_run(output.outcomes, diagnostics, args.dry_run);
    report.save_to_file(&args.output)?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), args.output.display());
    }

    print_summary(&report);
    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    let severity = match diagnostic.severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    };
    println!("  [{}] {}: {}", severity, diagnostic.code, diagnostic.message);
    if let Some(expected) = &diagnostic.expected {
        println!("    Declared: {}", expected.join(", "));
    }
    if let Some(actual) = &diagnostic.actual {
        println!("    Observed: {}", actual.join(", "));
    }
}

/// Print run summary to stdout
fn print_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Granary Load Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    if report.dry_run {
        println!("{}", "Dry run: no statement was sent to the warehouse".yellow());
        println!();
    }

    if !report.outcomes.is_empty() {
        println!("{}", "Relations:".bold());
        for outcome in &report.outcomes {
            let status = match outcome.status {
                BuildStatus::Built => "BUILT".green().bold(),
                BuildStatus::Failed => "FAILED".red().bold(),
                BuildStatus::Skipped => "SKIPPED".yellow(),
            };
            print!("  [{}] {} ({})", status, outcome.relation, outcome.kind);
            if let Some(rows) = outcome.rows {
                print!(", {rows} rows");
            }
            println!(", {} ms", outcome.elapsed_ms);
            if let Some(error) = &outcome.error {
                println!("    {}", error.red());
            }
        }
        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  Built:    {}", format!("{}", report.summary.built).green());
    if report.summary.failed > 0 {
        println!("  Failed:   {}", format!("{}", report.summary.failed).red().bold());
    } else {
        println!("  Failed:   {}", "0".green());
    }
    println!("  Skipped:  {}", report.summary.skipped);
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No findings".green().bold());
    } else {
        println!("{}", "Findings:".bold());
        for diagnostic in &report.diagnostics {
            print_diagnostic(diagnostic);
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
