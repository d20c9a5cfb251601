//! MATILDA CLI
//!
//! Thin wrapper over `matilda-core`:
//! - load and validate the YAML configuration,
//! - resolve the target database (`--config`, `--database`, or `--demo`),
//! - run discovery, write the JSON results and the Markdown report,
//! - map the outcome to the documented exit codes
//!   (0 success, 2 partial, 3 configuration error, 4 query/driver error).

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use matilda_core::{discover, report, Config, DiscoveryError, RunStatus};

mod demo;

use demo::DemoKind;

const EXIT_SUCCESS: i32 = 0;
const EXIT_PARTIAL: i32 = 2;
const EXIT_CONFIG: i32 = 3;
const EXIT_QUERY: i32 = 4;

#[derive(Parser)]
#[command(name = "matilda")]
#[command(
    author,
    version,
    about = "MATILDA: mining approximate tuple-generating dependencies in large databases"
)]
struct Cli {
    /// Path to the YAML configuration file (default: config.yaml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against a bundled demo database.
    #[arg(long, value_enum, conflicts_with = "database")]
    demo: Option<DemoKind>,

    /// Shortcut: point discovery at a single SQLite file.
    #[arg(long)]
    database: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::exit(classify(&err));
        }
    }
}

fn classify(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DiscoveryError>() {
        Some(DiscoveryError::Config(_)) => EXIT_CONFIG,
        Some(_) => EXIT_QUERY,
        None => EXIT_QUERY,
    }
}

fn run(cli: &Cli) -> Result<i32> {
    print_banner();

    let mut config = load_config(cli)?;

    if let Some(db) = &cli.database {
        config.database.url = None;
        config.database.path = None;
        config.database.name = Some(db.clone());
    }

    if let Some(kind) = cli.demo {
        // Demo databases are small and the imperfect one is deliberately
        // dirty; relax the thresholds so approximate rules surface.
        config.algorithm.nb_occurrence = 2;
        config.algorithm.max_table = 2;
        config.algorithm.max_vars = 6;
        config.algorithm.confidence_threshold = 0.9;

        let demo_path = PathBuf::from("data").join(kind.file_name());
        if demo_path.exists() {
            println!(
                "{} using existing demo database: {}",
                "ℹ".cyan(),
                demo_path.display()
            );
        } else {
            demo::create_demo_database(kind, &demo_path)
                .with_context(|| format!("creating demo database {}", demo_path.display()))?;
            println!(
                "{} demo database created: {}",
                "✓".green(),
                demo_path.display()
            );
        }
        config.database.url = None;
        config.database.path = Some(PathBuf::from("data"));
        config.database.name = Some(PathBuf::from(kind.file_name()));
    }

    let db_path = config.database_file().map_err(anyhow::Error::from)?;
    if !db_path.exists() {
        return Err(anyhow::Error::from(DiscoveryError::Config(format!(
            "database file not found: {}",
            db_path.display()
        ))));
    }

    std::fs::create_dir_all(&config.results.output_dir)?;
    std::fs::create_dir_all(&config.logging.log_dir)?;
    init_logging(&config)?;

    if config.mlflow.use_tracking {
        tracing::warn!("mlflow.use is set, but experiment tracking is not bundled in this build");
        println!(
            "{} mlflow tracking requested but not bundled; proceeding without it",
            "⚠".yellow()
        );
    }

    print_config_panel(&config, &db_path);

    println!("{}", "Starting MATILDA discovery".cyan().bold());
    let started = Instant::now();
    let outcome = discover(&db_path, &config).map_err(anyhow::Error::from)?;
    let elapsed = started.elapsed().as_secs_f64();

    let results_path = report::write_results_json(
        &config.results.output_dir,
        &db_path,
        &outcome,
        elapsed,
    )
    .map_err(anyhow::Error::from)?;
    let report_path = report::write_markdown_report(
        &config.results.output_dir,
        &db_path,
        &outcome,
        &results_path,
    )
    .map_err(anyhow::Error::from)?;

    print_summary(&outcome, &results_path, &report_path, elapsed);

    match outcome.status {
        RunStatus::Success => Ok(EXIT_SUCCESS),
        RunStatus::Partial => Ok(EXIT_PARTIAL),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path).map_err(anyhow::Error::from),
        None => {
            let default = Path::new("config.yaml");
            if default.exists() {
                Config::load(default).map_err(anyhow::Error::from)
            } else if cli.database.is_some() || cli.demo.is_some() {
                Ok(Config::default())
            } else {
                Err(anyhow::Error::from(DiscoveryError::Config(
                    "no config.yaml found; pass --config, --database, or --demo".to_string(),
                )))
            }
        }
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let log_path = config.logging.log_dir.join("matilda.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn print_banner() {
    println!();
    println!(
        "{}",
        "MATILDA — Mining Approximate Tuple-Generating Dependencies"
            .cyan()
            .bold()
    );
    println!("{}", "in Large Databases".dimmed());
    println!();
}

fn print_config_panel(config: &Config, db_path: &Path) {
    println!("{}", "Configuration".blue().bold());
    println!("  {:<22} {}", "database".cyan(), db_path.display());
    println!(
        "  {:<22} {}",
        "min occurrence".cyan(),
        config.algorithm.nb_occurrence
    );
    println!("  {:<22} {}", "max tables".cyan(), config.algorithm.max_table);
    println!("  {:<22} {}", "max variables".cyan(), config.algorithm.max_vars);
    println!(
        "  {:<22} {:.4}",
        "confidence threshold".cyan(),
        config.algorithm.confidence_threshold
    );
    println!(
        "  {:<22} {} bytes",
        "memory limit".cyan(),
        config.monitor.memory_threshold
    );
    println!("  {:<22} {} s", "timeout".cyan(), config.monitor.timeout);
    println!(
        "  {:<22} {}",
        "results dir".cyan(),
        config.results.output_dir.display()
    );
    println!();
}

fn print_summary(
    outcome: &matilda_core::DiscoveryOutcome,
    results_path: &Path,
    report_path: &Path,
    elapsed: f64,
) {
    println!();
    match outcome.status {
        RunStatus::Success => println!(
            "{} discovered {} rules in {elapsed:.2}s",
            "✓".green().bold(),
            outcome.rules.len().to_string().yellow()
        ),
        RunStatus::Partial => println!(
            "{} stopped early ({}) with {} rules after {elapsed:.2}s",
            "⚠".yellow().bold(),
            outcome
                .cancel_reason
                .map(|r| r.as_str())
                .unwrap_or("cancelled"),
            outcome.rules.len().to_string().yellow()
        ),
    }

    for (idx, rule) in outcome.rules.iter().take(5).enumerate() {
        println!(
            "  {} {} {}",
            format!("#{}", idx + 1).cyan(),
            rule.tgd_string,
            format!("(support {}, confidence {:.4})", rule.support, rule.confidence).dimmed()
        );
    }

    println!("  {} {}", "results:".dimmed(), results_path.display());
    println!("  {} {}", "report:".dimmed(), report_path.display());
}
