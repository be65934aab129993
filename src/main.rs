//! coinrun-figures - CoinRun objective-robustness figure builder
//!
//! A CLI tool that aggregates per-seed CoinRun evaluation results into the
//! robustness-failure frequency figure, and probes whether the environment
//! can be constructed on the current node.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing results, malformed layout, probe failure, etc.)

mod analysis;
mod cli;
mod config;
mod error;
mod figure;
mod loader;
mod models;
mod probe;
mod report;
mod scanner;

use analysis::ResultsLayout;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Command, PlotArgs, ProbeArgs};
use config::{Config, CONFIG_FILE_NAME};
use models::{Report, ReportMetadata};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("coinrun-figures v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let outcome = match args.command {
        Some(Command::Plot(ref plot)) => run_plot(config, plot),
        Some(Command::Probe(ref probe)) => run_probe(config, probe).await,
        None => Ok(()),
    };

    if let Err(e) = outcome {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .coinrun-figures.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the results layout, seed filter, figure and probe.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Aggregate the results directory and render the figure.
fn run_plot(mut config: Config, args: &PlotArgs) -> Result<()> {
    let start_time = Instant::now();
    config.merge_plot_args(args);

    let output = config.general.output.clone();
    cli::validate_figure_path(&output).map_err(anyhow::Error::msg)?;

    let layout = ResultsLayout {
        root: config.general.results_dir.clone(),
        vanilla_resdir: config.filter.vanilla_resdir.clone(),
        test_rp100_resdir: config.filter.test_rp100_resdir.clone(),
    };

    // Step 1: Aggregate
    println!("📂 Aggregating results in {}", layout.root.display());
    println!("   Baseline: {}", layout.baseline_dir().display());
    println!("   Fixed 100% test: {}", layout.test_rp100_dir().display());
    println!("   Max collect frequency: {}", config.filter.max_collect_freq);

    let aggregation = analysis::build_figure_data(&layout, config.filter.max_collect_freq)
        .with_context(|| format!("Failed to aggregate {}", layout.root.display()))?;

    debug!(
        "Good seeds: {:?}",
        aggregation.good_seeds.iter().collect::<Vec<_>>()
    );
    let skipped: usize = aggregation.tables.iter().map(|t| t.skipped_rows).sum();
    if skipped > 0 {
        warn!("{} malformed rows were skipped across all tables", skipped);
    }

    // Step 2: Render
    println!("\n📈 Rendering figure...");
    figure::render_figure(&output, &aggregation.figure, &config.figure)?;

    let duration = start_time.elapsed().as_secs_f64();
    let figure = &aggregation.figure;

    // Step 3: Optional summary
    if let Some(ref summary_path) = args.summary {
        let report = Report {
            metadata: ReportMetadata {
                results_dir: layout.root.clone(),
                generated_at: Utc::now(),
                figure_path: output.clone(),
                duration_seconds: duration,
            },
            figure: figure.clone(),
            tables: aggregation.tables.clone(),
        };
        report::write_report(&report, args.format, summary_path)?;
        println!("   Summary saved to: {}", summary_path.display());
    }

    // Print summary
    println!("\n📊 Aggregation Summary:");
    println!("   Good seeds: {}", figure.good_seed_count);
    println!(
        "   Maximum possible OR frequency: {:.2}%",
        figure.baseline_reference * 100.0
    );
    println!("   IID sweep points: {}", figure.iid_failure.len());
    println!("   Objective sweep points: {}", figure.objective_failure.len());
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Figure saved to: {}", output.display());

    Ok(())
}

/// Construct the environment once in an isolated child interpreter.
async fn run_probe(mut config: Config, args: &ProbeArgs) -> Result<()> {
    config.merge_probe_args(args);
    let probe_config = &config.probe;

    // Step 1: Isolate
    println!("🧪 Preparing probe environment...");
    let env = probe::build_environment(std::env::vars_os(), probe_config);
    println!("   Pinned to 1: {}", env.pinned.join(", "));
    if env.removed.is_empty() {
        println!("   Removed: none");
    } else {
        println!("   Removed: {}", env.removed.join(", "));
    }
    println!("   Blocked modules: {}", probe_config.blocked_modules.join(", "));
    println!("   Python: {}", probe_config.python);
    println!("   Timeout: {}s", probe_config.timeout_seconds);

    // Step 2: Run
    println!(
        "\n🔬 Constructing '{}' ({} mode, {} level(s) from {})...",
        probe_config.env_name,
        probe_config.distribution_mode,
        probe_config.num_levels,
        probe_config.start_level
    );

    match probe::run_probe(probe_config, &env).await {
        Ok(report) => {
            for (stage, detail) in &report.completed {
                if detail.is_empty() {
                    println!("   ✓ {}", stage);
                } else {
                    println!("   ✓ {} ({})", stage, detail);
                }
            }
            println!("\n✅ Probe complete in {:.1}s.", report.elapsed);
            Ok(())
        }
        Err(failure) => {
            if let probe::ProbeFailure::ConstructionTimeout { .. } = failure {
                eprintln!("\n⏳ The environment hung; the child process was killed.");
            }
            Err(failure).context("Environment probe failed")
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
