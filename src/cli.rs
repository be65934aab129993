//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// coinrun-figures - CoinRun objective-robustness figure builder
///
/// Aggregates per-seed evaluation CSVs from the CoinRun randomization sweep
/// and renders the robustness-failure frequency figure.
///
/// Examples:
///   coinrun-figures plot
///   coinrun-figures plot --results-dir runs/results --output fig2.png
///   coinrun-figures plot --summary fig2.json --format json
///   coinrun-figures probe --python ./venv/bin/python --timeout 60
///   coinrun-figures --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .coinrun-figures.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .coinrun-figures.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate evaluation CSVs and render the figure
    Plot(PlotArgs),
    /// Check that the CoinRun environment can be constructed on this node
    Probe(ProbeArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct PlotArgs {
    /// Results root holding the test_rand_percent_<P> directories
    #[arg(long, value_name = "DIR", env = "COINRUN_RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Baseline (unrandomized) results, relative to the results root
    #[arg(long, value_name = "PATH", alias = "vanilla_resdir")]
    pub vanilla_resdir: Option<PathBuf>,

    /// Results at 100% test randomization, relative to the results root
    #[arg(long, value_name = "PATH", alias = "test_rp100_resdir")]
    pub test_rp100_resdir: Option<PathBuf>,

    /// Output image path (.svg or .png)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Seeds whose baseline invisible-coin frequency is at or above this are dropped
    #[arg(long, value_name = "FREQ")]
    pub max_collect_freq: Option<f64>,

    /// Also write a summary report of the aggregated series
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Summary report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProbeArgs {
    /// Python interpreter with the environment library installed
    #[arg(long, value_name = "BIN", env = "COINRUN_PYTHON")]
    pub python: Option<String>,

    /// Seconds to wait before declaring construction hung
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Environment name to construct
    #[arg(long, value_name = "NAME")]
    pub env_name: Option<String>,
}

/// Output format for the summary report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Image formats the figure renderer can write.
pub const FIGURE_EXTENSIONS: [&str; 2] = ["svg", "png"];

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            None => Err("A subcommand is required (plot or probe)".to_string()),
            Some(Command::Plot(plot)) => plot.validate(),
            Some(Command::Probe(probe)) => probe.validate(),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl PlotArgs {
    fn validate(&self) -> Result<(), String> {
        if let Some(freq) = self.max_collect_freq {
            if !(freq > 0.0 && freq <= 1.0) {
                return Err("Max collect frequency must be in (0.0, 1.0]".to_string());
            }
        }

        if let Some(ref output) = self.output {
            validate_figure_path(output)?;
        }

        // Validate results directory if provided
        if let Some(ref dir) = self.results_dir {
            if !dir.is_dir() {
                return Err(format!(
                    "Results directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }
}

impl ProbeArgs {
    fn validate(&self) -> Result<(), String> {
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref python) = self.python {
            if python.trim().is_empty() {
                return Err("Python interpreter must not be empty".to_string());
            }
        }

        Ok(())
    }
}

/// Check that a figure path ends in a supported image extension.
pub fn validate_figure_path(path: &std::path::Path) -> Result<(), String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if FIGURE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(format!(
            "Unsupported figure format '{}' for {} (expected one of: {})",
            ext,
            path.display(),
            FIGURE_EXTENSIONS.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
            command: Some(command),
        }
    }

    #[test]
    fn test_parse_plot_defaults() {
        let args = Args::try_parse_from(["coinrun-figures", "plot"]).unwrap();
        match args.command {
            Some(Command::Plot(plot)) => {
                assert_eq!(plot.format, OutputFormat::Markdown);
                assert!(plot.output.is_none());
                assert!(plot.summary.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_legacy_flag_names() {
        let args = Args::try_parse_from([
            "coinrun-figures",
            "plot",
            "--vanilla_resdir",
            "test_rand_percent_0/train_rand_percent_0/",
            "--test_rp100_resdir",
            "test_rand_percent_100",
        ])
        .unwrap();

        let Some(Command::Plot(plot)) = args.command else {
            panic!("expected plot command");
        };
        assert_eq!(
            plot.vanilla_resdir,
            Some(PathBuf::from("test_rand_percent_0/train_rand_percent_0/"))
        );
        assert_eq!(plot.test_rp100_resdir, Some(PathBuf::from("test_rand_percent_100")));
    }

    #[test]
    fn test_validation_requires_command() {
        let mut args = make_args(Command::Plot(PlotArgs::default()));
        args.command = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::Plot(PlotArgs::default()));
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_collect_freq_range() {
        let plot = PlotArgs {
            max_collect_freq: Some(0.0),
            ..PlotArgs::default()
        };
        assert!(make_args(Command::Plot(plot)).validate().is_err());

        let plot = PlotArgs {
            max_collect_freq: Some(0.1),
            ..PlotArgs::default()
        };
        assert!(make_args(Command::Plot(plot)).validate().is_ok());
    }

    #[test]
    fn test_validation_figure_extension() {
        assert!(validate_figure_path(std::path::Path::new("fig.svg")).is_ok());
        assert!(validate_figure_path(std::path::Path::new("fig.PNG")).is_ok());
        assert!(validate_figure_path(std::path::Path::new("coinrun_freq.pdf")).is_err());
        assert!(validate_figure_path(std::path::Path::new("figure")).is_err());
    }

    #[test]
    fn test_validation_probe_timeout() {
        let probe = ProbeArgs {
            timeout: Some(0),
            ..ProbeArgs::default()
        };
        assert!(make_args(Command::Probe(probe)).validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::Probe(ProbeArgs::default()));
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
