//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.coinrun-figures.toml` files.

use crate::analysis::aggregator::DEFAULT_MAX_COLLECT_FREQ;
use crate::cli::{PlotArgs, ProbeArgs};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".coinrun-figures.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Seed filter and results layout settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Figure settings.
    #[serde(default)]
    pub figure: FigureConfig,

    /// Environment probe settings.
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Results root holding the `test_rand_percent_<P>` directories.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Default figure output path.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            output: default_output(),
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("experiments/results")
}

fn default_output() -> PathBuf {
    PathBuf::from("coinrun_freq.svg")
}

/// Good-seed filter and results layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Seeds whose baseline invisible-coin frequency reaches this are dropped.
    #[serde(default = "default_max_collect_freq")]
    pub max_collect_freq: f64,

    /// Baseline results, relative to the results root.
    #[serde(default = "default_vanilla_resdir")]
    pub vanilla_resdir: PathBuf,

    /// Results at 100% test randomization, relative to the results root.
    #[serde(default = "default_test_rp100_resdir")]
    pub test_rp100_resdir: PathBuf,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_collect_freq: default_max_collect_freq(),
            vanilla_resdir: default_vanilla_resdir(),
            test_rp100_resdir: default_test_rp100_resdir(),
        }
    }
}

fn default_max_collect_freq() -> f64 {
    DEFAULT_MAX_COLLECT_FREQ
}

fn default_vanilla_resdir() -> PathBuf {
    PathBuf::from("test_rand_percent_0")
}

fn default_test_rp100_resdir() -> PathBuf {
    PathBuf::from("test_rand_percent_100")
}

/// Figure rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureConfig {
    /// Width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Optional caption drawn above the chart.
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default = "default_x_label")]
    pub x_label: String,

    #[serde(default = "default_y_label")]
    pub y_label: String,
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: None,
            x_label: default_x_label(),
            y_label: default_y_label(),
        }
    }
}

// 6 x 2.5 inches at 150 dpi
fn default_width() -> u32 {
    900
}

fn default_height() -> u32 {
    375
}

fn default_x_label() -> String {
    "Probability (%) of a level with randomized coin.".to_string()
}

fn default_y_label() -> String {
    "Frequency (%)".to_string()
}

/// Environment probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Python interpreter used to import the environment library.
    #[serde(default = "default_python")]
    pub python: String,

    /// Seconds before construction is declared hung.
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_env_name")]
    pub env_name: String,

    #[serde(default = "default_distribution_mode")]
    pub distribution_mode: String,

    #[serde(default = "default_num_levels")]
    pub num_levels: u32,

    #[serde(default)]
    pub start_level: u32,

    /// Worker threads inside the environment library (0 = none).
    #[serde(default)]
    pub num_threads: u32,

    #[serde(default = "default_rand_seed")]
    pub rand_seed: u64,

    /// Variables pinned to `1` in the probed process.
    #[serde(default = "default_thread_vars")]
    pub thread_vars: Vec<String>,

    /// Variable name prefixes removed from the probed process.
    #[serde(default = "default_strip_prefixes")]
    pub strip_prefixes: Vec<String>,

    /// Python modules made unimportable in the probed process.
    #[serde(default = "default_blocked_modules")]
    pub blocked_modules: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_seconds: default_probe_timeout(),
            env_name: default_env_name(),
            distribution_mode: default_distribution_mode(),
            num_levels: default_num_levels(),
            start_level: 0,
            num_threads: 0,
            rand_seed: default_rand_seed(),
            thread_vars: default_thread_vars(),
            strip_prefixes: default_strip_prefixes(),
            blocked_modules: default_blocked_modules(),
        }
    }
}

fn default_python() -> String {
    "python".to_string()
}

fn default_probe_timeout() -> u64 {
    120
}

fn default_env_name() -> String {
    "coinrun".to_string()
}

fn default_distribution_mode() -> String {
    "easy".to_string()
}

fn default_num_levels() -> u32 {
    1
}

fn default_rand_seed() -> u64 {
    12345
}

fn default_thread_vars() -> Vec<String> {
    vec![
        "OMP_NUM_THREADS",
        "MKL_NUM_THREADS",
        "NUMEXPR_NUM_THREADS",
        "OPENBLAS_NUM_THREADS",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_strip_prefixes() -> Vec<String> {
    vec!["OMPI_", "PMI_", "MPI_", "SLURM_MPI", "I_MPI_"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_blocked_modules() -> Vec<String> {
    vec!["mpi4py", "mpi4py.MPI"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge plot arguments into this configuration.
    ///
    /// CLI arguments take precedence over config file settings, but only when
    /// they were given explicitly.
    pub fn merge_plot_args(&mut self, args: &PlotArgs) {
        if let Some(ref dir) = args.results_dir {
            self.general.results_dir = dir.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.clone();
        }
        if let Some(ref vanilla) = args.vanilla_resdir {
            self.filter.vanilla_resdir = vanilla.clone();
        }
        if let Some(ref rp100) = args.test_rp100_resdir {
            self.filter.test_rp100_resdir = rp100.clone();
        }
        if let Some(freq) = args.max_collect_freq {
            self.filter.max_collect_freq = freq;
        }
    }

    /// Merge probe arguments into this configuration.
    pub fn merge_probe_args(&mut self, args: &ProbeArgs) {
        if let Some(ref python) = args.python {
            self.probe.python = python.clone();
        }
        if let Some(timeout) = args.timeout {
            self.probe.timeout_seconds = timeout;
        }
        if let Some(ref env_name) = args.env_name {
            self.probe.env_name = env_name.clone();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
