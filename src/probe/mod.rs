//! Environment probe.
//!
//! Checks that the CoinRun environment can be imported, constructed,
//! observed and stepped in a single-threaded child interpreter.

pub mod environment;
pub mod runner;

pub use environment::{build_environment, probe_script, ProbeEnvironment};
pub use runner::{ProbeFailure, ProbeReport};

use crate::config::ProbeConfig;
use runner::{run_probe_command, ProbeCommand};
use std::time::Duration;

/// Run the probe script with `config.python` inside `env`.
pub async fn run_probe(
    config: &ProbeConfig,
    env: &ProbeEnvironment,
) -> Result<ProbeReport, ProbeFailure> {
    let command = ProbeCommand {
        program: config.python.clone(),
        args: vec!["-u".to_string(), "-c".to_string(), probe_script(config)],
    };

    run_probe_command(
        &command,
        &env.vars,
        Duration::from_secs(config.timeout_seconds),
    )
    .await
}
