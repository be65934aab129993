//! Child-process runner for the environment probe.
//!
//! The probed script announces each stage on stdout (`@@stage <name>`) and
//! confirms it (`@@ok <name> [detail]`). The runner tracks those markers so
//! a failure, a timeout or an interrupt can be attributed to a stage.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Steps of the probe, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbeStage {
    Import,
    Construct,
    Observe,
    Step,
}

impl ProbeStage {
    pub const ALL: [ProbeStage; 4] = [
        ProbeStage::Import,
        ProbeStage::Construct,
        ProbeStage::Observe,
        ProbeStage::Step,
    ];

    fn from_marker(name: &str) -> Option<Self> {
        match name {
            "import" => Some(ProbeStage::Import),
            "construct" => Some(ProbeStage::Construct),
            "observe" => Some(ProbeStage::Observe),
            "step" => Some(ProbeStage::Step),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStage::Import => write!(f, "Importing the environment library"),
            ProbeStage::Construct => write!(f, "Creating the environment"),
            ProbeStage::Observe => write!(f, "Observing the environment"),
            ProbeStage::Step => write!(f, "Stepping the environment"),
        }
    }
}

/// Failure category reported by the probe.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("could not launch '{program}': {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to import the environment library: {message}")]
    ImportFailure { message: String },

    #[error("{stage} {} after {elapsed:.2}s", stall_verb(.interrupted))]
    ConstructionTimeout {
        stage: ProbeStage,
        elapsed: f64,
        interrupted: bool,
    },

    #[error("{stage} failed after {elapsed:.2}s: {message}")]
    ConstructionError {
        stage: ProbeStage,
        elapsed: f64,
        message: String,
    },

    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn stall_verb(interrupted: &bool) -> &'static str {
    if *interrupted {
        "was interrupted"
    } else {
        "timed out"
    }
}

/// Successful probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Detail printed by each completed stage, in order.
    pub completed: Vec<(ProbeStage, String)>,
    pub elapsed: f64,
}

/// Stage markers seen so far on the child's stdout.
#[derive(Debug, Default)]
pub struct StageTracker {
    pub current: Option<ProbeStage>,
    pub completed: Vec<(ProbeStage, String)>,
}

impl StageTracker {
    /// Consume one stdout line. Non-marker lines are only logged.
    pub fn observe(&mut self, line: &str) {
        if let Some(rest) = line.strip_prefix("@@stage ") {
            if let Some(stage) = ProbeStage::from_marker(rest.trim()) {
                info!("{}...", stage);
                self.current = Some(stage);
            }
        } else if let Some(rest) = line.strip_prefix("@@ok ") {
            let (name, detail) = rest.split_once(' ').unwrap_or((rest, ""));
            if let Some(stage) = ProbeStage::from_marker(name.trim()) {
                self.completed.push((stage, detail.trim().to_string()));
                if self.current == Some(stage) {
                    self.current = None;
                }
            }
        } else {
            debug!("probe: {}", line);
        }
    }

    /// Stage in progress, or the first stage never completed.
    pub fn pending_stage(&self) -> ProbeStage {
        self.current.unwrap_or_else(|| {
            ProbeStage::ALL
                .into_iter()
                .find(|s| !self.completed.iter().any(|(done, _)| done == s))
                .unwrap_or(ProbeStage::Step)
        })
    }

    pub fn is_complete(&self) -> bool {
        ProbeStage::ALL
            .iter()
            .all(|s| self.completed.iter().any(|(done, _)| done == s))
    }
}

/// Program and arguments the probe runs.
#[derive(Debug, Clone)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Run `command` with exactly `vars` as its environment.
///
/// Fails with `ConstructionTimeout` if the child outlives `timeout` or this
/// process receives Ctrl-C; the child is killed in both cases.
pub async fn run_probe_command(
    command: &ProbeCommand,
    vars: &BTreeMap<OsString, OsString>,
    timeout: Duration,
) -> Result<ProbeReport, ProbeFailure> {
    let start = Instant::now();

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .env_clear()
        .envs(vars)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProbeFailure::LaunchFailure {
            program: command.program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdout unavailable")
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stderr unavailable")
    })?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let mut tracker = StageTracker::default();
    let run = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            tracker.observe(&line);
        }
        child.wait().await
    };

    let outcome = tokio::select! {
        status = tokio::time::timeout(timeout, run) => status.map_err(|_| false),
        _ = tokio::signal::ctrl_c() => Err(true),
    };

    let elapsed = start.elapsed().as_secs_f64();

    let status = match outcome {
        Ok(status) => status?,
        Err(interrupted) => {
            warn!("Probe child did not finish; killing it");
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(ProbeFailure::ConstructionTimeout {
                stage: tracker.pending_stage(),
                elapsed,
                interrupted,
            });
        }
    };

    let stderr_text = stderr_task.await.unwrap_or_default();
    classify(tracker, status.success(), status.code(), &stderr_text, elapsed)
}

/// Turn a finished child into a report or a failure category.
pub fn classify(
    tracker: StageTracker,
    success: bool,
    code: Option<i32>,
    stderr: &str,
    elapsed: f64,
) -> Result<ProbeReport, ProbeFailure> {
    if success && tracker.is_complete() {
        return Ok(ProbeReport {
            completed: tracker.completed,
            elapsed,
        });
    }

    let message = last_line(stderr).unwrap_or_else(|| match code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    });

    match tracker.pending_stage() {
        ProbeStage::Import => Err(ProbeFailure::ImportFailure { message }),
        stage => Err(ProbeFailure::ConstructionError {
            stage,
            elapsed,
            message,
        }),
    }
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}
