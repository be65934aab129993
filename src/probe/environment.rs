//! Environment handed to the probed interpreter.
//!
//! Instead of mutating this process, the probe builds an explicit variable
//! map and a script preamble, and passes both to the child process.

use crate::config::ProbeConfig;
use std::collections::BTreeMap;
use std::ffi::OsString;

/// Variables for the probed process, plus what was changed to get them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeEnvironment {
    pub vars: BTreeMap<OsString, OsString>,
    /// Thread-count variables pinned to `1`.
    pub pinned: Vec<String>,
    /// Variables dropped because of a distributed-computing prefix.
    pub removed: Vec<String>,
}

/// Derive the probe environment from `current` (usually `std::env::vars_os()`).
///
/// Names and values need not be valid Unicode; prefixes are matched against
/// the lossy form of the name.
pub fn build_environment<I>(current: I, config: &ProbeConfig) -> ProbeEnvironment
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut vars = BTreeMap::new();
    let mut removed = Vec::new();

    for (key, value) in current {
        let name = key.to_string_lossy();
        if config
            .strip_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            removed.push(name.into_owned());
        } else {
            vars.insert(key, value);
        }
    }

    for var in &config.thread_vars {
        vars.insert(OsString::from(var), OsString::from("1"));
    }

    removed.sort();

    ProbeEnvironment {
        vars,
        pinned: config.thread_vars.clone(),
        removed,
    }
}

const PROBE_SCRIPT: &str = r#"import sys
import time


def stage(name):
    print("@@stage " + name, flush=True)


def ok(name, detail=""):
    print("@@ok " + name + " " + detail, flush=True)


def fail(code):
    exc = sys.exc_info()[1]
    print(type(exc).__name__ + ": " + str(exc), file=sys.stderr, flush=True)
    sys.exit(code)


class _Blocked:
    def __getattr__(self, attr):
        raise ImportError("module is blocked for this probe")


for _name in __BLOCKED_MODULES__:
    sys.modules[_name] = _Blocked()

stage("import")
try:
    from procgen import ProcgenGym3Env
except Exception:
    fail(3)
ok("import")

stage("construct")
_start = time.time()
try:
    env = ProcgenGym3Env(
        num=1,
        env_name=__ENV_NAME__,
        num_levels=__NUM_LEVELS__,
        start_level=__START_LEVEL__,
        distribution_mode=__DISTRIBUTION_MODE__,
        num_threads=__NUM_THREADS__,
        render_mode=None,
        rand_seed=__RAND_SEED__,
    )
except Exception:
    fail(4)
ok("construct", "%.2f" % (time.time() - _start))

stage("observe")
try:
    _reward, _obs, _first = env.observe()
except Exception:
    fail(4)
ok("observe", str(_obs["rgb"].shape))

stage("step")
try:
    import numpy as np

    env.act(np.array([0]))
    env.observe()
except Exception:
    fail(4)
ok("step")
"#;

/// Python source run by the probe, with `config` substituted in.
pub fn probe_script(config: &ProbeConfig) -> String {
    PROBE_SCRIPT
        .replace("__BLOCKED_MODULES__", &python_literal(&config.blocked_modules))
        .replace("__ENV_NAME__", &python_literal(&config.env_name))
        .replace("__DISTRIBUTION_MODE__", &python_literal(&config.distribution_mode))
        .replace("__NUM_LEVELS__", &config.num_levels.to_string())
        .replace("__START_LEVEL__", &config.start_level.to_string())
        .replace("__NUM_THREADS__", &config.num_threads.to_string())
        .replace("__RAND_SEED__", &config.rand_seed.to_string())
}

/// JSON strings and string arrays are valid Python literals.
fn python_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "None".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_pair(key: &str, value: &str) -> (OsString, OsString) {
        (OsString::from(key), OsString::from(value))
    }

    fn current() -> Vec<(OsString, OsString)> {
        vec![
            os_pair("PATH", "/usr/bin"),
            os_pair("OMP_NUM_THREADS", "16"),
            os_pair("OMPI_COMM_WORLD_SIZE", "4"),
            os_pair("PMI_RANK", "0"),
            os_pair("SLURM_MPI_TYPE", "pmix"),
            os_pair("SLURM_JOB_ID", "1234"),
            os_pair("I_MPI_PIN", "off"),
        ]
    }

    fn var<'a>(env: &'a ProbeEnvironment, key: &str) -> Option<&'a str> {
        env.vars.get(&OsString::from(key)).and_then(|v| v.to_str())
    }

    #[test]
    fn test_build_environment_strips_and_pins() {
        let env = build_environment(current(), &ProbeConfig::default());

        assert_eq!(
            env.removed,
            vec!["I_MPI_PIN", "OMPI_COMM_WORLD_SIZE", "PMI_RANK", "SLURM_MPI_TYPE"]
        );
        assert_eq!(var(&env, "OMP_NUM_THREADS"), Some("1"));
        assert_eq!(var(&env, "OPENBLAS_NUM_THREADS"), Some("1"));
        assert_eq!(var(&env, "SLURM_JOB_ID"), Some("1234"));
        assert_eq!(var(&env, "PATH"), Some("/usr/bin"));
        assert!(var(&env, "PMI_RANK").is_none());
        assert_eq!(env.pinned.len(), 4);
    }

    #[test]
    fn test_build_environment_nothing_to_remove() {
        let env = build_environment(vec![os_pair("HOME", "/root")], &ProbeConfig::default());
        assert!(env.removed.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_build_environment_keeps_non_unicode_values() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(vec![b'/', b'd', 0xff, b'a']);
        let mut vars = current();
        vars.push((OsString::from("DATA_DIR"), raw.clone()));
        vars.push((OsString::from_vec(b"MPI_\xfe".to_vec()), OsString::from("x")));

        let env = build_environment(vars, &ProbeConfig::default());
        assert_eq!(env.vars.get(&OsString::from("DATA_DIR")), Some(&raw));
        assert!(env.removed.iter().any(|name| name.starts_with("MPI_")));
    }

    #[test]
    fn test_probe_script_substitution() {
        let config = ProbeConfig {
            env_name: "maze".to_string(),
            rand_seed: 7,
            ..ProbeConfig::default()
        };
        let script = probe_script(&config);

        assert!(script.contains(r#"for _name in ["mpi4py","mpi4py.MPI"]:"#));
        assert!(script.contains(r#"env_name="maze","#));
        assert!(script.contains(r#"distribution_mode="easy","#));
        assert!(script.contains("rand_seed=7,"));
        assert!(script.contains("num_threads=0,"));
        assert!(!script.contains("__RAND_SEED__"));
        assert!(!script.contains("__BLOCKED_MODULES__"));
    }
}
