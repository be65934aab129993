//! Evaluation table loading.
//!
//! Tables are read with the `csv` crate. Rows whose values cannot be parsed
//! are skipped and counted rather than aborting the load; a missing required
//! column fails the whole file.

pub mod reader;

pub use reader::{parse_flag, parse_seed, read_table, REQUIRED_COLUMNS};

use crate::error::AggregateResult;
use crate::models::EvaluationTable;
use crate::scanner::{find_single_csv, find_single_subdir};
use std::path::Path;
use tracing::debug;

/// Load the table of a condition directory.
///
/// The directory must hold exactly one subdirectory, which in turn must hold
/// exactly one `.csv` file.
pub fn load_table(directory: &Path) -> AggregateResult<EvaluationTable> {
    let run_dir = find_single_subdir(directory)?;
    debug!("Run directory for {}: {}", directory.display(), run_dir.display());

    let csv_path = find_single_csv(&run_dir)?;
    read_table(&csv_path)
}

/// Load the single `.csv` file directly inside `directory`.
pub fn load_flat_table(directory: &Path) -> AggregateResult<EvaluationTable> {
    let csv_path = find_single_csv(directory)?;
    read_table(&csv_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggregateError;
    use std::fs;
    use tempfile::TempDir;

    const CSV: &str = "seed,coin_collected,inv_coin_collected\n0,1,0\n1,0,1\n";

    #[test]
    fn test_load_table() {
        let root = TempDir::new().unwrap();
        let run = root.path().join("train_rand_percent_0");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("metrics.csv"), CSV).unwrap();

        let table = load_table(root.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.source.unwrap().ends_with("metrics.csv"));
    }

    #[test]
    fn test_load_table_two_csv_files_is_ambiguous() {
        let root = TempDir::new().unwrap();
        let run = root.path().join("run");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("metrics.csv"), CSV).unwrap();
        fs::write(run.join("metrics_old.csv"), CSV).unwrap();

        let err = load_table(root.path()).unwrap_err();
        assert!(matches!(err, AggregateError::Ambiguous { count: 2, .. }));
    }

    #[test]
    fn test_load_table_two_subdirs_is_ambiguous() {
        let root = TempDir::new().unwrap();
        for run in ["run_a", "run_b"] {
            let dir = root.path().join(run);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("metrics.csv"), CSV).unwrap();
        }

        let err = load_table(root.path()).unwrap_err();
        assert!(matches!(err, AggregateError::Ambiguous { .. }));
    }

    #[test]
    fn test_load_table_without_csv_is_not_found() {
        let root = TempDir::new().unwrap();
        let run = root.path().join("run");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("notes.txt"), "nothing here").unwrap();

        let err = load_table(root.path()).unwrap_err();
        assert!(matches!(err, AggregateError::NotFound { .. }));
    }

    #[test]
    fn test_load_flat_table() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("metrics.csv"), CSV).unwrap();

        let table = load_flat_table(root.path()).unwrap();
        assert_eq!(table.len(), 2);
    }
}
