//! Results directory scanner.
//!
//! This module resolves the results layout
//! `results_root/test_rand_percent_<P>/<single-subdir>/<single-file>.csv`
//! and enforces that every level holds exactly one candidate.

use crate::error::{AggregateError, AggregateResult};
use crate::models::RandomizationCondition;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Prefix of the per-test-condition directories under the results root.
pub const TEST_CONDITION_PREFIX: &str = "test_rand";

/// Prefix of the per-train-condition run directories inside a test condition.
pub const TRAIN_CONDITION_PREFIX: &str = "train_rand";

/// Extension of evaluation tables.
pub const TABLE_EXTENSION: &str = "csv";

/// Extract the trailing integer randomization percentage from a directory name.
pub fn resolve_condition(directory_name: &str) -> AggregateResult<RandomizationCondition> {
    let trimmed = directory_name.trim_end_matches(['/', '\\']);
    let digits_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);

    let Some(start) = digits_start else {
        return Err(AggregateError::Format {
            name: directory_name.to_string(),
            reason: "no trailing integer".to_string(),
        });
    };

    let value: u64 = trimmed[start..]
        .parse()
        .map_err(|e| AggregateError::Format {
            name: directory_name.to_string(),
            reason: format!("{}", e),
        })?;

    if value > 100 {
        return Err(AggregateError::Format {
            name: directory_name.to_string(),
            reason: format!("{} is not a percentage", value),
        });
    }

    Ok(value as RandomizationCondition)
}

/// Resolve the condition from the last component of a path.
pub fn resolve_path_condition(path: &Path) -> AggregateResult<RandomizationCondition> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    resolve_condition(&name)
}

/// List every test-condition directory under the results root, sorted by condition.
pub fn discover_conditions(
    results_root: &Path,
) -> AggregateResult<Vec<(RandomizationCondition, PathBuf)>> {
    let mut conditions = Vec::new();

    for dir in child_dirs(results_root)? {
        let name = file_name(&dir);
        if !name.starts_with(TEST_CONDITION_PREFIX) {
            debug!("Skipping non-condition directory {}", dir.display());
            continue;
        }
        conditions.push((resolve_condition(&name)?, dir));
    }

    conditions.sort_by_key(|(condition, _)| *condition);

    if let Some(pair) = conditions.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(AggregateError::Ambiguous {
            path: results_root.to_path_buf(),
            what: "directory for condition",
            count: 2,
            candidates: vec![file_name(&pair[0].1), file_name(&pair[1].1)],
        });
    }

    Ok(conditions)
}

/// Locate the single nested subdirectory of `dir`.
pub fn find_single_subdir(dir: &Path) -> AggregateResult<PathBuf> {
    exactly_one(dir, child_dirs(dir)?, "subdirectory")
}

/// Locate the single `.csv` file directly inside `dir`.
pub fn find_single_csv(dir: &Path) -> AggregateResult<PathBuf> {
    let csv_files: Vec<PathBuf> = child_files(dir)?
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(TABLE_EXTENSION))
                .unwrap_or(false)
        })
        .collect();

    exactly_one(dir, csv_files, ".csv file")
}

/// Immediate child directories, sorted by name. Hidden entries are skipped.
pub fn child_dirs(dir: &Path) -> AggregateResult<Vec<PathBuf>> {
    children(dir, |entry| entry.file_type().is_dir())
}

/// Immediate child files, sorted by name. Hidden entries are skipped.
pub fn child_files(dir: &Path) -> AggregateResult<Vec<PathBuf>> {
    children(dir, |entry| entry.file_type().is_file())
}

fn children<F>(dir: &Path, keep: F) -> AggregateResult<Vec<PathBuf>>
where
    F: Fn(&walkdir::DirEntry) -> bool,
{
    if !dir.is_dir() {
        return Err(AggregateError::NotFound {
            path: dir.to_path_buf(),
            what: "directory",
        });
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| AggregateError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;

        if is_hidden(entry.file_name().to_string_lossy().as_ref()) {
            continue;
        }

        if keep(&entry) {
            entries.push(entry.into_path());
        }
    }

    Ok(entries)
}

fn exactly_one(dir: &Path, mut candidates: Vec<PathBuf>, what: &'static str) -> AggregateResult<PathBuf> {
    match candidates.len() {
        0 => Err(AggregateError::NotFound {
            path: dir.to_path_buf(),
            what,
        }),
        1 => Ok(candidates.remove(0)),
        count => Err(AggregateError::Ambiguous {
            path: dir.to_path_buf(),
            what,
            count,
            candidates: candidates.iter().map(|p| file_name(p)).collect(),
        }),
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Last path component as a string, empty when there is none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_condition() {
        assert_eq!(resolve_condition("test_rand_percent_0").unwrap(), 0);
        assert_eq!(resolve_condition("test_rand_percent_5").unwrap(), 5);
        assert_eq!(resolve_condition("test_rand_percent_100").unwrap(), 100);
        assert_eq!(resolve_condition("train_rand_percent_50/").unwrap(), 50);
    }

    #[test]
    fn test_resolve_condition_without_suffix() {
        let err = resolve_condition("vanilla").unwrap_err();
        assert!(matches!(err, AggregateError::Format { .. }));
    }

    #[test]
    fn test_resolve_condition_out_of_range() {
        let err = resolve_condition("test_rand_percent_250").unwrap_err();
        assert!(matches!(err, AggregateError::Format { .. }));
    }

    #[test]
    fn test_discover_conditions_sorted() {
        let root = TempDir::new().unwrap();
        for name in ["test_rand_percent_100", "test_rand_percent_0", "test_rand_percent_50"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::create_dir(root.path().join("logs")).unwrap();
        fs::write(root.path().join("test_rand_notes.txt"), "x").unwrap();

        let conditions = discover_conditions(root.path()).unwrap();
        let keys: Vec<_> = conditions.iter().map(|(c, _)| *c).collect();
        assert_eq!(keys, vec![0, 50, 100]);
        assert!(conditions[1].1.ends_with("test_rand_percent_50"));
    }

    #[test]
    fn test_discover_conditions_duplicate() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("test_rand_percent_50")).unwrap();
        fs::create_dir(root.path().join("test_rand_pct_50")).unwrap();

        let err = discover_conditions(root.path()).unwrap_err();
        assert!(matches!(err, AggregateError::Ambiguous { .. }));
    }

    #[test]
    fn test_find_single_subdir() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            find_single_subdir(root.path()).unwrap_err(),
            AggregateError::NotFound { .. }
        ));

        fs::create_dir(root.path().join("run_a")).unwrap();
        fs::create_dir(root.path().join(".cache")).unwrap();
        assert!(find_single_subdir(root.path()).unwrap().ends_with("run_a"));

        fs::create_dir(root.path().join("run_b")).unwrap();
        match find_single_subdir(root.path()).unwrap_err() {
            AggregateError::Ambiguous { count, candidates, .. } => {
                assert_eq!(count, 2);
                assert_eq!(candidates, vec!["run_a", "run_b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_find_single_csv_ignores_other_files() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("config.json"), "{}").unwrap();
        assert!(matches!(
            find_single_csv(root.path()).unwrap_err(),
            AggregateError::NotFound { .. }
        ));

        fs::write(root.path().join("metrics.csv"), "seed\n").unwrap();
        assert!(find_single_csv(root.path()).unwrap().ends_with("metrics.csv"));
    }

    #[test]
    fn test_missing_directory() {
        let root = TempDir::new().unwrap();
        let err = child_dirs(&root.path().join("absent")).unwrap_err();
        assert!(matches!(err, AggregateError::NotFound { what: "directory", .. }));
    }
}
