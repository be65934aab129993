//! Error taxonomy for loading and aggregating evaluation tables.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving result directories and loading tables.
///
/// Every variant is raised immediately and propagated to the caller; the
/// pipeline never retries or recovers partially.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Directory name lacks a parseable trailing percentage.
    #[error("cannot resolve randomization percentage from '{name}': {reason}")]
    Format { name: String, reason: String },

    /// Expected file or subdirectory is absent.
    #[error("no {what} found in {}", path.display())]
    NotFound { path: PathBuf, what: &'static str },

    /// More than one candidate where exactly one is required.
    #[error("expected exactly 1 {what} in {}, found {count}: {candidates:?}", path.display())]
    Ambiguous {
        path: PathBuf,
        what: &'static str,
        count: usize,
        candidates: Vec<String>,
    },

    /// CSV file lacks a required column.
    #[error("{} is missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    /// Mean requested over a table with no rows.
    #[error("cannot average '{column}' over an empty table for condition {condition}")]
    EmptyTable { condition: u32, column: &'static str },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub type AggregateResult<T> = std::result::Result<T, AggregateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_lists_candidates() {
        let err = AggregateError::Ambiguous {
            path: PathBuf::from("results/test_rand_percent_0"),
            what: "subdirectory",
            count: 2,
            candidates: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("exactly 1 subdirectory"));
        assert!(msg.contains("found 2"));
        assert!(msg.contains("\"a\""));
    }

    #[test]
    fn test_format_message() {
        let err = AggregateError::Format {
            name: "baseline".to_string(),
            reason: "no trailing integer".to_string(),
        };
        assert!(err.to_string().contains("'baseline'"));
    }
}
