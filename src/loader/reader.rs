//! CSV reader for evaluation tables.

use crate::error::{AggregateError, AggregateResult};
use crate::models::{EvaluationRecord, EvaluationTable};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::{debug, warn};

/// Columns every evaluation table must carry. Extra columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 3] = ["seed", "coin_collected", "inv_coin_collected"];

struct ColumnIndex {
    seed: usize,
    coin_collected: usize,
    inv_coin_collected: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord, path: &Path) -> AggregateResult<Self> {
        let find = |column: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| AggregateError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                })
        };

        Ok(Self {
            seed: find(REQUIRED_COLUMNS[0])?,
            coin_collected: find(REQUIRED_COLUMNS[1])?,
            inv_coin_collected: find(REQUIRED_COLUMNS[2])?,
        })
    }

    fn parse(&self, row: &StringRecord) -> Option<EvaluationRecord> {
        Some(EvaluationRecord {
            seed: parse_seed(row.get(self.seed)?)?,
            coin_collected: parse_flag(row.get(self.coin_collected)?)?,
            inv_coin_collected: parse_flag(row.get(self.inv_coin_collected)?)?,
        })
    }
}

/// Read an evaluation table from a CSV file.
pub fn read_table(path: &Path) -> AggregateResult<EvaluationTable> {
    let csv_err = |source: csv::Error| AggregateError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let columns = ColumnIndex::from_headers(&headers, path)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, row) in reader.records().enumerate() {
        // Data rows start on line 2.
        let line = index + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(csv_err(e)),
            Err(e) => {
                warn!("Skipping unreadable row {} in {}: {}", line, path.display(), e);
                skipped += 1;
                continue;
            }
        };

        match columns.parse(&row) {
            Some(record) => records.push(record),
            None => {
                warn!("Skipping malformed row {} in {}: {:?}", line, path.display(), row);
                skipped += 1;
            }
        }
    }

    debug!(
        "Loaded {} rows from {} ({} skipped)",
        records.len(),
        path.display(),
        skipped
    );

    let mut table = EvaluationTable::new(records).with_source(path.to_path_buf());
    table.skipped_rows = skipped;
    Ok(table)
}

/// Parse a 0/1 style flag: `0`, `1`, `0.0`, `1.0`, `true`, `false` (any case).
pub fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();

    if value.eq_ignore_ascii_case("true") {
        return Some(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Some(false);
    }

    match value.parse::<f64>().ok()? {
        v if v == 1.0 => Some(true),
        v if v == 0.0 => Some(false),
        _ => None,
    }
}

/// Parse an integer seed, accepting integral floats such as `3.0`.
pub fn parse_seed(value: &str) -> Option<i64> {
    let value = value.trim();

    if let Ok(seed) = value.parse::<i64>() {
        return Some(seed);
    }

    let float = value.parse::<f64>().ok()?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    let in_range = (i64::MIN as f64..i64::MAX as f64).contains(&float);
    if in_range && float.fract() == 0.0 {
        Some(float as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("1.0"), Some(true));
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("FALSE"), Some(false));
        assert_eq!(parse_flag("0.5"), None);
        assert_eq!(parse_flag("yes"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42"), Some(42));
        assert_eq!(parse_seed("7.0"), Some(7));
        assert_eq!(parse_seed("7.5"), None);
        assert_eq!(parse_seed("abc"), None);
        assert_eq!(parse_seed("1e20"), None);
        assert_eq!(parse_seed("-1e20"), None);
        assert_eq!(parse_seed("inf"), None);
        assert_eq!(parse_seed("NaN"), None);
        assert_eq!(parse_seed("1e3"), Some(1000));
    }

    #[test]
    fn test_read_table_with_extra_columns() {
        let (_dir, path) = write_csv(
            ",episode_len,seed,inv_coin_collected,coin_collected,reward\n\
             0,120,3,False,True,10.0\n\
             1,80,4,True,False,0.0\n",
        );

        let table = read_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.records()[0],
            EvaluationRecord {
                seed: 3,
                coin_collected: true,
                inv_coin_collected: false,
            }
        );
        assert_eq!(table.skipped_rows, 0);
    }

    #[test]
    fn test_read_table_skips_malformed_rows() {
        let (_dir, path) = write_csv(
            "seed,coin_collected,inv_coin_collected\n\
             0,1,0\n\
             oops,1,0\n\
             2,1\n\
             1e20,1,0\n\
             3,0,1,extra,fields\n",
        );

        let table = read_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped_rows, 3);
        assert_eq!(table.max_seed(), Some(3));
        assert_eq!(table.records()[1].seed, 3);
    }

    #[test]
    fn test_read_table_missing_column() {
        let (_dir, path) = write_csv("seed,coin_collected\n0,1\n");

        match read_table(&path).unwrap_err() {
            AggregateError::MissingColumn { column, .. } => {
                assert_eq!(column, "inv_coin_collected")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
