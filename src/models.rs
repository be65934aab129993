//! Data models for the metrics aggregator.
//!
//! This module contains the core data structures used throughout
//! the application for representing evaluation rows, tables, seed filters,
//! summary series and the summary report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Randomization percentage (0..=100) keying a table or series entry.
pub type RandomizationCondition = u32;

/// One evaluated episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Level seed the episode was generated from.
    pub seed: i64,
    /// Whether the visible coin was reached.
    pub coin_collected: bool,
    /// Whether the invisible coin was collected.
    pub inv_coin_collected: bool,
}

/// Boolean column of an evaluation table that can be averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColumn {
    CoinCollected,
    InvCoinCollected,
}

impl MetricColumn {
    /// Column name as it appears in the CSV header.
    pub fn name(&self) -> &'static str {
        match self {
            MetricColumn::CoinCollected => "coin_collected",
            MetricColumn::InvCoinCollected => "inv_coin_collected",
        }
    }

    /// Read this column from a record.
    pub fn value(&self, record: &EvaluationRecord) -> bool {
        match self {
            MetricColumn::CoinCollected => record.coin_collected,
            MetricColumn::InvCoinCollected => record.inv_coin_collected,
        }
    }
}

impl fmt::Display for MetricColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered rows sharing one randomization condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationTable {
    records: Vec<EvaluationRecord>,
    /// File the rows were read from, if any.
    pub source: Option<PathBuf>,
    /// Number of malformed rows dropped while loading.
    pub skipped_rows: usize,
}

impl EvaluationTable {
    pub fn new(records: Vec<EvaluationRecord>) -> Self {
        Self {
            records,
            source: None,
            skipped_rows: 0,
        }
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Largest seed present, or `None` for an empty table.
    pub fn max_seed(&self) -> Option<i64> {
        self.records.iter().map(|r| r.seed).max()
    }

    /// Mean of a boolean column, or `None` when the table has no rows.
    pub fn mean(&self, column: MetricColumn) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let hits = self.records.iter().filter(|r| column.value(r)).count();
        Some(hits as f64 / self.records.len() as f64)
    }

    /// Per-seed mean of a boolean column, from a single pass over the rows.
    pub fn seed_means(&self, column: MetricColumn) -> BTreeMap<i64, f64> {
        let mut counts: BTreeMap<i64, (usize, usize)> = BTreeMap::new();

        for record in &self.records {
            let (hits, total) = counts.entry(record.seed).or_default();
            *hits += usize::from(column.value(record));
            *total += 1;
        }

        counts
            .into_iter()
            .map(|(seed, (hits, total))| (seed, hits as f64 / total as f64))
            .collect()
    }

    /// Keep only the rows matching `keep`, preserving order and provenance.
    pub fn retain_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&EvaluationRecord) -> bool,
    {
        Self {
            records: self.records.iter().copied().filter(|r| keep(r)).collect(),
            source: self.source.clone(),
            skipped_rows: self.skipped_rows,
        }
    }
}

impl FromIterator<EvaluationRecord> for EvaluationTable {
    fn from_iter<I: IntoIterator<Item = EvaluationRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Seeds retained for analysis because the baseline policy rarely collects
/// the invisible coin on them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodSeedSet(BTreeSet<i64>);

impl GoodSeedSet {
    pub fn contains(&self, seed: i64) -> bool {
        self.0.contains(&seed)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<i64> for GoodSeedSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-condition frequency, always ordered by condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummarySeries(BTreeMap<RandomizationCondition, f64>);

impl SummarySeries {
    pub fn insert(&mut self, condition: RandomizationCondition, value: f64) {
        self.0.insert(condition, value);
    }

    pub fn get(&self, condition: RandomizationCondition) -> Option<f64> {
        self.0.get(&condition).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(condition, frequency)` pairs in ascending condition order.
    pub fn points(&self) -> Vec<(RandomizationCondition, f64)> {
        self.0.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn conditions(&self) -> Vec<RandomizationCondition> {
        self.0.keys().copied().collect()
    }

    /// `1 - value` for every entry.
    pub fn complement(&self) -> Self {
        Self(self.0.iter().map(|(k, v)| (*k, 1.0 - v)).collect())
    }
}

impl FromIterator<(RandomizationCondition, f64)> for SummarySeries {
    fn from_iter<I: IntoIterator<Item = (RandomizationCondition, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything the figure and the summary report are drawn from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FigureData {
    /// Failure to reach the coin when train and test randomization match.
    pub iid_failure: SummarySeries,
    /// Invisible-coin collection at 100% test randomization, by train condition.
    pub objective_failure: SummarySeries,
    /// Fraction of good-seed baseline episodes that reach the coin.
    pub baseline_reference: f64,
    /// Threshold used to select good seeds.
    pub threshold: f64,
    /// Number of good seeds.
    pub good_seed_count: usize,
}

/// Which sweep a loaded table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    Baseline,
    IidSweep,
    ObjectiveSweep,
}

impl fmt::Display for TableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRole::Baseline => write!(f, "Baseline"),
            TableRole::IidSweep => write!(f, "IID sweep"),
            TableRole::ObjectiveSweep => write!(f, "Objective sweep"),
        }
    }
}

/// Row accounting for one loaded table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub role: TableRole,
    pub condition: RandomizationCondition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Rows parsed from the file.
    pub rows_loaded: usize,
    /// Rows left after the good-seed filter.
    pub rows_kept: usize,
    /// Malformed rows dropped while loading.
    pub skipped_rows: usize,
}

/// Metadata about a summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Results root the tables were read from.
    pub results_dir: PathBuf,
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Path of the rendered figure.
    pub figure_path: PathBuf,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete aggregation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub figure: FigureData,
    pub tables: Vec<TableSummary>,
}
