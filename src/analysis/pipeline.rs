//! End-to-end aggregation over a results directory.
//!
//! Loads the baseline, derives the good seeds, then builds the IID sweep
//! (train and test randomization equal) and the objective-robustness sweep
//! (test randomization fixed at 100%, train randomization varying).

use super::aggregator::{aggregate, compute_good_seeds, filter_by_seed};
use crate::error::{AggregateError, AggregateResult};
use crate::loader::{load_flat_table, load_table};
use crate::models::{
    EvaluationTable, FigureData, GoodSeedSet, MetricColumn, RandomizationCondition, TableRole,
    TableSummary,
};
use crate::scanner::{
    child_dirs, child_files, discover_conditions, file_name, resolve_path_condition,
    TRAIN_CONDITION_PREFIX,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where the baseline and the fixed-100%-test results live.
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    /// Results root holding the `test_rand_percent_<P>` directories.
    pub root: PathBuf,
    /// Baseline directory, relative to `root`.
    pub vanilla_resdir: PathBuf,
    /// Fixed-100%-test directory, relative to `root`.
    pub test_rp100_resdir: PathBuf,
}

impl ResultsLayout {
    pub fn baseline_dir(&self) -> PathBuf {
        self.root.join(&self.vanilla_resdir)
    }

    pub fn test_rp100_dir(&self) -> PathBuf {
        self.root.join(&self.test_rp100_resdir)
    }
}

/// Output of a full aggregation run.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub figure: FigureData,
    pub good_seeds: GoodSeedSet,
    pub tables: Vec<TableSummary>,
}

/// Run the whole pipeline over `layout`.
pub fn build_figure_data(layout: &ResultsLayout, threshold: f64) -> AggregateResult<Aggregation> {
    let mut summaries = Vec::new();

    // Baseline and seed filter
    let baseline_dir = layout.baseline_dir();
    info!("Loading baseline results from {}", baseline_dir.display());
    let baseline = load_baseline(&baseline_dir)?;
    let baseline_condition = resolve_path_condition(&baseline_dir).unwrap_or(0);

    let good_seeds = compute_good_seeds(&baseline, threshold);
    if good_seeds.is_empty() {
        warn!(
            "No baseline seed has an invisible-coin frequency below {}",
            threshold
        );
    }
    info!("Selected {} good seeds", good_seeds.len());

    let baseline_filtered = filter_by_seed(&baseline, &good_seeds);
    summaries.push(summarize(
        TableRole::Baseline,
        baseline_condition,
        &baseline,
        &baseline_filtered,
    ));
    let baseline_reference = baseline_filtered
        .mean(MetricColumn::CoinCollected)
        .ok_or(AggregateError::EmptyTable {
            condition: baseline_condition,
            column: MetricColumn::CoinCollected.name(),
        })?;

    // IID sweep: every discovered test condition except the largest
    let mut conditions = discover_conditions(&layout.root)?;
    if let Some((dropped, _)) = conditions.pop() {
        debug!("Excluding condition {} from the IID sweep", dropped);
    }

    let mut iid_tables = BTreeMap::new();
    for (condition, dir) in conditions {
        let table = load_table(&dir)?;
        let filtered = filter_by_seed(&table, &good_seeds);
        summaries.push(summarize(TableRole::IidSweep, condition, &table, &filtered));
        iid_tables.insert(condition, filtered);
    }
    let iid_failure = aggregate(&iid_tables, MetricColumn::CoinCollected)?.complement();

    // Objective-robustness sweep at 100% test randomization
    let mut objective_tables = BTreeMap::new();
    for (condition, table) in load_train_sweep(&layout.test_rp100_dir())? {
        let filtered = filter_by_seed(&table, &good_seeds);
        summaries.push(summarize(
            TableRole::ObjectiveSweep,
            condition,
            &table,
            &filtered,
        ));
        objective_tables.insert(condition, filtered);
    }
    let objective_failure = aggregate(&objective_tables, MetricColumn::InvCoinCollected)?;

    Ok(Aggregation {
        figure: FigureData {
            iid_failure,
            objective_failure,
            baseline_reference,
            threshold,
            good_seed_count: good_seeds.len(),
        },
        good_seeds,
        tables: summaries,
    })
}

/// Load the baseline table.
///
/// Accepts either a condition directory (`test_rand_percent_0`) or the run
/// directory inside it that holds the `.csv` file directly.
pub fn load_baseline(dir: &Path) -> AggregateResult<EvaluationTable> {
    if has_csv(dir)? {
        load_flat_table(dir)
    } else {
        load_table(dir)
    }
}

/// Load the tables of the fixed-100%-test directory, keyed by train condition.
///
/// Child directories named `train_rand*` (`train_rand_percent_50`) each
/// contribute one table from their single `.csv` file, keyed by their trailing
/// percentage. When there are none the directory is loaded as a single
/// condition directory, keyed by its own percentage.
pub fn load_train_sweep(
    dir: &Path,
) -> AggregateResult<BTreeMap<RandomizationCondition, EvaluationTable>> {
    let mut tables = BTreeMap::new();

    for child in child_dirs(dir)? {
        if !file_name(&child).starts_with(TRAIN_CONDITION_PREFIX) {
            debug!("Skipping {}: not a train condition", child.display());
            continue;
        }
        let condition = resolve_path_condition(&child)?;

        let table = load_flat_table(&child)?;
        if let Some(previous) = tables.insert(condition, table) {
            return Err(AggregateError::Ambiguous {
                path: dir.to_path_buf(),
                what: "directory for train condition",
                count: 2,
                candidates: previous
                    .source
                    .into_iter()
                    .chain(std::iter::once(child))
                    .map(|p| p.display().to_string())
                    .collect(),
            });
        }
    }

    if tables.is_empty() {
        let condition = resolve_path_condition(dir)?;
        tables.insert(condition, load_table(dir)?);
    }

    Ok(tables)
}

fn has_csv(dir: &Path) -> AggregateResult<bool> {
    Ok(child_files(dir)?.iter().any(|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(crate::scanner::TABLE_EXTENSION))
            .unwrap_or(false)
    }))
}

fn summarize(
    role: TableRole,
    condition: RandomizationCondition,
    loaded: &EvaluationTable,
    kept: &EvaluationTable,
) -> TableSummary {
    TableSummary {
        role,
        condition,
        source: loaded.source.clone(),
        rows_loaded: loaded.len(),
        rows_kept: kept.len(),
        skipped_rows: loaded.skipped_rows,
    }
}
