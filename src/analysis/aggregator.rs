//! Seed filtering and frequency aggregation.
//!
//! This module provides the good-seed filter derived from the baseline table
//! and the per-condition averaging used for both sweeps.

use crate::error::{AggregateError, AggregateResult};
use crate::models::{
    EvaluationTable, GoodSeedSet, MetricColumn, RandomizationCondition, SummarySeries,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Default upper bound (exclusive) on a seed's baseline invisible-coin frequency.
pub const DEFAULT_MAX_COLLECT_FREQ: f64 = 0.1;

/// Select the seeds on which the baseline policy rarely collects the invisible coin.
///
/// Seeds are considered over `0..max_seed`; the largest observed seed itself
/// is never a candidate. A seed without rows has no mean and is not good.
pub fn compute_good_seeds(baseline: &EvaluationTable, threshold: f64) -> GoodSeedSet {
    let Some(max_seed) = baseline.max_seed() else {
        return GoodSeedSet::default();
    };
    if max_seed <= 0 {
        return GoodSeedSet::default();
    }

    let means = baseline.seed_means(MetricColumn::InvCoinCollected);
    let candidates = means.range(0..max_seed).count();

    let good: GoodSeedSet = means
        .range(0..max_seed)
        .filter(|&(_, &mean)| mean < threshold)
        .map(|(&seed, _)| seed)
        .collect();

    debug!(
        "{} of {} candidate seeds are below threshold {}",
        good.len(),
        candidates,
        threshold
    );

    good
}

/// Keep only rows whose seed is in `seeds`, preserving row order.
pub fn filter_by_seed(table: &EvaluationTable, seeds: &GoodSeedSet) -> EvaluationTable {
    table.retain_rows(|record| seeds.contains(record.seed))
}

/// Mean of `column` for each condition, ordered by condition.
pub fn aggregate(
    tables: &BTreeMap<RandomizationCondition, EvaluationTable>,
    column: MetricColumn,
) -> AggregateResult<SummarySeries> {
    tables
        .iter()
        .map(|(&condition, table)| {
            table
                .mean(column)
                .map(|mean| (condition, mean))
                .ok_or(AggregateError::EmptyTable {
                    condition,
                    column: column.name(),
                })
        })
        .collect()
}
