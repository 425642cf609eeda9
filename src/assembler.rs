//! Result assembly.

use crate::aggregate::{FinalAggregate, MetricTotals};
use crate::evaluator;
use crate::models::{MetricDefinition, ResultRow, ResultTable};

/// Evaluate every metric for every group of a final aggregate.
///
/// Rows are sorted by group key so that the table is deterministic for a given aggregate. A
/// metric without totals for a group evaluates as not contributed.
///
/// # Arguments
///
/// * `final_aggregate`: Combined totals of a run
/// * `metrics`: Metrics in output column order
/// * `group_field`: Name of the grouping field, used as the first column header
pub fn assemble(
    final_aggregate: &FinalAggregate,
    metrics: &[MetricDefinition],
    group_field: &str,
) -> ResultTable {
    let missing = MetricTotals::not_contributed();
    let rows = final_aggregate
        .sorted_groups()
        .into_iter()
        .map(|group| {
            let values = metrics
                .iter()
                .map(|metric| {
                    let totals = final_aggregate.get(group, metric.id).unwrap_or(&missing);
                    evaluator::evaluate_totals(totals, metric.multiplier)
                })
                .collect();
            ResultRow {
                group: group.clone(),
                values,
            }
        })
        .collect();
    ResultTable {
        group_field: group_field.to_string(),
        metric_ids: metrics.iter().map(|metric| metric.id).collect(),
        rows,
    }
}
