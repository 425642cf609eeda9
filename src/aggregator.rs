//! Partition-local aggregation.
//!
//! Each partition is reduced to a [PartialAggregate] without touching any shared state, so that
//! partitions can be processed by independent threads in any order.

use crate::aggregate::{MetricTotals, PartialAggregate};
use crate::error::MetricsError;
use crate::models::{parse_number, Cell, GroupKey, MetricDefinition, Partition, Row};
use crate::registry::Registry;

use hashbrown::HashMap;

/// Column positions of one metric's fields within a partition schema.
struct MetricPlan {
    numerator: (usize, &'static str),
    terms: Vec<(usize, &'static str, f64)>,
}

impl MetricPlan {
    /// Resolve a metric against a partition schema.
    ///
    /// Returns `None` if any required field is missing from the schema.
    fn resolve(metric: &MetricDefinition, partition: &Partition) -> Option<Self> {
        let numerator = partition.column_index(metric.numerator_field)?;
        let terms = metric
            .denominator_terms
            .iter()
            .map(|term| {
                partition
                    .column_index(term.field)
                    .map(|index| (index, term.field, term.sign.factor()))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            numerator: (numerator, metric.numerator_field),
            terms,
        })
    }

    /// Returns the (numerator, denominator) contribution of one row.
    fn evaluate_row(&self, row: &Row, row_number: usize) -> Result<(f64, f64), MetricsError> {
        let (index, field) = self.numerator;
        let numerator = numeric_value(row, index, field, row_number)?;
        let mut denominator = 0.0;
        for (index, field, sign) in &self.terms {
            denominator += sign * numeric_value(row, *index, field, row_number)?;
        }
        Ok((numerator, denominator))
    }
}

/// Returns the summable value of a cell: absent and NaN values count as zero.
fn numeric_value(
    row: &Row,
    index: usize,
    field: &str,
    row_number: usize,
) -> Result<f64, MetricsError> {
    let number = match row.get(index) {
        None | Some(Cell::Absent) => return Ok(0.0),
        Some(Cell::Number(number)) => *number,
        Some(Cell::Text(text)) => {
            parse_number(text).ok_or_else(|| MetricsError::InvalidNumber {
                field: field.to_string(),
                row: row_number,
                value: text.clone(),
            })?
        }
    };
    Ok(if number.is_nan() { 0.0 } else { number })
}

/// Aggregate one partition into per-group, per-metric totals.
///
/// Metrics whose fields are not all part of the partition schema are recorded with
/// `contributed = false` for every group of the partition.
///
/// # Arguments
///
/// * `partition`: Rows to aggregate
/// * `group_field`: Name of the field whose value identifies a row's group
/// * `registry`: Metrics to compute
pub fn aggregate(
    partition: &Partition,
    group_field: &str,
    registry: &Registry,
) -> Result<PartialAggregate, MetricsError> {
    let group_index =
        partition
            .column_index(group_field)
            .ok_or_else(|| MetricsError::UnknownGroupField {
                field: group_field.to_string(),
            })?;

    let metrics = registry.list_metrics();
    let plans = metrics
        .iter()
        .map(|metric| {
            let plan = MetricPlan::resolve(metric, partition);
            if plan.is_none() {
                tracing::debug!(
                    partition = %partition.id,
                    metric = metric.id,
                    "metric fields missing from schema"
                );
            }
            plan
        })
        .collect::<Vec<_>>();

    let mut groups: HashMap<GroupKey, Vec<MetricTotals>> = HashMap::new();
    for (index, row) in partition.rows.iter().enumerate() {
        // Report 1-based data row numbers.
        let row_number = index + 1;
        let group = GroupKey::from_cell(row.get(group_index).unwrap_or(&Cell::Absent));
        let totals = groups
            .entry(group)
            .or_insert_with(|| vec![MetricTotals::not_contributed(); metrics.len()]);
        for (plan, totals) in plans.iter().zip(totals.iter_mut()) {
            if let Some(plan) = plan {
                let (numerator, denominator) = plan.evaluate_row(row, row_number)?;
                totals.merge(&MetricTotals::new(numerator, denominator));
            }
        }
    }

    let mut aggregate = PartialAggregate::new();
    for (group, totals) in groups {
        let group_totals = aggregate.touch_group(group);
        for (metric, totals) in metrics.iter().zip(totals) {
            group_totals.insert(metric.id, totals);
        }
    }
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils;

    #[test]
    fn aggregate_scenario_partition_a() {
        let registry = test_utils::scenario_registry();
        let partial = aggregate(&test_utils::scenario_partition_a(), "group", &registry).unwrap();
        assert_eq!(
            Some(&MetricTotals::new(30.0, 30.0)),
            partial.get(&GroupKey::from("X"), "m")
        );
    }

    #[test]
    fn aggregate_scenario_partition_b() {
        let registry = test_utils::scenario_registry();
        let partial = aggregate(&test_utils::scenario_partition_b(), "group", &registry).unwrap();
        assert_eq!(
            Some(&MetricTotals::new(5.0, 5.0)),
            partial.get(&GroupKey::from("X"), "m")
        );
    }

    #[test]
    fn aggregate_multiple_groups() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended"])
            .with_row([Cell::from("X"), 1.0.into(), 2.0.into(), 0.0.into()])
            .with_row([Cell::from("Y"), 3.0.into(), 9.0.into(), 1.0.into()])
            .with_row([Cell::from("X"), 4.0.into(), 5.0.into(), 1.0.into()]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        assert_eq!(2, partial.len());
        assert_eq!(
            Some(&MetricTotals::new(5.0, 6.0)),
            partial.get(&GroupKey::from("X"), "m")
        );
        assert_eq!(
            Some(&MetricTotals::new(3.0, 8.0)),
            partial.get(&GroupKey::from("Y"), "m")
        );
    }

    #[test]
    fn aggregate_absent_group_is_unknown() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended"])
            .with_row([Cell::Absent, 1.0.into(), 2.0.into(), 0.0.into()]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        assert_eq!(
            Some(&MetricTotals::new(1.0, 2.0)),
            partial.get(&GroupKey::Unknown, "m")
        );
    }

    #[test]
    fn aggregate_nan_and_absent_count_as_zero() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended"])
            .with_row([Cell::from("X"), f64::NAN.into(), 10.0.into(), Cell::Absent])
            .with_row([Cell::from("X"), 4.0.into(), Cell::Absent, 1.0.into()]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        let totals = partial.get(&GroupKey::from("X"), "m").unwrap();
        assert_eq!(&MetricTotals::new(4.0, 9.0), totals);
        assert!(totals.contributed);
    }

    #[test]
    fn aggregate_missing_field_not_contributed() {
        let registry = test_utils::scenario_registry();
        // No "suspended" column.
        let partition = Partition::new("p", ["group", "judged", "new"]).with_row([
            Cell::from("X"),
            1.0.into(),
            2.0.into(),
        ]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        assert_eq!(
            Some(&MetricTotals::not_contributed()),
            partial.get(&GroupKey::from("X"), "m")
        );
    }

    #[test]
    fn aggregate_empty_partition() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended"]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        assert!(partial.is_empty());
    }

    #[test]
    fn aggregate_unknown_group_field() {
        let registry = test_utils::scenario_registry();
        let err = aggregate(&test_utils::scenario_partition_a(), "court", &registry).unwrap_err();
        match err {
            MetricsError::UnknownGroupField { field } => assert_eq!("court", field),
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn aggregate_invalid_number() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended"])
            .with_row([Cell::from("X"), 1.0.into(), 2.0.into(), 0.0.into()])
            .with_row([Cell::from("X"), "many".into(), 2.0.into(), 0.0.into()]);
        let err = aggregate(&partition, "group", &registry).unwrap_err();
        assert_eq!(
            "invalid number \"many\" in field judged at row 2",
            err.to_string()
        );
    }

    #[test]
    fn aggregate_text_in_unused_field_is_ignored() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended", "note"])
            .with_row([
                Cell::from("X"),
                1.0.into(),
                2.0.into(),
                0.0.into(),
                "free text".into(),
            ]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        assert_eq!(
            Some(&MetricTotals::new(1.0, 2.0)),
            partial.get(&GroupKey::from("X"), "m")
        );
    }

    #[test]
    fn aggregate_numeric_text() {
        let registry = test_utils::scenario_registry();
        let partition = Partition::new("p", ["group", "judged", "new", "suspended"])
            .with_row(["0123", "1", "2,5", "0"])
            .with_row(["123", "3", "4", "NaN"]);
        let partial = aggregate(&partition, "group", &registry).unwrap();
        assert_eq!(2, partial.len());
        assert_eq!(
            Some(&MetricTotals::new(1.0, 2.5)),
            partial.get(&GroupKey::from("0123"), "m")
        );
        assert_eq!(
            Some(&MetricTotals::new(3.0, 4.0)),
            partial.get(&GroupKey::from("123"), "m")
        );
    }

    #[test]
    fn aggregate_builtin_registry() {
        let partition = test_utils::builtin_partition();
        let partial = aggregate(&partition, "ramo_justica", Registry::builtin()).unwrap();
        let group = GroupKey::from("Estadual");
        // Meta1: 30 / (40 + 2 - 2)
        assert_eq!(
            Some(&MetricTotals::new(30.0, 40.0)),
            partial.get(&group, "Meta1")
        );
        // Other metrics: 30 / (50 - 2)
        assert_eq!(
            Some(&MetricTotals::new(30.0, 48.0)),
            partial.get(&group, "Meta2A")
        );
        assert_eq!(14, partial.group(&group).unwrap().len());
    }
}
