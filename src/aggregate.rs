//! Partial and final aggregates, and the reduction that combines them.
//!
//! An [Aggregate] maps every group seen to per-metric [MetricTotals]. Combining two aggregates
//! adds sums and ORs the contributed flags key by key, which makes the operation associative and
//! commutative: partitions may be folded in any order and any tree shape.

use crate::models::GroupKey;

use hashbrown::HashMap;

/// Running totals for one (group, metric) pair
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricTotals {
    /// Sum of the numerator field
    pub numerator_sum: f64,
    /// Signed sum of the denominator fields
    pub denominator_sum: f64,
    /// Whether any row supplied the metric's fields
    pub contributed: bool,
}

impl MetricTotals {
    /// Return totals that carry data.
    pub fn new(numerator_sum: f64, denominator_sum: f64) -> Self {
        Self {
            numerator_sum,
            denominator_sum,
            contributed: true,
        }
    }

    /// Totals for a metric whose fields were not available.
    pub fn not_contributed() -> Self {
        Self::default()
    }

    /// Merge another set of totals into this one.
    pub fn merge(&mut self, other: &MetricTotals) {
        self.numerator_sum += other.numerator_sum;
        self.denominator_sum += other.denominator_sum;
        self.contributed |= other.contributed;
    }
}

/// Totals for every metric of one group, keyed by metric id
pub type GroupTotals = HashMap<&'static str, MetricTotals>;

/// Per-group, per-metric totals of a partition or of a whole run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    groups: HashMap<GroupKey, GroupTotals>,
}

/// Aggregate of a single partition.
pub type PartialAggregate = Aggregate;

/// Aggregate of all successful partitions of a run.
pub type FinalAggregate = Aggregate;

impl Aggregate {
    /// Return an empty Aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a group, even if no metric has totals for it yet.
    pub fn touch_group(&mut self, group: GroupKey) -> &mut GroupTotals {
        self.groups.entry(group).or_default()
    }

    /// Merge totals for a (group, metric) pair into the aggregate.
    pub fn add(&mut self, group: GroupKey, metric_id: &'static str, totals: MetricTotals) {
        self.touch_group(group)
            .entry(metric_id)
            .or_default()
            .merge(&totals);
    }

    /// Returns the totals for a (group, metric) pair, if recorded.
    pub fn get(&self, group: &GroupKey, metric_id: &str) -> Option<&MetricTotals> {
        self.groups.get(group).and_then(|totals| totals.get(metric_id))
    }

    /// Returns the totals of a group, if it was seen.
    pub fn group(&self, group: &GroupKey) -> Option<&GroupTotals> {
        self.groups.get(group)
    }

    /// Returns every group seen, sorted.
    pub fn sorted_groups(&self) -> Vec<&GroupKey> {
        let mut groups = self.groups.keys().collect::<Vec<_>>();
        groups.sort();
        groups
    }

    /// Returns the number of groups seen.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns whether no group was seen.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Merge another aggregate into this one.
    ///
    /// Keys present in only one operand behave as if the other held `(0, 0, false)`.
    pub fn merge(&mut self, other: Aggregate) {
        for (group, other_totals) in other.groups {
            match self.groups.get_mut(&group) {
                Some(totals) => {
                    for (metric_id, other_metric) in other_totals {
                        totals.entry(metric_id).or_default().merge(&other_metric);
                    }
                }
                None => {
                    self.groups.insert(group, other_totals);
                }
            }
        }
    }

    /// Combine two aggregates into one.
    pub fn combine(mut self, other: Aggregate) -> Aggregate {
        // Merge the smaller operand into the larger one.
        if self.groups.len() < other.groups.len() {
            let mut other = other;
            other.merge(self);
            return other;
        }
        self.merge(other);
        self
    }

    /// Fold any number of aggregates, as they arrive.
    pub fn combine_all(aggregates: impl IntoIterator<Item = Aggregate>) -> Aggregate {
        aggregates
            .into_iter()
            .fold(Aggregate::new(), Aggregate::combine)
    }
}

/// Combine two aggregates into one.
pub fn combine(a: Aggregate, b: PartialAggregate) -> FinalAggregate {
    a.combine(b)
}
