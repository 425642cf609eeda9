//! Metric catalog.
//!
//! Metrics are data, not code: each [MetricDefinition] names a numerator field, a signed list of
//! denominator fields and a multiplier. A single generic evaluator interprets every entry.

use crate::error::MetricsError;
use crate::models::{DenominatorTerm, MetricDefinition};

use lazy_static::lazy_static;

const JUDGED: &str = "julgados_2025";

/// Denominator of Meta1: new cases plus reactivated cases minus suspended cases.
const META1_TERMS: &[DenominatorTerm] = &[
    DenominatorTerm::plus("casos_novos_2025"),
    DenominatorTerm::plus("dessobrestados_2025"),
    DenominatorTerm::minus("suspensos_2025"),
];

/// Denominator of the remaining metrics: distributed cases minus suspended cases.
const DISTRIBUTED_TERMS: &[DenominatorTerm] = &[
    DenominatorTerm::plus("distribuidos_2025"),
    DenominatorTerm::minus("suspensos_2025"),
];

const fn distributed(id: &'static str, multiplier: f64) -> MetricDefinition {
    MetricDefinition {
        id,
        numerator_field: JUDGED,
        denominator_terms: DISTRIBUTED_TERMS,
        multiplier,
    }
}

/// The built-in catalog, in output column order.
pub const BUILTIN_METRICS: [MetricDefinition; 14] = [
    MetricDefinition {
        id: "Meta1",
        numerator_field: JUDGED,
        denominator_terms: META1_TERMS,
        multiplier: 100.0,
    },
    distributed("Meta2A", 1000.0 / 8.0),
    distributed("Meta2B", 1000.0 / 9.0),
    distributed("Meta2C", 1000.0 / 9.5),
    distributed("Meta2ANT", 100.0),
    distributed("Meta4A", 1000.0 / 6.5),
    distributed("Meta4B", 100.0),
    distributed("Meta6", 100.0),
    distributed("Meta7A", 1000.0 / 5.0),
    distributed("Meta7B", 1000.0 / 5.0),
    distributed("Meta8A", 1000.0 / 7.5),
    distributed("Meta8B", 1000.0 / 9.0),
    distributed("Meta10A", 1000.0 / 9.0),
    distributed("Meta10B", 1000.0 / 10.0),
];

lazy_static! {
    // Process-wide registry holding the built-in catalog
    static ref BUILTIN: Registry = Registry {
        metrics: BUILTIN_METRICS.to_vec(),
    };
}

/// An ordered, validated set of metric definitions
#[derive(Clone, Debug, PartialEq)]
pub struct Registry {
    metrics: Vec<MetricDefinition>,
}

impl Registry {
    /// Return a new Registry after validating the definitions.
    ///
    /// Ids must be unique and multipliers positive and finite.
    pub fn new(metrics: Vec<MetricDefinition>) -> Result<Self, MetricsError> {
        if metrics.is_empty() {
            return Err(MetricsError::EmptyRegistry);
        }
        for (index, metric) in metrics.iter().enumerate() {
            if !(metric.multiplier.is_finite() && metric.multiplier > 0.0) {
                return Err(MetricsError::InvalidMultiplier {
                    id: metric.id.to_string(),
                    multiplier: metric.multiplier,
                });
            }
            if metrics[..index].iter().any(|other| other.id == metric.id) {
                return Err(MetricsError::DuplicateMetric {
                    id: metric.id.to_string(),
                });
            }
        }
        Ok(Self { metrics })
    }

    /// Returns the built-in registry.
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// Returns the metric definitions in declaration order.
    pub fn list_metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    /// Returns the metric ids in declaration order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|metric| metric.id).collect()
    }

    /// Look up a metric by id.
    pub fn get(&self, id: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|metric| metric.id == id)
    }
}

/// Returns the fields a metric reads: its numerator field and every denominator field.
pub fn required_fields(metric: &MetricDefinition) -> Vec<&'static str> {
    metric.required_fields()
}
