//! Error handling.

use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;

/// Metafold error type
///
/// This type encapsulates the various errors that may occur. Errors raised while loading or
/// aggregating a single partition are recorded as a [PartitionFailure] by the driver and never
/// abort a run. The remaining variants are configuration or application level errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Error reading partition data or writing results
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Error decompressing data
    #[error("failed to decompress data")]
    Decompression {
        #[source]
        source: std::io::Error,
    },

    /// Error parsing delimited data
    #[error("failed to parse CSV data")]
    Csv(#[from] csv::Error),

    /// Non-numeric text in a field required by a metric
    #[error("invalid number {value:?} in field {field} at row {row}")]
    InvalidNumber {
        field: String,
        row: usize,
        value: String,
    },

    /// A row holds more fields than the header names
    #[error("row {row} has {found} fields but the header has {expected}")]
    TooManyFields {
        row: usize,
        found: usize,
        expected: usize,
    },

    /// The grouping field is not part of the partition schema
    #[error("group field {field} not found in partition schema")]
    UnknownGroupField { field: String },

    /// Two metric definitions share an id
    #[error("duplicate metric {id}")]
    DuplicateMetric { id: String },

    /// Metric multiplier is not a positive finite number
    #[error("invalid multiplier {multiplier} for metric {id}")]
    InvalidMultiplier { id: String, multiplier: f64 },

    /// A registry must hold at least one metric
    #[error("metric registry is empty")]
    EmptyRegistry,

    /// No input files were found
    #[error("no CSV input files found in {inputs}")]
    NoInputs { inputs: String },

    /// Error serialising JSON output
    #[error("failed to serialise JSON")]
    Json(#[from] serde_json::Error),

    /// A partition task panicked or was cancelled
    #[error("partition task failed")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Aggregating a partition panicked
    #[error("partition task panicked: {message}")]
    Panic { message: String },

    /// A partition did not complete in time
    #[error("partition timed out after {timeout:?}")]
    PartitionTimeout { timeout: std::time::Duration },

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Two execution modes produced different tables
    #[error("{left} and {right} runs produced different results")]
    ResultMismatch {
        left: &'static str,
        right: &'static str,
    },
}

/// Render an error followed by its chain of causes, separated by `: `.
///
/// Consecutive duplicate messages are dropped, as some wrapped errors repeat their source.
pub fn error_chain<E>(error: &E) -> String
where
    E: std::error::Error + ?Sized,
{
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(source) = current {
        messages.push(source.to_string());
        current = source.source();
    }
    messages.dedup();
    messages.join(": ")
}

/// A partition that could not be aggregated.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionFailure {
    /// Identifier of the partition source
    pub partition: String,
    /// Error message including its causes
    pub reason: String,
}

impl PartitionFailure {
    /// Return a new PartitionFailure for a partition and the error that excluded it.
    pub fn new(partition: impl Into<String>, error: &MetricsError) -> Self {
        Self {
            partition: partition.into(),
            reason: error_chain(error),
        }
    }
}

impl std::fmt::Display for PartitionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.partition, self.reason)
    }
}

/// Log an error and its causes at error level.
pub fn log_error(error: &MetricsError) {
    tracing::error!("{}", error);
    let mut current = error.source();
    while let Some(source) = current {
        tracing::error!("Caused by: {}", source);
        current = source.source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = MetricsError::Io(io_error);
        assert_eq!("I/O error: no such file", error_chain(&error));
    }

    #[test]
    fn decompression_error_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid gzip header");
        let error = MetricsError::Decompression { source: io_error };
        assert_eq!(
            "failed to decompress data: invalid gzip header",
            error_chain(&error)
        );
    }

    #[test]
    fn invalid_number_message() {
        let error = MetricsError::InvalidNumber {
            field: "julgados_2025".to_string(),
            row: 3,
            value: "abc".to_string(),
        };
        assert_eq!(
            "invalid number \"abc\" in field julgados_2025 at row 3",
            error.to_string()
        );
    }

    #[test]
    fn too_many_fields_message() {
        let error = MetricsError::TooManyFields {
            row: 4,
            found: 7,
            expected: 6,
        };
        assert_eq!("row 4 has 7 fields but the header has 6", error.to_string());
    }

    #[test]
    fn unknown_group_field_failure() {
        let error = MetricsError::UnknownGroupField {
            field: "ramo_justica".to_string(),
        };
        let failure = PartitionFailure::new("part-2", &error);
        assert_eq!("part-2", failure.partition);
        assert_eq!(
            "part-2: group field ramo_justica not found in partition schema",
            failure.to_string()
        );
    }

    #[test]
    fn panic_message() {
        let error = MetricsError::Panic {
            message: "boom".to_string(),
        };
        assert_eq!("partition task panicked: boom", error.to_string());
    }

    #[test]
    fn partition_timeout_message() {
        let error = MetricsError::PartitionTimeout {
            timeout: std::time::Duration::from_secs(5),
        };
        assert_eq!("partition timed out after 5s", error.to_string());
    }

    #[tokio::test]
    async fn semaphore_acquire_error() {
        let sem = tokio::sync::Semaphore::new(1);
        sem.close();
        let error = MetricsError::SemaphoreAcquireError(sem.acquire().await.unwrap_err());
        assert_eq!("error acquiring resources: semaphore closed", error_chain(&error));
    }

    #[test]
    fn result_mismatch_message() {
        let error = MetricsError::ResultMismatch {
            left: "sequential",
            right: "rayon",
        };
        assert_eq!(
            "sequential and rayon runs produced different results",
            error.to_string()
        );
    }
}
