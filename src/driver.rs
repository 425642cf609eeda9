//! Parallel execution of partition aggregation.
//!
//! The driver hands every partition to an independent unit of concurrency, collects a partial
//! aggregate or a failure from each, and folds the successes on the calling task. Units never
//! share mutable state; results are returned by value.

use crate::aggregate::{FinalAggregate, PartialAggregate};
use crate::aggregator;
use crate::error::{MetricsError, PartitionFailure};
use crate::registry::Registry;
use crate::resource_manager::ResourceManager;
use crate::source::PartitionSource;

use rayon::prelude::*;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// How partitions are dispatched
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionMode {
    /// One partition after another on the calling task
    Sequential,
    /// One Tokio blocking task per partition, bounded by the task limit
    #[default]
    Threads,
    /// Partitions mapped in parallel on the Rayon thread pool
    Rayon,
}

impl ExecutionMode {
    /// Returns the mode name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Threads => "threads",
            Self::Rayon => "rayon",
        }
    }
}

/// Processing state of one partition
#[derive(Clone, Debug, PartialEq)]
pub enum PartitionState {
    /// Not yet dispatched
    Pending,
    /// Dispatched to a unit of concurrency
    Running,
    /// Aggregated successfully
    Succeeded { rows: usize },
    /// Excluded from the run
    Failed { reason: String },
}

impl PartitionState {
    /// Returns whether the state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Result of a driver run
#[derive(Debug)]
pub struct RunOutcome {
    /// Fold of every successful partition
    pub aggregate: FinalAggregate,
    /// Partitions excluded from the fold, in partition order
    pub failures: Vec<PartitionFailure>,
    /// Final state of every partition, in partition order
    pub states: Vec<(String, PartitionState)>,
}

impl RunOutcome {
    /// Returns the number of partitions that succeeded.
    pub fn succeeded(&self) -> usize {
        self.states
            .iter()
            .filter(|(_, state)| matches!(state, PartitionState::Succeeded { .. }))
            .count()
    }

    /// Returns the total number of rows aggregated.
    pub fn rows(&self) -> usize {
        self.states
            .iter()
            .map(|(_, state)| match state {
                PartitionState::Succeeded { rows } => *rows,
                _ => 0,
            })
            .sum()
    }
}

/// Tracks partition states and the running fold.
struct Collector {
    aggregate: FinalAggregate,
    failures: Vec<(usize, PartitionFailure)>,
    states: Vec<(String, PartitionState)>,
}

impl Collector {
    fn new(ids: Vec<String>) -> Self {
        Self {
            aggregate: FinalAggregate::new(),
            failures: vec![],
            states: ids
                .into_iter()
                .map(|id| (id, PartitionState::Pending))
                .collect(),
        }
    }

    fn running(&mut self, index: usize) {
        self.transition(index, PartitionState::Running);
    }

    /// Record the outcome of a partition, merging a success into the fold.
    fn complete(&mut self, index: usize, result: Result<(PartialAggregate, usize), MetricsError>) {
        match result {
            Ok((partial, rows)) => {
                self.aggregate.merge(partial);
                self.transition(index, PartitionState::Succeeded { rows });
            }
            Err(error) => {
                let failure = PartitionFailure::new(self.states[index].0.clone(), &error);
                self.transition(
                    index,
                    PartitionState::Failed {
                        reason: failure.reason.clone(),
                    },
                );
                self.failures.push((index, failure));
            }
        }
    }

    fn transition(&mut self, index: usize, state: PartitionState) {
        let (id, current) = &mut self.states[index];
        tracing::debug!(partition = %id, from = ?current, to = ?state, "partition state");
        *current = state;
    }

    fn finish(mut self) -> RunOutcome {
        // Units lost without reporting still reach a terminal state.
        for index in 0..self.states.len() {
            if !self.states[index].1.is_terminal() {
                let error = MetricsError::Panic {
                    message: "partition task did not report a result".to_string(),
                };
                self.complete(index, Err(error));
            }
        }
        self.failures.sort_by_key(|(index, _)| *index);
        RunOutcome {
            aggregate: self.aggregate,
            failures: self
                .failures
                .into_iter()
                .map(|(_, failure)| failure)
                .collect(),
            states: self.states,
        }
    }
}

/// Load and aggregate one partition, returning its partial aggregate and row count.
fn process_partition<S: PartitionSource + ?Sized>(
    source: &S,
    group_field: &str,
    registry: &Registry,
) -> Result<(PartialAggregate, usize), MetricsError> {
    let partition = source.load()?;
    let rows = partition.rows.len();
    let partial = aggregator::aggregate(&partition, group_field, registry)?;
    Ok((partial, rows))
}

/// As [process_partition], turning a panic into an error.
fn process_partition_guarded<S: PartitionSource + ?Sized>(
    source: &S,
    group_field: &str,
    registry: &Registry,
) -> Result<(PartialAggregate, usize), MetricsError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        process_partition(source, group_field, registry)
    }))
    .unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(MetricsError::Panic { message })
    })
}

/// Executes partition aggregation and the reduction of partial results
#[derive(Clone, Debug)]
pub struct Driver {
    registry: Arc<Registry>,
    mode: ExecutionMode,
    resource_manager: ResourceManager,
    partition_timeout: Option<Duration>,
}

impl Driver {
    /// Returns a new Driver computing the metrics of `registry`.
    pub fn new(registry: Arc<Registry>, mode: ExecutionMode) -> Self {
        Self {
            registry,
            mode,
            resource_manager: ResourceManager::new(None),
            partition_timeout: None,
        }
    }

    /// Bound the number of partitions processed at once in [ExecutionMode::Threads].
    pub fn with_task_limit(mut self, task_limit: Option<usize>) -> Self {
        self.resource_manager = ResourceManager::new(task_limit);
        self
    }

    /// Fail partitions that take longer than `timeout` in [ExecutionMode::Threads].
    pub fn with_partition_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.partition_timeout = timeout;
        self
    }

    /// Returns the execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns the registry of computed metrics.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Aggregate every partition and fold the successes.
    ///
    /// A failing partition is recorded in [RunOutcome::failures] and excluded from the fold; it
    /// never aborts the run. The fold is independent of completion order.
    ///
    /// # Arguments
    ///
    /// * `sources`: Partitions to process; every row must appear in exactly one partition
    /// * `group_field`: Name of the field whose value identifies a row's group
    #[tracing::instrument(level = "DEBUG", skip(self, sources), fields(mode = %self.mode, partitions = sources.len()))]
    pub async fn run<S>(&self, sources: Vec<S>, group_field: &str) -> RunOutcome
    where
        S: PartitionSource + 'static,
    {
        let collector = Collector::new(sources.iter().map(|source| source.id()).collect());
        match self.mode {
            ExecutionMode::Sequential => {
                self.run_sequential(collector, sources, group_field).await
            }
            ExecutionMode::Threads => self.run_threads(collector, sources, group_field).await,
            ExecutionMode::Rayon => self.run_rayon(collector, sources, group_field).await,
        }
    }

    async fn run_sequential<S: PartitionSource + 'static>(
        &self,
        mut collector: Collector,
        sources: Vec<S>,
        group_field: &str,
    ) -> RunOutcome {
        let group_field: Arc<str> = Arc::from(group_field);
        for (index, source) in sources.into_iter().enumerate() {
            collector.running(index);
            let group_field = group_field.clone();
            let registry = self.registry.clone();
            // One partition at a time, off the async runtime.
            let result = tokio::task::spawn_blocking(move || {
                process_partition_guarded(&source, &group_field, &registry)
            })
            .await
            .unwrap_or_else(|err| Err(err.into()));
            collector.complete(index, result);
        }
        collector.finish()
    }

    async fn run_threads<S: PartitionSource + 'static>(
        &self,
        mut collector: Collector,
        sources: Vec<S>,
        group_field: &str,
    ) -> RunOutcome {
        let group_field: Arc<str> = Arc::from(group_field);
        let mut tasks = JoinSet::new();
        for (index, source) in sources.into_iter().enumerate() {
            collector.running(index);
            let group_field = group_field.clone();
            let registry = self.registry.clone();
            let resource_manager = self.resource_manager.clone();
            let timeout = self.partition_timeout;
            tasks.spawn(async move {
                let result =
                    run_blocking(source, group_field, registry, resource_manager, timeout).await;
                (index, result)
            });
        }
        // Merge results as they arrive.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => collector.complete(index, result),
                Err(err) => tracing::debug!("partition task lost: {}", err),
            }
        }
        collector.finish()
    }

    async fn run_rayon<S: PartitionSource + 'static>(
        &self,
        mut collector: Collector,
        sources: Vec<S>,
        group_field: &str,
    ) -> RunOutcome {
        for index in 0..sources.len() {
            collector.running(index);
        }
        let group_field = group_field.to_string();
        let registry = self.registry.clone();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let work = tokio_rayon::spawn(move || {
            sources
                .par_iter()
                .enumerate()
                .for_each_with(sender, |sender, (index, source)| {
                    let result = process_partition_guarded(source, &group_field, &registry);
                    // The receiver is only dropped once every sender is gone.
                    let _ = sender.send((index, result));
                })
        });
        // Merge results as they arrive; the channel closes when the pool work is done.
        while let Some((index, result)) = receiver.recv().await {
            collector.complete(index, result);
        }
        work.await;
        collector.finish()
    }
}

/// Aggregate a partition on a blocking thread once a task permit is available.
async fn run_blocking<S: PartitionSource + 'static>(
    source: S,
    group_field: Arc<str>,
    registry: Arc<Registry>,
    resource_manager: ResourceManager,
    timeout: Option<Duration>,
) -> Result<(PartialAggregate, usize), MetricsError> {
    let _permit = resource_manager.task().await?;
    let handle = tokio::task::spawn_blocking(move || {
        process_partition_guarded(&source, &group_field, &registry)
    });
    // A timed out partition keeps its thread until it finishes, but its result is discarded.
    let joined = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, handle)
            .await
            .map_err(|_| MetricsError::PartitionTimeout { timeout })?,
        None => handle.await,
    };
    joined?
}
