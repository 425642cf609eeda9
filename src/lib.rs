//! This crate computes ratio metrics over large grouped tabular datasets. Input rows are split
//! into partitions that are aggregated independently and in parallel, and the per-partition
//! sums are then combined into one result per group. Ratios are always computed from combined
//! sums, never from per-partition ratios, so the result does not depend on how the input was
//! partitioned or on the order in which partitions complete.
//!
//! The numerical core is small:
//!
//! * [registry] holds the metric definitions: a numerator field, a signed sum of denominator
//!   fields and a multiplier per metric.
//! * [aggregator] reduces one partition to per-group sums.
//! * [aggregate] combines partial sums. Combination is associative and commutative.
//! * [evaluator] turns combined sums into values, or NA where no value can be computed.
//! * [driver] dispatches partitions to concurrent tasks and collects the results.
//!
//! Metafold is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Rayon](rayon), a data parallelism library, for CPU-bound work.
//! * [csv] parses delimited input and writes delimited output.
//! * [Serde](serde) performs serialisation of JSON output.
//! * [flate2] decompresses gzip input.

pub mod aggregate;
pub mod aggregator;
pub mod app;
pub mod assembler;
pub mod chunker;
pub mod cli;
pub mod compression;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod output;
pub mod registry;
pub mod resource_manager;
pub mod source;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
