//! Command line application.

use crate::assembler;
use crate::chunker;
use crate::cli::CommandLineArgs;
use crate::compression;
use crate::discovery;
use crate::driver::{Driver, ExecutionMode, RunOutcome};
use crate::error::MetricsError;
use crate::models::ResultTable;
use crate::output;
use crate::registry::Registry;
use crate::source::{CsvOptions, CsvSource, Encoding};

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Run the application.
pub async fn run(args: &CommandLineArgs) -> Result<(), MetricsError> {
    let registry = Registry::builtin();
    if args.list_metrics {
        return list_metrics(registry, std::io::stdout().lock());
    }

    let delimiter = delimiter_byte(args.delimiter)?;
    let options = CsvOptions {
        delimiter,
        source_column: args.source_column.clone(),
        encoding: None,
    };
    let files = discovery::discover(&args.inputs, args.recursive)?;
    let sources = build_sources(&files, args.chunks_per_file, &options);
    tracing::info!(
        "processing {} files as {} partitions",
        files.len(),
        sources.len()
    );

    let thread_limit = args.thread_limit();
    init_rayon(thread_limit);
    let driver = Driver::new(Arc::new(registry.clone()), args.mode)
        .with_task_limit(Some(thread_limit))
        .with_partition_timeout(args.partition_timeout.map(Duration::from_secs));

    let table = if args.compare {
        compare(&driver, sources, &args.group_field).await?
    } else {
        let (outcome, elapsed) = timed_run(&driver, sources, &args.group_field).await;
        tracing::info!("{} run took {:.3}s", driver.mode(), elapsed.as_secs_f64());
        report(&outcome);
        assembler::assemble(&outcome.aggregate, registry.list_metrics(), &args.group_field)
    };

    output::write_table_to(&table, args.format, delimiter, &args.output)?;
    if args.output != output::STDOUT {
        tracing::info!("wrote {} groups to {}", table.rows.len(), args.output);
    }
    Ok(())
}

/// Write the metric definitions as JSON.
pub fn list_metrics<W: Write>(registry: &Registry, mut writer: W) -> Result<(), MetricsError> {
    serde_json::to_writer_pretty(&mut writer, registry.list_metrics())?;
    writeln!(writer)?;
    Ok(())
}

/// Returns the delimiter as a single byte.
fn delimiter_byte(delimiter: char) -> Result<u8, MetricsError> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("delimiter {:?} is not an ASCII character", delimiter),
        )
        .into())
    }
}

/// Returns whether a file starts with gzip magic bytes.
fn is_compressed(path: &Path) -> Result<bool, MetricsError> {
    let mut magic = Vec::with_capacity(2);
    File::open(path)?.take(2).read_to_end(&mut magic)?;
    Ok(compression::detect(&magic).is_some())
}

/// Build a partition source per file, or per chunk of each uncompressed file if
/// `chunks_per_file` is greater than one.
///
/// A file that cannot be planned gets a single whole-file source, so that its error is
/// recorded as a partition failure by the driver.
pub fn build_sources(
    files: &[PathBuf],
    chunks_per_file: usize,
    options: &CsvOptions,
) -> Vec<CsvSource> {
    let mut sources = Vec::new();
    for path in files {
        if chunks_per_file > 1 {
            match chunk_sources(path, chunks_per_file, options) {
                Ok(Some(chunks)) => {
                    sources.extend(chunks);
                    continue;
                }
                Ok(None) => {}
                Err(err) => tracing::debug!("{} not chunked: {}", path.display(), err),
            }
        }
        sources.push(CsvSource::file(path, options.clone()));
    }
    sources
}

/// Plan byte-range sources for an uncompressed file. Returns `None` for a compressed file.
fn chunk_sources(
    path: &Path,
    chunks: usize,
    options: &CsvOptions,
) -> Result<Option<Vec<CsvSource>>, MetricsError> {
    if is_compressed(path)? {
        return Ok(None);
    }
    let plan = chunker::plan(path, chunks)?;
    // Every chunk of a file is decoded the same way.
    let options = CsvOptions {
        encoding: Some(Encoding::detect(BufReader::new(File::open(path)?))?),
        ..options.clone()
    };
    tracing::debug!("{} split into {} chunks", path.display(), plan.ranges.len());
    Ok(Some(
        plan.ranges
            .into_iter()
            .map(|range| CsvSource::range(path, plan.header.clone(), range, options.clone()))
            .collect(),
    ))
}

/// Size the global Rayon thread pool.
fn init_rayon(num_threads: usize) {
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        tracing::debug!("Rayon thread pool already initialised: {}", err);
    }
}

async fn timed_run(
    driver: &Driver,
    sources: Vec<CsvSource>,
    group_field: &str,
) -> (RunOutcome, Duration) {
    let start = Instant::now();
    let outcome = driver.run(sources, group_field).await;
    (outcome, start.elapsed())
}

/// Log every failed partition and a summary.
fn report(outcome: &RunOutcome) {
    for failure in &outcome.failures {
        tracing::warn!("skipped partition {}", failure);
    }
    tracing::info!(
        "aggregated {} rows from {} partitions into {} groups, {} partitions failed",
        outcome.rows(),
        outcome.succeeded(),
        outcome.aggregate.len(),
        outcome.failures.len()
    );
}

/// Run sequentially and then in the driver's mode, check the results match and log the speedup.
async fn compare(
    driver: &Driver,
    sources: Vec<CsvSource>,
    group_field: &str,
) -> Result<ResultTable, MetricsError> {
    let metrics = driver.registry().list_metrics();
    let sequential = Driver::new(Arc::new(driver.registry().clone()), ExecutionMode::Sequential);
    let (baseline, baseline_elapsed) = timed_run(&sequential, sources.clone(), group_field).await;
    let (outcome, elapsed) = timed_run(driver, sources, group_field).await;
    report(&outcome);

    let baseline = assembler::assemble(&baseline.aggregate, metrics, group_field);
    let table = assembler::assemble(&outcome.aggregate, metrics, group_field);
    tracing::info!(
        "sequential run took {:.3}s, {} run took {:.3}s, speedup {:.2}x",
        baseline_elapsed.as_secs_f64(),
        driver.mode(),
        elapsed.as_secs_f64(),
        speedup(baseline_elapsed, elapsed)
    );
    if baseline != table {
        return Err(MetricsError::ResultMismatch {
            left: ExecutionMode::Sequential.name(),
            right: driver.mode().name(),
        });
    }
    Ok(table)
}

/// Returns how many times faster `elapsed` is than `baseline`.
fn speedup(baseline: Duration, elapsed: Duration) -> f64 {
    baseline.as_secs_f64() / elapsed.as_secs_f64().max(f64::EPSILON)
}
