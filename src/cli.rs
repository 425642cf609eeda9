//! Command Line Interface (CLI) arguments.

use crate::driver::ExecutionMode;
use crate::output::OutputFormat;

use clap::Parser;

/// Metafold command line interface
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct CommandLineArgs {
    /// CSV files or directories containing `*.csv` and `*.csv.gz` files
    #[arg(required_unless_present = "list_metrics")]
    pub inputs: Vec<String>,
    /// Name of the field whose value identifies a row's group
    #[arg(long, default_value = "ramo_justica", env = "METAFOLD_GROUP_FIELD")]
    pub group_field: String,
    /// Field delimiter of the input files
    #[arg(long, default_value_t = ';', env = "METAFOLD_DELIMITER")]
    pub delimiter: char,
    /// Path of the result table, or `-` for standard output
    #[arg(long, default_value = "ResumoMetas.csv", env = "METAFOLD_OUTPUT")]
    pub output: String,
    /// Format of the result table
    #[arg(long, value_enum, default_value_t, env = "METAFOLD_FORMAT")]
    pub format: OutputFormat,
    /// How partitions are dispatched
    #[arg(long, value_enum, default_value_t, env = "METAFOLD_MODE")]
    pub mode: ExecutionMode,
    /// Maximum number of partitions processed at once. Defaults to the number of CPUs.
    #[arg(long, env = "METAFOLD_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Maximum time in seconds allowed for a single partition in `threads` mode.
    #[arg(long, env = "METAFOLD_PARTITION_TIMEOUT")]
    pub partition_timeout: Option<u64>,
    /// Number of byte-range partitions to split each uncompressed file into
    #[arg(long, default_value_t = 1, env = "METAFOLD_CHUNKS_PER_FILE")]
    pub chunks_per_file: usize,
    /// Append a column of this name holding each row's source file name
    #[arg(long, env = "METAFOLD_SOURCE_COLUMN")]
    pub source_column: Option<String>,
    /// Search input directories recursively
    #[arg(long, default_value_t = false, env = "METAFOLD_RECURSIVE")]
    pub recursive: bool,
    /// Also run sequentially, report the speedup and check that the results match
    #[arg(long, default_value_t = false, env = "METAFOLD_COMPARE")]
    pub compare: bool,
    /// Print the built-in metric definitions as JSON and exit
    #[arg(long, default_value_t = false)]
    pub list_metrics: bool,
}

impl CommandLineArgs {
    /// Returns the thread limit, defaulting to the number of CPUs.
    pub fn thread_limit(&self) -> usize {
        self.thread_limit.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CommandLineArgs::try_parse_from(["metafold", "data"]).unwrap();
        assert_eq!(vec!["data"], args.inputs);
        assert_eq!("ramo_justica", args.group_field);
        assert_eq!(';', args.delimiter);
        assert_eq!("ResumoMetas.csv", args.output);
        assert_eq!(OutputFormat::Csv, args.format);
        assert_eq!(ExecutionMode::Threads, args.mode);
        assert_eq!(None, args.partition_timeout);
        assert_eq!(1, args.chunks_per_file);
        assert!(!args.recursive);
        assert!(!args.compare);
        assert!(args.thread_limit() >= 1);
    }

    #[test]
    fn options() {
        let args = CommandLineArgs::try_parse_from([
            "metafold",
            "a.csv",
            "b.csv.gz",
            "--mode",
            "rayon",
            "--format",
            "json",
            "--delimiter",
            ",",
            "--thread-limit",
            "3",
            "--chunks-per-file",
            "4",
            "--source-column",
            "fonte_arquivo",
        ])
        .unwrap();
        assert_eq!(vec!["a.csv", "b.csv.gz"], args.inputs);
        assert_eq!(ExecutionMode::Rayon, args.mode);
        assert_eq!(OutputFormat::Json, args.format);
        assert_eq!(',', args.delimiter);
        assert_eq!(3, args.thread_limit());
        assert_eq!(4, args.chunks_per_file);
        assert_eq!(Some("fonte_arquivo".to_string()), args.source_column);
    }

    #[test]
    fn inputs_required() {
        assert!(CommandLineArgs::try_parse_from(["metafold"]).is_err());
        let args = CommandLineArgs::try_parse_from(["metafold", "--list-metrics"]).unwrap();
        assert!(args.list_metrics);
        assert!(args.inputs.is_empty());
    }

    #[test]
    fn invalid_mode() {
        assert!(CommandLineArgs::try_parse_from(["metafold", "data", "--mode", "gpu"]).is_err());
    }
}
