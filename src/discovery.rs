//! Input file discovery.

use crate::error::MetricsError;

use expanduser::expanduser;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Returns whether a path names a CSV file, optionally gzip compressed.
pub fn is_csv(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let name = name.to_ascii_lowercase();
            name.ends_with(".csv") || name.ends_with(".csv.gz")
        })
        .unwrap_or(false)
}

/// Expand inputs into a sorted, deduplicated list of CSV files.
///
/// A file input is used as is. A directory input contributes the CSV files it contains,
/// searched recursively if `recursive` is set.
///
/// # Arguments
///
/// * `inputs`: File and directory paths, which may start with `~`
/// * `recursive`: Whether to search directories recursively
pub fn discover<S: AsRef<str>>(inputs: &[S], recursive: bool) -> Result<Vec<PathBuf>, MetricsError> {
    let mut files = Vec::new();
    for input in inputs {
        let path = expanduser(input.as_ref())?;
        if path.is_dir() {
            let walker = WalkDir::new(&path)
                .min_depth(1)
                .max_depth(if recursive { usize::MAX } else { 1 });
            for entry in walker {
                let entry = entry.map_err(std::io::Error::from)?;
                if entry.file_type().is_file() && is_csv(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.exists() {
            files.push(path);
        } else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input {} not found", path.display()),
            )
            .into());
        }
    }
    files.sort();
    files.dedup();
    if files.is_empty() {
        let inputs = inputs
            .iter()
            .map(|input| input.as_ref())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(MetricsError::NoInputs { inputs });
    }
    tracing::debug!("discovered {} input files", files.len());
    Ok(files)
}
