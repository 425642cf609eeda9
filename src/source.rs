//! Partition sources.
//!
//! A [PartitionSource] yields the rows of one partition when loaded. Loading happens inside the
//! concurrency unit that aggregates the partition, so only the partitions currently being
//! processed are held in memory.

use crate::compression;
use crate::error::MetricsError;
use crate::models::{Cell, Partition, Row};

use bytes::Bytes;
use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Trait for partition sources.
///
/// This forms the contract between input readers and the execution driver.
pub trait PartitionSource: Send + Sync {
    /// Identifier used in failure reports.
    fn id(&self) -> String;

    /// Read and parse the partition.
    fn load(&self) -> Result<Partition, MetricsError>;
}

impl<S: PartitionSource + ?Sized> PartitionSource for Box<S> {
    fn id(&self) -> String {
        (**self).id()
    }

    fn load(&self) -> Result<Partition, MetricsError> {
        (**self).load()
    }
}

/// In-memory partitions are their own source.
impl PartitionSource for Partition {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn load(&self) -> Result<Partition, MetricsError> {
        Ok(self.clone())
    }
}

/// Text encoding of delimited input
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// UTF-8
    Utf8,
    /// ISO 8859-1, one byte per character
    Latin1,
}

impl Encoding {
    /// Detect the encoding of a whole stream: UTF-8 if it is valid UTF-8, otherwise Latin-1.
    ///
    /// The stream is read in blocks, so a large file is never held in memory.
    pub fn detect<R: Read>(mut reader: R) -> Result<Self, MetricsError> {
        let mut buf = vec![0; 64 * 1024];
        let mut pending = 0;
        loop {
            let read = reader.read(&mut buf[pending..])?;
            if read == 0 {
                // A sequence cut off by the end of the stream is not UTF-8.
                return Ok(if pending == 0 { Self::Utf8 } else { Self::Latin1 });
            }
            let filled = pending + read;
            match std::str::from_utf8(&buf[..filled]) {
                Ok(_) => pending = 0,
                Err(err) if err.error_len().is_none() => {
                    // Carry an incomplete sequence over to the next block.
                    let valid = err.valid_up_to();
                    buf.copy_within(valid..filled, 0);
                    pending = filled - valid;
                }
                Err(_) => return Ok(Self::Latin1),
            }
        }
    }

    fn decode(self, data: &[u8]) -> Cow<'_, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(data),
            // Latin-1 maps each byte to the code point of the same value.
            Self::Latin1 => Cow::Owned(data.iter().copied().map(char::from).collect()),
        }
    }
}

/// Options for reading delimited text
#[derive(Clone, Debug, PartialEq)]
pub struct CsvOptions {
    /// Field delimiter
    pub delimiter: u8,
    /// Name of a column to append holding the source name (file stem)
    pub source_column: Option<String>,
    /// Encoding shared by every partition of a file, or `None` to detect it per partition
    pub encoding: Option<Encoding>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            source_column: None,
            encoding: None,
        }
    }
}

/// Where the bytes of a CSV partition come from
#[derive(Clone, Debug)]
enum Origin {
    /// A whole file, possibly gzip compressed
    File(PathBuf),
    /// The header and one byte range of an uncompressed file
    Range {
        path: PathBuf,
        header: Range<u64>,
        body: Range<u64>,
    },
    /// Bytes already in memory
    Memory { id: String, data: Bytes },
}

/// A partition read from delimited text
#[derive(Clone, Debug)]
pub struct CsvSource {
    origin: Origin,
    options: CsvOptions,
}

impl CsvSource {
    /// Source reading a whole file.
    pub fn file(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        Self {
            origin: Origin::File(path.into()),
            options,
        }
    }

    /// Source reading the header and one body range of an uncompressed file.
    pub fn range(
        path: impl Into<PathBuf>,
        header: Range<u64>,
        body: Range<u64>,
        options: CsvOptions,
    ) -> Self {
        Self {
            origin: Origin::Range {
                path: path.into(),
                header,
                body,
            },
            options,
        }
    }

    /// Source parsing bytes held in memory.
    pub fn bytes(id: impl Into<String>, data: impl Into<Bytes>, options: CsvOptions) -> Self {
        Self {
            origin: Origin::Memory {
                id: id.into(),
                data: data.into(),
            },
            options,
        }
    }

    /// Name written to the source column.
    fn source_name(&self) -> String {
        match &self.origin {
            Origin::File(path) | Origin::Range { path, .. } => file_stem(path),
            Origin::Memory { id, .. } => id.clone(),
        }
    }

    fn read(&self) -> Result<Bytes, MetricsError> {
        match &self.origin {
            Origin::File(path) => {
                let data = std::fs::read(path)?;
                compression::decompress_if_needed(data.into())
            }
            Origin::Range { path, header, body } => {
                let mut file = File::open(path)?;
                let mut data = read_range(&mut file, header)?;
                data.extend(read_range(&mut file, body)?);
                Ok(data.into())
            }
            Origin::Memory { data, .. } => compression::decompress_if_needed(data.clone()),
        }
    }
}

impl PartitionSource for CsvSource {
    fn id(&self) -> String {
        match &self.origin {
            Origin::File(path) => path.display().to_string(),
            Origin::Range { path, body, .. } => {
                format!("{}[{}..{}]", path.display(), body.start, body.end)
            }
            Origin::Memory { id, .. } => id.clone(),
        }
    }

    #[tracing::instrument(level = "DEBUG", skip(self), fields(partition = %self.id()))]
    fn load(&self) -> Result<Partition, MetricsError> {
        let data = self.read()?;
        parse_csv(self.id(), &data, &self.options, &self.source_name())
    }
}

/// Read a byte range of a file.
fn read_range(file: &mut File, range: &Range<u64>) -> Result<Vec<u8>, MetricsError> {
    let len = usize::try_from(range.end.saturating_sub(range.start)).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "byte range too large")
    })?;
    let mut buf = vec![0; len];
    file.seek(SeekFrom::Start(range.start))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Returns the file name without `.gz` and `.csv` extensions.
pub fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let name = name.strip_suffix(".csv").unwrap_or(name);
    name.to_string()
}

/// Decode text in the given encoding, or as UTF-8 with a Latin-1 fallback.
fn decode(data: &[u8], encoding: Option<Encoding>) -> Cow<'_, str> {
    match encoding {
        Some(encoding) => encoding.decode(data),
        None => match std::str::from_utf8(data) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => {
                tracing::debug!("input is not valid UTF-8, decoding as Latin-1");
                Encoding::Latin1.decode(data)
            }
        },
    }
}

/// Parse delimited text into a partition.
///
/// Rows shorter than the header are padded with absent cells. Rows longer than the header fail
/// the partition, as their fields cannot be attributed to columns.
///
/// # Arguments
///
/// * `id`: Partition identifier
/// * `data`: Uncompressed text, UTF-8 or Latin-1, with a header line
/// * `options`: Delimiter, encoding and optional source column
/// * `source_name`: Value of the source column, if enabled
pub fn parse_csv(
    id: impl Into<String>,
    data: &[u8],
    options: &CsvOptions,
    source_name: &str,
) -> Result<Partition, MetricsError> {
    let text = decode(data, options.encoding);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut columns = reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    let width = columns.len();
    if let Some(source_column) = &options.source_column {
        columns.push(source_column.clone());
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > width {
            return Err(MetricsError::TooManyFields {
                row: index + 1,
                found: record.len(),
                expected: width,
            });
        }
        let mut row = record.iter().map(Cell::parse).collect::<Row>();
        row.resize(width, Cell::Absent);
        if options.source_column.is_some() {
            row.push(Cell::Text(source_name.to_string()));
        }
        rows.push(row);
    }

    Ok(Partition {
        id: id.into(),
        columns,
        rows,
    })
}
