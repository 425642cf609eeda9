//! Result table output.

use crate::error::MetricsError;
use crate::models::{ResultRow, ResultTable};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fs::File;
use std::io::{BufWriter, Write};
use strum_macros::Display;

/// Path that selects standard output.
pub const STDOUT: &str = "-";

/// Format of the result table
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Delimited text with a header line
    #[default]
    Csv,
    /// An array of objects, one per group
    Json,
}

/// Write a result table.
///
/// # Arguments
///
/// * `table`: Table to write
/// * `format`: Output format
/// * `delimiter`: Field delimiter for [OutputFormat::Csv]
/// * `writer`: Destination
pub fn write_table<W: Write>(
    table: &ResultTable,
    format: OutputFormat,
    delimiter: u8,
    writer: W,
) -> Result<(), MetricsError> {
    match format {
        OutputFormat::Csv => write_csv(table, delimiter, writer),
        OutputFormat::Json => write_json(table, writer),
    }
}

/// Write a result table to a file, or to standard output if `path` is `-`.
pub fn write_table_to(
    table: &ResultTable,
    format: OutputFormat,
    delimiter: u8,
    path: &str,
) -> Result<(), MetricsError> {
    if path == STDOUT {
        let stdout = std::io::stdout();
        write_table(table, format, delimiter, stdout.lock())
    } else {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_table(table, format, delimiter, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn write_csv<W: Write>(table: &ResultTable, delimiter: u8, writer: W) -> Result<(), MetricsError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    let mut header = vec![table.group_field.as_str()];
    header.extend(table.metric_ids.iter().copied());
    writer.write_record(&header)?;
    for row in &table.rows {
        let mut record = vec![row.group.to_string()];
        record.extend(row.values.iter().map(|value| value.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<W: Write>(table: &ResultTable, mut writer: W) -> Result<(), MetricsError> {
    serde_json::to_writer_pretty(&mut writer, &JsonTable(table))?;
    writeln!(writer)?;
    Ok(())
}

/// Serialises a table as an array of objects with keys in column order.
struct JsonTable<'a>(&'a ResultTable);

struct JsonRow<'a> {
    table: &'a ResultTable,
    row: &'a ResultRow,
}

impl Serialize for JsonTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for row in &self.0.rows {
            seq.serialize_element(&JsonRow { table: self.0, row })?;
        }
        seq.end()
    }
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.values.len() + 1))?;
        map.serialize_entry(&self.table.group_field, &self.row.group.to_string())?;
        for (id, value) in self.table.metric_ids.iter().zip(&self.row.values) {
            match value.value() {
                Some(number) => map.serialize_entry(id, &number)?,
                None => map.serialize_entry(id, "NA")?,
            }
        }
        map.end()
    }
}
