//! Byte-range chunking of delimited text files.
//!
//! A file is split into line-aligned byte ranges that are disjoint and cover the whole body, so
//! every data row lands in exactly one chunk. Each chunk is read together with the file's header
//! line as an independent partition. Quoted fields containing newlines are not supported.

use crate::error::MetricsError;

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

/// Byte ranges of a file's header and body chunks
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkPlan {
    /// Header line, including its line terminator
    pub header: Range<u64>,
    /// Body chunks, in file order; never empty
    pub ranges: Vec<Range<u64>>,
}

/// Plan up to `chunks` line-aligned body ranges of a file.
pub fn plan(path: &Path, chunks: usize) -> Result<ChunkPlan, MetricsError> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    plan_reader(&mut BufReader::new(file), len, chunks)
}

/// Plan up to `chunks` line-aligned body ranges of `len` bytes of seekable data.
pub fn plan_reader<R: BufRead + Seek>(
    reader: &mut R,
    len: u64,
    chunks: usize,
) -> Result<ChunkPlan, MetricsError> {
    let header_end = next_line_start(reader, 0, len)?;
    let body_len = len - header_end;

    let mut boundaries = vec![header_end];
    let chunks = chunks.max(1) as u64;
    for i in 1..chunks {
        let approx = header_end + body_len * i / chunks;
        let last = *boundaries.last().unwrap_or(&header_end);
        if approx <= last {
            continue;
        }
        // Move forward to the start of the next line, unless already at one.
        let boundary = next_line_start(reader, approx - 1, len)?;
        if boundary > last && boundary < len {
            boundaries.push(boundary);
        }
    }
    boundaries.push(len);

    let ranges = boundaries
        .windows(2)
        .map(|pair| pair[0]..pair[1])
        .filter(|range| !range.is_empty())
        .collect::<Vec<_>>();
    let ranges = if ranges.is_empty() {
        vec![header_end..len]
    } else {
        ranges
    };
    Ok(ChunkPlan {
        header: 0..header_end,
        ranges,
    })
}

/// Returns the offset just after the first newline at or after `pos`, or `len` if there is none.
fn next_line_start<R: BufRead + Seek>(
    reader: &mut R,
    pos: u64,
    len: u64,
) -> Result<u64, MetricsError> {
    reader.seek(SeekFrom::Start(pos))?;
    let mut line = Vec::new();
    let read = reader.by_ref().take(len - pos).read_until(b'\n', &mut line)?;
    Ok(pos + read as u64)
}
