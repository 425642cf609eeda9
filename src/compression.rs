//! Decompression support.

use crate::error::MetricsError;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use std::io::Read;

/// Magic bytes at the start of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression algorithm
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Compression {
    /// Gzip
    Gzip,
}

/// Detect the compression of some data from its leading bytes.
pub fn detect(data: &[u8]) -> Option<Compression> {
    if data.starts_with(&GZIP_MAGIC) {
        Some(Compression::Gzip)
    } else {
        None
    }
}

/// Decompresses some Bytes and returns the uncompressed data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Compressed data
pub fn decompress(compression: Compression, data: &Bytes) -> Result<Bytes, MetricsError> {
    match compression {
        Compression::Gzip => decompress_gzip(data),
    }
}

/// Decompress data if it is compressed, otherwise return it unchanged.
pub fn decompress_if_needed(data: Bytes) -> Result<Bytes, MetricsError> {
    match detect(&data) {
        Some(compression) => decompress(compression, &data),
        None => Ok(data),
    }
}

fn decompress_gzip(data: &Bytes) -> Result<Bytes, MetricsError> {
    // Concatenated gzip members are common for appended exports.
    let mut decoder = MultiGzDecoder::new(data.as_ref());
    // Compressed text typically expands several times.
    let mut buf = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut buf)
        .map_err(|source| MetricsError::Decompression { source })?;
    Ok(buf.into())
}

#[cfg(test)]
pub(crate) fn compress_gzip(input: &[u8]) -> Vec<u8> {
    // Adapated from flate2 documentation.
    let mut result = Vec::<u8>::new();
    let mut deflater = flate2::read::GzEncoder::new(input, flate2::Compression::fast());
    deflater.read_to_end(&mut result).unwrap();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(Some(Compression::Gzip), detect(&compress_gzip(b"a;b\n")));
        assert_eq!(None, detect(b"a;b\n"));
        assert_eq!(None, detect(b""));
    }

    #[test]
    fn test_decompress_gzip() {
        let compressed = compress_gzip(b"hello world");
        let result = decompress(Compression::Gzip, &compressed.into()).unwrap();
        assert_eq!(result, b"hello world".as_ref());
    }

    #[test]
    fn test_decompress_multi_member() {
        let mut compressed = compress_gzip(b"hello ");
        compressed.extend(compress_gzip(b"world"));
        let result = decompress_if_needed(compressed.into()).unwrap();
        assert_eq!(result, b"hello world".as_ref());
    }

    #[test]
    fn test_plain_passthrough() {
        let result = decompress_if_needed(Bytes::from_static(b"a;b\n1;2\n")).unwrap();
        assert_eq!(result, b"a;b\n1;2\n".as_ref());
    }

    #[test]
    fn test_decompress_truncated_gzip() {
        let compressed = compress_gzip(b"hello world");
        let truncated = Bytes::copy_from_slice(&compressed[..compressed.len() / 2]);
        let err = decompress(Compression::Gzip, &truncated).unwrap_err();
        assert!(matches!(err, MetricsError::Decompression { .. }), "{}", err);
    }
}
