//! Blob compression for checkpoint storage

use crate::error::{WardenError, WardenResult};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// Compress bytes using gzip
pub(super) fn compress(bytes: &[u8]) -> WardenResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| WardenError::storage(format!("Failed to compress blob: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| WardenError::storage(format!("Failed to finish compression: {}", e)))
}

/// Decompress gzip bytes
pub(super) fn decompress(compressed: &[u8]) -> WardenResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| WardenError::storage(format!("Failed to decompress blob: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_shrinks_repetitive_input() {
        let input = vec![b'a'; 64 * 1024];
        let compressed = compress(&input).unwrap();
        assert!(compressed.len() < input.len() / 10);
        assert_eq!(decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
