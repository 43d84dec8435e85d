//! Transparent compression for on-disk records.
//!
//! Uses zstd. The SQLite store flags compressed rows in their own column,
//! and [`is_compressed`] additionally checks the zstd magic bytes so a
//! mis-flagged row is never fed to the decoder.
//!
//! # Feature Flag
//!
//! This module requires the `compression` feature (on by default):
//!
//! ```toml
//! [dependencies]
//! cold-tier = { version = "0.1", features = ["compression"] }
//! ```
//!
//! Host snapshots of strings, hashes and lists compress well. Tiny values
//! are left alone: below [`MIN_COMPRESS_BYTES`] the zstd frame overhead
//! outweighs the savings.

/// Zstd magic bytes (little-endian): 0xFD2FB528
#[cfg(feature = "compression")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level (3 is a good balance of speed/ratio)
#[cfg(feature = "compression")]
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Values smaller than this are stored as-is.
pub const MIN_COMPRESS_BYTES: usize = 256;

/// Compression error types
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Failed to compress data
    #[error("compression failed: {0}")]
    CompressFailed(String),

    /// Failed to decompress data
    #[error("decompression failed: {0}")]
    DecompressFailed(String),
}

/// Check if data is zstd-compressed by checking magic bytes.
#[cfg(feature = "compression")]
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Compress bytes with the default level.
#[cfg(feature = "compression")]
pub fn compress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    zstd::encode_all(data, DEFAULT_COMPRESSION_LEVEL)
        .map_err(|e| CompressionError::CompressFailed(e.to_string()))
}

/// Decompress bytes directly.
///
/// Returns original bytes if not compressed.
#[cfg(feature = "compression")]
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    if is_compressed(data) {
        zstd::decode_all(data)
            .map_err(|e| CompressionError::DecompressFailed(e.to_string()))
    } else {
        Ok(data.to_vec())
    }
}

/// Compress `data` if it is large enough and actually shrinks.
///
/// Returns `None` when the value should be stored uncompressed.
#[cfg(feature = "compression")]
pub fn maybe_compress(data: &[u8]) -> Result<Option<Vec<u8>>, CompressionError> {
    if data.len() < MIN_COMPRESS_BYTES {
        return Ok(None);
    }
    let compressed = compress_bytes(data)?;
    Ok((compressed.len() < data.len()).then_some(compressed))
}

// ============================================================================
// Stub implementations when compression feature is disabled
// ============================================================================

/// Check if data is compressed (always false without feature).
#[cfg(not(feature = "compression"))]
#[inline]
#[must_use]
pub fn is_compressed(_data: &[u8]) -> bool {
    false
}

/// Never compresses without the feature.
#[cfg(not(feature = "compression"))]
pub fn maybe_compress(_data: &[u8]) -> Result<Option<Vec<u8>>, CompressionError> {
    Ok(None)
}

/// Rows flagged compressed cannot be read back without the feature.
#[cfg(not(feature = "compression"))]
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    if data.len() >= 4 && data[..4] == [0x28, 0xB5, 0x2F, 0xFD] {
        Err(CompressionError::DecompressFailed(
            "built without the `compression` feature".into(),
        ))
    } else {
        Ok(data.to_vec())
    }
}
