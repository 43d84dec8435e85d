// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! On-disk record format for the cold tier.
//!
//! Every evicted key is stored as a single value:
//!
//! ```text
//! ┌──────────────────┬────────────────────┬───────────────────────┐
//! │ expiry_ms (i64)  │ payload_len (u32)  │ payload (payload_len) │
//! │ 8 bytes, LE      │ 4 bytes, LE        │ opaque host snapshot  │
//! └──────────────────┴────────────────────┴───────────────────────┘
//! ```
//!
//! `expiry_ms == 0` means the key never expires. Anything positive is an
//! absolute Unix epoch timestamp in milliseconds.
//!
//! # Example
//!
//! ```
//! use cold_tier::Record;
//!
//! let record = Record::new(1_700_000_005_000, vec![0x01, 0x02, 0x03]);
//! let bytes = record.encode().unwrap();
//! assert_eq!(bytes.len(), 12 + 3);
//!
//! let decoded = Record::decode(&bytes).unwrap();
//! assert_eq!(decoded, record);
//! assert!(decoded.is_expired_at(1_700_000_005_000));
//! assert!(!decoded.is_expired_at(1_700_000_004_999));
//! ```

use thiserror::Error;

use crate::host::KeyTtl;

/// Size of the fixed header (expiry + payload length).
pub const HEADER_LEN: usize = 8 + 4;

/// TTLs at or beyond this are treated as nonsense and stored as "no expiry".
pub const MAX_TTL_MS: i64 = 365 * 24 * 60 * 60 * 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("record truncated: {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated { len: usize },
    #[error("record length mismatch: header declares {declared} payload bytes, {actual} present")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("payload of {0} bytes does not fit a 32-bit length field")]
    PayloadTooLarge(usize),
    /// The store could not hand back the record bytes at all.
    #[error("stored record is unreadable: {0}")]
    Unreadable(String),
}

/// A decoded cold-tier record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Absolute expiry in epoch milliseconds, 0 for none.
    pub expiry_ms: i64,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(expiry_ms: i64, payload: Vec<u8>) -> Self {
        Self { expiry_ms, payload }
    }

    /// Serialize to the on-disk layout.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(self.expiry_ms, &self.payload)
    }

    /// Parse an on-disk value. Never panics; all input is untrusted.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (expiry_ms, payload) = decode(bytes)?;
        Ok(Self {
            expiry_ms,
            payload: payload.to_vec(),
        })
    }

    /// Whether the record has expired as of `now_ms`. The boundary is inclusive.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        is_expired(self.expiry_ms, now_ms)
    }

    /// Remaining TTL to hand back to the host on restore.
    ///
    /// Returns 0 for records without expiry, otherwise at least 1ms so a
    /// record that crossed its deadline between checks is not made permanent.
    #[must_use]
    pub fn remaining_ttl_ms(&self, now_ms: i64) -> i64 {
        if self.expiry_ms <= 0 {
            0
        } else {
            (self.expiry_ms - now_ms).max(1)
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Encode `(expiry_ms, payload)` into a single buffer.
pub fn encode(expiry_ms: i64, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&expiry_ms.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode a buffer into `(expiry_ms, payload)` borrowing the payload.
pub fn decode(bytes: &[u8]) -> Result<(i64, &[u8]), CodecError> {
    let (expiry, rest) = bytes
        .split_first_chunk::<8>()
        .ok_or(CodecError::Truncated { len: bytes.len() })?;
    let (len, payload) = rest
        .split_first_chunk::<4>()
        .ok_or(CodecError::Truncated { len: bytes.len() })?;

    let declared = u32::from_le_bytes(*len) as usize;
    if payload.len() != declared {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    Ok((i64::from_le_bytes(*expiry), payload))
}

/// Read only the expiry field, validating the overall length.
///
/// Used by the sweeper so it never copies payloads it is about to discard.
pub fn peek_expiry(bytes: &[u8]) -> Result<i64, CodecError> {
    decode(bytes).map(|(expiry, _)| expiry)
}

#[inline]
#[must_use]
pub fn is_expired(expiry_ms: i64, now_ms: i64) -> bool {
    expiry_ms > 0 && expiry_ms <= now_ms
}

/// Convert a host TTL reply into the absolute expiry to persist.
///
/// Only a positive remaining TTL under [`MAX_TTL_MS`] yields a deadline.
/// "No TTL", "key gone" and out-of-range replies all persist as 0.
#[must_use]
pub fn absolute_expiry(ttl: KeyTtl, now_ms: i64) -> i64 {
    match ttl {
        KeyTtl::Remaining(ms) if ms > 0 && ms < MAX_TTL_MS => now_ms.saturating_add(ms),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(NOW + 5000, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(bytes.len(), 15);
        assert_eq!(&bytes[..8], &(NOW + 5000).to_le_bytes());
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
        assert_eq!(&bytes[12..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let record = Record::new(0, Vec::new());
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Record::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_truncated_header() {
        for len in 0..HEADER_LEN {
            let bytes = vec![0u8; len];
            assert_eq!(decode(&bytes), Err(CodecError::Truncated { len }));
        }
    }

    #[test]
    fn test_length_mismatch_short_and_long() {
        let mut bytes = encode(42, b"hello").unwrap();
        bytes.pop();
        assert_eq!(
            decode(&bytes),
            Err(CodecError::LengthMismatch { declared: 5, actual: 4 })
        );

        let mut bytes = encode(42, b"hello").unwrap();
        bytes.push(0xFF);
        assert_eq!(
            decode(&bytes),
            Err(CodecError::LengthMismatch { declared: 5, actual: 6 })
        );
    }

    #[test]
    fn test_huge_declared_length_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"tiny");
        assert!(matches!(decode(&bytes), Err(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let record = Record::new(NOW, vec![1]);
        assert!(record.is_expired_at(NOW));
        assert!(record.is_expired_at(NOW + 1));
        assert!(!record.is_expired_at(NOW - 1));

        let forever = Record::new(0, vec![1]);
        assert!(!forever.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_remaining_ttl_clamps_to_one() {
        assert_eq!(Record::new(NOW + 2500, vec![]).remaining_ttl_ms(NOW), 2500);
        assert_eq!(Record::new(NOW, vec![]).remaining_ttl_ms(NOW + 10), 1);
        assert_eq!(Record::new(0, vec![]).remaining_ttl_ms(NOW), 0);
    }

    #[test]
    fn test_absolute_expiry_conversion() {
        assert_eq!(absolute_expiry(KeyTtl::Remaining(5000), NOW), NOW + 5000);
        assert_eq!(absolute_expiry(KeyTtl::NoExpiry, NOW), 0);
        assert_eq!(absolute_expiry(KeyTtl::Missing, NOW), 0);
        assert_eq!(absolute_expiry(KeyTtl::Remaining(0), NOW), 0);
        assert_eq!(absolute_expiry(KeyTtl::Remaining(-7), NOW), 0);
        assert_eq!(absolute_expiry(KeyTtl::Remaining(MAX_TTL_MS), NOW), 0);
        assert_eq!(absolute_expiry(KeyTtl::Remaining(MAX_TTL_MS - 1), NOW), NOW + MAX_TTL_MS - 1);
    }

    #[test]
    fn test_peek_expiry() {
        let bytes = encode(NOW, b"abc").unwrap();
        assert_eq!(peek_expiry(&bytes), Ok(NOW));
        assert!(peek_expiry(&bytes[..5]).is_err());
    }
}
