//! Batch payload encoding.
//!
//! A batch file holds either the raw concatenated record layout or a single
//! LZ4 frame wrapping those same bytes. The frame is a 4-byte little-endian
//! uncompressed length followed by one LZ4 block, which is the layout
//! `lz4_flex::block::decompress_size_prepended` understands.
//!
//! The reader must be configured with the same [`CompressionType`] as the
//! writer; nothing in the file says which one was used.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tick_core::{encode_records, Record, RecorderError, Result};

/// Width of the uncompressed-length prefix on an LZ4 frame.
const SIZE_PREFIX_LEN: usize = 4;

/// Upper bound on the LZ4 decompression ratio.
const MAX_EXPANSION: usize = 255;

/// Compression algorithm for batch files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Raw record bytes
    #[default]
    None,
    /// Size-prefixed LZ4 block
    Lz4,
}

impl CompressionType {
    /// Whether payloads are compressed
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Serialize a batch into the bytes that go on disk.
pub fn encode_payload(records: &[Record], compression: CompressionType) -> Result<Vec<u8>> {
    let raw = encode_records(records);
    match compression {
        CompressionType::None => Ok(raw),
        CompressionType::Lz4 => compress_frame(&raw),
    }
}

/// Undo [`encode_payload`], returning the raw record bytes.
pub fn decode_payload(bytes: Vec<u8>, compression: CompressionType, path: &Path) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(bytes),
        CompressionType::Lz4 => decompress_frame(&bytes, path),
    }
}

fn compress_frame(raw: &[u8]) -> Result<Vec<u8>> {
    let uncompressed_len = u32::try_from(raw.len()).map_err(|_| {
        RecorderError::Compression(format!(
            "batch of {} bytes exceeds the {} byte frame limit",
            raw.len(),
            u32::MAX
        ))
    })?;

    // Worst case is known before compressing, so allocate once.
    let bound = SIZE_PREFIX_LEN + lz4_flex::block::get_maximum_output_size(raw.len());
    let mut frame = vec![0u8; bound];
    frame[..SIZE_PREFIX_LEN].copy_from_slice(&uncompressed_len.to_le_bytes());

    let written = lz4_flex::block::compress_into(raw, &mut frame[SIZE_PREFIX_LEN..])
        .map_err(|e| RecorderError::Compression(e.to_string()))?;
    frame.truncate(SIZE_PREFIX_LEN + written);
    Ok(frame)
}

fn decompress_frame(frame: &[u8], path: &Path) -> Result<Vec<u8>> {
    let Some(prefix) = frame.get(..SIZE_PREFIX_LEN) else {
        return Err(RecorderError::Corrupt {
            path: path.to_path_buf(),
            reason: "unknown decompressed size: frame shorter than its size prefix".into(),
        });
    };

    let mut size = [0u8; SIZE_PREFIX_LEN];
    size.copy_from_slice(prefix);
    let expected = u32::from_le_bytes(size) as usize;
    let block = &frame[SIZE_PREFIX_LEN..];

    // LZ4 cannot expand input by more than MAX_EXPANSION; larger claims are
    // corrupt and must not drive the output allocation.
    if expected > block.len().saturating_mul(MAX_EXPANSION) + MAX_EXPANSION {
        return Err(RecorderError::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "size prefix claims {expected} bytes from a {} byte block",
                block.len()
            ),
        });
    }

    let decompressed = lz4_flex::block::decompress(block, expected).map_err(
        |e| RecorderError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("LZ4 decompression failed: {e}"),
        },
    )?;

    if decompressed.len() != expected {
        return Err(RecorderError::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "decompressed size mismatch: got {} bytes, expected {}",
                decompressed.len(),
                expected
            ),
        });
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tick_core::{decode_records, Timestamp};

    fn sample_batch(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(100.0 + i as f64, i as i64, Timestamp::from_nanos(i as i64)))
            .collect()
    }

    #[test]
    fn test_uncompressed_is_raw_layout() {
        let batch = sample_batch(3);
        let payload = encode_payload(&batch, CompressionType::None).unwrap();
        assert_eq!(payload, encode_records(&batch));
    }

    #[test]
    fn test_lz4_frame_carries_size() {
        let batch = sample_batch(500);
        let payload = encode_payload(&batch, CompressionType::Lz4).unwrap();

        let prefix = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        assert_eq!(prefix as usize, 500 * tick_core::RECORD_SIZE);
        assert!(
            payload.len() < prefix as usize,
            "repetitive batch should compress"
        );

        let raw = decode_payload(payload, CompressionType::Lz4, Path::new("mem")).unwrap();
        assert_eq!(decode_records(&raw).records, batch);
    }

    #[test]
    fn test_empty_batch_frame() {
        let payload = encode_payload(&[], CompressionType::Lz4).unwrap();
        let raw = decode_payload(payload, CompressionType::Lz4, Path::new("mem")).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn test_truncated_frame_is_corrupt() {
        let err = decode_payload(vec![1, 2], CompressionType::Lz4, Path::new("short.bin"))
            .unwrap_err();
        assert!(matches!(err, RecorderError::Corrupt { .. }));
        assert!(err.to_string().contains("unknown decompressed size"));
    }

    #[test]
    fn test_garbage_frame_is_corrupt() {
        let mut payload = encode_payload(&sample_batch(50), CompressionType::Lz4).unwrap();
        // Claim a much larger size than the block decodes to.
        payload[..4].copy_from_slice(&(1_000_000u32).to_le_bytes());
        let result = decode_payload(payload, CompressionType::Lz4, Path::new("bad.bin"));
        assert!(matches!(result, Err(RecorderError::Corrupt { .. })));
    }

    #[test]
    fn test_implausible_size_prefix_is_corrupt() {
        let mut frame = u32::MAX.to_le_bytes().to_vec();
        frame.extend_from_slice(&[0x10, 0x41]);
        let err = decode_payload(frame, CompressionType::Lz4, Path::new("huge.bin")).unwrap_err();
        assert!(err.to_string().contains("size prefix claims"));
    }

    #[test]
    fn test_is_enabled() {
        assert!(CompressionType::Lz4.is_enabled());
        assert!(!CompressionType::None.is_enabled());
        assert_eq!(CompressionType::default(), CompressionType::None);
    }
}
