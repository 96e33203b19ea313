//! Per-leaf compression
//!
//! A leaf asks for compression through its `LZ4` or `ZSTD` flag bit. The
//! builder compresses the payload and keeps the result only when it is
//! strictly smaller than the input; otherwise the payload is stored raw and
//! the bit is cleared, so the flag always describes the stored bytes.
//!
//! - LZ4 payloads carry their decompressed size as a 4 byte prefix
//! - Zstd payloads are single frames with the content size recorded

use crate::error::{Result, SealError};
use crate::flags::Flags;
use tracing::error;

/// Zstd level used when packing
pub const ZSTD_LEVEL: i32 = 3;

/// Upper bound on a decompressed leaf. Guards against frames that claim
/// absurd sizes.
pub const MAX_DECOMPRESSED_SIZE: usize = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Stored raw
    None,
    /// LZ4 (fast, moderate ratio)
    Lz4,
    /// Zstd (slower, better ratio)
    Zstd,
}

impl CompressionMethod {
    /// Method described by a leaf's flags. LZ4 wins if both bits are set.
    pub fn from_flags(flags: Flags) -> Self {
        if flags.contains(Flags::LZ4) {
            CompressionMethod::Lz4
        } else if flags.contains(Flags::ZSTD) {
            CompressionMethod::Zstd
        } else {
            CompressionMethod::None
        }
    }

    /// Flag bit for this method (zero for `None`)
    pub fn flag(self) -> u32 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Lz4 => Flags::LZ4,
            CompressionMethod::Zstd => Flags::ZSTD,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Zstd => "zstd",
        }
    }
}

impl std::str::FromStr for CompressionMethod {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(CompressionMethod::None),
            "lz4" => Ok(CompressionMethod::Lz4),
            "zstd" => Ok(CompressionMethod::Zstd),
            other => Err(SealError::ParseError(format!(
                "unknown compression method '{other}'"
            ))),
        }
    }
}

/// Compress data using the specified method
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionMethod::Zstd => zstd::bulk::compress(data, ZSTD_LEVEL).map_err(|e| {
            error!(error = %e, "zstd compression failed");
            SealError::Compression(format!("zstd compression failed: {e}"))
        }),
    }
}

/// Decompress data using the specified method
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    decompress_bounded(data, method, MAX_DECOMPRESSED_SIZE)
}

/// Decompress, refusing payloads that claim more than `limit` bytes
///
/// The claimed size is checked before any output buffer is allocated.
pub fn decompress_bounded(data: &[u8], method: CompressionMethod, limit: usize) -> Result<Vec<u8>> {
    let limit = limit.min(MAX_DECOMPRESSED_SIZE);
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => {
            if data.len() >= 4 {
                let claimed = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                if claimed > limit {
                    return Err(decompression_failed(
                        "lz4",
                        format!("claims {claimed} bytes, limit is {limit}"),
                    ));
                }
            }
            lz4_flex::decompress_size_prepended(data).map_err(|e| decompression_failed("lz4", e))
        }
        CompressionMethod::Zstd => {
            let capacity = match zstd::zstd_safe::get_frame_content_size(data) {
                Ok(Some(size)) if size <= limit as u64 => size as usize,
                Ok(Some(size)) => {
                    return Err(decompression_failed(
                        "zstd",
                        format!("claims {size} bytes, limit is {limit}"),
                    ))
                }
                _ => return Err(decompression_failed("zstd", "missing content size")),
            };
            zstd::bulk::decompress(data, capacity).map_err(|e| decompression_failed("zstd", e))
        }
    }
}

fn decompression_failed(method: &str, reason: impl std::fmt::Display) -> SealError {
    error!(method, %reason, "leaf decompression failed");
    SealError::Compression(format!("{method} decompression failed: {reason}"))
}

/// Compress according to `flags`, falling back to raw storage when it does
/// not pay off. Returns the stored bytes and the flags describing them.
pub fn compress_for_storage(data: &[u8], flags: Flags) -> Result<(Vec<u8>, Flags)> {
    let method = CompressionMethod::from_flags(flags);
    let mut stored_flags = flags;
    stored_flags.force_set(Flags::COMPRESSION_MASK, false);

    if method == CompressionMethod::None {
        return Ok((data.to_vec(), stored_flags));
    }

    let compressed = compress(data, method)?;
    if compressed.len() < data.len() {
        stored_flags.force_set(method.flag(), true);
        Ok((compressed, stored_flags))
    } else {
        Ok((data.to_vec(), stored_flags))
    }
}
