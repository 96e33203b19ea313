//! Bit flags carried by archive headers and leaf table entries
//!
//! The upper 16 bits are reserved for the library and describe how a leaf is
//! stored. The lower 16 bits are free for callers and round-trip untouched.
//!
//! ```text
//! bit 31  LZ4      leaf payload is LZ4 compressed
//! bit 30  ZSTD     leaf payload is Zstd compressed
//! bit 29  DIGEST   table entry is followed by a SHA-256 of the stored bytes
//! bit 28  SIGNED   (header) archive carries a signature
//! ```

use crate::error::{Result, SealError};
use std::fmt;

#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Flags(u32);

impl Flags {
    /// Bits reserved for library use
    pub const RESERVED_MASK: u32 = 0xFFFF_0000;

    /// Size of a flags field on disk
    pub const BYTES: usize = 4;

    pub const LZ4: u32 = 1 << 31;
    pub const ZSTD: u32 = 1 << 30;
    pub const DIGEST: u32 = 1 << 29;
    pub const SIGNED: u32 = 1 << 28;

    /// Both compression bits
    pub const COMPRESSION_MASK: u32 = Self::LZ4 | Self::ZSTD;

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Caller-owned lower 16 bits
    pub const fn user_bits(self) -> u32 {
        self.0 & !Self::RESERVED_MASK
    }

    pub const fn contains(self, bit: u32) -> bool {
        (self.0 & bit) == bit && bit != 0
    }

    /// Set or clear user bits. Touching the reserved range is rejected.
    pub fn set(&mut self, bits: u32, on: bool) -> Result<()> {
        if bits & Self::RESERVED_MASK != 0 {
            return Err(SealError::ParseError(format!(
                "bits {bits:#010x} fall inside the reserved flag range"
            )));
        }
        self.force_set(bits, on);
        Ok(())
    }

    pub(crate) fn force_set(&mut self, bits: u32, on: bool) {
        if on {
            self.0 |= bits;
        } else {
            self.0 &= !bits;
        }
    }

    /// Builder-style variant of [`force_set`](Self::force_set) for library bits
    pub const fn with(self, bits: u32) -> Self {
        Flags(self.0 | bits)
    }
}

impl From<u32> for Flags {
    fn from(bits: u32) -> Self {
        Flags(bits)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compressed = if self.contains(Self::LZ4) {
            'L'
        } else if self.contains(Self::ZSTD) {
            'Z'
        } else {
            '-'
        };
        let digest = if self.contains(Self::DIGEST) { 'D' } else { '-' };
        let signed = if self.contains(Self::SIGNED) { 'S' } else { '-' };

        write!(f, "[{compressed}{digest}{signed}] {:#06x}", self.user_bits())
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({self} : {:#034b})", self.0)
    }
}
