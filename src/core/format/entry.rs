use super::read_exact_or_malformed;
use crate::error::{Result, SealError};
use crate::flags::Flags;
use crate::validation::LeafId;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Length of a per-leaf SHA-256 digest
pub const DIGEST_LENGTH: usize = 32;

/// One record of the leaf table
///
/// ```text
/// [ID_LEN: u32][ID][CONTENT_VERSION: u8][FLAGS: u32][OFFSET: u64][LENGTH: u64]
/// [DIGEST: 32]   only when FLAGS has DIGEST
/// ```
///
/// `offset` is absolute within the archive. `length` is the number of stored
/// bytes, which for compressed leaves is the compressed size.
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: Arc<str>,
    pub offset: u64,
    pub length: u64,
    pub flags: Flags,
    pub content_version: u8,
    pub digest: Option<[u8; DIGEST_LENGTH]>,
}

impl Entry {
    /// Smallest possible record: an empty id and no digest
    pub const MIN_SIZE: usize = 4 + 1 + Flags::BYTES + 8 + 8;

    /// Size of this record on disk
    pub fn encoded_len(&self) -> usize {
        Self::encoded_len_for(self.id.len(), self.digest.is_some())
    }

    pub(crate) fn encoded_len_for(id_len: usize, has_digest: bool) -> usize {
        Self::MIN_SIZE + id_len + if has_digest { DIGEST_LENGTH } else { 0 }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.bits() & Flags::COMPRESSION_MASK != 0
    }

    /// Exclusive end of the stored bytes
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Append the encoded record to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.id.len() as u32).to_le_bytes());
        out.extend_from_slice(self.id.as_bytes());
        out.push(self.content_version);
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        if let Some(digest) = &self.digest {
            out.extend_from_slice(digest);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }

    /// Decode one record. Any truncation or invalid id is reported as malformed.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut word = [0u8; 4];
        read_exact_or_malformed(reader, &mut word, "leaf id length")?;
        let id_len = u32::from_le_bytes(word) as usize;

        if id_len > LeafId::MAX_LENGTH {
            return Err(SealError::malformed(format!(
                "leaf id length {id_len} exceeds {}",
                LeafId::MAX_LENGTH
            )));
        }

        let mut id = vec![0u8; id_len];
        read_exact_or_malformed(reader, &mut id, "leaf id")?;
        let id = String::from_utf8(id)
            .map_err(|_| SealError::malformed("leaf id is not valid UTF-8"))?;

        let mut fixed = [0u8; 1 + Flags::BYTES + 8 + 8];
        read_exact_or_malformed(reader, &mut fixed, "leaf record")?;

        let content_version = fixed[0];
        let flags = Flags::from_bits(u32::from_le_bytes([fixed[1], fixed[2], fixed[3], fixed[4]]));

        let mut word = [0u8; 8];
        word.copy_from_slice(&fixed[5..13]);
        let offset = u64::from_le_bytes(word);
        word.copy_from_slice(&fixed[13..21]);
        let length = u64::from_le_bytes(word);

        let digest = if flags.contains(Flags::DIGEST) {
            let mut digest = [0u8; DIGEST_LENGTH];
            read_exact_or_malformed(reader, &mut digest, "leaf digest")?;
            Some(digest)
        } else {
            None
        };

        Ok(Entry {
            id: Arc::from(id),
            offset,
            length,
            flags,
            content_version,
            digest,
        })
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("flags", &self.flags)
            .field("content_version", &self.content_version)
            .field("digest", &self.digest.as_ref().map(hex::encode))
            .finish()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} v{} {} bytes @ {}",
            self.flags, self.id, self.content_version, self.length, self.offset
        )
    }
}
