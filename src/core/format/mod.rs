//! On-disk archive format, version 1
//!
//! All integers are little-endian.
//!
//! ```text
//! HEADER      54 bytes, see [`Header`]
//! LEAF TABLE  LEAF_COUNT records, see [`Entry`]
//! PAYLOADS    stored leaf bytes, ascending, starting right after the table
//! SIGNATURE   64 bytes, Ed25519 over SHA-256 of everything above (zeros if unsigned)
//! ```
//!
//! Decoding reads the header and table only. Payload bytes are never touched
//! until a leaf is fetched.

pub mod entry;
pub mod header;
pub mod signature;

pub use entry::{Entry, DIGEST_LENGTH};
pub use header::{Header, FORMAT_VERSION, MAGIC, MAGIC_LENGTH};

use crate::error::{Result, SealError};
use crate::io::source_len;
use crate::keys::SIGNATURE_LENGTH;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use tracing::debug;

/// Parsed header and table plus the region boundaries derived from them
#[derive(Debug, Clone)]
pub struct Layout {
    pub header: Header,
    pub entries: Vec<Entry>,
    /// Offset of the first payload byte
    pub table_end: u64,
    /// Offset of the signature trailer, which is also the signed prefix length
    pub payload_end: u64,
}

impl Layout {
    /// Total encoded size including the signature
    pub fn total_len(&self) -> u64 {
        self.payload_end + SIGNATURE_LENGTH as u64
    }
}

/// Read header and leaf table from `source`, validating structure
pub fn decode<R: Read + Seek>(source: &mut R, magic: &[u8; MAGIC_LENGTH]) -> Result<Layout> {
    let total = source_len(source)?;
    let minimum = (Header::SIZE + SIGNATURE_LENGTH) as u64;
    if total < minimum {
        return Err(SealError::malformed(format!(
            "source is {total} bytes, an archive needs at least {minimum}"
        )));
    }

    source.seek(SeekFrom::Start(0))?;
    let mut header_bytes = [0u8; Header::SIZE];
    read_exact_or_malformed(source, &mut header_bytes, "header")?;
    let header = Header::from_bytes(&header_bytes, magic)?;

    // Every record needs at least MIN_SIZE bytes, so a count that cannot fit
    // is rejected before anything is allocated for it.
    let room = total - minimum;
    if header.leaf_count > room / Entry::MIN_SIZE as u64 {
        return Err(SealError::malformed(format!(
            "leaf count {} cannot fit in {room} bytes",
            header.leaf_count
        )));
    }

    let mut reader = BufReader::new((&mut *source).take(room));
    let mut entries = Vec::with_capacity(header.leaf_count as usize);
    let mut table_end = Header::SIZE as u64;
    for _ in 0..header.leaf_count {
        let entry = Entry::read_from(&mut reader)?;
        table_end += entry.encoded_len() as u64;
        entries.push(entry);
    }

    let mut payload_end = table_end;
    for entry in &entries {
        let end = entry.offset.checked_add(entry.length).ok_or_else(|| {
            SealError::malformed(format!("leaf '{}' extent overflows", entry.id))
        })?;
        if entry.offset < table_end {
            return Err(SealError::malformed(format!(
                "leaf '{}' starts at {} inside the table (ends at {table_end})",
                entry.id, entry.offset
            )));
        }
        payload_end = payload_end.max(end);
    }

    if total != payload_end + SIGNATURE_LENGTH as u64 {
        return Err(SealError::malformed(format!(
            "source is {total} bytes, layout expects {}",
            payload_end + SIGNATURE_LENGTH as u64
        )));
    }

    debug!(
        leaves = entries.len(),
        table_end, payload_end, "decoded archive layout"
    );

    Ok(Layout {
        header,
        entries,
        table_end,
        payload_end,
    })
}

/// `read_exact` that reports a short source as a malformed archive
pub(crate) fn read_exact_or_malformed<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SealError::malformed(format!("truncated {what}")),
        _ => SealError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Flags;
    use std::io::Cursor;
    use std::sync::Arc;

    fn archive_bytes(ids: &[(&str, &[u8])]) -> Vec<u8> {
        let mut header = Header::default();
        header.leaf_count = ids.len() as u64;

        let table_len: usize = ids
            .iter()
            .map(|(id, _)| Entry::encoded_len_for(id.len(), false))
            .sum();
        let mut offset = (Header::SIZE + table_len) as u64;

        let mut out = header.to_bytes().to_vec();
        for (id, data) in ids {
            let entry = Entry {
                id: Arc::from(*id),
                offset,
                length: data.len() as u64,
                flags: Flags::empty(),
                content_version: 0,
                digest: None,
            };
            entry.write_to(&mut out);
            offset += data.len() as u64;
        }
        for (_, data) in ids {
            out.extend_from_slice(data);
        }
        out.extend_from_slice(&[0u8; SIGNATURE_LENGTH]);
        out
    }

    #[test]
    fn test_decode_layout() {
        let bytes = archive_bytes(&[("a", b"hello"), ("b", b"")]);
        let layout = decode(&mut Cursor::new(&bytes), &MAGIC).unwrap();

        assert_eq!(layout.entries.len(), 2);
        assert_eq!(&*layout.entries[0].id, "a");
        assert_eq!(layout.entries[0].offset, layout.table_end);
        assert_eq!(layout.total_len(), bytes.len() as u64);
    }

    #[test]
    fn test_empty_archive() {
        let bytes = archive_bytes(&[]);
        assert_eq!(bytes.len(), Header::SIZE + SIGNATURE_LENGTH);

        let layout = decode(&mut Cursor::new(&bytes), &MAGIC).unwrap();
        assert!(layout.entries.is_empty());
        assert_eq!(layout.payload_end, Header::SIZE as u64);
    }

    #[test]
    fn test_every_truncation_is_malformed() {
        let bytes = archive_bytes(&[("first", b"0123456789"), ("second", b"abc")]);
        for cut in 0..bytes.len() {
            let err = decode(&mut Cursor::new(&bytes[..cut]), &MAGIC).unwrap_err();
            assert!(matches!(err, SealError::Malformed(_)), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn test_trailing_garbage_is_malformed() {
        let mut bytes = archive_bytes(&[("a", b"x")]);
        bytes.push(0);
        assert!(matches!(
            decode(&mut Cursor::new(&bytes), &MAGIC),
            Err(SealError::Malformed(_))
        ));
    }

    #[test]
    fn test_huge_leaf_count_rejected() {
        let mut bytes = archive_bytes(&[]);
        bytes[46..54].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            decode(&mut Cursor::new(&bytes), &MAGIC),
            Err(SealError::Malformed(_))
        ));
    }

    #[test]
    fn test_offset_inside_table_rejected() {
        let mut bytes = archive_bytes(&[("a", b"xyz")]);
        // offset field of the first record: header + id_len + id + version + flags
        let at = Header::SIZE + 4 + 1 + 1 + 4;
        bytes[at..at + 8].copy_from_slice(&0u64.to_le_bytes());
        assert!(matches!(
            decode(&mut Cursor::new(&bytes), &MAGIC),
            Err(SealError::Malformed(_))
        ));
    }
}
