use crate::error::{Result, SealError};
use crate::flags::Flags;
use crate::keys::PUBLIC_KEY_LENGTH;

/// Default magic sequence: "SPAK\x00\x01\x00\x00"
pub const MAGIC: [u8; 8] = *b"SPAK\x00\x01\x00\x00";

/// Length of the magic sequence
pub const MAGIC_LENGTH: usize = 8;

/// Current on-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Archive header
///
/// Sits at offset 0 and is immediately followed by the leaf table.
///
/// ```text
/// [MAGIC: 8][VERSION: u16][FLAGS: u32][VERIFYING_KEY: 32][LEAF_COUNT: u64]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; MAGIC_LENGTH],

    pub version: u16,

    /// Archive flags. `Flags::SIGNED` is set when a signature is present.
    pub flags: Flags,

    /// Verifying key of the signer, all zero for unsigned archives
    pub verifying_key: [u8; PUBLIC_KEY_LENGTH],

    /// Number of entries in the leaf table
    pub leaf_count: u64,
}

impl Header {
    /// Encoded size in bytes
    pub const SIZE: usize = MAGIC_LENGTH + 2 + Flags::BYTES + PUBLIC_KEY_LENGTH + 8;

    pub fn new(magic: [u8; MAGIC_LENGTH]) -> Self {
        Header {
            magic,
            version: FORMAT_VERSION,
            flags: Flags::empty(),
            verifying_key: [0u8; PUBLIC_KEY_LENGTH],
            leaf_count: 0,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.flags.contains(Flags::SIGNED)
    }

    /// Validate magic and version against what the reader expects
    pub fn validate(&self, expected_magic: &[u8; MAGIC_LENGTH]) -> Result<()> {
        if &self.magic != expected_magic {
            return Err(SealError::InvalidMagic(self.magic));
        }

        if self.version != FORMAT_VERSION {
            return Err(SealError::UnsupportedVersion(self.version));
        }

        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let mut offset = 0;

        bytes[offset..offset + MAGIC_LENGTH].copy_from_slice(&self.magic);
        offset += MAGIC_LENGTH;

        bytes[offset..offset + 2].copy_from_slice(&self.version.to_le_bytes());
        offset += 2;

        bytes[offset..offset + Flags::BYTES].copy_from_slice(&self.flags.bits().to_le_bytes());
        offset += Flags::BYTES;

        bytes[offset..offset + PUBLIC_KEY_LENGTH].copy_from_slice(&self.verifying_key);
        offset += PUBLIC_KEY_LENGTH;

        bytes[offset..offset + 8].copy_from_slice(&self.leaf_count.to_le_bytes());

        bytes
    }

    /// Deserialize and validate a header
    pub fn from_bytes(bytes: &[u8], expected_magic: &[u8; MAGIC_LENGTH]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(SealError::malformed(format!(
                "header needs {} bytes, source has {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut header = Header::new(*expected_magic);
        let mut offset = 0;

        header
            .magic
            .copy_from_slice(&bytes[offset..offset + MAGIC_LENGTH]);
        offset += MAGIC_LENGTH;

        header.version = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;

        header.flags = Flags::from_bits(u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]));
        offset += Flags::BYTES;

        header
            .verifying_key
            .copy_from_slice(&bytes[offset..offset + PUBLIC_KEY_LENGTH]);
        offset += PUBLIC_KEY_LENGTH;

        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[offset..offset + 8]);
        header.leaf_count = u64::from_le_bytes(count);

        header.validate(expected_magic)?;

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(MAGIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(Header::SIZE, 54);
        assert_eq!(Header::default().to_bytes().len(), Header::SIZE);
    }

    #[test]
    fn test_header_serialization() {
        let mut header = Header::default();
        header.flags = Flags::from_bits(0x0042).with(Flags::SIGNED);
        header.verifying_key = [9u8; PUBLIC_KEY_LENGTH];
        header.leaf_count = 3;

        let bytes = header.to_bytes();
        assert_eq!(&bytes[..8], &MAGIC);

        let parsed = Header::from_bytes(&bytes, &MAGIC).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.is_signed());
    }

    #[test]
    fn test_invalid_magic() {
        let bytes = Header::new(*b"NOTSPAK!").to_bytes();
        assert!(matches!(
            Header::from_bytes(&bytes, &MAGIC),
            Err(SealError::InvalidMagic(m)) if &m == b"NOTSPAK!"
        ));
    }

    #[test]
    fn test_custom_magic() {
        let magic = *b"GAMEDATA";
        let bytes = Header::new(magic).to_bytes();
        assert!(Header::from_bytes(&bytes, &magic).is_ok());
        assert!(Header::from_bytes(&bytes, &MAGIC).is_err());
    }

    #[test]
    fn test_invalid_version() {
        let mut header = Header::default();
        header.version = 99;
        assert!(matches!(
            Header::from_bytes(&header.to_bytes(), &MAGIC),
            Err(SealError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_short_header() {
        let bytes = Header::default().to_bytes();
        assert!(matches!(
            Header::from_bytes(&bytes[..Header::SIZE - 1], &MAGIC),
            Err(SealError::Malformed(_))
        ));
    }
}
