use crate::compression::MAX_DECOMPRESSED_SIZE;
use crate::error::Result;
use crate::format::{MAGIC, MAGIC_LENGTH};
use crate::keys::KeyMaterial;
use std::io::Read;

/// Settings for opening an [`Archive`](super::Archive)
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Magic the archive must start with
    pub magic: [u8; MAGIC_LENGTH],

    /// Key that signatures are checked against. Without one, nothing verifies.
    pub keys: Option<KeyMaterial>,

    /// Number of decoded leaves kept in memory. Zero disables the cache.
    pub cache_capacity: usize,

    /// Verify on open and refuse archives that do not verify
    pub require_signature: bool,

    /// Largest decompressed leaf a fetch will allocate for. Size prefixes
    /// are read before anything is verified, so keep this near the largest
    /// leaf you expect.
    pub max_leaf_size: usize,
}

impl ArchiveConfig {
    pub fn new() -> Self {
        ArchiveConfig {
            magic: MAGIC,
            keys: None,
            cache_capacity: 0,
            require_signature: false,
            max_leaf_size: MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Set the verifying key. Any secret half is dropped.
    pub fn verifying_key(mut self, keys: KeyMaterial) -> Self {
        self.keys = Some(keys.to_verifying());
        self
    }

    /// Read a 32 byte verifying key from `reader`
    pub fn load_verifying_key<R: Read>(mut self, reader: R) -> Result<Self> {
        self.keys = Some(KeyMaterial::read_verifying(reader)?);
        Ok(self)
    }

    pub fn magic(mut self, magic: [u8; MAGIC_LENGTH]) -> Self {
        self.magic = magic;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn require_signature(mut self, required: bool) -> Self {
        self.require_signature = required;
        self
    }

    /// Cap decompressed leaf sizes, clamped to the library maximum
    pub fn max_leaf_size(mut self, bytes: usize) -> Self {
        self.max_leaf_size = bytes.min(MAX_DECOMPRESSED_SIZE);
        self
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::new()
    }
}
