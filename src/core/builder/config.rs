use crate::error::Result;
use crate::flags::Flags;
use crate::format::{MAGIC, MAGIC_LENGTH};
use crate::keys::KeyMaterial;
use std::io::Read;

/// Settings for a [`Builder`](super::Builder)
///
/// # Examples
///
/// ```rust
/// use sealpack::{BuilderConfig, Flags, KeyMaterial};
///
/// let config = BuilderConfig::new()
///     .keys(KeyMaterial::generate())
///     .flags(Flags::from_bits(0x0001))
///     .magic(*b"MYGAME\x00\x01");
/// assert!(config.will_sign());
/// ```
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Key material used to sign the archive. Must be able to sign.
    pub keys: Option<KeyMaterial>,

    /// Archive flags. Setting `Flags::SIGNED` makes a missing key an error.
    pub flags: Flags,

    pub magic: [u8; MAGIC_LENGTH],
}

impl BuilderConfig {
    pub fn new() -> Self {
        BuilderConfig {
            keys: None,
            flags: Flags::empty(),
            magic: MAGIC,
        }
    }

    pub fn keys(mut self, keys: KeyMaterial) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn magic(mut self, magic: [u8; MAGIC_LENGTH]) -> Self {
        self.magic = magic;
        self
    }

    /// Read a 32 byte secret key from `reader`
    pub fn load_signing_key<R: Read>(mut self, reader: R) -> Result<Self> {
        self.keys = Some(KeyMaterial::read_signing(reader)?);
        Ok(self)
    }

    /// Read a 64 byte keypair from `reader`
    pub fn load_keypair<R: Read>(mut self, reader: R) -> Result<Self> {
        self.keys = Some(KeyMaterial::read_keypair(reader)?);
        Ok(self)
    }

    /// Whether dumps will carry a signature
    pub fn will_sign(&self) -> bool {
        self.keys.as_ref().is_some_and(KeyMaterial::can_sign)
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::new()
    }
}
