//! Ed25519 key material for signing and verifying archives
//!
//! A [`KeyMaterial`] always knows its verifying key. When it was built from a
//! secret key it can also sign; loaders only ever need the verifying half.
//!
//! Key files used by the CLI:
//! - `*.sk` - 32 byte secret key
//! - `*.pk` - 32 byte verifying key
//! - `*.kp` - 64 byte keypair (secret followed by verifying key)

use crate::error::{Result, SealError};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Length of a secret (signing) key
pub const SECRET_KEY_LENGTH: usize = ed25519_dalek::SECRET_KEY_LENGTH;

/// Length of a public (verifying) key
pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Length of a keypair file
pub const KEYPAIR_LENGTH: usize = SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH;

/// Length of an archive signature
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

#[derive(Clone)]
pub struct KeyMaterial {
    verifying: VerifyingKey,
    signing: Option<SigningKey>,
}

impl KeyMaterial {
    /// Generate a fresh signing key from the OS random source
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        KeyMaterial {
            verifying: signing.verifying_key(),
            signing: Some(signing),
        }
    }

    /// Build verify-only key material from exactly 32 raw bytes
    pub fn from_verifying_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            SealError::ParseError(format!(
                "verifying key must be {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        let verifying = VerifyingKey::from_bytes(bytes)
            .map_err(|e| SealError::ParseError(format!("invalid verifying key: {e}")))?;

        Ok(KeyMaterial {
            verifying,
            signing: None,
        })
    }

    /// Build signing key material from exactly 32 raw secret bytes
    pub fn from_signing_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; SECRET_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            SealError::ParseError(format!(
                "signing key must be {SECRET_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        let signing = SigningKey::from_bytes(bytes);
        Ok(KeyMaterial {
            verifying: signing.verifying_key(),
            signing: Some(signing),
        })
    }

    /// Build key material from a 64 byte keypair, checking both halves agree
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; KEYPAIR_LENGTH] = bytes.try_into().map_err(|_| {
            SealError::ParseError(format!(
                "keypair must be {KEYPAIR_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        let signing = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| SealError::ParseError(format!("invalid keypair: {e}")))?;

        Ok(KeyMaterial {
            verifying: signing.verifying_key(),
            signing: Some(signing),
        })
    }

    /// Build key material from optional raw halves.
    ///
    /// At least one half must be given. When both are given they must belong
    /// to the same keypair.
    pub fn from_parts(verifying: Option<&[u8]>, signing: Option<&[u8]>) -> Result<Self> {
        match (verifying, signing) {
            (None, None) => Err(SealError::NullParameter("verifying or signing key")),
            (Some(vk), None) => Self::from_verifying_bytes(vk),
            (None, Some(sk)) => Self::from_signing_bytes(sk),
            (Some(vk), Some(sk)) => {
                let keys = Self::from_signing_bytes(sk)?;
                let expected = Self::from_verifying_bytes(vk)?;
                if keys.verifying != expected.verifying {
                    return Err(SealError::ParseError(
                        "verifying key does not match signing key".to_string(),
                    ));
                }
                Ok(keys)
            }
        }
    }

    /// Read a 32 byte verifying key from a stream
    pub fn read_verifying<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        reader.read_exact(&mut bytes)?;
        Self::from_verifying_bytes(&bytes)
    }

    /// Read a 32 byte secret key from a stream
    pub fn read_signing<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = [0u8; SECRET_KEY_LENGTH];
        reader.read_exact(&mut bytes)?;
        Self::from_signing_bytes(&bytes)
    }

    /// Read a 64 byte keypair from a stream
    pub fn read_keypair<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = [0u8; KEYPAIR_LENGTH];
        reader.read_exact(&mut bytes)?;
        Self::from_keypair_bytes(&bytes)
    }

    /// Load signing material from a `.sk` (32 byte) or `.kp` (64 byte) file
    pub fn load_signing_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        match bytes.len() {
            SECRET_KEY_LENGTH => Self::from_signing_bytes(&bytes),
            KEYPAIR_LENGTH => Self::from_keypair_bytes(&bytes),
            other => Err(SealError::ParseError(format!(
                "{} holds {other} bytes, expected a {SECRET_KEY_LENGTH} byte secret key \
                 or {KEYPAIR_LENGTH} byte keypair",
                path.as_ref().display()
            ))),
        }
    }

    /// Load verify-only material from a `.pk` (32 byte) or `.kp` (64 byte) file
    pub fn load_verifying_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        match bytes.len() {
            PUBLIC_KEY_LENGTH => Self::from_verifying_bytes(&bytes),
            KEYPAIR_LENGTH => Ok(Self::from_keypair_bytes(&bytes)?.to_verifying()),
            other => Err(SealError::ParseError(format!(
                "{} holds {other} bytes, expected a {PUBLIC_KEY_LENGTH} byte verifying key \
                 or {KEYPAIR_LENGTH} byte keypair",
                path.as_ref().display()
            ))),
        }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    pub fn verifying_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.verifying.to_bytes()
    }

    /// Secret key bytes, if this material can sign
    pub fn signing_bytes(&self) -> Option<[u8; SECRET_KEY_LENGTH]> {
        self.signing.as_ref().map(SigningKey::to_bytes)
    }

    /// Keypair bytes (secret followed by verifying key), if this material can sign
    pub fn keypair_bytes(&self) -> Option<[u8; KEYPAIR_LENGTH]> {
        self.signing.as_ref().map(SigningKey::to_keypair_bytes)
    }

    pub fn can_sign(&self) -> bool {
        self.signing.is_some()
    }

    /// Drop the secret half, keeping only what a loader needs
    pub fn to_verifying(&self) -> Self {
        KeyMaterial {
            verifying: self.verifying,
            signing: None,
        }
    }

    /// SHA-256 fingerprint of the verifying key, hex encoded
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.verifying_bytes())
    }

    /// Sign a message with the secret half
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signing = self
            .signing
            .as_ref()
            .ok_or(SealError::MissingFeature("signing key"))?;

        signing
            .try_sign(message)
            .map_err(|e| SealError::Crypto(format!("signing failed: {e}")))
    }
}

/// SHA-256 fingerprint of raw verifying key bytes, hex encoded
pub fn fingerprint(verifying_bytes: &[u8; PUBLIC_KEY_LENGTH]) -> String {
    hex::encode(Sha256::digest(verifying_bytes))
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.verifying == other.verifying
    }
}

impl Eq for KeyMaterial {}
