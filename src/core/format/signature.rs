//! Archive signatures
//!
//! The signature is an Ed25519 signature over the SHA-256 digest of every
//! byte that precedes it. Hashing first lets both sides stream the archive
//! instead of holding it in memory.

use crate::error::{Result, SealError};
use crate::io::hash_prefix;
use crate::keys::{KeyMaterial, SIGNATURE_LENGTH};
use ed25519_dalek::{Signature, VerifyingKey};
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// Length of the SHA-256 digest that gets signed
pub const SIGNED_DIGEST_LENGTH: usize = 32;

/// Signature trailer for unsigned archives
pub const EMPTY_SIGNATURE: [u8; SIGNATURE_LENGTH] = [0u8; SIGNATURE_LENGTH];

/// Sign a prefix digest
pub fn sign_digest(
    keys: &KeyMaterial,
    digest: &[u8; SIGNED_DIGEST_LENGTH],
) -> Result<[u8; SIGNATURE_LENGTH]> {
    Ok(keys.sign(digest)?.to_bytes())
}

/// Check a signature over a prefix digest using strict verification
pub fn verify_digest(
    verifying_key: &VerifyingKey,
    digest: &[u8; SIGNED_DIGEST_LENGTH],
    signature: &[u8; SIGNATURE_LENGTH],
) -> Result<()> {
    let signature = Signature::from_bytes(signature);
    verifying_key
        .verify_strict(digest, &signature)
        .map_err(|e| SealError::Crypto(format!("signature verification failed: {e}")))
}

/// Verify the signature of an archive whose signed prefix is `prefix_len` bytes
///
/// The source must hold exactly `prefix_len + SIGNATURE_LENGTH` bytes, which
/// the decoder has already checked.
pub fn verify_source<R: Read + Seek>(
    source: &mut R,
    prefix_len: u64,
    verifying_key: &VerifyingKey,
) -> Result<()> {
    let digest = hash_prefix(source, prefix_len)?;

    let mut signature = [0u8; SIGNATURE_LENGTH];
    source.seek(SeekFrom::Start(prefix_len))?;
    source.read_exact(&mut signature)?;

    debug!(prefix_len, digest = %hex::encode(digest), "verifying archive signature");
    verify_digest(verifying_key, &digest, &signature)
}
