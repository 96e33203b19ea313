//! Archive loader
//!
//! [`Archive`] parses the header and leaf table of any `Read + Seek` source
//! and serves leaves by id. The signature is checked lazily on the first
//! fetch (or eagerly with `require_signature`) and the verdict is memoized.
//!
//! Two fetch paths exist:
//! - [`Archive::fetch`] takes `&self` and locks the source for the read, so
//!   one archive can be shared across threads
//! - [`Archive::fetch_mut`] takes `&mut self` and never locks
//!
//! Digest checks and decompression run outside the source lock.

pub mod config;
pub mod resource;

pub use config::ArchiveConfig;
pub use resource::{LeafInfo, Resource};

use crate::cache::{CacheStats, CachedLeaf, ResourceCache};
use crate::compression::{decompress_bounded, CompressionMethod};
use crate::error::{Result, SealError};
use crate::flags::Flags;
use crate::format::signature::verify_source;
use crate::format::{self, Entry, Header};
use crate::io::{read_at, HashingWriter};
use crate::keys::{self, KeyMaterial};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an archive stands with respect to its signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum VerificationStatus {
    /// The archive carries no signature
    Unsigned,
    /// Signed, but no verifying key was configured
    NoKey,
    /// Signed and a key is configured, but nothing has triggered the check yet
    Pending,
    Verified,
    Failed,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VerificationStatus::Unsigned => "unsigned",
            VerificationStatus::NoKey => "signed (no key to verify)",
            VerificationStatus::Pending => "signed (not yet verified)",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "verification failed",
        };
        f.write_str(text)
    }
}

pub struct Archive<R> {
    source: Mutex<Option<R>>,
    header: Header,
    /// Table order, one record per distinct id
    entries: Vec<Entry>,
    index: HashMap<Arc<str>, usize>,
    payload_end: u64,
    config: ArchiveConfig,
    cache: ResourceCache,
    closed: AtomicBool,
}

impl<R: Read + Seek> Archive<R> {
    /// Parse an archive from `source`
    ///
    /// # Errors
    ///
    /// - `MalformedArchiveSource` for any structural problem
    /// - `CryptoError` when `require_signature` is set and the signature does not verify
    /// - `MissingFeature` when `require_signature` is set without a verifying key
    pub fn open(mut source: R, config: ArchiveConfig) -> Result<Self> {
        let layout = format::decode(&mut source, &config.magic)?;

        let mut entries: Vec<Entry> = Vec::with_capacity(layout.entries.len());
        let mut index: HashMap<Arc<str>, usize> = HashMap::with_capacity(layout.entries.len());
        for entry in layout.entries {
            match index.get(&entry.id) {
                Some(&position) => {
                    warn!(id = %entry.id, "duplicate leaf id in archive, later record wins");
                    entries[position] = entry;
                }
                None => {
                    index.insert(Arc::clone(&entry.id), entries.len());
                    entries.push(entry);
                }
            }
        }

        let archive = Archive {
            source: Mutex::new(Some(source)),
            header: layout.header,
            entries,
            index,
            payload_end: layout.payload_end,
            cache: ResourceCache::new(config.cache_capacity),
            config,
            closed: AtomicBool::new(false),
        };

        info!(
            leaves = archive.entries.len(),
            bytes = layout.payload_end + keys::SIGNATURE_LENGTH as u64,
            signed = archive.header.is_signed(),
            "opened archive"
        );

        if archive.config.require_signature {
            archive.verify()?;
        }

        Ok(archive)
    }

    /// Fetch a leaf, locking the source for the read
    pub fn fetch(&self, id: &str) -> Result<Resource> {
        self.ensure_open()?;
        let entry = self.lookup(id)?;

        if let Some(hit) = self.cache.get(id) {
            let signature = self.signature_locked()?;
            debug!(id, "fetched leaf from cache");
            return Ok(to_resource(entry, hit, signature));
        }

        let (stored, signature) = {
            let mut guard = self.source.lock();
            let source = guard.as_mut().ok_or(SealError::ArchiveClosed)?;
            let signature = signature_verdict(
                &self.cache,
                &self.header,
                self.config.keys.as_ref(),
                self.payload_end,
                source,
            )?;
            (read_at(source, entry.offset, entry.length)?, signature)
        };

        let leaf = self.decode(entry, stored, signature)?;
        self.cache.put(Arc::clone(&entry.id), leaf.clone());
        debug!(id, bytes = leaf.data.len(), "fetched leaf");
        Ok(to_resource(entry, leaf, signature))
    }

    /// Fetch a leaf without locking. Exclusive access comes from the borrow.
    pub fn fetch_mut(&mut self, id: &str) -> Result<Resource> {
        self.ensure_open()?;
        let entry = self.lookup(id)?.clone();

        let source = self
            .source
            .get_mut()
            .as_mut()
            .ok_or(SealError::ArchiveClosed)?;
        let signature = signature_verdict(
            &self.cache,
            &self.header,
            self.config.keys.as_ref(),
            self.payload_end,
            source,
        )?;

        if let Some(hit) = self.cache.get_mut(id) {
            debug!(id, "fetched leaf from cache");
            return Ok(to_resource(&entry, hit, signature));
        }

        let source = self
            .source
            .get_mut()
            .as_mut()
            .ok_or(SealError::ArchiveClosed)?;
        let stored = read_at(source, entry.offset, entry.length)?;

        let leaf = self.decode(&entry, stored, signature)?;
        self.cache.put_mut(Arc::clone(&entry.id), leaf.clone());
        debug!(id, bytes = leaf.data.len(), "fetched leaf");
        Ok(to_resource(&entry, leaf, signature))
    }

    /// Check the archive signature
    ///
    /// # Errors
    ///
    /// - `CryptoError` if the archive is unsigned or the signature does not verify
    /// - `MissingFeature` if no verifying key was configured
    pub fn verify(&self) -> Result<()> {
        if !self.header.is_signed() {
            return Err(SealError::Crypto("archive is not signed".to_string()));
        }
        if self.config.keys.is_none() {
            return Err(SealError::MissingFeature("verifying key"));
        }

        if self.signature_locked()? {
            Ok(())
        } else {
            Err(SealError::Crypto(format!(
                "signature does not verify against key {}",
                self.config
                    .keys
                    .as_ref()
                    .map(KeyMaterial::fingerprint)
                    .unwrap_or_default()
            )))
        }
    }

    /// Memoized verdict, taking the source lock only if it is not known yet
    fn signature_locked(&self) -> Result<bool> {
        if let Some(verdict) = self.cache.signature() {
            return Ok(verdict);
        }

        let mut guard = self.source.lock();
        let source = guard.as_mut().ok_or(SealError::ArchiveClosed)?;
        signature_verdict(
            &self.cache,
            &self.header,
            self.config.keys.as_ref(),
            self.payload_end,
            source,
        )
    }

    /// Fetch a leaf straight into `target`
    ///
    /// Raw leaves are copied from the source without an intermediate buffer,
    /// holding the source lock for the copy. Compressed leaves go through
    /// [`fetch`](Self::fetch) and are written once decoded.
    pub fn fetch_write<W: Write>(&self, id: &str, mut target: W) -> Result<LeafInfo> {
        self.ensure_open()?;
        let entry = self.lookup(id)?;

        if entry.is_compressed() {
            let resource = self.fetch(id)?;
            target.write_all(resource.data())?;
            target.flush()?;
            return Ok(LeafInfo::from(&resource));
        }

        if let Some(hit) = self.cache.get(id) {
            let signature = self.signature_locked()?;
            target.write_all(&hit.data)?;
            target.flush()?;
            return Ok(to_resource(entry, hit, signature).into());
        }

        let (signature, copied, digest) = {
            let mut guard = self.source.lock();
            let source = guard.as_mut().ok_or(SealError::ArchiveClosed)?;
            let signature = signature_verdict(
                &self.cache,
                &self.header,
                self.config.keys.as_ref(),
                self.payload_end,
                source,
            )?;

            source.seek(SeekFrom::Start(entry.offset))?;
            let mut writer = HashingWriter::new(&mut target);
            let copied = io::copy(&mut (&mut *source).take(entry.length), &mut writer)?;
            let (_, digest, _) = writer.finish();
            (signature, copied, digest)
        };
        target.flush()?;

        if copied != entry.length {
            return Err(SealError::malformed(format!(
                "source ended {copied} bytes into leaf '{}'",
                entry.id
            )));
        }

        let digest_ok = entry.digest.map_or(true, |expected| expected == digest);
        if !digest_ok {
            warn!(id, "leaf digest mismatch");
        }

        debug!(id, bytes = copied, "streamed leaf");
        Ok(LeafInfo {
            flags: entry.flags,
            content_version: entry.content_version,
            length: copied,
            verified: signature && digest_ok,
        })
    }

    /// Give the source back
    pub fn into_inner(self) -> Result<R> {
        self.source.into_inner().ok_or(SealError::ArchiveClosed)
    }
}

impl<R> Archive<R> {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SealError::ArchiveClosed);
        }
        Ok(())
    }

    /// A signature was checked against our key and did not hold
    fn signature_failed(&self, signature: bool) -> bool {
        !signature && self.header.is_signed() && self.config.keys.is_some()
    }

    fn decode(&self, entry: &Entry, stored: Vec<u8>, signature: bool) -> Result<CachedLeaf> {
        decode_leaf(
            entry,
            stored,
            self.config.max_leaf_size,
            self.signature_failed(signature),
        )
    }

    fn lookup(&self, id: &str) -> Result<&Entry> {
        self.index
            .get(id)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| SealError::ResourceNotFound(id.to_string()))
    }

    /// Leaf records in table order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Leaf ids in table order
    pub fn get_entries(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| &*entry.id).collect()
    }

    pub fn entry(&self, id: &str) -> Option<&Entry> {
        self.lookup(id).ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    pub fn is_signed(&self) -> bool {
        self.header.is_signed()
    }

    /// Fingerprint of the key recorded in the header, if signed
    pub fn signer_fingerprint(&self) -> Option<String> {
        self.header
            .is_signed()
            .then(|| keys::fingerprint(&self.header.verifying_key))
    }

    /// Current signature state. Never triggers verification.
    pub fn verification_status(&self) -> VerificationStatus {
        if !self.header.is_signed() {
            return VerificationStatus::Unsigned;
        }
        if self.config.keys.is_none() {
            return VerificationStatus::NoKey;
        }
        match self.cache.signature() {
            None => VerificationStatus::Pending,
            Some(true) => VerificationStatus::Verified,
            Some(false) => VerificationStatus::Failed,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Release the source. Every later fetch fails with `ArchiveClosed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.source.lock().take();
        self.cache.clear();
        info!(leaves = self.entries.len(), "closed archive");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Archive<BufReader<File>> {
    /// Open an archive file
    pub fn open_file<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opening archive file");
        Archive::open(BufReader::new(file), config)
    }
}

impl<'a> Archive<Cursor<&'a [u8]>> {
    /// Open an archive held in borrowed memory
    pub fn from_buffer(bytes: &'a [u8], config: ArchiveConfig) -> Result<Self> {
        Archive::open(Cursor::new(bytes), config)
    }
}

impl Archive<Cursor<Vec<u8>>> {
    /// Open an archive held in owned memory
    pub fn from_vec(bytes: Vec<u8>, config: ArchiveConfig) -> Result<Self> {
        Archive::open(Cursor::new(bytes), config)
    }
}

impl<R> fmt::Display for Archive<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: u64 = self.entries.iter().map(|entry| entry.length).sum();
        write!(
            f,
            "Archive: {} leaves, {} stored bytes, flags {}, {}",
            self.entries.len(),
            total,
            self.header.flags,
            self.verification_status()
        )?;
        if let Some(fingerprint) = self.signer_fingerprint() {
            write!(f, ", signer {}", &fingerprint[..16])?;
        }
        Ok(())
    }
}

impl<R> fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .field("status", &self.verification_status())
            .field("closed", &self.is_closed())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Signature verdict, computed under the caller's source borrow on first use
///
/// I/O errors are returned without settling the verdict.
fn signature_verdict<R: Read + Seek>(
    cache: &ResourceCache,
    header: &Header,
    verifying: Option<&KeyMaterial>,
    payload_end: u64,
    source: &mut R,
) -> Result<bool> {
    cache.signature_or_try_init(|| {
        let Some(expected) = verifying.filter(|_| header.is_signed()) else {
            debug!(signed = header.is_signed(), "archive signature not checked");
            return Ok(false);
        };

        if header.verifying_key != expected.verifying_bytes() {
            warn!(
                expected = %expected.fingerprint(),
                found = %keys::fingerprint(&header.verifying_key),
                "archive was signed by a different key"
            );
            return Ok(false);
        }

        match verify_source(source, payload_end, expected.verifying_key()) {
            Ok(()) => {
                info!(signer = %expected.fingerprint(), "archive signature verified");
                Ok(true)
            }
            Err(SealError::Io(e)) => {
                warn!(error = %e, "archive signature check interrupted");
                Err(SealError::Io(e))
            }
            Err(e) => {
                warn!(error = %e, "archive signature did not verify");
                Ok(false)
            }
        }
    })
}

/// Check the digest and undo compression for freshly read bytes
///
/// A leaf that fails to decode after failing an integrity check is reported
/// as `Crypto` rather than a compression error.
fn decode_leaf(
    entry: &Entry,
    stored: Vec<u8>,
    limit: usize,
    signature_failed: bool,
) -> Result<CachedLeaf> {
    let digest_ok = match &entry.digest {
        Some(expected) => {
            let actual: [u8; 32] = Sha256::digest(&stored).into();
            if &actual != expected {
                warn!(id = %entry.id, "leaf digest mismatch");
            }
            &actual == expected
        }
        None => true,
    };

    let data = match CompressionMethod::from_flags(entry.flags) {
        CompressionMethod::None => stored,
        method => match decompress_bounded(&stored, method, limit) {
            Ok(data) => data,
            Err(e) if signature_failed || !digest_ok => {
                return Err(SealError::Crypto(format!(
                    "leaf '{}' failed integrity checks and could not be decoded: {e}",
                    entry.id
                )));
            }
            Err(e) => return Err(e),
        },
    };

    Ok(CachedLeaf {
        data: Arc::from(data),
        digest_ok,
    })
}

fn to_resource(entry: &Entry, leaf: CachedLeaf, signature: bool) -> Resource {
    Resource::new(
        leaf.data,
        entry.flags,
        entry.content_version,
        signature && leaf.digest_ok,
    )
}
