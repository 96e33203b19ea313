//! Archive builder
//!
//! Collects leaves and writes them as a single archive. Dumping runs in two
//! passes: the first prepares every leaf (compression, digest, final length)
//! and lays out offsets, the second streams header, table and payloads
//! through a hashing writer and appends the signature.

pub mod config;
pub mod leaf;

pub use config::BuilderConfig;
pub use leaf::{Leaf, LeafSource};

use crate::compression::compress_for_storage;
use crate::error::{Result, SealError};
use crate::flags::Flags;
use crate::format::signature::{sign_digest, EMPTY_SIGNATURE};
use crate::format::{Entry, Header};
use crate::io::{write_atomically, HashingWriter};
use crate::keys::{KeyMaterial, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use crate::validation::LeafId;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a leaf landed, reported to the dump callback right after its bytes
/// are written
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub id: &'a str,
    /// Stored bytes, `None` for file leaves streamed straight to the target
    pub data: Option<&'a [u8]>,
    /// Stored length
    pub length: u64,
    /// Absolute offset in the archive
    pub location: u64,
    /// Offset relative to the start of the payload region
    pub offset: u64,
    /// Flags as stored, after any compression fallback
    pub flags: Flags,
}

/// Assembles leaves into a signed archive
///
/// # Examples
///
/// ```rust
/// use sealpack::{Archive, ArchiveConfig, Builder, BuilderConfig, Flags, KeyMaterial};
///
/// # fn main() -> sealpack::Result<()> {
/// let keys = KeyMaterial::generate();
///
/// let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
/// builder.add_leaf_from_buffer("a", b"hello".to_vec(), Flags::empty())?;
/// builder.add_leaf_from_buffer("b", Vec::new(), Flags::empty())?;
///
/// let mut bytes = Vec::new();
/// builder.dump(&mut bytes, |_| {})?;
///
/// let config = ArchiveConfig::new().verifying_key(keys.to_verifying());
/// let archive = Archive::from_buffer(&bytes, config)?;
/// let resource = archive.fetch("a")?;
/// assert_eq!(resource.data(), b"hello");
/// assert!(resource.verified);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Builder {
    config: BuilderConfig,
    leaves: Vec<Leaf>,
    ids: HashSet<LeafId>,
}

/// Stored form of one leaf, produced by the first pass
enum Stored<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
    Stream(&'a Path),
}

struct Prepared<'a> {
    leaf: &'a Leaf,
    stored: Stored<'a>,
    entry: Entry,
}

/// Output of the first pass
struct Plan<'a> {
    header: Header,
    leaves: Vec<Prepared<'a>>,
    table_end: u64,
    total_len: u64,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Self {
        Builder {
            config,
            leaves: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Queue a leaf. Ids must be unique within one builder.
    pub fn add_leaf(&mut self, leaf: Leaf) -> Result<()> {
        if self.ids.contains(leaf.id()) {
            return Err(SealError::DuplicateLeafId(leaf.id().to_string()));
        }

        debug!(id = %leaf.id(), bytes = leaf.raw_len(), flags = %leaf.get_flags(), "queued leaf");
        self.ids.insert(leaf.id().clone());
        self.leaves.push(leaf);
        Ok(())
    }

    pub fn add_leaf_from_buffer<I>(
        &mut self,
        id: I,
        data: impl Into<Vec<u8>>,
        flags: Flags,
    ) -> Result<()>
    where
        I: TryInto<LeafId>,
        SealError: From<I::Error>,
    {
        self.add_leaf(Leaf::from_buffer(id, data)?.flags(flags))
    }

    pub fn add_leaf_from_file<I, P>(&mut self, id: I, path: P, flags: Flags) -> Result<()>
    where
        I: TryInto<LeafId>,
        SealError: From<I::Error>,
        P: AsRef<Path>,
    {
        self.add_leaf(Leaf::from_file(id, path)?.flags(flags))
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Queued leaves in insertion order
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Exact size `dump` would produce
    ///
    /// Compression is applied to find the stored sizes, so this costs as much
    /// as the first dump pass.
    pub fn encoded_len(&self) -> Result<u64> {
        Ok(self.plan()?.total_len)
    }

    /// Write the archive to `target`, returning the number of bytes written
    pub fn dump<W, F>(&self, target: W, callback: F) -> Result<u64>
    where
        W: Write,
        F: FnMut(&Placement<'_>),
    {
        let plan = self.plan()?;
        self.write_plan(&plan, target, callback)
    }

    /// Write the archive into `buffer`
    ///
    /// Nothing is written if the buffer is smaller than the archive.
    pub fn dump_to_buffer<F>(&self, buffer: &mut [u8], callback: F) -> Result<u64>
    where
        F: FnMut(&Placement<'_>),
    {
        let plan = self.plan()?;
        if (buffer.len() as u64) < plan.total_len {
            return Err(SealError::BufferTooSmall {
                required: plan.total_len,
                available: buffer.len() as u64,
            });
        }

        self.write_plan(&plan, &mut buffer[..], callback)
    }

    /// Write the archive to a new file at `path`
    ///
    /// The archive is written to a temporary file next to `path` and moved
    /// into place on success, so a failed dump leaves `path` as it was.
    pub fn dump_to_file<P, F>(&self, path: P, callback: F) -> Result<u64>
    where
        P: AsRef<Path>,
        F: FnMut(&Placement<'_>),
    {
        let plan = self.plan()?;

        let written = write_atomically(path.as_ref(), |file| {
            let mut writer = BufWriter::new(file);
            let written = self.write_plan(&plan, &mut writer, callback)?;
            writer.flush()?;
            Ok(written)
        })?;

        info!(path = %path.as_ref().display(), bytes = written, "wrote archive");
        Ok(written)
    }

    /// Signing key to use, checking the config asks for nothing it cannot do
    fn signer(&self) -> Result<Option<&KeyMaterial>> {
        let signer = self.config.keys.as_ref().filter(|keys| keys.can_sign());
        if signer.is_none() && self.config.flags.contains(Flags::SIGNED) {
            return Err(SealError::MissingFeature("signing key"));
        }
        Ok(signer)
    }

    /// First pass: prepare stored bytes and lay out offsets
    fn plan(&self) -> Result<Plan<'_>> {
        let signer = self.signer()?;

        let mut header = Header::new(self.config.magic);
        header.flags = self.config.flags;
        header.flags.force_set(Flags::SIGNED, signer.is_some());
        header.verifying_key =
            signer.map_or([0u8; PUBLIC_KEY_LENGTH], KeyMaterial::verifying_bytes);
        header.leaf_count = self.leaves.len() as u64;

        let mut leaves = Vec::with_capacity(self.leaves.len());
        for leaf in &self.leaves {
            leaves.push(prepare(leaf)?);
        }

        let table_len: u64 = leaves.iter().map(|p| p.entry.encoded_len() as u64).sum();
        let table_end = Header::SIZE as u64 + table_len;

        let mut offset = table_end;
        for prepared in &mut leaves {
            prepared.entry.offset = offset;
            offset += prepared.entry.length;
        }

        Ok(Plan {
            header,
            leaves,
            table_end,
            total_len: offset + SIGNATURE_LENGTH as u64,
        })
    }

    /// Second pass: stream everything through a hashing writer, then sign
    fn write_plan<W, F>(&self, plan: &Plan<'_>, target: W, mut callback: F) -> Result<u64>
    where
        W: Write,
        F: FnMut(&Placement<'_>),
    {
        let mut writer = HashingWriter::new(target);
        writer.write_all(&plan.header.to_bytes())?;

        let mut table = Vec::with_capacity((plan.table_end as usize).saturating_sub(Header::SIZE));
        for prepared in &plan.leaves {
            prepared.entry.write_to(&mut table);
        }
        writer.write_all(&table)?;

        for prepared in &plan.leaves {
            let entry = &prepared.entry;
            let data = match &prepared.stored {
                Stored::Borrowed(data) => {
                    writer.write_all(data)?;
                    Some(*data)
                }
                Stored::Owned(data) => {
                    writer.write_all(data)?;
                    Some(data.as_slice())
                }
                Stored::Stream(path) => {
                    stream_file(prepared.leaf, path, entry.length, &mut writer)?;
                    None
                }
            };

            debug!(
                id = %entry.id,
                location = entry.offset,
                length = entry.length,
                flags = %entry.flags,
                "wrote leaf"
            );
            callback(&Placement {
                id: &entry.id,
                data,
                length: entry.length,
                location: entry.offset,
                offset: entry.offset - plan.table_end,
                flags: entry.flags,
            });
        }

        let (mut target, digest, written) = writer.finish();
        let signature = match self.signer()? {
            Some(keys) => sign_digest(keys, &digest)?,
            None => EMPTY_SIGNATURE,
        };
        target.write_all(&signature)?;
        target.flush()?;

        let total = written + SIGNATURE_LENGTH as u64;
        info!(
            leaves = plan.leaves.len(),
            bytes = total,
            signed = plan.header.is_signed(),
            "dumped archive"
        );
        Ok(total)
    }
}

/// Work out how a leaf will be stored
fn prepare(leaf: &Leaf) -> Result<Prepared<'_>> {
    let flags = leaf.get_flags();
    let needs_bytes = flags.bits() & (Flags::COMPRESSION_MASK | Flags::DIGEST) != 0;

    let (stored, stored_flags) = match leaf.source() {
        LeafSource::Buffer(data) if flags.bits() & Flags::COMPRESSION_MASK != 0 => {
            let (bytes, stored_flags) = compress_for_storage(data, flags)?;
            (Stored::Owned(bytes), stored_flags)
        }
        LeafSource::Buffer(data) => (Stored::Borrowed(data.as_slice()), flags),
        LeafSource::File { path, length } if needs_bytes => {
            let data = read_file_leaf(leaf, path, *length)?;
            let (bytes, stored_flags) = compress_for_storage(&data, flags)?;
            (Stored::Owned(bytes), stored_flags)
        }
        LeafSource::File { path, .. } => (Stored::Stream(path.as_path()), flags),
    };

    let length = match &stored {
        Stored::Borrowed(data) => data.len() as u64,
        Stored::Owned(data) => data.len() as u64,
        Stored::Stream(_) => leaf.raw_len(),
    };

    let digest = if stored_flags.contains(Flags::DIGEST) {
        let bytes: &[u8] = match &stored {
            Stored::Borrowed(data) => *data,
            Stored::Owned(data) => data.as_slice(),
            // digest leaves are always read up front
            Stored::Stream(_) => &[],
        };
        Some(Sha256::digest(bytes).into())
    } else {
        None
    };

    let entry = Entry {
        id: leaf.id().to_arc(),
        offset: 0,
        length,
        flags: stored_flags,
        content_version: leaf.content_version(),
        digest,
    };

    Ok(Prepared {
        leaf,
        stored,
        entry,
    })
}

fn size_changed(leaf: &Leaf, expected: u64, found: u64) -> SealError {
    SealError::LeafSizeChanged {
        id: leaf.id().to_string(),
        expected,
        found,
    }
}

fn read_file_leaf(leaf: &Leaf, path: &Path, expected: u64) -> Result<Vec<u8>> {
    let data = std::fs::read(path)?;
    if data.len() as u64 != expected {
        return Err(size_changed(leaf, expected, data.len() as u64));
    }
    Ok(data)
}

fn stream_file<W: Write>(leaf: &Leaf, path: &Path, expected: u64, target: &mut W) -> Result<()> {
    let file = File::open(path)?;
    let found = file.metadata()?.len();
    if found != expected {
        return Err(size_changed(leaf, expected, found));
    }

    let copied = io::copy(&mut file.take(expected), target)?;
    if copied != expected {
        return Err(size_changed(leaf, expected, copied));
    }
    Ok(())
}
