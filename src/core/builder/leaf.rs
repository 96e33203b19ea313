use crate::compression::CompressionMethod;
use crate::error::{Result, SealError};
use crate::flags::Flags;
use crate::validation::LeafId;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a leaf's bytes come from
#[derive(Debug, Clone)]
pub enum LeafSource {
    /// Bytes owned by the builder
    Buffer(Vec<u8>),
    /// A file read at dump time. `length` is its size when it was added.
    File { path: PathBuf, length: u64 },
}

/// A resource queued for packing
///
/// # Examples
///
/// ```rust
/// use sealpack::{CompressionMethod, Leaf};
///
/// let leaf = Leaf::from_buffer("shaders/basic.wgsl", b"@vertex fn main() {}".to_vec())
///     .unwrap()
///     .compress(CompressionMethod::Zstd)
///     .digest(true)
///     .version(2);
/// assert_eq!(leaf.id().as_str(), "shaders/basic.wgsl");
/// ```
#[derive(Debug, Clone)]
pub struct Leaf {
    id: LeafId,
    source: LeafSource,
    flags: Flags,
    content_version: u8,
}

impl Leaf {
    pub fn from_buffer<I>(id: I, data: impl Into<Vec<u8>>) -> Result<Self>
    where
        I: TryInto<LeafId>,
        SealError: From<I::Error>,
    {
        Ok(Leaf {
            id: id.try_into()?,
            source: LeafSource::Buffer(data.into()),
            flags: Flags::empty(),
            content_version: 0,
        })
    }

    /// Queue a file. Its size is recorded now and its bytes are read at dump time.
    pub fn from_file<I, P>(id: I, path: P) -> Result<Self>
    where
        I: TryInto<LeafId>,
        SealError: From<I::Error>,
        P: AsRef<Path>,
    {
        let id = id.try_into()?;
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(SealError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        Ok(Leaf {
            id,
            source: LeafSource::File {
                path: path.to_path_buf(),
                length: metadata.len(),
            },
            flags: Flags::empty(),
            content_version: 0,
        })
    }

    /// Replace the leaf flags. `Flags::SIGNED` has no meaning on a leaf and is dropped.
    pub fn flags(mut self, flags: Flags) -> Self {
        let mut flags = flags;
        flags.force_set(Flags::SIGNED, false);
        self.flags = flags;
        self
    }

    /// Request compression. It is only kept if it shrinks the payload.
    pub fn compress(mut self, method: CompressionMethod) -> Self {
        self.flags.force_set(Flags::COMPRESSION_MASK, false);
        self.flags.force_set(method.flag(), true);
        self
    }

    /// Record a SHA-256 of the stored bytes in the leaf table
    pub fn digest(mut self, enabled: bool) -> Self {
        self.flags.force_set(Flags::DIGEST, enabled);
        self
    }

    pub fn version(mut self, content_version: u8) -> Self {
        self.content_version = content_version;
        self
    }

    pub fn id(&self) -> &LeafId {
        &self.id
    }

    pub fn source(&self) -> &LeafSource {
        &self.source
    }

    pub fn get_flags(&self) -> Flags {
        self.flags
    }

    pub fn content_version(&self) -> u8 {
        self.content_version
    }

    /// Size of the raw (uncompressed) payload
    pub fn raw_len(&self) -> u64 {
        match &self.source {
            LeafSource::Buffer(data) => data.len() as u64,
            LeafSource::File { length, .. } => *length,
        }
    }
}
