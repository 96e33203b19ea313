use crate::flags::Flags;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A leaf fetched from an archive
///
/// `data` is always the decoded payload, decompressed if the leaf was stored
/// compressed. `verified` is true only when the archive signature checked
/// out and, for leaves carrying a digest, the stored bytes matched it.
#[derive(Clone, PartialEq, Eq)]
pub struct Resource {
    data: Arc<[u8]>,
    pub flags: Flags,
    pub content_version: u8,
    pub verified: bool,
}

impl Resource {
    pub(crate) fn new(data: Arc<[u8]>, flags: Flags, content_version: u8, verified: bool) -> Self {
        Resource {
            data,
            flags,
            content_version,
            verified,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the payload
    pub fn shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data.to_vec()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Metadata of a leaf written by [`Archive::fetch_write`](super::Archive::fetch_write)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafInfo {
    pub flags: Flags,
    pub content_version: u8,
    /// Decoded bytes written
    pub length: u64,
    pub verified: bool,
}

impl From<&Resource> for LeafInfo {
    fn from(resource: &Resource) -> Self {
        LeafInfo {
            flags: resource.flags,
            content_version: resource.content_version,
            length: resource.data.len() as u64,
            verified: resource.verified,
        }
    }
}

impl From<Resource> for LeafInfo {
    fn from(resource: Resource) -> Self {
        LeafInfo::from(&resource)
    }
}

impl Deref for Resource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for Resource {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("len", &self.data.len())
            .field("flags", &self.flags)
            .field("content_version", &self.content_version)
            .field("verified", &self.verified)
            .finish()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes {} v{}{}",
            self.data.len(),
            self.flags,
            self.content_version,
            if self.verified { " (verified)" } else { "" }
        )
    }
}
