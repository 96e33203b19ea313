//! Validation for leaf identifiers and the paths they are derived from
//!
//! Leaf ids are flat UTF-8 strings. The archive format stores their length
//! in a `u32`, but the library caps them at [`LeafId::MAX_LENGTH`] bytes so
//! that a corrupted length field can never drive a multi-gigabyte allocation.

use crate::error::{Result, SealError};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;

/// Validated leaf identifier
///
/// # Rules
/// - valid UTF-8
/// - at most [`LeafId::MAX_LENGTH`] bytes
///
/// Empty ids are allowed; they are unusual but unambiguous.
///
/// # Examples
///
/// ```
/// use sealpack::LeafId;
///
/// let id = LeafId::new("textures/grass.png").unwrap();
/// assert_eq!(id.as_str(), "textures/grass.png");
///
/// assert!(LeafId::from_bytes(&[0xff, 0xfe]).is_err()); // not UTF-8
/// assert!(LeafId::new("x".repeat(LeafId::MAX_LENGTH + 1)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(Arc<str>);

impl LeafId {
    /// Maximum id length in bytes
    pub const MAX_LENGTH: usize = u16::MAX as usize;

    /// Create a new validated id
    ///
    /// # Errors
    ///
    /// Returns `LeafIdTooLong` if the id exceeds [`LeafId::MAX_LENGTH`] bytes.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        Self::check_length(id.len())?;
        Ok(LeafId(Arc::from(id)))
    }

    /// Create an id from raw bytes, as received across an FFI or file boundary
    ///
    /// # Errors
    ///
    /// Returns `InvalidUtf8` for non UTF-8 input and `LeafIdTooLong` for
    /// overlong input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let id = std::str::from_utf8(bytes)?;
        Self::new(id)
    }

    fn check_length(length: usize) -> Result<()> {
        if length > Self::MAX_LENGTH {
            return Err(SealError::LeafIdTooLong {
                length,
                max: Self::MAX_LENGTH,
            });
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shared handle to the id text
    pub fn to_arc(&self) -> Arc<str> {
        self.0.clone()
    }
}

impl AsRef<str> for LeafId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LeafId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for LeafId {
    type Error = SealError;

    fn try_from(value: &str) -> Result<Self> {
        LeafId::new(value)
    }
}

impl TryFrom<String> for LeafId {
    type Error = SealError;

    fn try_from(value: String) -> Result<Self> {
        LeafId::new(value)
    }
}

impl TryFrom<&[u8]> for LeafId {
    type Error = SealError;

    fn try_from(value: &[u8]) -> Result<Self> {
        LeafId::from_bytes(value)
    }
}

/// Derive a leaf id from a file path relative to `root`
///
/// Components are joined with `/` regardless of platform so archives built
/// on Windows and Unix agree on ids.
///
/// # Examples
///
/// ```
/// use sealpack::validation::leaf_id_from_path;
/// use std::path::Path;
///
/// let id = leaf_id_from_path(Path::new("assets"), Path::new("assets/ui/icon.png")).unwrap();
/// assert_eq!(id.as_str(), "ui/icon.png");
/// ```
pub fn leaf_id_from_path(root: &Path, path: &Path) -> Result<LeafId> {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    SealError::ParseError(format!("path {} is not valid UTF-8", path.display()))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SealError::ParseError(format!(
                    "path {} escapes the input root",
                    path.display()
                )));
            }
        }
    }

    LeafId::new(parts.join("/"))
}

/// Check that an id is safe to materialize below an output directory
///
/// Unpacking must never write outside the target, so ids with absolute
/// components or `..` segments are refused.
pub fn is_safe_relative_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('/')
        && !id.contains('\\')
        && id.split('/').all(|part| !part.is_empty() && part != "..")
}
