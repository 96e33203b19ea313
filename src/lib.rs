//! # sealpack - Signed Archive Container
//!
//! `sealpack` packs named binary resources ("leaves") into a single archive,
//! signed with Ed25519 so a loader holding only the public key can prove
//! the archive came from the key holder and was not modified.
//!
//! - **Flat leaf ids** with random access through an in-memory index
//! - **Ed25519 signatures** over a SHA-256 of the whole archive
//! - **Per-leaf options**: LZ4 / Zstd compression, SHA-256 digests, content versions
//! - **Thread-safe loading**: a locking `fetch(&self)` and a lock-free `fetch_mut(&mut self)`
//! - **Any source**: files, borrowed buffers, or any `Read + Seek`
//!
//! ## Quick Start
//!
//! ```rust
//! use sealpack::{Archive, ArchiveConfig, Builder, BuilderConfig, Flags, KeyMaterial, Result};
//!
//! # fn main() -> Result<()> {
//! let keys = KeyMaterial::generate();
//!
//! // Build
//! let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
//! builder.add_leaf_from_buffer("greeting", b"Hello, World!".to_vec(), Flags::empty())?;
//!
//! let mut bytes = Vec::new();
//! builder.dump(&mut bytes, |placement| {
//!     println!("{} -> {} bytes @ {}", placement.id, placement.length, placement.location);
//! })?;
//!
//! // Load and verify
//! let config = ArchiveConfig::new().verifying_key(keys.to_verifying());
//! let archive = Archive::from_buffer(&bytes, config)?;
//! let greeting = archive.fetch("greeting")?;
//! assert_eq!(greeting.data(), b"Hello, World!");
//! assert!(greeting.verified);
//! # Ok(())
//! # }
//! ```
//!
//! ## Files
//!
//! ```rust,no_run
//! use sealpack::{Archive, ArchiveConfig, Builder, BuilderConfig, CompressionMethod, Leaf, Result};
//!
//! # fn main() -> Result<()> {
//! let keypair = std::fs::File::open("release.kp")?;
//! let mut builder = Builder::new(BuilderConfig::new().load_keypair(keypair)?);
//! builder.add_leaf(Leaf::from_file("music/theme.ogg", "assets/theme.ogg")?.digest(true))?;
//! builder.add_leaf(
//!     Leaf::from_file("levels/1.json", "assets/1.json")?.compress(CompressionMethod::Zstd),
//! )?;
//! builder.dump_to_file("game.spk", |_| {})?;
//!
//! let config = ArchiveConfig::new()
//!     .load_verifying_key(std::fs::File::open("release.pk")?)?
//!     .require_signature(true)
//!     .cache_capacity(32);
//! let archive = Archive::open_file("game.spk", config)?;
//! let level = archive.fetch("levels/1.json")?;
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    archive, builder, cache, compression, error, flags, format, io, keys, manifest,
};

pub use crate::core::{
    archive::{Archive, ArchiveConfig, LeafInfo, Resource, VerificationStatus},
    builder::{Builder, BuilderConfig, Leaf, LeafSource, Placement},
    cache::CacheStats,
    compression::CompressionMethod,
    error::{ErrorKind, Result, SealError},
    flags::Flags,
    format::{Entry, Header, FORMAT_VERSION, MAGIC},
    keys::{KeyMaterial, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH, SIGNATURE_LENGTH},
    manifest::{LeafSpec, PackManifest},
    validation::LeafId,
};

pub use crate::core::validation;

/// Conventional archive file extension
pub const FILE_EXTENSION: &str = "spk";

/// Longest accepted leaf id, in bytes
pub const MAX_ID_LENGTH: usize = LeafId::MAX_LENGTH;

/// Commonly used types
pub mod prelude {
    pub use crate::{
        Archive, ArchiveConfig, Builder, BuilderConfig, CompressionMethod, Flags, KeyMaterial,
        Leaf, Resource, Result, SealError,
    };
}
