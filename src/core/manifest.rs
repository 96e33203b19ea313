//! Pack manifest
//!
//! A TOML description of one archive build: where it goes, which key signs
//! it and which files become leaves. Relative paths are resolved against the
//! directory holding the manifest.
//!
//! ```toml
//! output = "assets.spk"
//! key = "keys/release.kp"
//! flags = 0x0001
//! compress = "lz4"
//! digest = true
//!
//! [[leaf]]
//! path = "textures/grass.png"
//!
//! [[leaf]]
//! id = "config"
//! path = "settings/game.toml"
//! compress = "zstd"
//! version = 2
//! ```

use crate::builder::{Builder, BuilderConfig, Leaf};
use crate::compression::CompressionMethod;
use crate::error::{Result, SealError};
use crate::flags::Flags;
use crate::format::{MAGIC, MAGIC_LENGTH};
use crate::keys::KeyMaterial;
use crate::validation::{leaf_id_from_path, LeafId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Build description for one archive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackManifest {
    /// Archive to write
    pub output: PathBuf,

    /// Signing key file (32 byte secret or 64 byte keypair)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,

    /// User bits for the archive header
    #[serde(default)]
    pub flags: u16,

    /// Custom magic, exactly 8 bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<String>,

    /// Default compression for every leaf
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<String>,

    /// Default digest setting for every leaf
    #[serde(default)]
    pub digest: bool,

    /// Default content version for every leaf
    #[serde(default)]
    pub version: u8,

    #[serde(default, rename = "leaf")]
    pub leaves: Vec<LeafSpec>,
}

/// One `[[leaf]]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeafSpec {
    pub path: PathBuf,

    /// Leaf id, derived from `path` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,

    /// User bits for this leaf
    #[serde(default)]
    pub flags: u16,
}

fn manifest_error(message: String) -> SealError {
    error!(%message, "invalid pack manifest");
    SealError::Manifest(message)
}

impl PackManifest {
    /// Conventional file name
    pub const FILE_NAME: &'static str = "sealpack.toml";

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let manifest: PackManifest =
            toml::from_str(text).map_err(|e| manifest_error(format!("parse failed: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loaded pack manifest");
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| manifest_error(format!("serialize failed: {e}")))
    }

    /// Check everything that can be checked without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        self.magic_bytes()?;
        if let Some(method) = &self.compress {
            method.parse::<CompressionMethod>()?;
        }

        let mut seen = HashSet::new();
        for spec in &self.leaves {
            if let Some(method) = &spec.compress {
                method.parse::<CompressionMethod>()?;
            }
            let id = spec.leaf_id()?;
            if !seen.insert(id.clone()) {
                return Err(SealError::DuplicateLeafId(id.to_string()));
            }
        }

        Ok(())
    }

    /// Magic as configured, or the default
    pub fn magic_bytes(&self) -> Result<[u8; MAGIC_LENGTH]> {
        match &self.magic {
            None => Ok(MAGIC),
            Some(text) => text.as_bytes().try_into().map_err(|_| {
                manifest_error(format!(
                    "magic must be exactly {MAGIC_LENGTH} bytes, got {}",
                    text.len()
                ))
            }),
        }
    }

    /// Turn the manifest into a ready builder
    ///
    /// `base_dir` anchors relative paths. `keys` overrides the manifest's key
    /// file when given.
    pub fn to_builder(&self, base_dir: &Path, keys: Option<KeyMaterial>) -> Result<Builder> {
        let keys = match (keys, &self.key) {
            (Some(keys), _) => Some(keys),
            (None, Some(path)) => Some(KeyMaterial::load_signing_file(base_dir.join(path))?),
            (None, None) => None,
        };

        let mut config = BuilderConfig::new()
            .flags(Flags::from_bits(u32::from(self.flags)))
            .magic(self.magic_bytes()?);
        if let Some(keys) = keys {
            config = config.keys(keys);
        }

        let default_method = match &self.compress {
            Some(method) => method.parse()?,
            None => CompressionMethod::None,
        };

        let mut builder = Builder::new(config);
        for spec in &self.leaves {
            let method = match &spec.compress {
                Some(method) => method.parse()?,
                None => default_method,
            };

            let leaf = Leaf::from_file(spec.leaf_id()?, base_dir.join(&spec.path))?
                .flags(Flags::from_bits(u32::from(spec.flags)))
                .compress(method)
                .digest(spec.digest.unwrap_or(self.digest))
                .version(spec.version.unwrap_or(self.version));
            builder.add_leaf(leaf)?;
        }

        Ok(builder)
    }

    /// Output path resolved against `base_dir`
    pub fn output_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.output)
    }
}

impl LeafSpec {
    pub fn leaf_id(&self) -> Result<LeafId> {
        match &self.id {
            Some(id) => LeafId::new(id),
            None => leaf_id_from_path(Path::new(""), &self.path),
        }
    }
}
