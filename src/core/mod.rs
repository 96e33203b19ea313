//! Core implementation
//!
//! - [`keys`] - Ed25519 key material
//! - [`flags`] - header and leaf flag bits
//! - [`validation`] - leaf id rules
//! - [`format`] - on-disk header, leaf table and signature codec
//! - [`compression`] - per-leaf LZ4 / Zstd
//! - [`builder`] - writes archives
//! - [`archive`] - reads and verifies archives
//! - [`cache`] - signature memo and decoded leaf LRU
//! - [`manifest`] - TOML pack manifests

pub mod archive;
pub mod builder;
pub mod cache;
pub mod compression;
pub mod error;
pub mod flags;
pub mod format;
pub mod io;
pub mod keys;
pub mod manifest;
pub mod validation;

mod integration_tests;

pub use archive::{Archive, ArchiveConfig, LeafInfo, Resource, VerificationStatus};
pub use builder::{Builder, BuilderConfig, Leaf, LeafSource, Placement};
