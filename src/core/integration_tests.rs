//! Cross-module tests
//!
//! Exercise builder, format codec, loader and cache together.

#[cfg(test)]
mod tests {
    use crate::core::archive::{Archive, ArchiveConfig, VerificationStatus};
    use crate::core::builder::{Builder, BuilderConfig, Leaf};
    use crate::core::compression::CompressionMethod;
    use crate::core::error::{ErrorKind, SealError};
    use crate::core::flags::Flags;
    use crate::core::format::{self, Header};
    use crate::core::format::signature::sign_digest;
    use crate::core::keys::{KeyMaterial, SIGNATURE_LENGTH};
    use sha2::{Digest, Sha256};
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_two_leaf_scenario() {
        let keys = KeyMaterial::generate();

        let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
        builder
            .add_leaf(Leaf::from_buffer("a", b"hello".to_vec()).unwrap().version(1))
            .unwrap();
        builder
            .add_leaf(Leaf::from_buffer("b", b"world".to_vec()).unwrap().version(1))
            .unwrap();

        let mut bytes = Vec::new();
        builder.dump(&mut bytes, |_| {}).unwrap();

        let archive =
            Archive::from_buffer(&bytes, ArchiveConfig::new().verifying_key(keys)).unwrap();
        assert_eq!(archive.get_entries(), vec!["a", "b"]);

        let a = archive.fetch("a").unwrap();
        assert_eq!(a.data(), b"hello");
        assert!(a.verified);
        assert_eq!(a.content_version, 1);

        let err = archive.fetch("c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    }

    #[test]
    fn test_file_round_trip_with_options() {
        let dir = TempDir::new().unwrap();
        let keys = KeyMaterial::generate();

        let text = b"The quick brown fox jumps over the lazy dog. ".repeat(200);
        let noise: Vec<u8> = (0..4096u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        fs::write(dir.path().join("text.txt"), &text).unwrap();
        fs::write(dir.path().join("noise.bin"), &noise).unwrap();

        let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
        builder
            .add_leaf(
                Leaf::from_file("text", dir.path().join("text.txt"))
                    .unwrap()
                    .compress(CompressionMethod::Zstd)
                    .digest(true),
            )
            .unwrap();
        builder
            .add_leaf(Leaf::from_file("noise", dir.path().join("noise.bin")).unwrap())
            .unwrap();
        builder
            .add_leaf(
                Leaf::from_buffer("inline", text.clone())
                    .unwrap()
                    .flags(Flags::from_bits(0x00FF))
                    .compress(CompressionMethod::Lz4)
                    .version(7),
            )
            .unwrap();

        let path = dir.path().join("bundle.spk");
        let written = builder.dump_to_file(&path, |_| {}).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), written);

        let archive = Archive::open_file(
            &path,
            ArchiveConfig::new().verifying_key(keys).require_signature(true),
        )
        .unwrap();

        let fetched = archive.fetch("text").unwrap();
        assert_eq!(fetched.data(), text.as_slice());
        assert!(fetched.verified);
        assert!(archive.entry("text").unwrap().digest.is_some());
        assert!(archive.entry("text").unwrap().length < text.len() as u64);

        assert_eq!(archive.fetch("noise").unwrap().data(), noise.as_slice());

        let inline = archive.fetch("inline").unwrap();
        assert_eq!(inline.data(), text.as_slice());
        assert_eq!(inline.content_version, 7);
        assert!(inline.flags.contains(Flags::LZ4));
        assert_eq!(inline.flags.user_bits(), 0x00FF);
    }

    #[test]
    fn test_digest_mismatch_marks_unverified() {
        let keys = KeyMaterial::generate();
        let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
        builder
            .add_leaf(Leaf::from_buffer("d", b"digested".to_vec()).unwrap().digest(true))
            .unwrap();

        let mut location = 0;
        let mut bytes = Vec::new();
        builder.dump(&mut bytes, |p| location = p.location).unwrap();
        bytes[location as usize] ^= 0x20;

        // Re-sign the altered bytes so only the digest disagrees
        let prefix = bytes.len() - SIGNATURE_LENGTH;
        let digest: [u8; 32] = Sha256::digest(&bytes[..prefix]).into();
        let signature = sign_digest(&keys, &digest).unwrap();
        bytes[prefix..].copy_from_slice(&signature);

        let archive =
            Archive::from_buffer(&bytes, ArchiveConfig::new().verifying_key(keys)).unwrap();
        archive.verify().unwrap();

        let resource = archive.fetch("d").unwrap();
        assert_eq!(resource.data(), b"Digested");
        assert!(!resource.verified);
    }

    #[test]
    fn test_custom_magic_must_match() {
        let magic = *b"MODPACK1";
        let mut builder = Builder::new(BuilderConfig::new().magic(magic));
        builder
            .add_leaf_from_buffer("x", b"y".to_vec(), Flags::empty())
            .unwrap();
        let mut bytes = Vec::new();
        builder.dump(&mut bytes, |_| {}).unwrap();

        let err = Archive::from_buffer(&bytes, ArchiveConfig::default()).unwrap_err();
        assert!(matches!(err, SealError::InvalidMagic(m) if m == magic));
        assert_eq!(err.kind(), ErrorKind::MalformedArchiveSource);

        let archive = Archive::from_buffer(&bytes, ArchiveConfig::new().magic(magic)).unwrap();
        assert_eq!(archive.fetch("x").unwrap().data(), b"y");
    }

    #[test]
    fn test_header_reflects_builder_config() {
        let keys = KeyMaterial::generate();
        let mut builder = Builder::new(
            BuilderConfig::new()
                .keys(keys.clone())
                .flags(Flags::from_bits(0x0ABC)),
        );
        builder
            .add_leaf_from_buffer("only", Vec::new(), Flags::empty())
            .unwrap();

        let mut bytes = Vec::new();
        builder.dump(&mut bytes, |_| {}).unwrap();

        let layout = format::decode(&mut Cursor::new(&bytes), &format::MAGIC).unwrap();
        assert!(layout.header.is_signed());
        assert_eq!(layout.header.flags.user_bits(), 0x0ABC);
        assert_eq!(layout.header.verifying_key, keys.verifying_bytes());
        assert_eq!(layout.header.leaf_count, 1);
        assert_eq!(layout.table_end, layout.payload_end);
        assert_eq!(layout.total_len(), bytes.len() as u64);
        assert!(layout.table_end > Header::SIZE as u64);
    }

    #[test]
    fn test_unlocked_and_locked_fetch_agree() {
        let keys = KeyMaterial::generate();
        let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
        for i in 0..16u8 {
            builder
                .add_leaf_from_buffer(format!("leaf-{i}"), vec![i; i as usize * 10], Flags::empty())
                .unwrap();
        }
        let mut bytes = Vec::new();
        builder.dump(&mut bytes, |_| {}).unwrap();

        let config = ArchiveConfig::new().verifying_key(keys).cache_capacity(4);
        let shared = Archive::from_buffer(&bytes, config.clone()).unwrap();
        let mut exclusive = Archive::from_vec(bytes.clone(), config).unwrap();

        for id in shared.get_entries() {
            assert_eq!(shared.fetch(id).unwrap(), exclusive.fetch_mut(id).unwrap());
        }
        assert_eq!(exclusive.verification_status(), VerificationStatus::Verified);
    }
}
