//! Property-based round trip tests
//!
//! Whatever set of leaves goes into a builder comes back out of the loader
//! byte for byte, with flags and versions intact.

use proptest::prelude::*;
use sealpack::{
    Archive, ArchiveConfig, Builder, BuilderConfig, CompressionMethod, Flags, KeyMaterial, Leaf,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct LeafCase {
    data: Vec<u8>,
    user_flags: u16,
    version: u8,
    method: CompressionMethod,
    digest: bool,
}

fn method_strategy() -> impl Strategy<Value = CompressionMethod> {
    prop_oneof![
        Just(CompressionMethod::None),
        Just(CompressionMethod::Lz4),
        Just(CompressionMethod::Zstd),
    ]
}

fn leaf_strategy() -> impl Strategy<Value = LeafCase> {
    (
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..512),
            // repetitive data so compression actually sticks
            (any::<u8>(), 0usize..4096).prop_map(|(byte, len)| vec![byte; len]),
        ],
        any::<u16>(),
        any::<u8>(),
        method_strategy(),
        any::<bool>(),
    )
        .prop_map(|(data, user_flags, version, method, digest)| LeafCase {
            data,
            user_flags,
            version,
            method,
            digest,
        })
}

fn build(cases: &BTreeMap<String, LeafCase>, keys: Option<&KeyMaterial>) -> Vec<u8> {
    let mut config = BuilderConfig::new();
    if let Some(keys) = keys {
        config = config.keys(keys.clone());
    }

    let mut builder = Builder::new(config);
    for (id, case) in cases {
        let leaf = Leaf::from_buffer(id.as_str(), case.data.clone())
            .unwrap()
            .flags(Flags::from_bits(case.user_flags as u32))
            .compress(case.method)
            .digest(case.digest)
            .version(case.version);
        builder.add_leaf(leaf).unwrap();
    }

    let mut bytes = Vec::new();
    let written = builder.dump(&mut bytes, |_| {}).unwrap();
    assert_eq!(written, bytes.len() as u64);
    assert_eq!(builder.encoded_len().unwrap(), written);
    bytes
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_signed_round_trip(
        cases in prop::collection::btree_map("[a-z0-9_/.]{0,24}", leaf_strategy(), 0..12)
    ) {
        let keys = KeyMaterial::generate();
        let bytes = build(&cases, Some(&keys));

        let config = ArchiveConfig::new().verifying_key(keys);
        let archive = Archive::from_buffer(&bytes, config).unwrap();
        prop_assert_eq!(archive.len(), cases.len());
        prop_assert!(archive.verify().is_ok());

        for (id, case) in &cases {
            let resource = archive.fetch(id).unwrap();
            prop_assert_eq!(resource.data(), case.data.as_slice());
            prop_assert_eq!(resource.content_version, case.version);
            prop_assert_eq!(resource.flags.user_bits(), case.user_flags as u32);
            prop_assert_eq!(resource.flags.contains(Flags::DIGEST), case.digest);
            prop_assert!(resource.verified);

            // compression only sticks when it saves space
            let method = CompressionMethod::from_flags(resource.flags);
            prop_assert!(method == CompressionMethod::None || method == case.method);
            let entry = archive.entry(id).unwrap();
            if method != CompressionMethod::None {
                prop_assert!(entry.length < case.data.len() as u64);
            } else {
                prop_assert_eq!(entry.length, case.data.len() as u64);
            }
        }
    }

    #[test]
    fn prop_unsigned_round_trip(
        cases in prop::collection::btree_map("[A-Za-z]{1,8}", leaf_strategy(), 1..6)
    ) {
        let bytes = build(&cases, None);

        let mut archive = Archive::from_vec(bytes, ArchiveConfig::default()).unwrap();
        prop_assert!(!archive.is_signed());

        let ids: Vec<String> = archive.get_entries().into_iter().map(str::to_string).collect();
        prop_assert_eq!(ids.len(), cases.len());
        for id in ids {
            let resource = archive.fetch_mut(&id).unwrap();
            prop_assert_eq!(resource.data(), cases[&id].data.as_slice());
            prop_assert!(!resource.verified);
        }
    }

    #[test]
    fn prop_garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(archive) = Archive::from_buffer(&bytes, ArchiveConfig::default()) {
            for id in archive.get_entries() {
                let _ = archive.fetch(id);
            }
        }
    }
}
