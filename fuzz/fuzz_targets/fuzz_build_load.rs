#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealpack::{Archive, ArchiveConfig, Builder, BuilderConfig, CompressionMethod, Flags, Leaf};

#[derive(Debug, Arbitrary)]
struct FuzzLeaf {
    id: String,
    data: Vec<u8>,
    flags: u16,
    version: u8,
    method: u8,
    digest: bool,
}

fuzz_target!(|leaves: Vec<FuzzLeaf>| {
    let mut builder = Builder::new(BuilderConfig::default());
    let mut kept = Vec::new();

    for leaf in leaves {
        let method = match leaf.method % 3 {
            0 => CompressionMethod::None,
            1 => CompressionMethod::Lz4,
            _ => CompressionMethod::Zstd,
        };
        let built = match Leaf::from_buffer(leaf.id.as_str(), leaf.data.clone()) {
            Ok(built) => built
                .flags(Flags::from_bits(leaf.flags as u32))
                .compress(method)
                .digest(leaf.digest)
                .version(leaf.version),
            Err(_) => continue,
        };
        if builder.add_leaf(built).is_ok() {
            kept.push(leaf);
        }
    }

    let mut bytes = Vec::new();
    builder.dump(&mut bytes, |_| {}).expect("in-memory dump cannot fail");

    let archive =
        Archive::from_buffer(&bytes, ArchiveConfig::default()).expect("built archive must load");
    assert_eq!(archive.len(), kept.len());
    for leaf in kept {
        let resource = archive.fetch(&leaf.id).expect("leaf must be fetchable");
        assert_eq!(resource.data(), leaf.data.as_slice());
        assert_eq!(resource.content_version, leaf.version);
    }
});
