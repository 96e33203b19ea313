#![no_main]
use libfuzzer_sys::fuzz_target;
use sealpack::{Archive, ArchiveConfig, KeyMaterial};

// Arbitrary bytes must never panic the loader, only error out
fuzz_target!(|data: &[u8]| {
    let keys = KeyMaterial::from_verifying_bytes(&[7u8; 32]).ok();
    let mut config = ArchiveConfig::new().cache_capacity(4);
    if let Some(keys) = keys {
        config = config.verifying_key(keys);
    }

    let archive = match Archive::from_buffer(data, config) {
        Ok(archive) => archive,
        Err(_) => return,
    };

    let _ = archive.verify();
    for id in archive.get_entries() {
        let _ = archive.fetch(id);
    }
});
