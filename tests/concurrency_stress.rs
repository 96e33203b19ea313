//! Concurrent fetch stress tests

use parking_lot::Mutex;
use sealpack::{
    Archive, ArchiveConfig, Builder, BuilderConfig, CompressionMethod, Flags, KeyMaterial, Leaf,
    Resource,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

const LEAVES: usize = 64;

fn build_archive(keys: &KeyMaterial) -> Vec<u8> {
    let mut builder = Builder::new(BuilderConfig::new().keys(keys.clone()));
    for i in 0..LEAVES {
        let data = format!("payload-{i}-").repeat(i + 1).into_bytes();
        let mut leaf = Leaf::from_buffer(format!("leaf/{i}"), data)
            .unwrap()
            .version(i as u8);
        if i % 3 == 0 {
            leaf = leaf.compress(CompressionMethod::Lz4);
        }
        if i % 4 == 0 {
            leaf = leaf.digest(true);
        }
        builder.add_leaf(leaf).unwrap();
    }

    let mut out = Vec::new();
    builder.dump(&mut out, |_| {}).unwrap();
    out
}

fn sequential_results(bytes: &[u8], keys: &KeyMaterial) -> HashMap<String, Resource> {
    let config = ArchiveConfig::new().verifying_key(keys.clone());
    let archive = Archive::from_buffer(bytes, config).unwrap();
    archive
        .get_entries()
        .into_iter()
        .map(|id| (id.to_string(), archive.fetch(id).unwrap()))
        .collect()
}

fn hammer(archive: Arc<Archive<Cursor<Vec<u8>>>>, expected: Arc<HashMap<String, Resource>>) {
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let checked = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|thread_id| {
            let archive = Arc::clone(&archive);
            let expected = Arc::clone(&expected);
            let barrier = Arc::clone(&barrier);
            let checked = Arc::clone(&checked);
            std::thread::spawn(move || {
                // everyone races for the first (verifying) fetch
                barrier.wait();
                for round in 0..200 {
                    // even threads overlap on a hot set, odd threads walk disjoint ids
                    let idx = if thread_id % 2 == 0 {
                        rand::random::<usize>() % 8
                    } else {
                        (thread_id * 7 + round) % LEAVES
                    };
                    let id = format!("leaf/{idx}");
                    let resource = archive.fetch(&id).unwrap();
                    assert_eq!(&resource, &expected[&id], "mismatch for {id}");
                    checked.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(checked.load(Ordering::Relaxed), threads * 200);
}

#[test]
fn test_concurrent_fetch_matches_sequential() {
    let keys = KeyMaterial::generate();
    let bytes = build_archive(&keys);
    let expected = Arc::new(sequential_results(&bytes, &keys));
    assert!(expected.values().all(|r| r.verified));

    let archive = Archive::from_vec(bytes, ArchiveConfig::new().verifying_key(keys)).unwrap();
    hammer(Arc::new(archive), expected);
}

#[test]
fn test_concurrent_fetch_with_cache() {
    let keys = KeyMaterial::generate();
    let bytes = build_archive(&keys);
    let expected = Arc::new(sequential_results(&bytes, &keys));

    let config = ArchiveConfig::new()
        .verifying_key(keys)
        .cache_capacity(LEAVES * 2);
    let archive = Arc::new(Archive::from_vec(bytes, config).unwrap());
    hammer(Arc::clone(&archive), expected);

    let stats = archive.cache_stats();
    assert_eq!(stats.hits + stats.misses, 16 * 200);
    // every id is touched, and nothing is ever evicted
    assert_eq!(stats.entries, LEAVES);
    assert!(stats.misses >= LEAVES as u64);
    assert!(stats.hits > 0);
}

#[test]
fn test_concurrent_first_access_with_wrong_key() {
    let keys = KeyMaterial::generate();
    let bytes = build_archive(&keys);
    let config = ArchiveConfig::new().verifying_key(KeyMaterial::generate());
    let archive = Arc::new(Archive::from_vec(bytes, config).unwrap());

    let verdicts = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let archive = Arc::clone(&archive);
            let verdicts = Arc::clone(&verdicts);
            std::thread::spawn(move || {
                let resource = archive.fetch(&format!("leaf/{i}")).unwrap();
                verdicts.lock().push(resource.verified);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    let verdicts = verdicts.lock();
    assert_eq!(verdicts.len(), 8);
    assert!(verdicts.iter().all(|&v| !v));
}

#[test]
fn test_unlocked_fetch_from_many_owned_archives() {
    let keys = KeyMaterial::generate();
    let bytes = Arc::new(build_archive(&keys));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bytes = Arc::clone(&bytes);
            let keys = keys.to_verifying();
            std::thread::spawn(move || {
                let config = ArchiveConfig::new().verifying_key(keys);
                let mut archive = Archive::from_vec(bytes.to_vec(), config).unwrap();
                for i in 0..LEAVES {
                    let resource = archive.fetch_mut(&format!("leaf/{i}")).unwrap();
                    assert!(resource.verified);
                    assert_eq!(resource.content_version, i as u8);
                    assert_eq!(resource.flags.user_bits(), Flags::empty().user_bits());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
