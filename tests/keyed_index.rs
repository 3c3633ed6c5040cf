//! Keyed index: key mapping, directory save/load and key table validation.

use forge_ann::{Dataset, ForgeAnnError, IndexConfig, IndexState, KeyedIndex, Metric};
use std::fs;
use tempfile::tempdir;

fn keyed(n: usize, data: &Dataset) -> KeyedIndex<String> {
    let mut index =
        KeyedIndex::new(IndexConfig::new(data.dimension, Metric::Angular).seed(8)).unwrap();
    for (i, vector) in data.vectors.iter().take(n).enumerate() {
        index.put(format!("doc-{i}"), vector).unwrap();
    }
    index.build(6).unwrap();
    index
}

#[test]
fn test_keyed_roundtrip() {
    let dir = tempdir().unwrap();
    let data = Dataset::generate(300, 5, 10, 21);
    let mut index = keyed(300, &data);
    index.save(dir.path().join("docs"), false).unwrap();
    assert_eq!(index.index().state(), IndexState::MemoryMapped);
    assert!(!dir.path().join("docs").join("keys.bin.pending").exists());

    for prefault in [false, true] {
        let loaded = KeyedIndex::<String>::load(dir.path().join("docs"), prefault).unwrap();
        assert_eq!(loaded.len(), 300);
        assert!(loaded.contains_key(&"doc-299".to_string()));

        for query in &data.queries {
            assert_eq!(
                index.get_nns_by_vector(query, 5, None).unwrap(),
                loaded.get_nns_by_vector(query, 5, None).unwrap()
            );
        }

        let key = "doc-42".to_string();
        let (keys, distances) = loaded.get_nns_by_key(&key, 3, None).unwrap();
        assert_eq!(keys[0], key);
        assert_eq!(distances[0], 0.0);
        assert_eq!(loaded.get_item_vector(&key).unwrap(), data.vectors[42]);
    }
}

#[test]
fn test_unknown_key_is_reported() {
    let data = Dataset::generate(10, 0, 4, 2);
    let index = keyed(10, &data);
    assert!(matches!(
        index.get_nns_by_key(&"missing".to_string(), 3, None),
        Err(ForgeAnnError::KeyNotFound(_))
    ));
}

#[test]
fn test_mismatched_key_table_rejected() {
    let dir = tempdir().unwrap();
    let data = Dataset::generate(40, 0, 6, 9);

    keyed(20, &data).save(dir.path().join("small"), false).unwrap();
    keyed(40, &data).save(dir.path().join("large"), false).unwrap();
    fs::copy(
        dir.path().join("large").join("keys.bin"),
        dir.path().join("small").join("keys.bin"),
    )
    .unwrap();

    assert!(matches!(
        KeyedIndex::<String>::load(dir.path().join("small"), false),
        Err(ForgeAnnError::InvalidFormat(_))
    ));
}

#[test]
fn test_corrupt_or_missing_key_table_rejected() {
    let dir = tempdir().unwrap();
    let data = Dataset::generate(15, 0, 3, 4);
    let path = dir.path().join("docs");
    keyed(15, &data).save(&path, true).unwrap();

    fs::write(path.join("keys.bin"), b"not a key table").unwrap();
    assert!(matches!(
        KeyedIndex::<String>::load(&path, false),
        Err(ForgeAnnError::InvalidFormat(_))
    ));

    fs::remove_file(path.join("keys.bin")).unwrap();
    assert!(matches!(
        KeyedIndex::<String>::load(&path, false),
        Err(ForgeAnnError::Io(_))
    ));
}

#[test]
fn test_failed_forest_save_writes_no_key_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("docs");
    // A non-empty directory where the forest file belongs makes the rename fail.
    fs::create_dir_all(path.join("index.ann").join("occupied")).unwrap();

    let data = Dataset::generate(25, 0, 4, 6);
    let mut index = keyed(25, &data);
    assert!(index.save(&path, false).is_err());

    assert!(!path.join("keys.bin").exists());
    assert!(!path.join("keys.bin.pending").exists());
    assert_eq!(index.index().state(), IndexState::Built);
}

#[test]
fn test_integer_keys() {
    let mut index = KeyedIndex::<u64>::new(IndexConfig::new(2, Metric::Manhattan).seed(3)).unwrap();
    index.put(1_000_000, &[0.0, 0.0]).unwrap();
    index.put(7, &[3.0, 0.0]).unwrap();
    index.put(99, &[1.0, 1.0]).unwrap();
    index.build(4).unwrap();

    let (keys, distances) = index.get_nns_by_vector(&[0.0, 0.0], 3, None).unwrap();
    assert_eq!(keys, vec![1_000_000, 99, 7]);
    assert_eq!(distances, vec![0.0, 2.0, 3.0]);
}
