//! Lifecycle tests: state transitions, rejected operations and the small
//! hand-checked scenarios.

use forge_ann::{AnnIndex, BuildOptions, ForgeAnnError, IndexConfig, IndexState, Metric, TreeCount};
use tempfile::tempdir;

fn four_points() -> AnnIndex {
    let mut index = AnnIndex::new(IndexConfig::new(4, Metric::Euclidean).seed(2024)).unwrap();
    index.add_item(0, &[0.0, 0.0, 0.0, 0.0]).unwrap();
    index.add_item(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    index.add_item(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
    index.add_item(3, &[5.0, 5.0, 5.0, 5.0]).unwrap();
    index
}

#[test]
fn test_four_point_scenario() {
    let mut index = four_points();
    index.build(10).unwrap();

    let result = index.get_nns_by_vector(&[0.0, 0.0, 0.0, 0.0], 2, Some(100)).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.ids[0], 0);
    assert!(result.ids[1] == 1 || result.ids[1] == 2, "got {:?}", result.ids);
    assert!(!result.ids.contains(&3));
    assert_eq!(result.distances[0], 0.0);
    assert!((result.distances[1] - 1.0).abs() < 1e-6);
}

#[test]
fn test_items_survive_build() {
    let mut index = four_points();
    let before: Vec<Vec<f32>> = (0..4).map(|id| index.get_item(id).unwrap()).collect();
    index.build(3).unwrap();

    for (id, vector) in before.iter().enumerate() {
        assert_eq!(&index.get_item(id as u32).unwrap(), vector);
    }
    assert!(matches!(index.get_item(4), Err(ForgeAnnError::NotFound(4))));
}

#[test]
fn test_overwrite_before_build() {
    let mut index = four_points();
    index.add_item(3, &[0.5, 0.5, 0.5, 0.5]).unwrap();
    assert_eq!(index.n_items(), 4);
    index.build(2).unwrap();
    assert_eq!(index.get_item(3).unwrap(), vec![0.5; 4]);
}

#[test]
fn test_second_build_fails() {
    let mut index = four_points();
    index.build(5).unwrap();
    let err = index.build(5).unwrap_err();
    assert!(matches!(
        err,
        ForgeAnnError::InvalidState {
            operation: "build",
            state: IndexState::Built
        }
    ));
    assert_eq!(err.to_string(), "invalid state: cannot build while index is built");
    assert_eq!(index.state(), IndexState::Built);
}

#[test]
fn test_queries_before_build_fail() {
    let index = four_points();
    assert!(matches!(
        index.get_nns_by_item(0, 2, None),
        Err(ForgeAnnError::InvalidState { .. })
    ));
    assert!(matches!(
        index.get_nns_by_vector(&[0.0; 4], 2, None),
        Err(ForgeAnnError::InvalidState { .. })
    ));
    assert!(matches!(index.get_distance(0, 1), Err(ForgeAnnError::InvalidState { .. })));
    assert!(matches!(index.statistics(), Err(ForgeAnnError::InvalidState { .. })));
}

#[test]
fn test_dimension_mismatch_on_add() {
    let mut index = four_points();
    assert!(matches!(
        index.add_item(9, &[1.0, 2.0]),
        Err(ForgeAnnError::DimensionMismatch { expected: 4, actual: 2 })
    ));
    assert_eq!(index.n_items(), 4);
}

#[test]
fn test_empty_index_builds_and_answers_nothing() {
    let mut index = AnnIndex::new(IndexConfig::new(3, Metric::Angular)).unwrap();
    index.build(BuildOptions::from_hint(-1)).unwrap();

    assert_eq!(index.n_items(), 0);
    assert!(index.n_trees() >= 1);
    assert!(index.get_nns_by_vector(&[1.0, 0.0, 0.0], 5, None).unwrap().is_empty());
}

#[test]
fn test_auto_tree_count() {
    let mut index =
        AnnIndex::new(IndexConfig::new(2, Metric::Euclidean).leaf_size(4).seed(1)).unwrap();
    for id in 0..500u32 {
        index.add_item(id, &[(id % 25) as f32, (id / 25) as f32]).unwrap();
    }
    index.build(BuildOptions::new(TreeCount::Auto)).unwrap();

    let stats = index.statistics().unwrap();
    assert!(stats.n_splits + stats.n_leaves >= 500);
    assert_eq!(stats.n_trees, index.n_trees());
}

#[test]
fn test_unload_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("four.ann");

    let mut index = four_points();
    index.build(4).unwrap();
    index.save(&path, false).unwrap();
    assert_eq!(index.state(), IndexState::MemoryMapped);

    index.unload().unwrap();
    assert_eq!(index.state(), IndexState::Unloaded);
    assert!(matches!(
        index.get_nns_by_item(0, 1, None),
        Err(ForgeAnnError::InvalidState { state: IndexState::Unloaded, .. })
    ));
    assert!(matches!(index.build(1), Err(ForgeAnnError::InvalidState { .. })));
    assert!(matches!(
        index.add_item(5, &[0.0; 4]),
        Err(ForgeAnnError::InvalidState { .. })
    ));

    index.load(&path, true).unwrap();
    assert_eq!(index.state(), IndexState::MemoryMapped);
    assert_eq!(index.n_items(), 4);
    assert_eq!(index.get_nns_by_item(1, 1, None).unwrap().ids, vec![1]);
}

#[test]
fn test_mapped_index_is_read_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("four.ann");

    let mut index = four_points();
    index.build(4).unwrap();
    index.save(&path, false).unwrap();

    let mut loaded = AnnIndex::new(IndexConfig::new(4, Metric::Euclidean)).unwrap();
    loaded.load(&path, false).unwrap();
    assert!(matches!(
        loaded.add_item(10, &[1.0; 4]),
        Err(ForgeAnnError::InvalidState { state: IndexState::MemoryMapped, .. })
    ));
    assert!(matches!(loaded.build(2), Err(ForgeAnnError::InvalidState { .. })));
}

#[test]
fn test_load_missing_file_leaves_state_unchanged() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.ann");

    let mut fresh = AnnIndex::new(IndexConfig::new(4, Metric::Euclidean)).unwrap();
    assert!(matches!(fresh.load(&missing, false), Err(ForgeAnnError::Io(_))));
    assert_eq!(fresh.state(), IndexState::Unbuilt);

    let mut built = four_points();
    built.build(3).unwrap();
    assert!(built.load(&missing, true).is_err());
    assert_eq!(built.state(), IndexState::Built);
    assert_eq!(built.get_nns_by_item(3, 1, None).unwrap().ids, vec![3]);

    built.unload().unwrap();
    assert!(built.load(&missing, false).is_err());
    assert_eq!(built.state(), IndexState::Unloaded);
}

#[test]
fn test_verbose_has_no_functional_effect() {
    let mut quiet = four_points();
    let mut loud = four_points();
    loud.set_verbose(true);

    quiet.build(6).unwrap();
    loud.build(6).unwrap();

    let query = [0.2, 0.3, 0.0, 0.1];
    assert_eq!(
        quiet.get_nns_by_vector(&query, 4, None).unwrap(),
        loud.get_nns_by_vector(&query, 4, None).unwrap()
    );
}
