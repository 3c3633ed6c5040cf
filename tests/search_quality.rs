//! Search quality: recall against brute force and result invariants.

use forge_ann::dataset::exact_neighbors;
use forge_ann::{recall_at_k, AnnIndex, Dataset, ForgeAnnError, IndexConfig, Metric};

const K: usize = 10;

fn setup(metric: Metric, n: usize, dim: usize, trees: usize) -> (AnnIndex, Dataset) {
    let mut data = Dataset::generate(n, 50, dim, 1234);
    data.compute_ground_truth(K, metric);

    let mut index = AnnIndex::new(IndexConfig::new(dim, metric).seed(99)).unwrap();
    for (id, vector) in data.vectors.iter().enumerate() {
        index.add_item(id as u32, vector).unwrap();
    }
    index.build(trees).unwrap();
    (index, data)
}

fn mean_recall(index: &AnnIndex, data: &Dataset, search_k: usize) -> f32 {
    let total: f32 = data
        .queries
        .iter()
        .zip(&data.ground_truth)
        .map(|(query, truth)| {
            let found = index.get_nns_by_vector(query, K, Some(search_k)).unwrap();
            recall_at_k(&found.ids, truth, K)
        })
        .sum();
    total / data.queries.len() as f32
}

#[test]
fn test_recall_increases_with_search_k() {
    for metric in [Metric::Angular, Metric::Euclidean, Metric::Manhattan] {
        let (index, data) = setup(metric, 2000, 8, 10);

        let budgets = [K, 100, 500, 2000, 10_000];
        let recalls: Vec<f32> = budgets.iter().map(|k| mean_recall(&index, &data, *k)).collect();

        for pair in recalls.windows(2) {
            assert!(pair[1] + 1e-6 >= pair[0], "{metric}: recall dropped {recalls:?}");
        }
        // A budget covering every item ranks all of them exactly.
        assert_eq!(recalls[recalls.len() - 1], 1.0, "{metric}: {recalls:?}");
        assert!(recalls[2] > 0.6, "{metric}: low recall {recalls:?}");
    }
}

#[test]
fn test_default_budget_has_reasonable_recall() {
    let (index, data) = setup(Metric::Euclidean, 3000, 6, 20);
    let total: f32 = data
        .queries
        .iter()
        .zip(&data.ground_truth)
        .map(|(query, truth)| {
            let found = index.get_nns_by_vector(query, K, None).unwrap();
            recall_at_k(&found.ids, truth, K)
        })
        .sum();
    let recall = total / data.queries.len() as f32;
    assert!(recall > 0.3, "recall {recall}");
}

#[test]
fn test_results_are_sorted_valid_and_unique() {
    let (index, data) = setup(Metric::Angular, 1000, 16, 5);

    for id in (0..1000u32).step_by(37) {
        let result = index.get_nns_by_item(id, 15, None).unwrap();
        assert!(result.len() <= 15);
        assert!(result.distances.windows(2).all(|w| w[0] <= w[1]));
        assert!(result.ids.iter().all(|i| (*i as usize) < data.vectors.len()));

        let mut unique = result.ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), result.len());
    }
}

#[test]
fn test_item_query_finds_itself() {
    let (index, _) = setup(Metric::Euclidean, 1500, 10, 10);

    for id in (0..1500u32).step_by(101) {
        let result = index.get_nns_by_item(id, 1, None).unwrap();
        assert_eq!(result.ids, vec![id]);
        assert_eq!(result.distances, vec![0.0]);
    }
}

#[test]
fn test_reported_distances_match_get_distance() {
    let (index, data) = setup(Metric::Manhattan, 500, 5, 6);

    let result = index.get_nns_by_item(17, 8, Some(500)).unwrap();
    for (id, distance) in result.iter() {
        let direct = index.get_distance(17, id).unwrap();
        assert!((direct - distance).abs() < 1e-5);
    }

    let exact = exact_neighbors(&data.vectors, &data.vectors[17], 8, Metric::Manhattan);
    assert_eq!(result.ids, exact);
}

#[test]
fn test_duplicate_vectors() {
    let mut index =
        AnnIndex::new(IndexConfig::new(3, Metric::Euclidean).leaf_size(4).seed(5)).unwrap();
    for id in 0..300u32 {
        let v = if id % 2 == 0 { [1.0, 1.0, 1.0] } else { [2.0, 2.0, 2.0] };
        index.add_item(id, &v).unwrap();
    }
    index.build(4).unwrap();

    let result = index.get_nns_by_vector(&[1.0, 1.0, 1.0], 5, Some(1000)).unwrap();
    assert_eq!(result.ids, vec![0, 2, 4, 6, 8]);
    assert!(result.distances.iter().all(|d| *d == 0.0));
}

#[test]
fn test_get_distance_symmetric_and_zero_on_self() {
    for metric in [Metric::Angular, Metric::Euclidean, Metric::Manhattan] {
        let (index, _) = setup(metric, 60, 7, 2);
        for i in 0..60u32 {
            assert_eq!(index.get_distance(i, i).unwrap(), 0.0, "{metric}");
            for j in (0..60u32).step_by(7) {
                assert_eq!(index.get_distance(i, j).unwrap(), index.get_distance(j, i).unwrap());
            }
        }
    }
}

#[test]
fn test_non_finite_vectors_rejected() {
    let mut index = AnnIndex::new(IndexConfig::new(2, Metric::Euclidean).seed(3)).unwrap();
    index.add_item(0, &[0.0, 0.0]).unwrap();
    for (id, bad) in [(1, [f32::INFINITY, 0.0]), (2, [f32::NAN, 0.0])] {
        assert!(matches!(
            index.add_item(id, &bad),
            Err(ForgeAnnError::InvalidParameter(_))
        ));
    }
    index.add_item(3, &[1.0, 0.0]).unwrap();
    assert_eq!(index.n_items(), 2);
    index.build(3).unwrap();

    let result = index.get_nns_by_vector(&[0.0, 0.0], 4, Some(100)).unwrap();
    assert_eq!(result.ids, vec![0, 3]);
    assert_eq!(result.distances, vec![0.0, 1.0]);

    for query in [[f32::INFINITY, 0.0], [0.0, f32::NAN]] {
        assert!(matches!(
            index.get_nns_by_vector(&query, 4, Some(100)),
            Err(ForgeAnnError::InvalidParameter(_))
        ));
    }
    let batch = vec![vec![0.5, 0.0], vec![f32::NEG_INFINITY, 0.0]];
    assert!(matches!(
        index.batch_get_nns_by_vector(&batch, 2, None),
        Err(ForgeAnnError::InvalidParameter(_))
    ));
}
