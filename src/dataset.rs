//! Dataset utilities for generating and evaluating approximate search.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::distance::Metric;
use crate::types::ItemId;

/// A dataset containing vectors, queries, and ground truth for evaluation.
pub struct Dataset {
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
    pub queries: Vec<Vec<f32>>,
    pub ground_truth: Vec<Vec<ItemId>>,
}

impl Dataset {
    /// Generate a random synthetic dataset.
    ///
    /// Components are drawn uniformly from `[-1, 1)`; the same seed always
    /// yields the same vectors and queries.
    pub fn generate(n_vectors: usize, n_queries: usize, dimension: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut random = |count: usize| -> Vec<Vec<f32>> {
            (0..count)
                .map(|_| (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect())
                .collect()
        };

        let vectors = random(n_vectors);
        let queries = random(n_queries);

        Self {
            dimension,
            vectors,
            queries,
            ground_truth: Vec::new(),
        }
    }

    /// Compute exact nearest neighbors of every query by brute force.
    pub fn compute_ground_truth(&mut self, k: usize, metric: Metric) {
        self.ground_truth = self
            .queries
            .iter()
            .map(|query| exact_neighbors(&self.vectors, query, k, metric))
            .collect();
    }
}

/// Max-heap entry keyed by distance, ties by id.
#[derive(Clone, Copy)]
struct Scored {
    distance: f32,
    id: ItemId,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Ids of the `k` vectors closest to `query`, closest first.
///
/// Vector `i` of `vectors` has id `i`.
pub fn exact_neighbors(
    vectors: &[Vec<f32>],
    query: &[f32],
    k: usize,
    metric: Metric,
) -> Vec<ItemId> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (i, vector) in vectors.iter().enumerate() {
        let candidate = Scored {
            distance: metric.distance(query, vector),
            id: i as ItemId,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek() {
            if candidate < *worst {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec().into_iter().map(|s| s.id).collect()
}

/// Compute recall@k between predicted and ground truth results.
///
/// Recall is the fraction of true nearest neighbors that were found.
/// Returns a value between 0.0 and 1.0.
pub fn recall_at_k(predicted: &[ItemId], ground_truth: &[ItemId], k: usize) -> f32 {
    if k == 0 {
        return 1.0;
    }
    let pred_set: HashSet<ItemId> = predicted.iter().take(k).copied().collect();
    let truth_set: HashSet<ItemId> = ground_truth.iter().take(k).copied().collect();

    let intersection = pred_set.intersection(&truth_set).count();
    intersection as f32 / k as f32
}
