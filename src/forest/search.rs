//! Best-first search across all trees of a forest.
//!
//! A single priority queue holds pending nodes of every tree, keyed by the
//! smallest margin seen on the path to them. Roots start at `+inf`. At a split
//! the side the query falls on inherits the path priority, while the far side
//! is capped by the query's distance from the hyperplane, so the queue drifts
//! towards the leaves closest to the query in every tree at once.
//!
//! Leaves feed a candidate set until it holds `search_k` items (or the queue
//! runs dry). Candidates are then ranked by exact distance.

use roaring::RoaringBitmap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{ForestView, Node};
use crate::types::{ItemId, Neighbors, NodeRef};

/// Pending node ordered by priority (max-heap).
#[derive(Debug, Clone, Copy)]
struct Pending {
    priority: f32,
    node: NodeRef,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Candidate with its ranking distance.
#[derive(Debug, Clone, Copy)]
struct Scored {
    distance: f32,
    id: ItemId,
}

impl Scored {
    #[inline]
    fn rank(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Query executor bound to a forest view.
pub struct Searcher<'a> {
    view: ForestView<'a>,
}

impl<'a> Searcher<'a> {
    pub fn new(view: ForestView<'a>) -> Self {
        Self { view }
    }

    /// Default candidate budget: `n * n_trees`.
    #[inline]
    pub fn default_search_k(&self, n: usize) -> usize {
        n.saturating_mul(self.view.n_trees())
    }

    /// Up to `n` approximate nearest neighbors of `query`.
    ///
    /// `search_k` bounds the number of candidate items examined; `None` or
    /// `Some(0)` means the default. `query` must already have the forest's
    /// dimension. The result is sorted by ascending distance, ties broken by
    /// ascending id, and holds no duplicates.
    pub fn search(&self, query: &[f32], n: usize, search_k: Option<usize>) -> Neighbors {
        if n == 0 || self.view.n_items() == 0 {
            return Neighbors::default();
        }

        let search_k = match search_k {
            Some(k) if k > 0 => k,
            _ => self.default_search_k(n),
        };

        let candidates = self.collect_candidates(query, search_k);
        self.rank(query, &candidates, n)
    }

    fn collect_candidates(&self, query: &[f32], search_k: usize) -> RoaringBitmap {
        let metric = self.view.metric();
        let mut heap = BinaryHeap::with_capacity(self.view.n_trees() * 2);
        heap.extend(self.view.roots().map(|node| Pending {
            priority: f32::INFINITY,
            node,
        }));

        let mut candidates = RoaringBitmap::new();
        while (candidates.len() as usize) < search_k {
            let Some(Pending { priority, node }) = heap.pop() else {
                break;
            };

            match self.view.node(node) {
                Node::Leaf(items) => {
                    candidates.extend(items.iter().copied());
                }
                Node::Split { plane, left, right } => {
                    let margin = metric.margin(plane, query);
                    heap.push(Pending {
                        priority: priority.min(margin),
                        node: right,
                    });
                    heap.push(Pending {
                        priority: priority.min(-margin),
                        node: left,
                    });
                }
            }
        }

        candidates
    }

    fn rank(&self, query: &[f32], candidates: &RoaringBitmap, n: usize) -> Neighbors {
        let metric = self.view.metric();
        let mut scored: Vec<Scored> = candidates
            .iter()
            .filter_map(|id| {
                self.view.item(id).map(|v| Scored {
                    distance: metric.distance(query, v),
                    id,
                })
            })
            .collect();

        if scored.len() > n {
            scored.select_nth_unstable_by(n - 1, Scored::rank);
            scored.truncate(n);
        }
        scored.sort_unstable_by(Scored::rank);

        let mut result = Neighbors::with_capacity(scored.len());
        for s in scored {
            result.ids.push(s.id);
            result.distances.push(metric.normalized_distance(s.distance));
        }
        result
    }
}
