//! Random-projection tree construction.
//!
//! Each tree is grown independently from its own seeded random stream, so the
//! trees of a forest can be built in parallel and a fixed seed reproduces the
//! same forest regardless of the number of worker threads.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::debug;

use crate::constants::tree::{
    AUTO_NODE_FACTOR, MAX_SPLIT_IMBALANCE, SEED_STRIDE, SPLIT_ATTEMPTS,
};
use crate::distance::{Hyperplane, Metric, VectorSource};
use crate::index::TreeCount;
use crate::types::{ItemId, NodeRef, Side};

/// Split node of a tree under construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitNode {
    pub(crate) left: NodeRef,
    pub(crate) right: NodeRef,
    pub(crate) offset: f32,
}

/// Node tables of one tree, addressed from zero.
///
/// [`super::ForestTables::merge`] relocates every reference when the trees
/// are concatenated into the forest.
#[derive(Debug, Clone)]
pub(crate) struct TreeArena {
    pub(crate) root: NodeRef,
    pub(crate) splits: Vec<SplitNode>,
    pub(crate) normals: Vec<f32>,
    /// `(start, len)` into `pool`.
    pub(crate) leaves: Vec<(u32, u32)>,
    pub(crate) pool: Vec<ItemId>,
}

impl TreeArena {
    fn new() -> Self {
        Self {
            root: NodeRef::leaf(0),
            splits: Vec::new(),
            normals: Vec::new(),
            leaves: Vec::new(),
            pool: Vec::new(),
        }
    }

    /// Total number of split and leaf nodes.
    #[inline]
    pub(crate) fn node_count(&self) -> usize {
        self.splits.len() + self.leaves.len()
    }
}

/// Grows one tree by recursive bisection.
struct TreeBuilder<'a, S: ?Sized> {
    source: &'a S,
    metric: Metric,
    leaf_size: usize,
    rng: StdRng,
    arena: TreeArena,
    forced_splits: usize,
}

impl<'a, S: VectorSource + ?Sized> TreeBuilder<'a, S> {
    fn build(mut self, ids: Vec<ItemId>) -> (TreeArena, usize) {
        self.arena.root = self.make_tree(ids);
        (self.arena, self.forced_splits)
    }

    fn make_tree(&mut self, bucket: Vec<ItemId>) -> NodeRef {
        if bucket.len() <= self.leaf_size {
            return self.push_leaf(&bucket);
        }

        let (plane, left, right) = self.split(bucket);

        // Reserve the slot before recursing so children get larger indices.
        let index = self.arena.splits.len();
        self.arena.splits.push(SplitNode {
            left: NodeRef::leaf(0),
            right: NodeRef::leaf(0),
            offset: plane.offset,
        });
        self.arena.normals.extend_from_slice(&plane.normal);

        let left = self.make_tree(left);
        let right = self.make_tree(right);
        let node = &mut self.arena.splits[index];
        node.left = left;
        node.right = right;

        NodeRef::split(index as u32)
    }

    fn push_leaf(&mut self, bucket: &[ItemId]) -> NodeRef {
        let index = self.arena.leaves.len() as u32;
        let start = self.arena.pool.len() as u32;
        self.arena.pool.extend_from_slice(bucket);
        self.arena.leaves.push((start, bucket.len() as u32));
        NodeRef::leaf(index)
    }

    /// Partition a bucket with a sampled hyperplane, retrying lopsided
    /// splits. When every attempt is too unbalanced (typically a bucket of
    /// duplicates) the bucket is cut in half under a zero hyperplane, which
    /// search treats as equally close on both sides.
    fn split(&mut self, bucket: Vec<ItemId>) -> (Hyperplane, Vec<ItemId>, Vec<ItemId>) {
        for _ in 0..SPLIT_ATTEMPTS {
            let plane = self.metric.create_split(&bucket, self.source, &mut self.rng);

            let mut left = Vec::with_capacity(bucket.len() / 2 + 1);
            let mut right = Vec::with_capacity(bucket.len() / 2 + 1);
            for &id in &bucket {
                match self.metric.side(plane.as_ref(), self.source.vector(id), &mut self.rng) {
                    Side::Left => left.push(id),
                    Side::Right => right.push(id),
                }
            }

            if imbalance(left.len(), right.len()) <= MAX_SPLIT_IMBALANCE {
                return (plane, left, right);
            }
        }

        self.forced_splits += 1;
        let mut left = bucket;
        let right = left.split_off(left.len() / 2);
        (Hyperplane::zero(self.source.dimension()), left, right)
    }
}

/// Fraction of the bucket that landed on the larger side.
#[inline]
fn imbalance(left: usize, right: usize) -> f32 {
    let total = (left + right).max(1) as f32;
    left.max(right) as f32 / total
}

/// Builds the trees of a forest over a set of stored items.
pub(crate) struct ForestBuilder<'a, S: ?Sized> {
    source: &'a S,
    ids: &'a [ItemId],
    metric: Metric,
    leaf_size: usize,
    seed: u64,
}

impl<'a, S: VectorSource + ?Sized> ForestBuilder<'a, S> {
    pub(crate) fn new(
        source: &'a S,
        ids: &'a [ItemId],
        metric: Metric,
        leaf_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            source,
            ids,
            metric,
            leaf_size: leaf_size.max(1),
            seed,
        }
    }

    /// Build the requested number of trees on the current rayon pool.
    pub(crate) fn build_trees(&self, count: TreeCount) -> Vec<TreeArena> {
        match count {
            TreeCount::Fixed(n) => (0..n).into_par_iter().map(|t| self.build_tree(t)).collect(),
            TreeCount::Auto => self.build_until_covered(),
        }
    }

    /// Add trees in batches of one per worker until the forest has at least
    /// as many nodes as there are items. Trees beyond the one that reaches
    /// the target are discarded, keeping the result independent of the
    /// batch size.
    fn build_until_covered(&self) -> Vec<TreeArena> {
        let target = (self.ids.len() * AUTO_NODE_FACTOR).max(1);
        let batch = rayon::current_num_threads().max(1);

        let mut trees = Vec::new();
        let mut nodes = 0usize;
        while nodes < target {
            let start = trees.len();
            let built: Vec<TreeArena> = (start..start + batch)
                .into_par_iter()
                .map(|t| self.build_tree(t))
                .collect();

            for tree in built {
                nodes += tree.node_count();
                trees.push(tree);
                if nodes >= target {
                    break;
                }
            }
        }

        trees
    }

    fn build_tree(&self, tree_index: usize) -> TreeArena {
        let seed = self
            .seed
            .wrapping_add((tree_index as u64).wrapping_mul(SEED_STRIDE));

        let builder = TreeBuilder {
            source: self.source,
            metric: self.metric,
            leaf_size: self.leaf_size,
            rng: StdRng::seed_from_u64(seed),
            arena: TreeArena::new(),
            forced_splits: 0,
        };

        let (arena, forced_splits) = builder.build(self.ids.to_vec());
        debug!(
            tree = tree_index,
            splits = arena.splits.len(),
            leaves = arena.leaves.len(),
            forced_splits,
            "built tree"
        );
        arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{ForestSource, ForestTables, Node, OwnedForest};
    use crate::store::VectorStore;
    use rand::Rng;

    fn random_store(n: u32, dim: usize, seed: u64) -> VectorStore {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut store = VectorStore::new(dim);
        for id in 0..n {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            store.add(id, &v).unwrap();
        }
        store
    }

    fn leaf_items(view: &crate::forest::ForestView<'_>, node: NodeRef, out: &mut Vec<ItemId>) {
        match view.node(node) {
            Node::Leaf(items) => out.extend_from_slice(items),
            Node::Split { left, right, .. } => {
                leaf_items(view, left, out);
                leaf_items(view, right, out);
            }
        }
    }

    #[test]
    fn test_every_item_in_exactly_one_leaf_per_tree() {
        let store = random_store(300, 6, 42);
        let ids = store.ids();
        let trees = ForestBuilder::new(&store, &ids, Metric::Euclidean, 10, 1)
            .build_trees(TreeCount::Fixed(4));
        let tables = ForestTables::merge(&trees, 6).unwrap();
        let forest = OwnedForest::new(Metric::Euclidean, store, tables);
        let view = forest.view();
        view.validate().unwrap();

        for root in view.roots() {
            let mut items = Vec::new();
            leaf_items(&view, root, &mut items);
            items.sort_unstable();
            assert_eq!(items, ids);
        }
    }

    #[test]
    fn test_leaves_respect_leaf_size() {
        let store = random_store(500, 4, 7);
        let ids = store.ids();
        let trees = ForestBuilder::new(&store, &ids, Metric::Angular, 12, 3)
            .build_trees(TreeCount::Fixed(3));

        for tree in &trees {
            assert!(tree.leaves.iter().all(|(_, len)| *len as usize <= 12));
        }
    }

    #[test]
    fn test_duplicates_terminate() {
        let mut store = VectorStore::new(3);
        for id in 0..200 {
            store.add(id, &[1.0, 1.0, 1.0]).unwrap();
        }
        let ids = store.ids();
        let trees = ForestBuilder::new(&store, &ids, Metric::Manhattan, 5, 9)
            .build_trees(TreeCount::Fixed(2));

        for tree in &trees {
            let total: u32 = tree.leaves.iter().map(|(_, len)| len).sum();
            assert_eq!(total, 200);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let store = random_store(200, 5, 11);
        let ids = store.ids();
        let a = ForestBuilder::new(&store, &ids, Metric::Euclidean, 8, 99)
            .build_trees(TreeCount::Fixed(3));
        let b = ForestBuilder::new(&store, &ids, Metric::Euclidean, 8, 99)
            .build_trees(TreeCount::Fixed(3));

        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.pool, y.pool);
            assert_eq!(x.leaves, y.leaves);
            assert_eq!(x.normals, y.normals);
        }
    }

    #[test]
    fn test_auto_covers_items() {
        let store = random_store(400, 4, 5);
        let ids = store.ids();
        let trees = ForestBuilder::new(&store, &ids, Metric::Euclidean, 10, 5)
            .build_trees(TreeCount::Auto);

        assert!(!trees.is_empty());
        let nodes: usize = trees.iter().map(TreeArena::node_count).sum();
        assert!(nodes >= 400);
        let without_last: usize = trees[..trees.len() - 1].iter().map(TreeArena::node_count).sum();
        assert!(without_last < 400);
    }

    #[test]
    fn test_empty_store_builds_single_leaf() {
        let store = VectorStore::new(3);
        let ids = store.ids();
        let trees = ForestBuilder::new(&store, &ids, Metric::Angular, 8, 0)
            .build_trees(TreeCount::Auto);

        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].leaves, vec![(0, 0)]);
    }

    #[test]
    fn test_imbalance() {
        assert_eq!(imbalance(5, 5), 0.5);
        assert_eq!(imbalance(0, 10), 1.0);
        assert_eq!(imbalance(0, 0), 0.0);
    }
}
