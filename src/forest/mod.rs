//! Random-projection forest stored as flat, offset-addressed tables.
//!
//! All trees of a forest share five tables:
//!
//! ```text
//! roots          [u32; n_trees]            NodeRef of each tree's root
//! split_records  [u32; 3 * n_splits]       left NodeRef, right NodeRef, offset (f32 bits)
//! split_normals  [f32; dim * n_splits]     hyperplane normal of split i at i * dim
//! leaf_ranges    [u32; 2 * n_leaves]       start, len into leaf_pool
//! leaf_pool      [u32; ..]                 item ids of all leaf buckets
//! ```
//!
//! Children are addressed by [`NodeRef`] integers, never pointers, so the same
//! tables can be read from heap vectors or straight out of a memory-mapped file.
//! A split's children always have a larger index than the split itself.

pub mod builder;
pub mod search;

use crate::distance::{HyperplaneRef, Metric};
use crate::error::{ForgeAnnError, Result};
use crate::store::VectorStore;
use crate::types::{ItemId, NodeRef};

use builder::TreeArena;

/// Words per entry of the split record table.
pub(crate) const SPLIT_RECORD_WORDS: usize = 3;

/// Words per entry of the leaf range table.
pub(crate) const LEAF_RECORD_WORDS: usize = 2;

/// A node as read from the forest tables.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// Bucket of item ids.
    Leaf(&'a [ItemId]),
    /// Splitting hyperplane with its two children.
    Split {
        plane: HyperplaneRef<'a>,
        left: NodeRef,
        right: NodeRef,
    },
}

/// Read interface over a built or loaded forest and its vectors.
///
/// Both backings (heap-resident and memory-mapped) hand out this view; the
/// search and statistics code never knows which one it is reading.
#[derive(Debug, Clone, Copy)]
pub struct ForestView<'a> {
    pub(crate) metric: Metric,
    pub(crate) dimension: usize,
    pub(crate) n_items: usize,
    pub(crate) present: &'a [u8],
    pub(crate) vectors: &'a [f32],
    pub(crate) roots: &'a [u32],
    pub(crate) split_records: &'a [u32],
    pub(crate) split_normals: &'a [f32],
    pub(crate) leaf_ranges: &'a [u32],
    pub(crate) leaf_pool: &'a [u32],
}

impl<'a> ForestView<'a> {
    #[inline]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored items.
    #[inline]
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of id slots (one past the largest stored id).
    #[inline]
    pub fn n_slots(&self) -> usize {
        self.present.len()
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.roots.len()
    }

    #[inline]
    pub fn n_splits(&self) -> usize {
        self.split_records.len() / SPLIT_RECORD_WORDS
    }

    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.leaf_ranges.len() / LEAF_RECORD_WORDS
    }

    /// Vector of a stored item, or `None` for an absent or out-of-range id.
    #[inline]
    pub fn item(&self, id: ItemId) -> Option<&'a [f32]> {
        let slot = id as usize;
        if self.present.get(slot).copied().unwrap_or(0) == 0 {
            return None;
        }
        let start = slot * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    /// Root of every tree, in build order.
    pub fn roots(&self) -> impl Iterator<Item = NodeRef> + 'a {
        self.roots.iter().map(|raw| NodeRef::from_raw(*raw))
    }

    /// Resolve a node reference.
    ///
    /// References come from the tables themselves, which are bounds-checked
    /// when built or loaded.
    #[inline]
    pub fn node(&self, node: NodeRef) -> Node<'a> {
        let index = node.index() as usize;
        if node.is_leaf() {
            let range = &self.leaf_ranges[index * LEAF_RECORD_WORDS..][..LEAF_RECORD_WORDS];
            let start = range[0] as usize;
            let len = range[1] as usize;
            Node::Leaf(&self.leaf_pool[start..start + len])
        } else {
            let record = &self.split_records[index * SPLIT_RECORD_WORDS..][..SPLIT_RECORD_WORDS];
            let normal = &self.split_normals[index * self.dimension..][..self.dimension];
            Node::Split {
                plane: HyperplaneRef {
                    normal,
                    offset: f32::from_bits(record[2]),
                },
                left: NodeRef::from_raw(record[0]),
                right: NodeRef::from_raw(record[1]),
            }
        }
    }

    /// Check that every reference in the tables stays in bounds and that
    /// children come after their parent, which rules out cycles.
    pub(crate) fn validate(&self) -> Result<()> {
        let n_splits = self.n_splits();
        let n_leaves = self.n_leaves();

        let check_ref = |node: NodeRef, parent: Option<usize>| -> Result<()> {
            let index = node.index() as usize;
            let in_bounds = if node.is_leaf() {
                index < n_leaves
            } else {
                index < n_splits && parent.map_or(true, |p| index > p)
            };
            if in_bounds {
                Ok(())
            } else {
                Err(ForgeAnnError::invalid_format(format!(
                    "node reference {node} out of bounds"
                )))
            }
        };

        for root in self.roots() {
            check_ref(root, None)?;
        }

        for (index, record) in self.split_records.chunks_exact(SPLIT_RECORD_WORDS).enumerate() {
            check_ref(NodeRef::from_raw(record[0]), Some(index))?;
            check_ref(NodeRef::from_raw(record[1]), Some(index))?;
        }

        for range in self.leaf_ranges.chunks_exact(LEAF_RECORD_WORDS) {
            let end = range[0] as usize + range[1] as usize;
            if end > self.leaf_pool.len() {
                return Err(ForgeAnnError::invalid_format("leaf range exceeds leaf pool"));
            }
        }

        if let Some(id) = self.leaf_pool.iter().find(|id| self.item(**id).is_none()) {
            return Err(ForgeAnnError::invalid_format(format!(
                "leaf references absent item {id}"
            )));
        }

        Ok(())
    }
}

/// Anything that can expose a [`ForestView`].
pub trait ForestSource {
    fn view(&self) -> ForestView<'_>;
}

/// Node tables of a whole forest, held on the heap.
#[derive(Debug, Clone, Default)]
pub(crate) struct ForestTables {
    pub(crate) roots: Vec<u32>,
    pub(crate) split_records: Vec<u32>,
    pub(crate) split_normals: Vec<f32>,
    pub(crate) leaf_ranges: Vec<u32>,
    pub(crate) leaf_pool: Vec<u32>,
}

impl ForestTables {
    /// Concatenate independently built trees, relocating their node references.
    ///
    /// All memory is reserved up front, so an allocation failure leaves the
    /// caller's state untouched.
    pub(crate) fn merge(trees: &[TreeArena], dimension: usize) -> Result<Self> {
        let n_splits: usize = trees.iter().map(|t| t.splits.len()).sum();
        let n_leaves: usize = trees.iter().map(|t| t.leaves.len()).sum();
        let pool_len: usize = trees.iter().map(|t| t.pool.len()).sum();

        if n_splits > NodeRef::MAX_INDEX as usize
            || n_leaves > NodeRef::MAX_INDEX as usize
            || pool_len > u32::MAX as usize
        {
            return Err(ForgeAnnError::allocation_failure(
                "forest exceeds the addressable node count",
            ));
        }

        let mut tables = ForestTables::default();
        tables.roots.try_reserve_exact(trees.len())?;
        tables.split_records.try_reserve_exact(n_splits * SPLIT_RECORD_WORDS)?;
        tables.split_normals.try_reserve_exact(n_splits * dimension)?;
        tables.leaf_ranges.try_reserve_exact(n_leaves * LEAF_RECORD_WORDS)?;
        tables.leaf_pool.try_reserve_exact(pool_len)?;

        for tree in trees {
            let split_base = (tables.split_records.len() / SPLIT_RECORD_WORDS) as u32;
            let leaf_base = (tables.leaf_ranges.len() / LEAF_RECORD_WORDS) as u32;
            let pool_base = tables.leaf_pool.len() as u32;

            for split in &tree.splits {
                tables.split_records.extend_from_slice(&[
                    split.left.relocate(split_base, leaf_base).raw(),
                    split.right.relocate(split_base, leaf_base).raw(),
                    split.offset.to_bits(),
                ]);
            }
            tables.split_normals.extend_from_slice(&tree.normals);
            for &(start, len) in &tree.leaves {
                tables.leaf_ranges.extend_from_slice(&[start + pool_base, len]);
            }
            tables.leaf_pool.extend_from_slice(&tree.pool);
            tables.roots.push(tree.root.relocate(split_base, leaf_base).raw());
        }

        Ok(tables)
    }
}

/// Heap-resident forest: the result of a build or of an in-memory load.
#[derive(Debug, Clone)]
pub struct OwnedForest {
    pub(crate) metric: Metric,
    pub(crate) dimension: usize,
    pub(crate) n_items: usize,
    pub(crate) present: Vec<u8>,
    pub(crate) vectors: Vec<f32>,
    pub(crate) tables: ForestTables,
}

impl OwnedForest {
    /// Take ownership of the store's vectors alongside the merged trees.
    pub(crate) fn new(metric: Metric, store: VectorStore, tables: ForestTables) -> Self {
        let dimension = store.dimension();
        let (present, vectors, n_items) = store.into_parts();
        Self {
            metric,
            dimension,
            n_items,
            present,
            vectors,
            tables,
        }
    }
}

impl ForestSource for OwnedForest {
    fn view(&self) -> ForestView<'_> {
        ForestView {
            metric: self.metric,
            dimension: self.dimension,
            n_items: self.n_items,
            present: &self.present,
            vectors: &self.vectors,
            roots: &self.tables.roots,
            split_records: &self.tables.split_records,
            split_normals: &self.tables.split_normals,
            leaf_ranges: &self.tables.leaf_ranges,
            leaf_pool: &self.tables.leaf_pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::builder::SplitNode;

    fn two_trees() -> Vec<TreeArena> {
        // Tree 0: split -> (leaf [0, 1], leaf [2])
        let t0 = TreeArena {
            root: NodeRef::split(0),
            splits: vec![SplitNode {
                left: NodeRef::leaf(0),
                right: NodeRef::leaf(1),
                offset: 0.5,
            }],
            normals: vec![1.0, 0.0],
            leaves: vec![(0, 2), (2, 1)],
            pool: vec![0, 1, 2],
        };
        // Tree 1: single leaf [0, 1, 2]
        let t1 = TreeArena {
            root: NodeRef::leaf(0),
            splits: Vec::new(),
            normals: Vec::new(),
            leaves: vec![(0, 3)],
            pool: vec![2, 1, 0],
        };
        vec![t0, t1]
    }

    fn store() -> VectorStore {
        let mut store = VectorStore::new(2);
        store.add(0, &[0.0, 0.0]).unwrap();
        store.add(1, &[0.2, 0.0]).unwrap();
        store.add(2, &[1.0, 0.0]).unwrap();
        store
    }

    #[test]
    fn test_merge_relocates_references() {
        let tables = ForestTables::merge(&two_trees(), 2).unwrap();
        assert_eq!(tables.roots, vec![NodeRef::split(0).raw(), NodeRef::leaf(2).raw()]);
        assert_eq!(tables.leaf_ranges, vec![0, 2, 2, 1, 3, 3]);
        assert_eq!(tables.leaf_pool, vec![0, 1, 2, 2, 1, 0]);
    }

    #[test]
    fn test_view_resolves_nodes() {
        let tables = ForestTables::merge(&two_trees(), 2).unwrap();
        let forest = OwnedForest::new(Metric::Euclidean, store(), tables);
        let view = forest.view();

        assert_eq!(view.n_trees(), 2);
        assert_eq!(view.n_splits(), 1);
        assert_eq!(view.n_leaves(), 3);
        view.validate().unwrap();

        let roots: Vec<NodeRef> = view.roots().collect();
        match view.node(roots[0]) {
            Node::Split { plane, left, right } => {
                assert_eq!(plane.normal, &[1.0, 0.0]);
                assert_eq!(plane.offset, 0.5);
                assert!(matches!(view.node(left), Node::Leaf(&[0, 1])));
                assert!(matches!(view.node(right), Node::Leaf(&[2])));
            }
            Node::Leaf(_) => panic!("expected split root"),
        }
        assert!(matches!(view.node(roots[1]), Node::Leaf(&[2, 1, 0])));
    }

    #[test]
    fn test_validate_rejects_backward_child() {
        let mut tables = ForestTables::merge(&two_trees(), 2).unwrap();
        tables.split_records[0] = NodeRef::split(0).raw();
        let forest = OwnedForest::new(Metric::Euclidean, store(), tables);
        assert!(matches!(
            forest.view().validate(),
            Err(ForgeAnnError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_item_lookup() {
        let forest = OwnedForest::new(Metric::Euclidean, store(), ForestTables::default());
        let view = forest.view();
        assert_eq!(view.item(1), Some(&[0.2, 0.0][..]));
        assert_eq!(view.item(3), None);
    }
}
