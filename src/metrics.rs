//! Statistics about a built or loaded forest.
//!
//! Use [`ForestStatistics`] to check how a forest turned out:
//!
//! ```ignore
//! let stats = index.statistics()?;
//! println!("{}", stats.summary());
//! // Output:
//! // ForestStatistics:
//! //   Items: 10000 (dimension 64, angular)
//! //   Trees: 12 (splits=14976, leaves=14988, max depth=21)
//! //   Leaves: mean=8.0, max=130
//! //   Memory: 2.99 MB
//! ```

use crate::distance::Metric;
use crate::forest::{ForestView, Node};
use crate::types::NodeRef;

/// Shape summary of a forest.
#[derive(Clone, Debug, PartialEq)]
pub struct ForestStatistics {
    pub n_items: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub n_trees: usize,
    pub n_splits: usize,
    pub n_leaves: usize,
    /// Largest leaf bucket.
    pub max_leaf_len: usize,
    /// Mean leaf bucket size.
    pub mean_leaf_len: f64,
    /// Longest root-to-leaf path, counted in edges.
    pub max_depth: usize,
    /// Bytes held by vectors and node tables.
    pub memory_bytes: usize,
}

impl ForestStatistics {
    /// Walk every tree of the forest once.
    pub fn collect(view: &ForestView<'_>) -> Self {
        let leaf_lens = view.leaf_ranges.chunks_exact(2).map(|range| range[1] as usize);
        let max_leaf_len = leaf_lens.clone().max().unwrap_or(0);
        let total_leaf_len: usize = leaf_lens.sum();
        let n_leaves = view.n_leaves();

        let max_depth = view
            .roots()
            .map(|root| tree_depth(view, root))
            .max()
            .unwrap_or(0);

        let memory_bytes = view.present.len()
            + 4 * (view.vectors.len()
                + view.roots.len()
                + view.split_records.len()
                + view.split_normals.len()
                + view.leaf_ranges.len()
                + view.leaf_pool.len());

        Self {
            n_items: view.n_items(),
            dimension: view.dimension(),
            metric: view.metric(),
            n_trees: view.n_trees(),
            n_splits: view.n_splits(),
            n_leaves,
            max_leaf_len,
            mean_leaf_len: if n_leaves == 0 {
                0.0
            } else {
                total_leaf_len as f64 / n_leaves as f64
            },
            max_depth,
            memory_bytes,
        }
    }

    /// Get a summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "ForestStatistics:\n  \
             Items: {} (dimension {}, {})\n  \
             Trees: {} (splits={}, leaves={}, max depth={})\n  \
             Leaves: mean={:.1}, max={}\n  \
             Memory: {:.2} MB",
            self.n_items,
            self.dimension,
            self.metric,
            self.n_trees,
            self.n_splits,
            self.n_leaves,
            self.max_depth,
            self.mean_leaf_len,
            self.max_leaf_len,
            self.memory_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}

/// Depth of the deepest leaf below `root`, without recursion.
fn tree_depth(view: &ForestView<'_>, root: NodeRef) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        match view.node(node) {
            Node::Leaf(_) => deepest = deepest.max(depth),
            Node::Split { left, right, .. } => {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
    }
    deepest
}
