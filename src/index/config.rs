//! Index and build configuration.

use serde::{Deserialize, Serialize};

use crate::constants::tree::{LEAF_SIZE_FACTOR, LEAF_SIZE_MARGIN};
use crate::distance::Metric;
use crate::error::{ForgeAnnError, Result};

/// Static configuration of an [`AnnIndex`](super::AnnIndex).
///
/// # Example
///
/// ```
/// use forge_ann::{IndexConfig, Metric};
///
/// let config = IndexConfig::new(64, Metric::Angular)
///     .leaf_size(32)
///     .seed(7)
///     .verbose(true);
/// assert_eq!(config.effective_leaf_size(), 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of components of every vector.
    pub dimension: usize,
    /// Distance metric used for building and searching.
    pub metric: Metric,
    /// Maximum bucket size of a leaf. `None` means `2 * dimension + 2`.
    pub leaf_size: Option<usize>,
    /// Seed of the tree construction streams. `None` draws one per build.
    pub seed: Option<u64>,
    /// Log progress at info level instead of debug.
    pub verbose: bool,
}

impl IndexConfig {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            leaf_size: None,
            seed: None,
            verbose: false,
        }
    }

    /// Set the maximum leaf bucket size.
    pub fn leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = Some(leaf_size);
        self
    }

    /// Fix the build seed, making builds reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Leaf bucket size used by the builder.
    pub fn effective_leaf_size(&self) -> usize {
        self.leaf_size
            .unwrap_or(LEAF_SIZE_FACTOR * self.dimension + LEAF_SIZE_MARGIN)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(ForgeAnnError::invalid_parameter("dimension must be positive"));
        }
        if self.leaf_size == Some(0) {
            return Err(ForgeAnnError::invalid_parameter("leaf_size must be positive"));
        }
        Ok(())
    }
}

/// Number of trees to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeCount {
    /// Exactly this many trees.
    Fixed(usize),
    /// Keep adding trees until the forest has at least as many nodes as
    /// there are items.
    Auto,
}

/// Options of a single [`AnnIndex::build`](super::AnnIndex::build) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub trees: TreeCount,
    /// Worker threads. `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl BuildOptions {
    pub fn new(trees: TreeCount) -> Self {
        Self {
            trees,
            threads: None,
        }
    }

    /// Interpret a signed tree count: positive values build exactly that
    /// many trees, zero or negative values select [`TreeCount::Auto`].
    pub fn from_hint(trees: i32) -> Self {
        if trees > 0 {
            Self::new(TreeCount::Fixed(trees as usize))
        } else {
            Self::new(TreeCount::Auto)
        }
    }

    /// Build on a dedicated pool of `threads` workers.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::new(TreeCount::Auto)
    }
}

impl From<usize> for BuildOptions {
    fn from(trees: usize) -> Self {
        if trees > 0 {
            Self::new(TreeCount::Fixed(trees))
        } else {
            Self::new(TreeCount::Auto)
        }
    }
}

impl From<i32> for BuildOptions {
    fn from(trees: i32) -> Self {
        Self::from_hint(trees)
    }
}

impl From<TreeCount> for BuildOptions {
    fn from(trees: TreeCount) -> Self {
        Self::new(trees)
    }
}
