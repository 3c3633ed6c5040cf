//! Core types shared by the store, the forest and the index facade.

use rand::Rng;
use std::fmt;

/// Dense integer identifier of a stored vector.
///
/// Ids do not need to be contiguous; storage is sized to the largest id added.
pub type ItemId = u32;

/// Reference to a node in the flat forest arena.
///
/// The high bit tags leaves; the remaining bits index into either the split
/// table or the leaf table. References are plain integers so a tree can be
/// traversed directly out of a memory-mapped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeRef(u32);

impl NodeRef {
    const LEAF_BIT: u32 = 1 << 31;

    /// Largest index addressable by either node kind.
    pub const MAX_INDEX: u32 = Self::LEAF_BIT - 1;

    /// Reference to the split node at `index`.
    #[inline]
    pub const fn split(index: u32) -> Self {
        Self(index & Self::MAX_INDEX)
    }

    /// Reference to the leaf node at `index`.
    #[inline]
    pub const fn leaf(index: u32) -> Self {
        Self((index & Self::MAX_INDEX) | Self::LEAF_BIT)
    }

    /// Rebuild a reference from its persisted representation.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Persisted representation.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_leaf(self) -> bool {
        self.0 & Self::LEAF_BIT != 0
    }

    /// Index into the split or leaf table, depending on [`Self::is_leaf`].
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 & Self::MAX_INDEX
    }

    /// Shift the reference by the base offsets of the table it points into.
    #[inline]
    pub(crate) fn relocate(self, split_base: u32, leaf_base: u32) -> Self {
        if self.is_leaf() {
            Self::leaf(self.index() + leaf_base)
        } else {
            Self::split(self.index() + split_base)
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_leaf() {
            write!(f, "leaf#{}", self.index())
        } else {
            write!(f, "split#{}", self.index())
        }
    }
}

/// Side of a hyperplane a vector falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Positive margins go right, negative go left. A vector lying exactly on
    /// the hyperplane is assigned by a coin flip from the tree's own stream.
    #[inline]
    pub fn from_margin<R: Rng + ?Sized>(margin: f32, rng: &mut R) -> Self {
        if margin > 0.0 {
            Side::Right
        } else if margin < 0.0 {
            Side::Left
        } else if rng.gen::<bool>() {
            Side::Right
        } else {
            Side::Left
        }
    }
}

/// Result of a nearest neighbor query: item ids in ascending distance order
/// and the parallel distances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub ids: Vec<ItemId>,
    pub distances: Vec<f32>,
}

impl Neighbors {
    /// Create an empty result with room for `n` neighbors.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            distances: Vec::with_capacity(n),
        }
    }

    /// Number of neighbors returned.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over `(id, distance)` pairs, closest first.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, f32)> + '_ {
        self.ids.iter().copied().zip(self.distances.iter().copied())
    }

    /// Split into the `(ids, distances)` pair exposed at the binding boundary.
    pub fn into_parts(self) -> (Vec<ItemId>, Vec<f32>) {
        (self.ids, self.distances)
    }
}
