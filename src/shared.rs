//! Thread-safe handle to an [`AnnIndex`].
//!
//! Queries share a read lock and run concurrently. Lifecycle transitions
//! (adding items, build, save, load, unload) take the write lock, so they
//! never overlap an in-flight query.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{AnnIndex, BuildOptions, IndexState};
use crate::types::{ItemId, Neighbors};

/// Cloneable, shareable index handle.
#[derive(Debug, Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<AnnIndex>>,
}

impl SharedIndex {
    pub fn new(index: AnnIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn state(&self) -> IndexState {
        self.inner.read().state()
    }

    pub fn n_items(&self) -> usize {
        self.inner.read().n_items()
    }

    pub fn add_item(&self, id: ItemId, vector: &[f32]) -> Result<()> {
        self.inner.write().add_item(id, vector)
    }

    pub fn build(&self, options: impl Into<BuildOptions>) -> Result<()> {
        self.inner.write().build(options)
    }

    pub fn get_item(&self, id: ItemId) -> Result<Vec<f32>> {
        self.inner.read().get_item(id)
    }

    pub fn get_nns_by_item(
        &self,
        id: ItemId,
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        self.inner.read().get_nns_by_item(id, n, search_k)
    }

    pub fn get_nns_by_vector(
        &self,
        vector: &[f32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        self.inner.read().get_nns_by_vector(vector, n, search_k)
    }

    pub fn get_distance(&self, i: ItemId, j: ItemId) -> Result<f32> {
        self.inner.read().get_distance(i, j)
    }

    pub fn save(&self, path: impl AsRef<Path>, prefault: bool) -> Result<()> {
        self.inner.write().save(path, prefault)
    }

    pub fn load(&self, path: impl AsRef<Path>, prefault: bool) -> Result<()> {
        self.inner.write().load(path, prefault)
    }

    pub fn unload(&self) -> Result<()> {
        self.inner.write().unload()
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.inner.write().set_verbose(verbose);
    }

    /// Run `f` with shared access to the index.
    pub fn with_read<R>(&self, f: impl FnOnce(&AnnIndex) -> R) -> R {
        f(&self.inner.read())
    }
}

impl From<AnnIndex> for SharedIndex {
    fn from(index: AnnIndex) -> Self {
        Self::new(index)
    }
}
