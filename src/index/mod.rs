//! The [`AnnIndex`] facade and its lifecycle.
//!
//! An index starts `Unbuilt` and accepts items. [`AnnIndex::build`] turns the
//! stored items into a random-projection forest once; after that the index is
//! read-only. Saving re-opens the written file as a memory map, so a saved
//! index serves queries straight from the page cache like a loaded one.

pub mod config;
pub mod state;

pub use config::{BuildOptions, IndexConfig, TreeCount};
pub use state::IndexState;

use rand::Rng;
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

use crate::distance::Metric;
use crate::error::{ForgeAnnError, Result};
use crate::forest::builder::ForestBuilder;
use crate::forest::search::Searcher;
use crate::forest::{ForestSource, ForestTables, ForestView, OwnedForest};
use crate::metrics::ForestStatistics;
use crate::persistence::{self, ForestBacking, ForestShape};
use crate::store::{check_finite, VectorStore};
use crate::types::{ItemId, Neighbors};
use state::Stage;

/// Progress event at info level when the index is verbose, debug otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Approximate nearest neighbor index over fixed-dimension vectors.
///
/// # Example
///
/// ```
/// use forge_ann::{AnnIndex, IndexConfig, Metric};
///
/// let mut index = AnnIndex::new(IndexConfig::new(2, Metric::Euclidean).seed(1)).unwrap();
/// index.add_item(0, &[0.0, 0.0]).unwrap();
/// index.add_item(1, &[1.0, 0.0]).unwrap();
/// index.add_item(2, &[5.0, 5.0]).unwrap();
/// index.build(4).unwrap();
///
/// let nearest = index.get_nns_by_vector(&[0.1, 0.0], 2, None).unwrap();
/// assert_eq!(nearest.ids, vec![0, 1]);
/// ```
#[derive(Debug)]
pub struct AnnIndex {
    config: IndexConfig,
    stage: Stage,
}

impl AnnIndex {
    /// Create an empty, unbuilt index.
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let stage = Stage::Unbuilt(VectorStore::new(config.dimension));
        Ok(Self { config, stage })
    }

    /// Open a saved index, taking dimension and metric from the file.
    pub fn open(path: impl AsRef<Path>, prefault: bool) -> Result<Self> {
        let path = path.as_ref();
        let backing = persistence::open_mapped(path, prefault, None)?;
        let view = backing.view();
        let config = IndexConfig::new(view.dimension(), view.metric());
        tracing::debug!(path = %path.display(), items = view.n_items(), "opened index");

        Ok(Self {
            config,
            stage: Stage::Mapped(backing),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[inline]
    pub fn metric(&self) -> Metric {
        self.config.metric
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> IndexState {
        self.stage.state()
    }

    /// Toggle progress logging at info level. Has no functional effect.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    /// Store `vector` under `id`, replacing any previous vector for `id`.
    ///
    /// # Errors
    /// `InvalidState` once the index is built or loaded, `DimensionMismatch`
    /// when `vector` has the wrong length.
    pub fn add_item(&mut self, id: ItemId, vector: &[f32]) -> Result<()> {
        match &mut self.stage {
            Stage::Unbuilt(store) => store.add(id, vector),
            stage => Err(ForgeAnnError::invalid_state("add items", stage.state())),
        }
    }

    /// Build the forest over all added items. Valid once per index.
    ///
    /// Accepts a tree count (`index.build(10)`, zero meaning automatic) or a
    /// full [`BuildOptions`]. On failure the index stays `Unbuilt` with its
    /// items intact.
    pub fn build(&mut self, options: impl Into<BuildOptions>) -> Result<()> {
        let options = options.into();
        let store = match std::mem::replace(&mut self.stage, Stage::Unloaded) {
            Stage::Unbuilt(store) => store,
            other => {
                let state = other.state();
                self.stage = other;
                return Err(ForgeAnnError::invalid_state("build", state));
            }
        };

        let start = Instant::now();
        let tables = match grow_forest(&self.config, &store, options) {
            Ok(tables) => tables,
            Err(err) => {
                self.stage = Stage::Unbuilt(store);
                return Err(err);
            }
        };

        let forest = OwnedForest::new(self.config.metric, store, tables);
        let view = forest.view();
        progress!(
            self.config.verbose,
            trees = view.n_trees(),
            splits = view.n_splits(),
            leaves = view.n_leaves(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "forest built"
        );

        self.stage = Stage::Built(ForestBacking::Owned(forest));
        Ok(())
    }

    /// Copy of the vector stored under `id`.
    ///
    /// Available while adding items as well as once built or loaded.
    pub fn get_item(&self, id: ItemId) -> Result<Vec<f32>> {
        let vector = match &self.stage {
            Stage::Unbuilt(store) => store.get(id),
            Stage::Built(forest) | Stage::Mapped(forest) => forest.view().item(id),
            Stage::Unloaded => return Err(ForgeAnnError::invalid_state("get item", self.state())),
        };
        vector.map(<[f32]>::to_vec).ok_or(ForgeAnnError::NotFound(id))
    }

    /// Number of stored items; zero once unloaded.
    pub fn n_items(&self) -> usize {
        match &self.stage {
            Stage::Unbuilt(store) => store.len(),
            Stage::Built(forest) | Stage::Mapped(forest) => forest.view().n_items(),
            Stage::Unloaded => 0,
        }
    }

    /// Number of trees in the forest; zero before a build or load.
    pub fn n_trees(&self) -> usize {
        self.stage.view().map_or(0, |view| view.n_trees())
    }

    /// Up to `n` approximate nearest neighbors of stored item `id`.
    ///
    /// The item itself is included when found. `search_k` of `None` or
    /// `Some(0)` uses the default budget of `n * n_trees` candidates.
    pub fn get_nns_by_item(
        &self,
        id: ItemId,
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        let view = self.forest("query neighbors")?;
        let query = view.item(id).ok_or(ForgeAnnError::NotFound(id))?;
        Ok(Searcher::new(view).search(query, n, search_k))
    }

    /// Up to `n` approximate nearest neighbors of `vector`.
    pub fn get_nns_by_vector(
        &self,
        vector: &[f32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Neighbors> {
        let view = self.forest("query neighbors")?;
        self.check_query(vector)?;
        Ok(Searcher::new(view).search(vector, n, search_k))
    }

    /// Run [`Self::get_nns_by_vector`] for many queries in parallel.
    pub fn batch_get_nns_by_vector(
        &self,
        vectors: &[Vec<f32>],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<Neighbors>> {
        let view = self.forest("query neighbors")?;
        vectors.iter().try_for_each(|v| self.check_query(v))?;

        let searcher = Searcher::new(view);
        Ok(vectors
            .par_iter()
            .map(|v| searcher.search(v, n, search_k))
            .collect())
    }

    /// Distance between two stored items under the index metric.
    pub fn get_distance(&self, i: ItemId, j: ItemId) -> Result<f32> {
        let view = self.forest("compute distances")?;
        let a = view.item(i).ok_or(ForgeAnnError::NotFound(i))?;
        let b = view.item(j).ok_or(ForgeAnnError::NotFound(j))?;
        Ok(view.metric().pair_distance(a, b))
    }

    /// Shape summary of the forest.
    pub fn statistics(&self) -> Result<ForestStatistics> {
        let view = self.forest("collect statistics")?;
        Ok(ForestStatistics::collect(&view))
    }

    /// Write the index to `path` and continue serving from the written file.
    ///
    /// The index moves to `MemoryMapped`. With `prefault` the mapping is made
    /// resident and checksummed immediately.
    pub fn save(&mut self, path: impl AsRef<Path>, prefault: bool) -> Result<()> {
        let path = path.as_ref();
        let view = self.forest("save")?;
        let start = Instant::now();

        persistence::write_forest(path, &view)?;
        let backing = persistence::open_mapped(path, prefault, Some(self.shape()))?;
        progress!(
            self.config.verbose,
            path = %path.display(),
            items = view.n_items(),
            trees = view.n_trees(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "saved index"
        );

        self.stage = Stage::Mapped(backing);
        Ok(())
    }

    /// Memory-map a saved index, replacing the current forest.
    ///
    /// The file must match this index's dimension and metric. Valid unless
    /// items were added and not yet built. On failure the index is left
    /// exactly as it was.
    pub fn load(&mut self, path: impl AsRef<Path>, prefault: bool) -> Result<()> {
        self.check_loadable()?;
        let path = path.as_ref();
        let start = Instant::now();

        let backing = persistence::open_mapped(path, prefault, Some(self.shape()))?;
        progress!(
            self.config.verbose,
            path = %path.display(),
            prefault,
            items = backing.view().n_items(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded index"
        );

        self.stage = Stage::Mapped(backing);
        Ok(())
    }

    /// Read a saved index fully onto the heap. The index becomes `Built`.
    pub fn load_into_memory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.check_loadable()?;
        let path = path.as_ref();
        let start = Instant::now();

        let forest = persistence::read_forest(path, Some(self.shape()))?;
        progress!(
            self.config.verbose,
            path = %path.display(),
            items = forest.n_items,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded index into memory"
        );

        self.stage = Stage::Built(ForestBacking::Owned(forest));
        Ok(())
    }

    /// Release the forest and its vectors. Only `load` is valid afterwards.
    pub fn unload(&mut self) -> Result<()> {
        if !self.state().is_queryable() {
            return Err(ForgeAnnError::invalid_state("unload", self.state()));
        }
        self.stage = Stage::Unloaded;
        progress!(self.config.verbose, "unloaded index");
        Ok(())
    }

    fn forest(&self, operation: &'static str) -> Result<ForestView<'_>> {
        self.stage
            .view()
            .ok_or_else(|| ForgeAnnError::invalid_state(operation, self.state()))
    }

    fn check_query(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(ForgeAnnError::dimension_mismatch(self.config.dimension, vector.len()));
        }
        check_finite(vector)
    }

    fn check_loadable(&self) -> Result<()> {
        match &self.stage {
            Stage::Unbuilt(store) if !store.is_empty() => {
                Err(ForgeAnnError::invalid_state("load over unbuilt items", self.state()))
            }
            _ => Ok(()),
        }
    }

    fn shape(&self) -> ForestShape {
        ForestShape {
            dimension: self.config.dimension,
            metric: self.config.metric,
        }
    }
}

/// Build the trees over `store` and merge them into forest tables.
fn grow_forest(
    config: &IndexConfig,
    store: &VectorStore,
    options: BuildOptions,
) -> Result<ForestTables> {
    let metric = config.metric;
    let leaf_size = config.effective_leaf_size();
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let ids = store.ids();

    progress!(
        config.verbose,
        items = ids.len(),
        dimension = config.dimension,
        %metric,
        leaf_size,
        trees = ?options.trees,
        "building forest"
    );

    let builder = ForestBuilder::new(store, &ids, metric, leaf_size, seed);
    let trees = match options.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| ForgeAnnError::invalid_parameter(format!("thread pool: {err}")))?
            .install(|| builder.build_trees(options.trees)),
        None => builder.build_trees(options.trees),
    };

    ForestTables::merge(&trees, config.dimension)
}
