//! Caller-keyed index.
//!
//! [`KeyedIndex`] assigns dense item ids in insertion order and keeps the
//! key of every id, so callers can work with their own identifiers. A saved
//! keyed index is a directory holding the forest file and a key table.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::hash::Hash;
use std::path::Path;
use tracing::debug;

use crate::constants::io::{KEYED_INDEX_FILE, KEYED_KEYS_FILE, KEYED_KEYS_STAGED_FILE};
use crate::error::{ForgeAnnError, Result};
use crate::index::{AnnIndex, BuildOptions, IndexConfig};
use crate::persistence::{verify_header, write_with_header, FileKind};
use crate::types::{ItemId, Neighbors};

/// Bounds required of a key type.
pub trait IndexKey: Eq + Hash + Clone + Debug + Serialize + DeserializeOwned {}

impl<K> IndexKey for K where K: Eq + Hash + Clone + Debug + Serialize + DeserializeOwned {}

/// An [`AnnIndex`] addressed by caller keys instead of item ids.
#[derive(Debug)]
pub struct KeyedIndex<K: IndexKey> {
    index: AnnIndex,
    /// Key of item id `i` at position `i`.
    keys: Vec<K>,
    ids: HashMap<K, ItemId>,
}

impl<K: IndexKey> KeyedIndex<K> {
    pub fn new(config: IndexConfig) -> Result<Self> {
        Ok(Self {
            index: AnnIndex::new(config)?,
            keys: Vec::new(),
            ids: HashMap::new(),
        })
    }

    /// Underlying index.
    pub fn index(&self) -> &AnnIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.ids.contains_key(key)
    }

    /// Add a vector under a new key.
    ///
    /// # Errors
    /// `KeyAlreadyPresent` for a key that was put before, plus every error of
    /// [`AnnIndex::add_item`].
    pub fn put(&mut self, key: K, vector: &[f32]) -> Result<()> {
        if self.ids.contains_key(&key) {
            return Err(ForgeAnnError::KeyAlreadyPresent(format!("{key:?}")));
        }
        let id = ItemId::try_from(self.keys.len())
            .ok()
            .filter(|id| *id < ItemId::MAX)
            .ok_or_else(|| ForgeAnnError::invalid_parameter("keyed index is full"))?;

        self.index.add_item(id, vector)?;
        self.ids.insert(key.clone(), id);
        self.keys.push(key);
        Ok(())
    }

    pub fn build(&mut self, options: impl Into<BuildOptions>) -> Result<()> {
        self.index.build(options)
    }

    /// Nearest neighbors of `vector` as `(keys, distances)`.
    pub fn get_nns_by_vector(
        &self,
        vector: &[f32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<(Vec<K>, Vec<f32>)> {
        let neighbors = self.index.get_nns_by_vector(vector, n, search_k)?;
        Ok(self.resolve(neighbors))
    }

    /// Nearest neighbors of the item stored under `key`, including itself.
    pub fn get_nns_by_key(
        &self,
        key: &K,
        n: usize,
        search_k: Option<usize>,
    ) -> Result<(Vec<K>, Vec<f32>)> {
        let neighbors = self.index.get_nns_by_item(self.id_of(key)?, n, search_k)?;
        Ok(self.resolve(neighbors))
    }

    /// Vector stored under `key`.
    pub fn get_item_vector(&self, key: &K) -> Result<Vec<f32>> {
        self.index.get_item(self.id_of(key)?)
    }

    /// Write `index.ann` and `keys.bin` into `dir`, creating it if needed.
    ///
    /// The key table is staged before the forest is written and only renamed
    /// into place after the forest save succeeds. A failed forest write leaves
    /// any previous key table untouched and no staged file behind.
    pub fn save(&mut self, dir: impl AsRef<Path>, prefault: bool) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let staged = dir.join(KEYED_KEYS_STAGED_FILE);
        let payload = bincode::serialize(&self.keys)?;
        write_with_header(&staged, FileKind::KeyTable, &payload)?;

        if let Err(err) = self.index.save(dir.join(KEYED_INDEX_FILE), prefault) {
            let _ = fs::remove_file(&staged);
            return Err(err);
        }
        if let Err(err) = fs::rename(&staged, dir.join(KEYED_KEYS_FILE)) {
            let _ = fs::remove_file(&staged);
            return Err(err.into());
        }

        debug!(dir = %dir.display(), keys = self.keys.len(), "saved keyed index");
        Ok(())
    }

    /// Open a keyed index saved with [`Self::save`].
    pub fn load(dir: impl AsRef<Path>, prefault: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let index = AnnIndex::open(dir.join(KEYED_INDEX_FILE), prefault)?;

        let data = fs::read(dir.join(KEYED_KEYS_FILE))?;
        let keys: Vec<K> = bincode::deserialize(verify_header(&data, FileKind::KeyTable)?)?;
        if keys.len() != index.n_items() {
            return Err(ForgeAnnError::invalid_format(format!(
                "key table holds {} keys for {} items",
                keys.len(),
                index.n_items()
            )));
        }

        let mut ids = HashMap::with_capacity(keys.len());
        for (id, key) in keys.iter().enumerate() {
            if ids.insert(key.clone(), id as ItemId).is_some() {
                return Err(ForgeAnnError::invalid_format(format!(
                    "duplicate key {key:?} in key table"
                )));
            }
        }

        debug!(dir = %dir.display(), keys = keys.len(), "loaded keyed index");
        Ok(Self { index, keys, ids })
    }

    fn id_of(&self, key: &K) -> Result<ItemId> {
        self.ids
            .get(key)
            .copied()
            .ok_or_else(|| ForgeAnnError::KeyNotFound(format!("{key:?}")))
    }

    fn resolve(&self, neighbors: Neighbors) -> (Vec<K>, Vec<f32>) {
        let (ids, distances) = neighbors.into_parts();
        let keys = ids
            .into_iter()
            .filter_map(|id| self.keys.get(id as usize).cloned())
            .collect();
        (keys, distances)
    }
}
