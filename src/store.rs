//! Vector storage for an index that is still accepting items.
//!
//! Vectors live in one flat `Vec<f32>` with stride `dimension`, so item `id`
//! occupies `data[id * dimension..(id + 1) * dimension]`. The same layout is
//! written to disk unchanged.

use crate::distance::VectorSource;
use crate::error::{ForgeAnnError, Result};
use crate::types::ItemId;

/// Dense vector storage indexed by item id.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dimension: usize,
    /// Flat vector data, `slots * dimension` floats.
    data: Vec<f32>,
    /// One flag per slot: 1 if an item was added at that id.
    present: Vec<u8>,
    count: usize,
}

impl VectorStore {
    /// Create an empty store for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
            present: Vec::new(),
            count: 0,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Store `vector` under `id`, overwriting any previous vector.
    ///
    /// Storage grows to cover `id`; slots skipped over stay absent.
    pub fn add(&mut self, id: ItemId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(ForgeAnnError::dimension_mismatch(self.dimension, vector.len()));
        }
        if id == ItemId::MAX {
            return Err(ForgeAnnError::invalid_parameter(format!(
                "item id {id} is reserved"
            )));
        }
        check_finite(vector)?;

        let slot = id as usize;
        if slot >= self.present.len() {
            let slots = slot + 1;
            let floats = slots
                .checked_mul(self.dimension)
                .ok_or_else(|| ForgeAnnError::allocation_failure("vector storage size overflows"))?;
            self.data.try_reserve(floats - self.data.len())?;
            self.present.try_reserve(slots - self.present.len())?;
            self.data.resize(floats, 0.0);
            self.present.resize(slots, 0);
        }

        let start = slot * self.dimension;
        self.data[start..start + self.dimension].copy_from_slice(vector);
        if self.present[slot] == 0 {
            self.present[slot] = 1;
            self.count += 1;
        }
        Ok(())
    }

    /// Vector stored under `id`, if any.
    #[inline]
    pub fn get(&self, id: ItemId) -> Option<&[f32]> {
        let slot = id as usize;
        if self.present.get(slot).copied().unwrap_or(0) == 0 {
            return None;
        }
        let start = slot * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    #[inline]
    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Number of distinct ids stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of id slots, i.e. one past the largest id added.
    #[inline]
    pub fn slots(&self) -> usize {
        self.present.len()
    }

    /// Ids of all stored items in ascending order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.present
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag != 0)
            .map(|(slot, _)| slot as ItemId)
            .collect()
    }

    /// Give up the raw `(present, data, count)` arrays.
    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<f32>, usize) {
        (self.present, self.data, self.count)
    }
}

/// Reject vectors with NaN or infinite components.
pub(crate) fn check_finite(vector: &[f32]) -> Result<()> {
    match vector.iter().position(|x| !x.is_finite()) {
        None => Ok(()),
        Some(i) => Err(ForgeAnnError::invalid_parameter(format!(
            "component {i} is {}",
            vector[i]
        ))),
    }
}

impl VectorSource for VectorStore {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn vector(&self, id: ItemId) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.data[start..start + self.dimension]
    }
}
