//! Memory-mapped forest backing.

use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Range;
use std::path::Path;

use super::{count_present, parse_forest, ForestHeader, ForestShape, SectionLayout};
use crate::error::{ForgeAnnError, Result};
use crate::forest::{ForestSource, ForestView};

/// Forest tables read in place from a mapped file.
///
/// Only valid on little-endian hosts; see [`super::open_mapped`].
#[derive(Debug)]
pub struct MappedForest {
    map: Mmap,
    header: ForestHeader,
    layout: SectionLayout,
    n_items: usize,
}

impl MappedForest {
    pub(crate) fn open(path: &Path, prefault: bool, expected: Option<ForestShape>) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < (ForestHeader::OFFSET + ForestHeader::SIZE) as u64 {
            return Err(ForgeAnnError::invalid_format(format!(
                "file is {len} bytes, too small for a forest header"
            )));
        }

        let mut options = MmapOptions::new();
        if prefault {
            options.populate();
        }

        // SAFETY: the mapping is read-only and never handed out mutably. The
        // file is replaced by rename on save, never truncated in place.
        let map = unsafe { options.map(&file)? };

        if map.as_ptr().align_offset(std::mem::align_of::<u32>()) != 0 {
            return Err(ForgeAnnError::invalid_format(
                "mapped file is not aligned for 4-byte words",
            ));
        }

        // Prefaulted loads read every page anyway, so verify the checksum too.
        let (header, layout) = parse_forest(&map, expected, prefault)?;
        let n_items = count_present(&map[layout.present.clone()]);

        let forest = Self {
            map,
            header,
            layout,
            n_items,
        };
        forest.view().validate()?;
        Ok(forest)
    }

    /// Size of the mapped file in bytes.
    pub fn mapped_bytes(&self) -> usize {
        self.map.len()
    }

    fn words<T>(&self, range: &Range<usize>) -> &[T] {
        debug_assert_eq!(std::mem::size_of::<T>(), 4);
        let bytes = &self.map[range.clone()];
        // SAFETY: `open` checked that the map base is 4-byte aligned and the
        // layout places every word section at a multiple of 4 with a length
        // that is a multiple of 4. T is only ever u32 or f32, for which every
        // bit pattern is valid. The slice borrows `self`, which owns the map.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<T>(), bytes.len() / 4) }
    }
}

impl ForestSource for MappedForest {
    fn view(&self) -> ForestView<'_> {
        ForestView {
            metric: self.header.metric,
            dimension: self.header.dimension as usize,
            n_items: self.n_items,
            present: &self.map[self.layout.present.clone()],
            vectors: self.words::<f32>(&self.layout.vectors),
            roots: self.words::<u32>(&self.layout.roots),
            split_records: self.words::<u32>(&self.layout.split_records),
            split_normals: self.words::<f32>(&self.layout.split_normals),
            leaf_ranges: self.words::<u32>(&self.layout.leaf_ranges),
            leaf_pool: self.words::<u32>(&self.layout.leaf_pool),
        }
    }
}
