//! File format definitions for forge-ann persistence.
//!
//! Every file starts with the 24-byte [`FileHeader`] prelude. A forest file
//! follows it with a [`ForestHeader`] and seven sections, all little-endian
//! and 4-byte aligned so they can be used in place from a memory map.
//!
//! ```text
//! [MAGIC 8B "FORGEANN"][VERSION u32][KIND u32][FLAGS u32][CHECKSUM u32]
//! [METRIC u32][DIM u32][SLOTS u32][TREES u32][SPLITS u32][LEAVES u32][POOL u32]
//! [PRESENT u8 * SLOTS, zero-padded to 4]
//! [VECTORS f32 * SLOTS * DIM]
//! [ROOTS u32 * TREES]
//! [SPLIT_RECORDS u32 * SPLITS * 3]
//! [SPLIT_NORMALS f32 * SPLITS * DIM]
//! [LEAF_RANGES u32 * LEAVES * 2]
//! [LEAF_POOL u32 * POOL]
//! ```
//!
//! The checksum covers every byte after the prelude.

use std::ops::Range;

use crate::distance::Metric;
use crate::error::{ForgeAnnError, Result};
use crate::forest::{LEAF_RECORD_WORDS, SPLIT_RECORD_WORDS};

/// Magic bytes identifying a forge-ann file.
pub const MAGIC: [u8; 8] = *b"FORGEANN";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Kind of payload following the prelude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileKind {
    /// Vectors and random-projection trees.
    Forest = 1,
    /// Key table of a keyed index.
    KeyTable = 2,
}

impl FileKind {
    /// Convert from u32.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Forest),
            2 => Some(Self::KeyTable),
            _ => None,
        }
    }
}

/// File prelude.
///
/// Total size: 24 bytes
/// ```text
/// [MAGIC 8B][VERSION u32][KIND u32][FLAGS u32][CHECKSUM u32]
/// ```
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub kind: FileKind,
    /// Reserved, written as zero.
    pub flags: u32,
    /// CRC32 of everything after the prelude.
    pub checksum: u32,
}

impl FileHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 24;

    pub fn new(kind: FileKind, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            kind,
            flags: 0,
            checksum,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.version.to_le_bytes());
        bytes[12..16].copy_from_slice(&(self.kind as u32).to_le_bytes());
        bytes[16..20].copy_from_slice(&self.flags.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ForgeAnnError::invalid_format("header too small"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        if magic != MAGIC {
            return Err(ForgeAnnError::invalid_format("invalid magic bytes"));
        }

        let kind_raw = read_u32(bytes, 12);
        let kind = FileKind::from_u32(kind_raw)
            .ok_or_else(|| ForgeAnnError::invalid_format(format!("unknown file kind {kind_raw}")))?;

        Ok(Self {
            magic,
            version: read_u32(bytes, 8),
            kind,
            flags: read_u32(bytes, 16),
            checksum: read_u32(bytes, 20),
        })
    }

    /// Verify the header is supported and matches the expected kind.
    pub fn verify(&self, expected: FileKind) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(ForgeAnnError::invalid_format(format!(
                "unsupported version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }

        if self.kind != expected {
            return Err(ForgeAnnError::invalid_format(format!(
                "file kind mismatch: expected {:?}, got {:?}",
                expected, self.kind
            )));
        }

        if self.flags != 0 {
            return Err(ForgeAnnError::invalid_format(format!(
                "unsupported flags {:#x}",
                self.flags
            )));
        }

        Ok(())
    }
}

/// Shape of a persisted forest.
///
/// Total size: 28 bytes, directly after the [`FileHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestHeader {
    pub metric: Metric,
    pub dimension: u32,
    pub slots: u32,
    pub trees: u32,
    pub splits: u32,
    pub leaves: u32,
    pub pool: u32,
}

impl ForestHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 28;

    /// Absolute offset of the forest header in the file.
    pub const OFFSET: usize = FileHeader::SIZE;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let fields = [
            self.metric.tag(),
            self.dimension,
            self.slots,
            self.trees,
            self.splits,
            self.leaves,
            self.pool,
        ];
        let mut bytes = [0u8; Self::SIZE];
        for (chunk, field) in bytes.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ForgeAnnError::invalid_format("forest header too small"));
        }

        let tag = read_u32(bytes, 0);
        let metric = Metric::from_tag(tag)
            .ok_or_else(|| ForgeAnnError::invalid_format(format!("unknown metric tag {tag}")))?;

        let header = Self {
            metric,
            dimension: read_u32(bytes, 4),
            slots: read_u32(bytes, 8),
            trees: read_u32(bytes, 12),
            splits: read_u32(bytes, 16),
            leaves: read_u32(bytes, 20),
            pool: read_u32(bytes, 24),
        };

        if header.dimension == 0 {
            return Err(ForgeAnnError::invalid_format("zero dimension"));
        }
        Ok(header)
    }

    /// Byte ranges of every section, or an error when they overflow.
    pub fn layout(&self) -> Result<SectionLayout> {
        let overflow = || ForgeAnnError::invalid_format("section sizes overflow");
        let dim = self.dimension as usize;
        let slots = self.slots as usize;
        let splits = self.splits as usize;

        let mut cursor = Self::OFFSET + Self::SIZE;
        let mut next = |bytes: Option<usize>| -> Result<Range<usize>> {
            let bytes = bytes.ok_or_else(overflow)?;
            let end = cursor.checked_add(bytes).ok_or_else(overflow)?;
            let range = cursor..end;
            cursor = end;
            Ok(range)
        };

        let present = next(Some(slots))?;
        let _padding = next(Some(padding(slots)))?;
        let vectors = next(slots.checked_mul(dim).and_then(|n| n.checked_mul(4)))?;
        let roots = next((self.trees as usize).checked_mul(4))?;
        let split_records = next(splits.checked_mul(SPLIT_RECORD_WORDS * 4))?;
        let split_normals = next(splits.checked_mul(dim).and_then(|n| n.checked_mul(4)))?;
        let leaf_ranges = next((self.leaves as usize).checked_mul(LEAF_RECORD_WORDS * 4))?;
        let leaf_pool = next((self.pool as usize).checked_mul(4))?;

        Ok(SectionLayout {
            present,
            vectors,
            roots,
            split_records,
            split_normals,
            leaf_ranges,
            total: leaf_pool.end,
            leaf_pool,
        })
    }
}

/// Absolute byte ranges of the forest sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLayout {
    pub present: Range<usize>,
    pub vectors: Range<usize>,
    pub roots: Range<usize>,
    pub split_records: Range<usize>,
    pub split_normals: Range<usize>,
    pub leaf_ranges: Range<usize>,
    pub leaf_pool: Range<usize>,
    /// Exact file length.
    pub total: usize,
}

/// Zero bytes needed after `len` bytes to reach 4-byte alignment.
#[inline]
pub fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest_header() -> ForestHeader {
        ForestHeader {
            metric: Metric::Angular,
            dimension: 3,
            slots: 5,
            trees: 2,
            splits: 4,
            leaves: 6,
            pool: 10,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = FileHeader::new(FileKind::Forest, 0x12345678);
        let parsed = FileHeader::from_bytes(&header.to_bytes()).unwrap();

        assert_eq!(parsed.magic, MAGIC);
        assert_eq!(parsed.version, FORMAT_VERSION);
        assert_eq!(parsed.kind, FileKind::Forest);
        assert_eq!(parsed.checksum, 0x12345678);
        parsed.verify(FileKind::Forest).unwrap();
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = [0u8; FileHeader::SIZE];
        bytes[0..8].copy_from_slice(b"INVALID\0");
        assert!(FileHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_verify_kind_mismatch() {
        let header = FileHeader::new(FileKind::KeyTable, 0);
        assert!(header.verify(FileKind::Forest).is_err());
    }

    #[test]
    fn test_verify_future_version() {
        let mut header = FileHeader::new(FileKind::Forest, 0);
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(
            header.verify(FileKind::Forest),
            Err(ForgeAnnError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_forest_header_roundtrip() {
        let header = forest_header();
        assert_eq!(ForestHeader::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_unknown_metric_tag() {
        let mut bytes = forest_header().to_bytes();
        bytes[0..4].copy_from_slice(&77u32.to_le_bytes());
        assert!(ForestHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_layout_is_aligned_and_contiguous() {
        let layout = forest_header().layout().unwrap();

        assert_eq!(layout.present, 52..57);
        assert_eq!(layout.vectors.start, 60);
        for range in [
            &layout.vectors,
            &layout.roots,
            &layout.split_records,
            &layout.split_normals,
            &layout.leaf_ranges,
            &layout.leaf_pool,
        ] {
            assert_eq!(range.start % 4, 0);
        }
        assert_eq!(layout.vectors.len(), 5 * 3 * 4);
        assert_eq!(layout.split_records.len(), 4 * 12);
        assert_eq!(layout.total, layout.leaf_pool.end);
        assert_eq!(layout.total, 60 + 60 + 8 + 48 + 48 + 48 + 40);
    }

    #[test]
    fn test_padding() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 3);
        assert_eq!(padding(4), 0);
        assert_eq!(padding(7), 1);
    }
}
