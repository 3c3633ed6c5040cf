//! Persistence layer for saving and loading forge-ann forests.
//!
//! A forest is written as one self-describing file (see [`format`]) whose
//! sections mirror the in-memory tables, so it can either be decoded onto the
//! heap ([`read_forest`]) or used in place through a memory map
//! ([`MappedForest`]).
//!
//! Writes go to a sibling temporary file that is renamed over the target once
//! fully synced; a failed save never leaves a truncated index behind.
//!
//! # Example
//!
//! ```ignore
//! use forge_ann::persistence::{open_mapped, write_forest};
//!
//! write_forest("items.ann".as_ref(), &forest.view())?;
//! let mapped = open_mapped("items.ann".as_ref(), true, None)?;
//! ```

pub mod format;
mod mapped;

pub use format::{FileHeader, FileKind, ForestHeader, SectionLayout, FORMAT_VERSION, MAGIC};
pub use mapped::MappedForest;

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::constants::io::WRITE_CHUNK_BYTES;
use crate::distance::Metric;
use crate::error::{ForgeAnnError, Result};
use crate::forest::{ForestSource, ForestTables, ForestView, OwnedForest};

/// Dimension and metric a caller requires of a file it loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestShape {
    pub dimension: usize,
    pub metric: Metric,
}

/// A loaded or built forest, on the heap or memory-mapped.
#[derive(Debug)]
pub enum ForestBacking {
    Owned(OwnedForest),
    Mapped(MappedForest),
}

impl ForestSource for ForestBacking {
    fn view(&self) -> ForestView<'_> {
        match self {
            ForestBacking::Owned(forest) => forest.view(),
            ForestBacking::Mapped(forest) => forest.view(),
        }
    }
}

/// Write a forest to `path`, replacing any existing file.
pub fn write_forest(path: &Path, view: &ForestView<'_>) -> Result<()> {
    let header = ForestHeader {
        metric: view.metric(),
        dimension: to_u32(view.dimension(), "dimension")?,
        slots: to_u32(view.n_slots(), "item slot count")?,
        trees: to_u32(view.n_trees(), "tree count")?,
        splits: to_u32(view.n_splits(), "split count")?,
        leaves: to_u32(view.n_leaves(), "leaf count")?,
        pool: to_u32(view.leaf_pool.len(), "leaf pool length")?,
    };

    replace_atomically(path, |file| {
        let mut writer = ChecksumWriter::new(BufWriter::with_capacity(WRITE_CHUNK_BYTES, file));

        // Placeholder prelude, rewritten once the checksum is known.
        writer
            .inner
            .write_all(&FileHeader::new(FileKind::Forest, 0).to_bytes())?;

        writer.write_all(&header.to_bytes())?;
        writer.write_all(view.present)?;
        writer.write_all(&[0u8; 3][..format::padding(view.present.len())])?;
        write_words(&mut writer, view.vectors, f32::to_le_bytes)?;
        write_words(&mut writer, view.roots, u32::to_le_bytes)?;
        write_words(&mut writer, view.split_records, u32::to_le_bytes)?;
        write_words(&mut writer, view.split_normals, f32::to_le_bytes)?;
        write_words(&mut writer, view.leaf_ranges, u32::to_le_bytes)?;
        write_words(&mut writer, view.leaf_pool, u32::to_le_bytes)?;

        let (mut buffered, checksum) = writer.finish();
        buffered.seek(SeekFrom::Start(0))?;
        buffered.write_all(&FileHeader::new(FileKind::Forest, checksum).to_bytes())?;
        buffered.into_inner().map_err(|err| err.into_error())
    })
}

/// Read and fully decode a forest file onto the heap.
///
/// The checksum is always verified.
pub fn read_forest(path: &Path, expected: Option<ForestShape>) -> Result<OwnedForest> {
    let bytes = fs::read(path)?;
    let (header, layout) = parse_forest(&bytes, expected, true)?;

    let present = bytes[layout.present.clone()].to_vec();
    let forest = OwnedForest {
        metric: header.metric,
        dimension: header.dimension as usize,
        n_items: count_present(&present),
        vectors: decode_f32s(&bytes[layout.vectors])?,
        tables: ForestTables {
            roots: decode_u32s(&bytes[layout.roots])?,
            split_records: decode_u32s(&bytes[layout.split_records])?,
            split_normals: decode_f32s(&bytes[layout.split_normals])?,
            leaf_ranges: decode_u32s(&bytes[layout.leaf_ranges])?,
            leaf_pool: decode_u32s(&bytes[layout.leaf_pool])?,
        },
        present,
    };

    forest.view().validate()?;
    Ok(forest)
}

/// Open a forest file for in-place use.
///
/// With `prefault` every page is read up front and the checksum verified;
/// otherwise pages are faulted in lazily by queries and only the structure is
/// validated. Big-endian hosts cannot use the little-endian sections in place
/// and decode the file onto the heap instead.
pub fn open_mapped(
    path: &Path,
    prefault: bool,
    expected: Option<ForestShape>,
) -> Result<ForestBacking> {
    if cfg!(target_endian = "little") {
        MappedForest::open(path, prefault, expected).map(ForestBacking::Mapped)
    } else {
        read_forest(path, expected).map(ForestBacking::Owned)
    }
}

/// Validate the prelude and forest header of a complete file image and
/// return its section layout.
pub(crate) fn parse_forest(
    bytes: &[u8],
    expected: Option<ForestShape>,
    verify_checksum: bool,
) -> Result<(ForestHeader, SectionLayout)> {
    let prelude = FileHeader::from_bytes(bytes)?;
    prelude.verify(FileKind::Forest)?;

    let header = ForestHeader::from_bytes(&bytes[ForestHeader::OFFSET..])?;
    if let Some(shape) = expected {
        if header.dimension as usize != shape.dimension {
            return Err(ForgeAnnError::incompatible(format!(
                "file has dimension {}, index expects {}",
                header.dimension, shape.dimension
            )));
        }
        if header.metric != shape.metric {
            return Err(ForgeAnnError::incompatible(format!(
                "file uses {} distance, index expects {}",
                header.metric, shape.metric
            )));
        }
    }

    let layout = header.layout()?;
    if bytes.len() != layout.total {
        return Err(ForgeAnnError::invalid_format(format!(
            "file is {} bytes, header describes {}",
            bytes.len(),
            layout.total
        )));
    }

    if verify_checksum && crc32fast::hash(&bytes[FileHeader::SIZE..]) != prelude.checksum {
        return Err(ForgeAnnError::ChecksumMismatch);
    }

    Ok((header, layout))
}

/// Verify file header and return the payload section.
pub(crate) fn verify_header(data: &[u8], expected: FileKind) -> Result<&[u8]> {
    let header = FileHeader::from_bytes(data)?;
    header.verify(expected)?;

    let payload = &data[FileHeader::SIZE..];
    if crc32fast::hash(payload) != header.checksum {
        return Err(ForgeAnnError::ChecksumMismatch);
    }

    Ok(payload)
}

/// Write header and payload to file.
pub(crate) fn write_with_header(path: &Path, kind: FileKind, payload: &[u8]) -> Result<()> {
    let header = FileHeader::new(kind, crc32fast::hash(payload));

    replace_atomically(path, |mut file| {
        file.write_all(&header.to_bytes())?;
        file.write_all(payload)?;
        Ok(file)
    })
}

/// Run `write` against a fresh temporary file next to `path`, sync it and
/// rename it over `path`. The temporary file is removed on failure.
fn replace_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> io::Result<File>,
{
    let tmp = temp_path(path);
    let result = File::create(&tmp)
        .and_then(write)
        .and_then(|file| file.sync_all());

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        ForgeAnnError::from(err)
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writer that hashes everything written through it.
struct ChecksumWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn finish(self) -> (W, u32) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encode 4-byte words little-endian in bounded chunks.
fn write_words<W: Write, T: Copy>(
    writer: &mut W,
    values: &[T],
    encode: fn(T) -> [u8; 4],
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(WRITE_CHUNK_BYTES);
    for chunk in values.chunks(WRITE_CHUNK_BYTES / 4) {
        buf.clear();
        for value in chunk {
            buf.extend_from_slice(&encode(*value));
        }
        writer.write_all(&buf)?;
    }
    Ok(())
}

fn decode_u32s(bytes: &[u8]) -> Result<Vec<u32>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len() / 4)?;
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
    Ok(out)
}

fn decode_f32s(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len() / 4)?;
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
    Ok(out)
}

#[inline]
pub(crate) fn count_present(present: &[u8]) -> usize {
    present.iter().filter(|flag| **flag != 0).count()
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        ForgeAnnError::invalid_parameter(format!("{what} {value} too large to persist"))
    })
}
