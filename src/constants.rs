//! Named constants for configuration values.
//!
//! This module centralizes the tunables of tree construction, search and the
//! on-disk format, making them easier to find, document, and tune.

/// Constants for random-projection tree construction.
pub mod tree {
    /// Leaf bucket size is `LEAF_SIZE_FACTOR * dimension + LEAF_SIZE_MARGIN`
    /// unless the configuration overrides it.
    pub const LEAF_SIZE_FACTOR: usize = 2;

    /// Additive margin for the default leaf bucket size.
    pub const LEAF_SIZE_MARGIN: usize = 2;

    /// Number of sampled hyperplanes tried before forcing a half/half split.
    pub const SPLIT_ATTEMPTS: usize = 3;

    /// A split is rejected when its larger side holds more than this fraction
    /// of the bucket.
    pub const MAX_SPLIT_IMBALANCE: f32 = 0.95;

    /// Refinement steps of the two-means split sampler.
    pub const TWO_MEANS_ITERATIONS: usize = 200;

    /// With an automatic tree count, trees are added until the forest holds at
    /// least `AUTO_NODE_FACTOR * n_items` nodes.
    pub const AUTO_NODE_FACTOR: usize = 1;

    /// Mixing constant used to derive per-tree seeds from the index seed.
    pub const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
}

/// Constants for distance kernels.
pub mod simd {
    /// Below this length the scalar kernels are used directly.
    /// SIMD setup overhead is not worth it for very short vectors.
    pub const SIMD_THRESHOLD: usize = 16;
}

/// Constants for the persisted index format.
pub mod io {
    /// Size of the staging buffer used when streaming sections to disk.
    pub const WRITE_CHUNK_BYTES: usize = 64 * 1024;

    /// File name of the forest inside a keyed index directory.
    pub const KEYED_INDEX_FILE: &str = "index.ann";

    /// File name of the key table inside a keyed index directory.
    pub const KEYED_KEYS_FILE: &str = "keys.bin";

    /// Key table written during a save, renamed once the forest is in place.
    pub const KEYED_KEYS_STAGED_FILE: &str = "keys.bin.pending";
}
