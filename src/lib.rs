//! forge-ann: approximate nearest neighbor search with random-projection forests.
//!
//! Vectors are added to an index, a forest of random-projection trees is
//! built over them once, and queries walk all trees best-first to collect a
//! candidate set that is then ranked by exact distance. A built index can be
//! saved to a single file and served from a read-only memory map.
//!
//! # Features
//!
//! - **Three Metrics**: Angular (cosine), Euclidean and Manhattan
//! - **SIMD Distance Functions**: AVX2/FMA and NEON kernels with runtime dispatch
//! - **Parallel Build**: Trees built independently with Rayon, reproducible by seed
//! - **Memory-Mapped Serving**: Flat node tables used in place, no deserialization
//! - **Keyed Index**: Caller keys mapped onto dense item ids
//!
//! # Example
//!
//! ```
//! use forge_ann::{AnnIndex, IndexConfig, Metric};
//!
//! let mut index = AnnIndex::new(IndexConfig::new(3, Metric::Angular).seed(42)).unwrap();
//! index.add_item(0, &[1.0, 0.0, 0.0]).unwrap();
//! index.add_item(1, &[0.9, 0.1, 0.0]).unwrap();
//! index.add_item(2, &[0.0, 0.0, 1.0]).unwrap();
//! index.build(10).unwrap();
//!
//! let neighbors = index.get_nns_by_item(0, 2, None).unwrap();
//! assert_eq!(neighbors.ids, vec![0, 1]);
//! ```

pub mod constants;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod forest;
pub mod index;
pub mod keyed;
pub mod metrics;
pub mod persistence;
pub mod shared;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use dataset::{recall_at_k, Dataset};
pub use distance::Metric;
pub use error::{ForgeAnnError, Result};
pub use index::{AnnIndex, BuildOptions, IndexConfig, IndexState, TreeCount};
pub use keyed::KeyedIndex;
pub use metrics::ForestStatistics;
pub use shared::SharedIndex;
pub use store::VectorStore;
pub use types::{ItemId, Neighbors};
