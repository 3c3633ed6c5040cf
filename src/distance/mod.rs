//! Distance metrics and the hyperplane capabilities the forest is built on.
//!
//! Every metric provides four operations: a ranking distance, a split
//! hyperplane derived from a bucket of points, the signed margin of a vector
//! against such a hyperplane, and the side the margin selects.

pub mod scalar;
pub mod simd;

pub use simd::{dot_product, euclidean_distance_squared, manhattan_distance};

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::tree::TWO_MEANS_ITERATIONS;
use crate::types::{ItemId, Side};

/// Read access to stored vectors by item id, used while building trees.
pub trait VectorSource: Sync {
    /// Dimensionality of every stored vector.
    fn dimension(&self) -> usize;

    /// Vector of a stored item. Callers only pass ids known to be present.
    fn vector(&self, id: ItemId) -> &[f32];
}

/// Supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Cosine-derived distance: `sqrt(2 - 2 * cos(a, b))`, i.e. the Euclidean
    /// distance between the unit vectors. Range [0, 2].
    Angular,
    /// Euclidean (L2) distance: sqrt(sum((a[i] - b[i])^2))
    Euclidean,
    /// Manhattan (L1) distance: sum(|a[i] - b[i]|)
    Manhattan,
}

impl Metric {
    /// Tag stored in the persisted header.
    pub fn tag(self) -> u32 {
        match self {
            Metric::Angular => 1,
            Metric::Euclidean => 2,
            Metric::Manhattan => 3,
        }
    }

    /// Convert from a persisted tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Metric::Angular),
            2 => Some(Metric::Euclidean),
            3 => Some(Metric::Manhattan),
            _ => None,
        }
    }

    /// Ranking distance between two vectors.
    ///
    /// Monotone in the reported distance (see [`Self::normalized_distance`]),
    /// so it can be compared directly while selecting neighbors.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Angular => scalar::angular_distance_squared(a, b),
            Metric::Euclidean => euclidean_distance_squared(a, b),
            Metric::Manhattan => manhattan_distance(a, b),
        }
    }

    /// Convert a ranking distance into the distance reported to callers.
    ///
    /// Rounding below zero clamps to zero. NaN passes through, so a distance
    /// that ranks last is never reported as an exact match.
    #[inline]
    pub fn normalized_distance(self, distance: f32) -> f32 {
        let clamped = if distance < 0.0 { 0.0 } else { distance };
        match self {
            Metric::Angular | Metric::Euclidean => clamped.sqrt(),
            Metric::Manhattan => clamped,
        }
    }

    /// Reported distance between two vectors.
    #[inline]
    pub fn pair_distance(self, a: &[f32], b: &[f32]) -> f32 {
        self.normalized_distance(self.distance(a, b))
    }

    /// Derive a hyperplane that approximately separates `bucket` into two halves.
    ///
    /// Two distinct members seed a two-means refinement over random members of
    /// the bucket. Angular splits pass through the origin along the normalized
    /// difference of the two centroids; Euclidean and Manhattan splits are
    /// additionally offset to the centroids' midpoint. Near-duplicate points
    /// yield a zero normal, which sends every vector through the coin-flip path
    /// of [`Side::from_margin`] instead of failing.
    pub fn create_split<S, R>(self, bucket: &[ItemId], source: &S, rng: &mut R) -> Hyperplane
    where
        S: VectorSource + ?Sized,
        R: Rng + ?Sized,
    {
        let dim = source.dimension();
        if bucket.len() < 2 {
            return Hyperplane::zero(dim);
        }

        let (p, q) = self.two_means(bucket, source, rng);
        let mut normal: Vec<f32> = p.iter().zip(q.iter()).map(|(a, b)| a - b).collect();
        scalar::normalize(&mut normal);

        let offset = match self {
            Metric::Angular => 0.0,
            Metric::Euclidean | Metric::Manhattan => {
                -normal
                    .iter()
                    .zip(p.iter().zip(q.iter()))
                    .map(|(n, (a, b))| n * (a + b) * 0.5)
                    .sum::<f32>()
            }
        };

        Hyperplane { normal, offset }
    }

    /// Signed distance of `v` from the hyperplane.
    #[inline]
    pub fn margin(self, plane: HyperplaneRef<'_>, v: &[f32]) -> f32 {
        match self {
            Metric::Angular => dot_product(plane.normal, v),
            Metric::Euclidean | Metric::Manhattan => plane.offset + dot_product(plane.normal, v),
        }
    }

    /// Side of the hyperplane `v` falls on; exact ties are broken with `rng`.
    #[inline]
    pub fn side<R: Rng + ?Sized>(self, plane: HyperplaneRef<'_>, v: &[f32], rng: &mut R) -> Side {
        Side::from_margin(self.margin(plane, v), rng)
    }

    /// Two-means clustering of a bucket, returning both centroids.
    fn two_means<S, R>(self, bucket: &[ItemId], source: &S, rng: &mut R) -> (Vec<f32>, Vec<f32>)
    where
        S: VectorSource + ?Sized,
        R: Rng + ?Sized,
    {
        let count = bucket.len();
        let i = rng.gen_range(0..count);
        let mut j = rng.gen_range(0..count - 1);
        if j >= i {
            j += 1;
        }

        let mut p = source.vector(bucket[i]).to_vec();
        let mut q = source.vector(bucket[j]).to_vec();
        if self == Metric::Angular {
            scalar::normalize(&mut p);
            scalar::normalize(&mut q);
        }

        let mut p_count = 1.0f32;
        let mut q_count = 1.0f32;
        for _ in 0..TWO_MEANS_ITERATIONS {
            let v = source.vector(bucket[rng.gen_range(0..count)]);
            let scale = match self {
                Metric::Angular => scalar::norm(v),
                Metric::Euclidean | Metric::Manhattan => 1.0,
            };
            if !(scale > 0.0) {
                continue;
            }

            let dp = p_count * self.distance(&p, v);
            let dq = q_count * self.distance(&q, v);
            if dp < dq {
                absorb(&mut p, &mut p_count, v, scale);
            } else if dq < dp {
                absorb(&mut q, &mut q_count, v, scale);
            }
        }

        (p, q)
    }
}

/// Move a running centroid towards `v / scale`.
#[inline]
fn absorb(centroid: &mut [f32], count: &mut f32, v: &[f32], scale: f32) {
    for (c, x) in centroid.iter_mut().zip(v.iter()) {
        *c = (*c * *count + x / scale) / (*count + 1.0);
    }
    *count += 1.0;
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Angular => "angular",
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
        };
        f.write_str(name)
    }
}

/// Owned splitting hyperplane produced while building a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperplane {
    pub normal: Vec<f32>,
    pub offset: f32,
}

impl Hyperplane {
    /// Hyperplane with a zero normal; every margin against it is `offset`.
    pub fn zero(dim: usize) -> Self {
        Self {
            normal: vec![0.0; dim],
            offset: 0.0,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> HyperplaneRef<'_> {
        HyperplaneRef {
            normal: &self.normal,
            offset: self.offset,
        }
    }
}

/// Borrowed hyperplane, read straight out of the forest arena.
#[derive(Debug, Clone, Copy)]
pub struct HyperplaneRef<'a> {
    pub normal: &'a [f32],
    pub offset: f32,
}
