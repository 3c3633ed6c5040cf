//! Scalar (non-SIMD) distance kernels.
//! These are the reference implementations and the fallback on platforms
//! without AVX2.

/// Compute the dot product of two vectors.
///
/// Returns sum(a[i] * b[i])
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute the squared Euclidean distance between two vectors.
///
/// Returns sum((a[i] - b[i])^2)
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Compute the Manhattan (L1) distance between two vectors.
///
/// Returns sum(|a[i] - b[i]|)
#[inline]
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Squared chord length between the unit vectors of `a` and `b`.
///
/// Equals `2 - 2 * cos(a, b)` but is computed from the normalized components,
/// so identical inputs give exactly zero and the result is never negative.
/// A zero vector normalizes to the origin.
#[inline]
pub fn angular_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let inv_a = inverse_norm(a);
    let inv_b = inverse_norm(b);

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x * inv_a - y * inv_b;
            diff * diff
        })
        .sum()
}

/// Euclidean norm of a vector.
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    dot_product(a, a).sqrt()
}

/// Reciprocal of the norm, or zero for a zero (or non-finite) norm.
#[inline]
fn inverse_norm(a: &[f32]) -> f32 {
    let n = norm(a);
    if n > 0.0 && n.is_finite() {
        1.0 / n
    } else {
        0.0
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
#[inline]
pub fn normalize(a: &mut [f32]) {
    let inv = inverse_norm(a);
    if inv > 0.0 {
        for x in a.iter_mut() {
            *x *= inv;
        }
    }
}
