//! SIMD distance kernels with runtime dispatch.
//!
//! - **AVX2+FMA** (x86_64): 8 floats per iteration, selected at runtime
//! - **NEON** (aarch64): 4 floats per iteration, always available
//! - **Scalar**: fallback for every other platform and for short vectors
//!
//! The public functions pick the fastest available implementation.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use super::scalar;
use crate::constants::simd::SIMD_THRESHOLD;

// =============================================================================
// AVX2 Implementations (x86_64)
// =============================================================================

/// Squared Euclidean distance using AVX2 and FMA intrinsics.
///
/// # Safety
/// The caller must ensure the CPU supports AVX2 and FMA.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn euclidean_distance_squared_avx2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len().min(b.len());
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= len {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        let diff = _mm256_sub_ps(va, vb);
        sum = _mm256_fmadd_ps(diff, diff, sum);
        i += 8;
    }

    let mut total = horizontal_sum_avx(sum);

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total
}

/// Dot product using AVX2 and FMA intrinsics.
///
/// # Safety
/// The caller must ensure the CPU supports AVX2 and FMA.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len().min(b.len());
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= len {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        sum = _mm256_fmadd_ps(va, vb, sum);
        i += 8;
    }

    let mut total = horizontal_sum_avx(sum);

    while i < len {
        total += a[i] * b[i];
        i += 1;
    }

    total
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn horizontal_sum_avx(v: __m256) -> f32 {
    let mut lanes = [0.0f32; 8];
    _mm256_storeu_ps(lanes.as_mut_ptr(), v);
    lanes.iter().sum()
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn has_avx2_fma() -> bool {
    is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
}

// =============================================================================
// ARM NEON Implementations (aarch64)
// =============================================================================

/// Squared Euclidean distance using NEON intrinsics.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn euclidean_distance_squared_neon(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len().min(b.len());
    let mut i = 0;
    let mut sum = unsafe { vdupq_n_f32(0.0) };

    while i + 4 <= len {
        unsafe {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            let diff = vsubq_f32(va, vb);
            sum = vfmaq_f32(sum, diff, diff);
        }
        i += 4;
    }

    let mut total = unsafe { vaddvq_f32(sum) };

    while i < len {
        let diff = a[i] - b[i];
        total += diff * diff;
        i += 1;
    }

    total
}

/// Dot product using NEON intrinsics.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len().min(b.len());
    let mut i = 0;
    let mut sum = unsafe { vdupq_n_f32(0.0) };

    while i + 4 <= len {
        unsafe {
            let va = vld1q_f32(a.as_ptr().add(i));
            let vb = vld1q_f32(b.as_ptr().add(i));
            sum = vfmaq_f32(sum, va, vb);
        }
        i += 4;
    }

    let mut total = unsafe { vaddvq_f32(sum) };

    while i < len {
        total += a[i] * b[i];
        i += 1;
    }

    total
}

// =============================================================================
// Dispatch
// =============================================================================

/// Squared Euclidean distance with the fastest available kernel.
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() >= SIMD_THRESHOLD {
        #[cfg(target_arch = "x86_64")]
        if has_avx2_fma() {
            // SAFETY: feature support checked above.
            return unsafe { euclidean_distance_squared_avx2(a, b) };
        }

        #[cfg(target_arch = "aarch64")]
        return euclidean_distance_squared_neon(a, b);
    }

    scalar::euclidean_distance_squared(a, b)
}

/// Dot product with the fastest available kernel.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() >= SIMD_THRESHOLD {
        #[cfg(target_arch = "x86_64")]
        if has_avx2_fma() {
            // SAFETY: feature support checked above.
            return unsafe { dot_product_avx2(a, b) };
        }

        #[cfg(target_arch = "aarch64")]
        return dot_product_neon(a, b);
    }

    scalar::dot_product(a, b)
}

/// Manhattan distance. Compilers vectorize the scalar loop well enough.
#[inline]
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    scalar::manhattan_distance(a, b)
}
