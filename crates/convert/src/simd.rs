//! Vector row kernels.
//!
//! SSE2 on x86_64 and NEON on aarch64 are part of the target baseline, so
//! no runtime feature detection is needed. Other targets use the scalar
//! kernel. Output is byte-identical to [`ScalarKernel`] for every span.

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
use crate::kernel::ScalarKernel;
use crate::kernel::RowKernel;

/// Whether [`SimdKernel`] has a vector path on this target.
pub const SIMD_AVAILABLE: bool = cfg!(any(target_arch = "x86_64", target_arch = "aarch64"));

/// Name of the vector instruction set used, for logging.
pub const SIMD_NAME: &str = if cfg!(target_arch = "x86_64") {
    "sse2"
} else if cfg!(target_arch = "aarch64") {
    "neon"
} else {
    "none"
};

pub struct SimdKernel;

// ---------------------------------------------------------------------------
// x86_64
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
impl RowKernel for SimdKernel {
    #[inline]
    fn copy(dst: &mut [u8], src: &[u8]) {
        use std::arch::x86_64::{_mm_loadu_si128, _mm_storeu_si128, __m128i};

        debug_assert_eq!(dst.len(), src.len());
        let mut s = src.chunks_exact(16);
        let mut d = dst.chunks_exact_mut(16);
        for (d, s) in (&mut d).zip(&mut s) {
            // SAFETY: both chunks are exactly 16 bytes; unaligned load/store.
            unsafe {
                let v = _mm_loadu_si128(s.as_ptr() as *const __m128i);
                _mm_storeu_si128(d.as_mut_ptr() as *mut __m128i, v);
            }
        }
        d.into_remainder().copy_from_slice(s.remainder());
    }

    #[inline]
    fn split(cb: &mut [u8], cr: &mut [u8], src: &[u8]) {
        use std::arch::x86_64::{
            __m128i, _mm_and_si128, _mm_loadu_si128, _mm_packus_epi16, _mm_set1_epi16,
            _mm_setzero_si128, _mm_srli_epi16, _mm_storel_epi64, _mm_storeu_si128,
        };

        debug_assert_eq!(src.len(), cb.len() * 2);
        debug_assert_eq!(cb.len(), cr.len());
        match cb.len() {
            16 => {
                // SAFETY: src is 32 bytes, cb/cr 16 bytes each.
                unsafe {
                    let mask = _mm_set1_epi16(0x00FF);
                    let a = _mm_loadu_si128(src.as_ptr() as *const __m128i);
                    let b = _mm_loadu_si128(src.as_ptr().add(16) as *const __m128i);
                    let even = _mm_packus_epi16(_mm_and_si128(a, mask), _mm_and_si128(b, mask));
                    let odd = _mm_packus_epi16(_mm_srli_epi16(a, 8), _mm_srli_epi16(b, 8));
                    _mm_storeu_si128(cb.as_mut_ptr() as *mut __m128i, even);
                    _mm_storeu_si128(cr.as_mut_ptr() as *mut __m128i, odd);
                }
            }
            8 => {
                // SAFETY: src is 16 bytes, cb/cr 8 bytes each; only the low
                // 8 bytes of each result are stored.
                unsafe {
                    let mask = _mm_set1_epi16(0x00FF);
                    let zero = _mm_setzero_si128();
                    let a = _mm_loadu_si128(src.as_ptr() as *const __m128i);
                    let even = _mm_packus_epi16(_mm_and_si128(a, mask), zero);
                    let odd = _mm_packus_epi16(_mm_srli_epi16(a, 8), zero);
                    _mm_storel_epi64(cb.as_mut_ptr() as *mut __m128i, even);
                    _mm_storel_epi64(cr.as_mut_ptr() as *mut __m128i, odd);
                }
            }
            _ => {
                for ((pair, b), r) in src.chunks_exact(2).zip(cb.iter_mut()).zip(cr.iter_mut()) {
                    *b = pair[0];
                    *r = pair[1];
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// aarch64
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
impl RowKernel for SimdKernel {
    #[inline]
    fn copy(dst: &mut [u8], src: &[u8]) {
        use std::arch::aarch64::{vld1q_u8, vst1q_u8};

        debug_assert_eq!(dst.len(), src.len());
        let mut s = src.chunks_exact(16);
        let mut d = dst.chunks_exact_mut(16);
        for (d, s) in (&mut d).zip(&mut s) {
            // SAFETY: both chunks are exactly 16 bytes.
            unsafe { vst1q_u8(d.as_mut_ptr(), vld1q_u8(s.as_ptr())) };
        }
        d.into_remainder().copy_from_slice(s.remainder());
    }

    #[inline]
    fn split(cb: &mut [u8], cr: &mut [u8], src: &[u8]) {
        use std::arch::aarch64::{vld2_u8, vld2q_u8, vst1_u8, vst1q_u8};

        debug_assert_eq!(src.len(), cb.len() * 2);
        debug_assert_eq!(cb.len(), cr.len());
        match cb.len() {
            16 => {
                // SAFETY: src is 32 bytes, cb/cr 16 bytes each.
                unsafe {
                    let v = vld2q_u8(src.as_ptr());
                    vst1q_u8(cb.as_mut_ptr(), v.0);
                    vst1q_u8(cr.as_mut_ptr(), v.1);
                }
            }
            8 => {
                // SAFETY: src is 16 bytes, cb/cr 8 bytes each.
                unsafe {
                    let v = vld2_u8(src.as_ptr());
                    vst1_u8(cb.as_mut_ptr(), v.0);
                    vst1_u8(cr.as_mut_ptr(), v.1);
                }
            }
            _ => {
                for ((pair, b), r) in src.chunks_exact(2).zip(cb.iter_mut()).zip(cr.iter_mut()) {
                    *b = pair[0];
                    *r = pair[1];
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Everything else
// ---------------------------------------------------------------------------

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
impl RowKernel for SimdKernel {
    #[inline]
    fn copy(dst: &mut [u8], src: &[u8]) {
        ScalarKernel::copy(dst, src);
    }

    #[inline]
    fn split(cb: &mut [u8], cr: &mut [u8], src: &[u8]) {
        ScalarKernel::split(cb, cr, src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ScalarKernel;

    fn ramp(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(13).wrapping_add(seed)).collect()
    }

    #[test]
    fn copy_matches_scalar_for_tile_spans() {
        for span in [16usize, 32] {
            let src = ramp(span, 3);
            let mut a = vec![0u8; span];
            let mut b = vec![0u8; span];
            SimdKernel::copy(&mut a, &src);
            ScalarKernel::copy(&mut b, &src);
            assert_eq!(a, b, "span {span}");
        }
    }

    #[test]
    fn split_matches_scalar_for_tile_spans() {
        for half in [8usize, 16] {
            let src = ramp(half * 2, 200);
            let (mut cb_a, mut cr_a) = (vec![0u8; half], vec![0u8; half]);
            let (mut cb_b, mut cr_b) = (vec![0u8; half], vec![0u8; half]);
            SimdKernel::split(&mut cb_a, &mut cr_a, &src);
            ScalarKernel::split(&mut cb_b, &mut cr_b, &src);
            assert_eq!(cb_a, cb_b, "cb, half {half}");
            assert_eq!(cr_a, cr_b, "cr, half {half}");
        }
    }

    #[test]
    fn split_handles_saturating_values() {
        // packus saturates signed 16-bit lanes; the mask keeps them in range.
        let src = [0xFFu8; 32];
        let mut cb = [0u8; 16];
        let mut cr = [0u8; 16];
        SimdKernel::split(&mut cb, &mut cr, &src);
        assert!(cb.iter().chain(cr.iter()).all(|&v| v == 0xFF));
    }

    #[test]
    fn short_split_does_not_touch_neighbours() {
        let src = ramp(16, 1);
        let mut cb = [0xEEu8; 16];
        let mut cr = [0xEEu8; 16];
        SimdKernel::split(&mut cb[..8], &mut cr[..8], &src);
        assert!(cb[8..].iter().all(|&v| v == 0xEE));
        assert!(cr[8..].iter().all(|&v| v == 0xEE));
    }
}
