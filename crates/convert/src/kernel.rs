//! Row kernels: the innermost byte moves of the tile walks.
//!
//! A kernel only ever sees one tile line at a time: at most 32 bytes to
//! copy, or at most 32 interleaved chroma bytes to split. The walk decides
//! the span, so kernels never need to clip.

/// Moves one tile line into the destination.
pub trait RowKernel {
    /// Copy `src` into `dst`. Both slices have the same length.
    fn copy(dst: &mut [u8], src: &[u8]);

    /// Deinterleave `src` (Cb, Cr, Cb, Cr, ...) into `cb` and `cr`.
    /// `src.len() == 2 * cb.len() == 2 * cr.len()`.
    fn split(cb: &mut [u8], cr: &mut [u8], src: &[u8]);
}

/// Portable implementation.
pub struct ScalarKernel;

impl RowKernel for ScalarKernel {
    #[inline]
    fn copy(dst: &mut [u8], src: &[u8]) {
        dst.copy_from_slice(src);
    }

    #[inline]
    fn split(cb: &mut [u8], cr: &mut [u8], src: &[u8]) {
        for ((pair, b), r) in src.chunks_exact(2).zip(cb.iter_mut()).zip(cr.iter_mut()) {
            *b = pair[0];
            *r = pair[1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_split_deinterleaves() {
        let src: Vec<u8> = (0..32).collect();
        let mut cb = [0u8; 16];
        let mut cr = [0u8; 16];
        ScalarKernel::split(&mut cb, &mut cr, &src);
        assert_eq!(cb[0], 0);
        assert_eq!(cr[0], 1);
        assert_eq!(cb[15], 30);
        assert_eq!(cr[15], 31);
    }

    #[test]
    fn scalar_copy_is_exact() {
        let src = [9u8; 16];
        let mut dst = [0u8; 16];
        ScalarKernel::copy(&mut dst, &src);
        assert_eq!(dst, src);
    }
}
