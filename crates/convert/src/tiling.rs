//! Geometry of the decoder's 32x32 tiled layout and the tile walks.
//!
//! The hardware stores each plane as a sequence of 1024-byte tiles. A tile
//! covers 32 rows and 32 bytes (one macroblock pair) and is stored line by
//! line. Tiles are ordered band by band (a band is 32 destination rows), and
//! within a band by macroblock-pair column. The hardware always emits whole
//! tiles, so the walks clip at the right and bottom edges and never write
//! past the coded size.
//!
//! Everything in this module is pure index arithmetic over slices; the byte
//! moving itself is delegated to a [`RowKernel`].

use crate::kernel::RowKernel;

/// Tile edge in rows and in bytes.
pub const TILE_EDGE: usize = 32;
/// Bytes per tile.
pub const TILE_BYTES: usize = TILE_EDGE * TILE_EDGE;

/// Number of tile bands and tile columns covering one plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileGeometry {
    /// Rows of tiles (32 destination rows each).
    pub bands: usize,
    /// Tile columns per band (one macroblock pair each).
    pub pairs: usize,
}

impl TileGeometry {
    /// Geometry of a luma-like plane: 16x16 macroblocks, two macroblock rows
    /// per band. Also used for the interleaved chroma plane viewed as bytes.
    pub fn luma(coded_width: u32, coded_height: u32) -> Self {
        let mb_width = (coded_width as usize).div_ceil(16);
        let mb_height = (coded_height as usize).div_ceil(16);
        let bands = (mb_height + 1) >> 1;
        let recon_width = (mb_width + 1) & !1;
        Self {
            bands,
            pairs: recon_width / 2,
        }
    }

    /// Geometry of the interleaved chroma plane in samples: `coded_width` is
    /// the luma width, `chroma_height` the chroma row count. Chroma
    /// macroblocks are 8x8 samples, four macroblock rows per band.
    pub fn chroma(coded_width: u32, chroma_height: u32) -> Self {
        let width = (coded_width / 2) as usize;
        let mb_width = width.div_ceil(8);
        let mb_height = (chroma_height as usize).div_ceil(8);
        let bands = (mb_height + 3) >> 2;
        let recon_width = (mb_width + 1) & !1;
        Self {
            bands,
            pairs: recon_width / 2,
        }
    }

    /// Bytes the hardware writes for this plane.
    pub fn tiled_len(&self) -> usize {
        self.bands * self.pairs * TILE_BYTES
    }

    /// The tiled plane seen as a byte texture: (width, height).
    pub fn texture_size(&self) -> (u32, u32) {
        (
            (self.pairs * TILE_EDGE) as u32,
            (self.bands * TILE_EDGE) as u32,
        )
    }
}

/// Bytes written for a luma line of the tile column starting at byte `n`.
#[inline]
fn luma_span(n: usize, coded_width: usize) -> usize {
    if n + 16 < coded_width {
        32
    } else if n < coded_width {
        16
    } else {
        0
    }
}

/// Samples per chroma component for the tile column starting at sample `n`.
#[inline]
fn chroma_span(n: usize, chroma_width: usize) -> usize {
    if n + 8 < chroma_width {
        16
    } else if n < chroma_width {
        8
    } else {
        0
    }
}

/// Untile a luma-like plane into `dst` with row pitch `dst_stride`.
pub(crate) fn walk_luma<K: RowKernel>(
    src: &[u8],
    dst: &mut [u8],
    dst_stride: usize,
    coded_width: u32,
    coded_height: u32,
) {
    let geo = TileGeometry::luma(coded_width, coded_height);
    let (width, height) = (coded_width as usize, coded_height as usize);
    debug_assert!(src.len() >= geo.tiled_len(), "tiled luma plane too short");

    let mut cursor = 0usize;
    for band in 0..geo.bands {
        let m = band * TILE_EDGE;
        for pair in 0..geo.pairs {
            let n = pair * TILE_EDGE;
            let span = luma_span(n, width);
            let mut offset = m * dst_stride + n;
            for line in 0..TILE_EDGE {
                if m + line < height {
                    if span > 0 {
                        K::copy(
                            &mut dst[offset..offset + span],
                            &src[cursor..cursor + span],
                        );
                    }
                    offset += dst_stride;
                }
                cursor += TILE_EDGE;
            }
        }
    }
}

/// Untile the interleaved chroma plane into separate Cb and Cr planes.
pub(crate) fn walk_chroma<K: RowKernel>(
    src: &[u8],
    dst_cb: &mut [u8],
    dst_cr: &mut [u8],
    dst_stride: usize,
    coded_width: u32,
    chroma_height: u32,
) {
    let geo = TileGeometry::chroma(coded_width, chroma_height);
    let width = (coded_width / 2) as usize;
    let height = chroma_height as usize;
    debug_assert!(src.len() >= geo.tiled_len(), "tiled chroma plane too short");

    let mut cursor = 0usize;
    for band in 0..geo.bands {
        let m = band * TILE_EDGE;
        for pair in 0..geo.pairs {
            let n = pair * 16;
            let span = chroma_span(n, width);
            let mut offset = m * dst_stride + n;
            for line in 0..TILE_EDGE {
                if m + line < height {
                    if span > 0 {
                        K::split(
                            &mut dst_cb[offset..offset + span],
                            &mut dst_cr[offset..offset + span],
                            &src[cursor..cursor + span * 2],
                        );
                    }
                    offset += dst_stride;
                }
                cursor += TILE_EDGE;
            }
        }
    }
}

/// Lay a linear plane out in the hardware's tiled order.
///
/// This is the inverse of the luma walk and is used to synthesise
/// decoder-layout pictures (tests, benchmarks, software decoders feeding
/// the same pipeline). Bytes outside `width` x `height` are zero.
pub fn tile_plane(linear: &[u8], stride: usize, width: u32, height: u32) -> Vec<u8> {
    let geo = TileGeometry::luma(width, height);
    let (width, height) = (width as usize, height as usize);
    let mut tiled = vec![0u8; geo.tiled_len()];
    let mut cursor = 0usize;
    for band in 0..geo.bands {
        for pair in 0..geo.pairs {
            for line in 0..TILE_EDGE {
                let y = band * TILE_EDGE + line;
                for col in 0..TILE_EDGE {
                    let x = pair * TILE_EDGE + col;
                    if x < width && y < height {
                        tiled[cursor + col] = linear[y * stride + x];
                    }
                }
                cursor += TILE_EDGE;
            }
        }
    }
    tiled
}
