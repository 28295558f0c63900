//! `cv-convert`: Tile-to-linear conversion for CedarV pictures.
//!
//! [`PlanarConverter`] turns the decoder's 32x32 tiled planes into linear
//! planar (Y, Cb, Cr) or semi-planar (Y, CbCr) memory. The backend is
//! resolved once at construction and carried as a value; every entry point
//! dispatches on it without further checks.
//!
//! [`HostMemoryCache`] owns the persistent CPU buffer a host view is
//! converted into.

pub mod host;
pub mod kernel;
pub mod simd;
pub mod tiling;

pub use host::{HostMemoryCache, HostPlanes, HostStats};
pub use tiling::{tile_plane, TileGeometry, TILE_BYTES, TILE_EDGE};

use cv_common::{AlignedDimensions, ConverterBackend, MappingParameters, PixelFormat, TiledPicture};
use tracing::{info, warn};

use crate::kernel::ScalarKernel;
use crate::simd::{SimdKernel, SIMD_AVAILABLE, SIMD_NAME};

/// Tile-to-linear converter with a fixed backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlanarConverter {
    backend: ConverterBackend,
}

impl PlanarConverter {
    /// Resolve `requested` against the target. An accelerated request on a
    /// target without a vector path resolves to scalar.
    pub fn new(requested: ConverterBackend) -> Self {
        let backend = match requested {
            ConverterBackend::Accelerated if !SIMD_AVAILABLE => {
                warn!("No vector tile converter for this target, using scalar");
                ConverterBackend::Scalar
            }
            other => other,
        };
        info!(?backend, isa = SIMD_NAME, "Tile converter ready");
        Self { backend }
    }

    pub fn scalar() -> Self {
        Self {
            backend: ConverterBackend::Scalar,
        }
    }

    /// The backend actually in use.
    pub fn backend(&self) -> ConverterBackend {
        self.backend
    }

    /// Untile a luma plane.
    ///
    /// `src` must hold at least [`TileGeometry::luma`]`.tiled_len()` bytes and
    /// `dst` must cover `coded_height` rows of `dst_stride` bytes.
    pub fn luma(
        &self,
        src: &[u8],
        dst: &mut [u8],
        dst_stride: usize,
        coded_width: u32,
        coded_height: u32,
    ) {
        match self.backend {
            ConverterBackend::Scalar => {
                tiling::walk_luma::<ScalarKernel>(src, dst, dst_stride, coded_width, coded_height)
            }
            ConverterBackend::Accelerated => {
                tiling::walk_luma::<SimdKernel>(src, dst, dst_stride, coded_width, coded_height)
            }
        }
    }

    /// Untile the interleaved chroma plane into separate Cb and Cr planes.
    ///
    /// `coded_width` is the luma width; each output row holds
    /// `coded_width / 2` samples.
    pub fn chroma(
        &self,
        src: &[u8],
        dst_cb: &mut [u8],
        dst_cr: &mut [u8],
        dst_stride: usize,
        coded_width: u32,
        chroma_height: u32,
    ) {
        match self.backend {
            ConverterBackend::Scalar => tiling::walk_chroma::<ScalarKernel>(
                src,
                dst_cb,
                dst_cr,
                dst_stride,
                coded_width,
                chroma_height,
            ),
            ConverterBackend::Accelerated => tiling::walk_chroma::<SimdKernel>(
                src,
                dst_cb,
                dst_cr,
                dst_stride,
                coded_width,
                chroma_height,
            ),
        }
    }

    /// Untile the chroma plane keeping Cb/Cr interleaved (NV12 UV plane).
    pub fn interleaved_chroma(
        &self,
        src: &[u8],
        dst: &mut [u8],
        dst_stride: usize,
        coded_width: u32,
        chroma_height: u32,
    ) {
        self.luma(src, dst, dst_stride, coded_width, chroma_height);
    }

    /// Write `picture` into `dst` in the layout `mapping` describes, planes
    /// back to back at [`MappingParameters::plane_offsets`].
    ///
    /// Tiled mappings receive a verbatim copy of the decoder planes.
    pub fn convert(&self, picture: &TiledPicture, mapping: &MappingParameters, dst: &mut [u8]) {
        let dims = mapping.dimensions;
        let offsets = mapping.plane_offsets();
        let (_, ch) = dims.chroma();

        match mapping.pixel_format {
            PixelFormat::Nv12 => {
                let (luma, uv) = dst.split_at_mut(offsets[1]);
                self.luma(
                    picture.luma(),
                    luma,
                    mapping.planes[0].stride as usize,
                    dims.width,
                    dims.height,
                );
                self.interleaved_chroma(
                    picture.chroma(),
                    uv,
                    mapping.planes[1].stride as usize,
                    dims.width,
                    ch,
                );
            }
            PixelFormat::Yuv420p => {
                let (luma, rest) = dst.split_at_mut(offsets[1]);
                let (cb, cr) = rest.split_at_mut(offsets[2] - offsets[1]);
                self.luma(
                    picture.luma(),
                    luma,
                    mapping.planes[0].stride as usize,
                    dims.width,
                    dims.height,
                );
                self.chroma(
                    picture.chroma(),
                    cb,
                    cr,
                    mapping.planes[1].stride as usize,
                    dims.width,
                    ch,
                );
            }
            PixelFormat::Nv12Tiled32 => {
                let planes = [picture.luma(), picture.chroma()];
                for ((plane, offset), src) in mapping.planes.iter().zip(&offsets).zip(planes) {
                    let len = plane.byte_len().min(src.len());
                    dst[*offset..*offset + len].copy_from_slice(&src[..len]);
                }
            }
        }
    }
}

impl Default for PlanarConverter {
    fn default() -> Self {
        Self::new(ConverterBackend::default())
    }
}

/// Tiled plane sizes of a picture of the given aligned size, as byte
/// textures: (luma, interleaved chroma).
pub fn tiled_texture_sizes(dims: AlignedDimensions) -> ((u32, u32), (u32, u32)) {
    let (_, ch) = dims.chroma();
    (
        TileGeometry::luma(dims.width, dims.height).texture_size(),
        TileGeometry::luma(dims.width, ch).texture_size(),
    )
}

/// Mapping parameters of a still-tiled frame of the given aligned size.
pub fn tiled_mapping(dims: AlignedDimensions) -> MappingParameters {
    let (luma, chroma) = tiled_texture_sizes(dims);
    MappingParameters::nv12_tiled(dims, luma, chroma)
}
