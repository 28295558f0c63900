//! Plane geometry reported to consumers alongside every host or texture view.

use serde::{Deserialize, Serialize};

use crate::color::{PixelFormat, PlaneFormat};
use crate::types::AlignedDimensions;

/// Geometry of one plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneMapping {
    /// Width in texels.
    pub width: u32,
    /// Height in rows.
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    pub format: PlaneFormat,
}

impl PlaneMapping {
    /// Bytes covered by this plane (`stride * height`).
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Bytes of visible data in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_texel() as usize
    }
}

/// Mapping parameters for a whole frame.
///
/// Computed once per (aligned dimensions, target kind) and stored with the
/// resource it describes, so steady-state frames only clone it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingParameters {
    pub pixel_format: PixelFormat,
    /// Aligned size of the picture the planes were derived from.
    pub dimensions: AlignedDimensions,
    pub planes: Vec<PlaneMapping>,
}

impl MappingParameters {
    /// Semi-planar layout: Y at full size, interleaved CbCr at half size.
    /// Both planes share the luma stride.
    pub fn nv12(dims: AlignedDimensions) -> Self {
        let (cw, ch) = dims.chroma();
        Self {
            pixel_format: PixelFormat::Nv12,
            dimensions: dims,
            planes: vec![
                PlaneMapping {
                    width: dims.width,
                    height: dims.height,
                    stride: dims.width,
                    format: PlaneFormat::R8,
                },
                PlaneMapping {
                    width: cw,
                    height: ch,
                    stride: dims.width,
                    format: PlaneFormat::Rg8,
                },
            ],
        }
    }

    /// Fully planar layout with separate Cb and Cr planes.
    pub fn yuv420p(dims: AlignedDimensions) -> Self {
        let (cw, ch) = dims.chroma();
        let chroma = PlaneMapping {
            width: cw,
            height: ch,
            stride: cw,
            format: PlaneFormat::R8,
        };
        Self {
            pixel_format: PixelFormat::Yuv420p,
            dimensions: dims,
            planes: vec![
                PlaneMapping {
                    width: dims.width,
                    height: dims.height,
                    stride: dims.width,
                    format: PlaneFormat::R8,
                },
                chroma,
                chroma,
            ],
        }
    }

    /// Still-tiled planes, viewed as byte textures of the given sizes.
    pub fn nv12_tiled(dims: AlignedDimensions, luma: (u32, u32), chroma: (u32, u32)) -> Self {
        let plane = |(width, height): (u32, u32)| PlaneMapping {
            width,
            height,
            stride: width,
            format: PlaneFormat::R8,
        };
        Self {
            pixel_format: PixelFormat::Nv12Tiled32,
            dimensions: dims,
            planes: vec![plane(luma), plane(chroma)],
        }
    }

    /// Total bytes of all planes laid out back to back.
    pub fn total_bytes(&self) -> usize {
        self.planes.iter().map(PlaneMapping::byte_len).sum()
    }

    /// Byte offset of each plane when laid out back to back.
    pub fn plane_offsets(&self) -> Vec<usize> {
        self.planes
            .iter()
            .scan(0usize, |offset, plane| {
                let start = *offset;
                *offset += plane.byte_len();
                Some(start)
            })
            .collect()
    }

    pub fn is_tiled(&self) -> bool {
        self.pixel_format.is_tiled()
    }
}
