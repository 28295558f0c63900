//! Pixel and plane formats exposed to consumers.

use serde::{Deserialize, Serialize};

/// Layout of a converted (or still tiled) frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane + interleaved UV at half resolution.
    Nv12,
    /// Y, Cb and Cr in three separate planes (4:2:0).
    Yuv420p,
    /// Decoder-native layout: NV12 planes stored as 32x32 column-major tiles.
    /// Consumers must detile in their shader.
    Nv12Tiled32,
}

impl PixelFormat {
    pub fn plane_count(self) -> usize {
        match self {
            Self::Nv12 | Self::Nv12Tiled32 => 2,
            Self::Yuv420p => 3,
        }
    }

    pub fn is_tiled(self) -> bool {
        matches!(self, Self::Nv12Tiled32)
    }
}

/// Per-plane texel format used for textures and image imports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneFormat {
    /// One byte per texel (luma, or a single chroma component).
    R8,
    /// Two bytes per texel (interleaved Cb/Cr).
    Rg8,
}

impl PlaneFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_counts() {
        assert_eq!(PixelFormat::Nv12.plane_count(), 2);
        assert_eq!(PixelFormat::Yuv420p.plane_count(), 3);
        assert!(PixelFormat::Nv12Tiled32.is_tiled());
        assert!(!PixelFormat::Nv12.is_tiled());
        assert_eq!(PlaneFormat::Rg8.bytes_per_texel(), 2);
    }
}
