//! Core types with newtype pattern for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal alignment of decoded pictures (one macroblock).
pub const MB_ALIGN_WIDTH: u32 = 16;
/// Vertical alignment applied by the decoder to the display height.
pub const FIELD_ALIGN_HEIGHT: u32 = 8;
/// Final vertical alignment (even rows for 4:2:0 chroma).
pub const CHROMA_ALIGN_HEIGHT: u32 = 2;

/// Round `value` up to a multiple of `align` (power of two).
#[inline]
pub const fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// Time code in seconds (f64 precision).
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimeCode(pub f64);

impl TimeCode {
    pub const ZERO: Self = Self(0.0);

    /// The decoder reports presentation times in milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis as f64 / 1000.0)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Visible picture size as reported by the decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Self = Self {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Storage size rounded to hardware block granularity.
    pub fn aligned(self) -> AlignedDimensions {
        AlignedDimensions::from_display(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Display size rounded up to the decoder's block granularity.
///
/// Every buffer and texture downstream of the decoder is sized from this,
/// never from the display size.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlignedDimensions {
    pub width: u32,
    pub height: u32,
}

impl AlignedDimensions {
    /// Width is rounded to 16; height to 8 and then to 2.
    pub fn from_display(display_width: u32, display_height: u32) -> Self {
        let height = align_up(
            align_up(display_height, FIELD_ALIGN_HEIGHT),
            CHROMA_ALIGN_HEIGHT,
        );
        Self {
            width: align_up(display_width, MB_ALIGN_WIDTH),
            height,
        }
    }

    /// Size of the half-resolution chroma plane in samples.
    pub fn chroma(self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

impl fmt::Display for AlignedDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Hardware picture slot id handed back to the decoder on release.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PictureId(pub u32);

impl fmt::Display for PictureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pic#{}", self.0)
    }
}

/// Identity of a rendering context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{:#x}", self.0)
    }
}

/// Texture name inside a rendering context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Platform image handle (EGLImage or equivalent) imported from shared memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(1081, 8), 1088);
    }

    #[test]
    fn hd_is_already_aligned() {
        let dims = Resolution::HD.aligned();
        assert_eq!(dims, AlignedDimensions { width: 1920, height: 1080 });
        assert_eq!(dims.chroma(), (960, 540));
    }

    #[test]
    fn odd_display_sizes_round_up() {
        let dims = AlignedDimensions::from_display(854, 481);
        assert_eq!(dims.width, 864);
        assert_eq!(dims.height, 488);
    }

    #[test]
    fn timecode_from_decoder_millis() {
        let tc = TimeCode::from_millis(1500);
        assert!((tc.as_secs() - 1.5).abs() < 1e-9);
        assert_eq!(tc.to_string(), "1.500s");
    }
}
