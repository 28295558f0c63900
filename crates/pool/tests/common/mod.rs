//! Shared fakes for the pool integration tests.
//!
//! The rendering device is the recording `FakeGl` of `cv-gpu-hal`. The
//! platform fakes here inject hardware failures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cv_common::{
    DisplayEngine, NativeHandle, OwnedPlanes, PictureId, PictureReleaser, PlatformError,
    Resolution, ScalerJob, TiledPicture, TimeCode,
};
use cv_convert::{TileGeometry, TILE_BYTES, TILE_EDGE};
use parking_lot::Mutex;

pub use cv_gpu_hal::testing::FakeGl;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Display engine whose jobs fail like a rejected ioctl.
#[derive(Default)]
pub struct BrokenScaler {
    pub calls: AtomicUsize,
}

impl DisplayEngine for BrokenScaler {
    fn detile(&self, _job: &ScalerJob) -> Result<(), PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PlatformError::Scaler { status: -22 })
    }
}

// ---------------------------------------------------------------------------
// Decoder side
// ---------------------------------------------------------------------------

/// Records every released picture id.
#[derive(Default)]
pub struct ReleaseLog {
    ids: Mutex<Vec<PictureId>>,
}

impl ReleaseLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn released(&self) -> Vec<PictureId> {
        self.ids.lock().clone()
    }
}

impl PictureReleaser for ReleaseLog {
    fn release(&self, id: PictureId) {
        self.ids.lock().push(id);
    }
}

/// Tiled bytes filled with a ramp: byte `i` of the plane is `i * 7 + i / 256`.
pub fn ramp_plane(len: usize) -> Vec<u8> {
    shifted_ramp_plane(len, 0)
}

/// [`ramp_plane`] with `shift` added to every byte.
pub fn shifted_ramp_plane(len: usize, shift: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 7 + i / 256) as u8).wrapping_add(shift))
        .collect()
}

/// Byte at (x, y) of a tiled plane, computed directly from the tile layout.
pub fn untile_at(tiled: &[u8], geo: TileGeometry, x: usize, y: usize) -> u8 {
    let tile = (y / TILE_EDGE) * geo.pairs + x / TILE_EDGE;
    tiled[tile * TILE_BYTES + (y % TILE_EDGE) * TILE_EDGE + x % TILE_EDGE]
}

/// A decoder picture whose planes hold ramps in tiled order.
pub fn ramp_picture(display: Resolution, id: u32) -> TiledPicture {
    ramp_picture_shifted(display, id, 0)
}

/// Like [`ramp_picture`] with every sample shifted by `shift`.
pub fn ramp_picture_shifted(display: Resolution, id: u32, shift: u8) -> TiledPicture {
    let dims = display.aligned();
    let luma = shifted_ramp_plane(TileGeometry::luma(dims.width, dims.height).tiled_len(), shift);
    let chroma = shifted_ramp_plane(
        TileGeometry::luma(dims.width, dims.height / 2).tiled_len(),
        shift,
    );
    let mem = OwnedPlanes::new(luma, chroma).with_phys_addrs(0x4000_0000, 0x4800_0000);
    TiledPicture::new(Arc::new(mem), display, TimeCode::from_millis(40 * id as i64), PictureId(id))
}

/// Like [`ramp_picture`] with an importable native handle.
pub fn native_picture(display: Resolution, id: u32) -> TiledPicture {
    let dims = display.aligned();
    let luma = ramp_plane(TileGeometry::luma(dims.width, dims.height).tiled_len());
    let chroma = ramp_plane(TileGeometry::luma(dims.width, dims.height / 2).tiled_len());
    let chroma_offset = luma.len();
    let mem = OwnedPlanes::new(luma, chroma).with_native_handle(NativeHandle {
        id: 1000 + id as u64,
        luma_offset: 0,
        chroma_offset,
    });
    TiledPicture::new(Arc::new(mem), display, TimeCode::ZERO, PictureId(id))
}
