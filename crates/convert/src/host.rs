//! Persistent CPU buffer for host views.
//!
//! One linear frame is kept per pool. It is converted into on request and
//! handed out behind the cache lock, so concurrent host requests serialize
//! and a view can never observe a half-written frame. The allocation lives
//! as long as the aligned size and layout stay the same; on a change it is
//! replaced, never grown in place.

use std::sync::atomic::{AtomicU64, Ordering};

use cv_common::{AlignedDimensions, HostLayout, MappingParameters, TiledPicture};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::PlanarConverter;

struct HostFrame {
    data: Vec<u8>,
    mapping: MappingParameters,
    /// Sequence number of the buffer whose picture `data` currently holds.
    content: Option<u64>,
}

impl HostFrame {
    fn empty() -> Self {
        Self {
            data: Vec::new(),
            mapping: MappingParameters::nv12(AlignedDimensions {
                width: 0,
                height: 0,
            }),
            content: None,
        }
    }
}

/// Counters of host-path work.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Frames converted into the host buffer.
    pub conversions: u64,
    /// Backing allocations made, including the first.
    pub allocations: u64,
}

pub struct HostMemoryCache {
    converter: PlanarConverter,
    layout: HostLayout,
    frame: Mutex<HostFrame>,
    conversions: AtomicU64,
    allocations: AtomicU64,
}

impl HostMemoryCache {
    pub fn new(converter: PlanarConverter, layout: HostLayout) -> Self {
        Self {
            converter,
            layout,
            frame: Mutex::new(HostFrame::empty()),
            conversions: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
        }
    }

    pub fn layout(&self) -> HostLayout {
        self.layout
    }

    pub fn converter(&self) -> &PlanarConverter {
        &self.converter
    }

    /// Mapping parameters of host views for pictures of size `dims`.
    pub fn mapping_for(&self, dims: AlignedDimensions) -> MappingParameters {
        match self.layout {
            HostLayout::Nv12 => MappingParameters::nv12(dims),
            HostLayout::Yuv420p => MappingParameters::yuv420p(dims),
        }
    }

    /// Linear planes of `picture`.
    ///
    /// `frame_seq` identifies the buffer the picture belongs to; when the
    /// cache already holds that buffer's frame no conversion is done. The
    /// returned view holds the cache lock until dropped.
    pub fn get_host_planes(&self, picture: &TiledPicture, frame_seq: u64) -> HostPlanes<'_> {
        let dims = picture.aligned();
        let mut frame = self.frame.lock();

        if frame.mapping.dimensions != dims || frame.data.is_empty() {
            let mapping = self.mapping_for(dims);
            debug!(
                from = %frame.mapping.dimensions,
                to = %dims,
                layout = ?self.layout,
                bytes = mapping.total_bytes(),
                "Allocating host frame"
            );
            frame.data = vec![0u8; mapping.total_bytes()];
            frame.mapping = mapping;
            frame.content = None;
            self.allocations.fetch_add(1, Ordering::Relaxed);
        }

        if frame.content != Some(frame_seq) {
            let HostFrame { data, mapping, .. } = &mut *frame;
            self.converter.convert(picture, mapping, data);
            frame.content = Some(frame_seq);
            self.conversions.fetch_add(1, Ordering::Relaxed);
        }

        HostPlanes { frame }
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            conversions: self.conversions.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }

    /// Aligned size of the current allocation, if any.
    pub fn dimensions(&self) -> Option<AlignedDimensions> {
        let frame = self.frame.lock();
        (!frame.data.is_empty()).then_some(frame.mapping.dimensions)
    }
}

/// Locked view of the host frame.
pub struct HostPlanes<'a> {
    frame: MutexGuard<'a, HostFrame>,
}

impl HostPlanes<'_> {
    pub fn mapping(&self) -> &MappingParameters {
        &self.frame.mapping
    }

    /// Bytes of plane `index`, `stride * height` long.
    pub fn plane(&self, index: usize) -> &[u8] {
        let offset = self.frame.mapping.plane_offsets()[index];
        let len = self.frame.mapping.planes[index].byte_len();
        &self.frame.data[offset..offset + len]
    }

    pub fn plane_count(&self) -> usize {
        self.frame.mapping.planes.len()
    }

    /// The whole frame, planes back to back.
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame.data
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.frame.data.as_ptr()
    }

    /// Sequence number of the buffer this view shows.
    pub fn frame_seq(&self) -> Option<u64> {
        self.frame.content
    }
}

impl std::fmt::Debug for HostPlanes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPlanes")
            .field("mapping", &self.frame.mapping)
            .field("frame_seq", &self.frame.content)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiling::tile_plane;
    use cv_common::{ConverterBackend, PictureId, PixelFormat, Resolution, TimeCode};

    fn picture(display: Resolution, fill: u8) -> TiledPicture {
        let dims = display.aligned();
        let (w, h) = (dims.width as usize, dims.height as usize);
        let luma = vec![fill; w * h];
        let chroma = vec![fill.wrapping_add(1); w * h / 2];
        TiledPicture::from_planes(
            tile_plane(&luma, w, dims.width, dims.height),
            tile_plane(&chroma, w, dims.width, dims.height / 2),
            display,
            TimeCode::ZERO,
            PictureId(0),
        )
    }

    fn cache(layout: HostLayout) -> HostMemoryCache {
        HostMemoryCache::new(PlanarConverter::new(ConverterBackend::Accelerated), layout)
    }

    // ── Allocation ───────────────────────────────────────────────

    #[test]
    fn allocation_is_stable_for_same_size() {
        let cache = cache(HostLayout::Nv12);
        let first = picture(Resolution::new(320, 240), 10);
        let second = picture(Resolution::new(320, 240), 20);

        let ptr_a = cache.get_host_planes(&first, 1).as_ptr();
        let planes = cache.get_host_planes(&second, 2);
        assert_eq!(planes.as_ptr(), ptr_a);
        assert_eq!(planes.plane(0)[0], 20);
        drop(planes);

        assert_eq!(cache.stats(), HostStats { conversions: 2, allocations: 1 });
    }

    #[test]
    fn size_change_replaces_allocation() {
        let cache = cache(HostLayout::Nv12);
        cache.get_host_planes(&picture(Resolution::new(320, 240), 1), 1);
        let planes = cache.get_host_planes(&picture(Resolution::new(640, 480), 2), 2);
        assert_eq!(planes.as_bytes().len(), 640 * 480 * 3 / 2);
        drop(planes);
        assert_eq!(cache.stats().allocations, 2);
        assert_eq!(cache.dimensions(), Some(AlignedDimensions { width: 640, height: 480 }));
    }

    #[test]
    fn repeated_request_skips_conversion() {
        let cache = cache(HostLayout::Nv12);
        let pic = picture(Resolution::new(64, 64), 5);
        drop(cache.get_host_planes(&pic, 9));
        let again = cache.get_host_planes(&pic, 9);
        assert_eq!(again.frame_seq(), Some(9));
        drop(again);
        assert_eq!(cache.stats().conversions, 1);
    }

    // ── Layouts ──────────────────────────────────────────────────

    #[test]
    fn nv12_view_has_two_planes_at_luma_stride() {
        let cache = cache(HostLayout::Nv12);
        let planes = cache.get_host_planes(&picture(Resolution::new(176, 144), 7), 0);
        assert_eq!(planes.plane_count(), 2);
        assert_eq!(planes.mapping().planes[1].stride, 176);
        assert!(planes.plane(0).iter().all(|&v| v == 7));
        assert!(planes.plane(1).iter().all(|&v| v == 8));
    }

    #[test]
    fn planar_view_has_three_planes() {
        let cache = cache(HostLayout::Yuv420p);
        let planes = cache.get_host_planes(&picture(Resolution::new(176, 144), 7), 0);
        assert_eq!(planes.mapping().pixel_format, PixelFormat::Yuv420p);
        assert_eq!(planes.plane_count(), 3);
        assert_eq!(planes.plane(1).len(), 88 * 72);
        // Interleaved chroma was uniformly 8, so both components are 8.
        assert!(planes.plane(1).iter().chain(planes.plane(2)).all(|&v| v == 8));
    }

    #[test]
    fn empty_cache_reports_no_dimensions() {
        assert_eq!(cache(HostLayout::Nv12).dimensions(), None);
    }
}
