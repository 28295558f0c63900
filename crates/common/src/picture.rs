//! Decoder-owned tiled pictures and the token that hands them back.
//!
//! A [`TiledPicture`] describes one decoded frame still sitting in the
//! decoder's private memory: a luma plane and an interleaved chroma plane,
//! both stored as 32x32 column-major tiles. The bytes are reached through
//! the [`PictureMemory`] trait so the decoder glue decides how they are
//! mapped (raw pointers into the hardware pool, or owned vectors in tests).
//!
//! The picture slot is returned to the decoder through a [`ReleaseToken`]:
//! a single-owner value carrying the slot id and the releaser. Dropping the
//! token performs the release, so ownership alone guarantees it runs once.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::types::{AlignedDimensions, PictureId, Resolution, TimeCode};

/// Plane index of the luma plane.
pub const LUMA_PLANE: usize = 0;
/// Plane index of the interleaved chroma plane.
pub const CHROMA_PLANE: usize = 1;

/// Platform shared-memory handle that backs a picture natively.
///
/// When the decoder allocates its picture pool from importable memory the
/// consumer can map the still-tiled planes without any copy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NativeHandle {
    /// Platform handle id (secure id / exported buffer name).
    pub id: u64,
    /// Byte offset of the luma plane within the handle.
    pub luma_offset: usize,
    /// Byte offset of the chroma plane within the handle.
    pub chroma_offset: usize,
}

/// Access to the bytes of a decoded picture.
pub trait PictureMemory: Send + Sync {
    /// Borrow plane `index` ([`LUMA_PLANE`] or [`CHROMA_PLANE`]).
    fn plane(&self, index: usize) -> &[u8];

    /// Physical address of plane `index`, needed by the display engine.
    fn phys_addr(&self, _index: usize) -> Option<u64> {
        None
    }

    /// Native shared-memory handle, if the picture pool is importable.
    fn native_handle(&self) -> Option<NativeHandle> {
        None
    }
}

/// Heap-owned planes. Used by tests and by decoders that copy out.
#[derive(Clone, Debug, Default)]
pub struct OwnedPlanes {
    planes: [Vec<u8>; 2],
    phys: Option<[u64; 2]>,
    native: Option<NativeHandle>,
}

impl OwnedPlanes {
    pub fn new(luma: Vec<u8>, chroma: Vec<u8>) -> Self {
        Self {
            planes: [luma, chroma],
            phys: None,
            native: None,
        }
    }

    /// Attach physical addresses for display-engine jobs.
    pub fn with_phys_addrs(mut self, luma: u64, chroma: u64) -> Self {
        self.phys = Some([luma, chroma]);
        self
    }

    /// Attach a native shared-memory handle.
    pub fn with_native_handle(mut self, handle: NativeHandle) -> Self {
        self.native = Some(handle);
        self
    }
}

impl PictureMemory for OwnedPlanes {
    fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index]
    }

    fn phys_addr(&self, index: usize) -> Option<u64> {
        self.phys.map(|p| p[index])
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        self.native
    }
}

/// Planes mapped from the decoder's picture pool through raw pointers.
#[derive(Debug)]
pub struct MappedPlanes {
    ptrs: [NonNull<u8>; 2],
    lens: [usize; 2],
    phys: Option<[u64; 2]>,
}

impl MappedPlanes {
    /// Wrap raw plane pointers.
    ///
    /// # Safety
    ///
    /// Each pointer must be valid for reads of its length, and the memory
    /// must stay mapped and unmodified until the picture's release token
    /// has been dropped.
    pub unsafe fn new(
        luma: NonNull<u8>,
        luma_len: usize,
        chroma: NonNull<u8>,
        chroma_len: usize,
        phys: Option<[u64; 2]>,
    ) -> Self {
        Self {
            ptrs: [luma, chroma],
            lens: [luma_len, chroma_len],
            phys,
        }
    }
}

// SAFETY: the mapping is read-only and owned by the decoder until the
// release token fires; nothing here mutates through the pointers.
unsafe impl Send for MappedPlanes {}
unsafe impl Sync for MappedPlanes {}

impl PictureMemory for MappedPlanes {
    fn plane(&self, index: usize) -> &[u8] {
        // SAFETY: validity for `lens[index]` bytes is the constructor's contract.
        unsafe { std::slice::from_raw_parts(self.ptrs[index].as_ptr(), self.lens[index]) }
    }

    fn phys_addr(&self, index: usize) -> Option<u64> {
        self.phys.map(|p| p[index])
    }
}

/// One decoded picture in the hardware's tiled layout.
pub struct TiledPicture {
    memory: Arc<dyn PictureMemory>,
    display: Resolution,
    timestamp: TimeCode,
    id: PictureId,
}

impl TiledPicture {
    pub fn new(
        memory: Arc<dyn PictureMemory>,
        display: Resolution,
        timestamp: TimeCode,
        id: PictureId,
    ) -> Self {
        Self {
            memory,
            display,
            timestamp,
            id,
        }
    }

    /// Build a picture from owned plane vectors.
    pub fn from_planes(
        luma: Vec<u8>,
        chroma: Vec<u8>,
        display: Resolution,
        timestamp: TimeCode,
        id: PictureId,
    ) -> Self {
        Self::new(
            Arc::new(OwnedPlanes::new(luma, chroma)),
            display,
            timestamp,
            id,
        )
    }

    pub fn luma(&self) -> &[u8] {
        self.memory.plane(LUMA_PLANE)
    }

    pub fn chroma(&self) -> &[u8] {
        self.memory.plane(CHROMA_PLANE)
    }

    pub fn memory(&self) -> &dyn PictureMemory {
        self.memory.as_ref()
    }

    pub fn display(&self) -> Resolution {
        self.display
    }

    /// Storage size every downstream buffer is derived from.
    pub fn aligned(&self) -> AlignedDimensions {
        self.display.aligned()
    }

    pub fn timestamp(&self) -> TimeCode {
        self.timestamp
    }

    pub fn id(&self) -> PictureId {
        self.id
    }
}

impl fmt::Debug for TiledPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledPicture")
            .field("id", &self.id)
            .field("display", &self.display)
            .field("timestamp", &self.timestamp)
            .field("luma_len", &self.luma().len())
            .field("chroma_len", &self.chroma().len())
            .finish()
    }
}

/// The decoder side of picture recycling.
pub trait PictureReleaser: Send + Sync {
    /// Return slot `id` to the decoder's picture pool.
    fn release(&self, id: PictureId);
}

/// Single-owner token that returns a picture slot to the decoder.
///
/// The release happens when the token is dropped (or consumed through
/// [`ReleaseToken::release`]), so it can run at most once.
pub struct ReleaseToken {
    id: PictureId,
    releaser: Option<Arc<dyn PictureReleaser>>,
}

impl ReleaseToken {
    pub fn new(id: PictureId, releaser: Arc<dyn PictureReleaser>) -> Self {
        Self {
            id,
            releaser: Some(releaser),
        }
    }

    pub fn id(&self) -> PictureId {
        self.id
    }

    /// Release the slot now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ReleaseToken {
    fn drop(&mut self) {
        if let Some(releaser) = self.releaser.take() {
            releaser.release(self.id);
        }
    }
}

impl fmt::Debug for ReleaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseToken")
            .field("id", &self.id)
            .field("pending", &self.releaser.is_some())
            .finish()
    }
}
