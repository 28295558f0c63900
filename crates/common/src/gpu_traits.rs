//! Collaborator interfaces for the rendering API and platform memory.
//!
//! The bridge never talks to GL/EGL, the shared-memory driver or the display
//! engine directly. The embedding application implements these traits for
//! its platform; everything above them is platform-independent.
//!
//! # Threading
//!
//! [`GlDevice`] is deliberately neither `Send` nor `Sync`: rendering handles
//! are affine to the thread that owns the current context, and all GPU-path
//! calls must happen there. [`SharedMemory`] and [`DisplayEngine`] are shared
//! process-wide and must be thread-safe.

use std::fmt;
use std::ptr::NonNull;

use crate::color::PlaneFormat;
use crate::error::{GpuError, PlatformError};
use crate::types::{AlignedDimensions, ContextId, ImageHandle, Resolution, TextureId};

/// Callback run once when a rendering context is destroyed.
///
/// The device passed in is the one owning the dying context; resources of
/// that context can still be deleted through it.
pub type ContextDestroyHook = Box<dyn FnOnce(&dyn GlDevice) + Send + 'static>;

/// Description of a plane to import from shared memory as a platform image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageImport {
    /// Shared-memory handle id.
    pub handle: u64,
    /// Byte offset of the plane within the handle.
    pub offset: usize,
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    pub format: PlaneFormat,
}

/// Rendering-API operations used by the texture paths.
pub trait GlDevice {
    /// Identity of the context current on the calling thread.
    fn current_context(&self) -> Option<ContextId>;

    /// Register `hook` to run when `ctx` is destroyed.
    fn on_context_destroyed(&self, ctx: ContextId, hook: ContextDestroyHook);

    /// Create a 2D texture with uninitialised storage.
    fn create_texture(
        &self,
        format: PlaneFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError>;

    /// Replace the `width` x `height` sub-region at the origin.
    /// `stride` is the source row pitch in bytes.
    fn update_texture(
        &self,
        texture: TextureId,
        format: PlaneFormat,
        width: u32,
        height: u32,
        stride: u32,
        data: &[u8],
    ) -> Result<(), GpuError>;

    fn delete_texture(&self, texture: TextureId);

    /// Import a shared-memory plane as a platform image.
    fn import_image(&self, desc: &ImageImport) -> Result<ImageHandle, GpuError>;

    /// Use `image` as the storage of `texture`.
    fn bind_image(&self, texture: TextureId, image: ImageHandle) -> Result<(), GpuError>;

    fn destroy_image(&self, image: ImageHandle);
}

/// A CPU-mapped allocation in platform shared memory.
pub struct SharedBlock {
    handle: u64,
    phys_addr: u64,
    ptr: NonNull<u8>,
    len: usize,
}

impl SharedBlock {
    /// Wrap a mapped allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// block is handed back to [`SharedMemory::free`], and no other CPU
    /// mapping may write the region concurrently.
    pub unsafe fn from_raw(handle: u64, phys_addr: u64, ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            handle,
            phys_addr,
            ptr,
            len,
        }
    }

    /// Platform handle used for image import.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Physical address used by display-engine jobs.
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: validity for `len` bytes is the constructor's contract.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` gives exclusive CPU access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

// SAFETY: the block is a plain mapping; exclusive access is mediated by
// `&mut self` and the owning resource bundle.
unsafe impl Send for SharedBlock {}
unsafe impl Sync for SharedBlock {}

impl fmt::Debug for SharedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBlock")
            .field("handle", &self.handle)
            .field("phys_addr", &format_args!("{:#x}", self.phys_addr))
            .field("len", &self.len)
            .finish()
    }
}

/// Platform shared-memory allocator (UMP, ION, dma-heap, ...).
pub trait SharedMemory: Send + Sync {
    fn allocate(&self, len: usize) -> Result<SharedBlock, PlatformError>;

    fn free(&self, block: SharedBlock);
}

/// One tile-to-linear job for the display engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScalerJob {
    pub src_luma_phys: u64,
    pub src_chroma_phys: u64,
    pub dimensions: AlignedDimensions,
    /// Visible size, used as the engine's crop window.
    pub display: Resolution,
    pub dst_phys: u64,
    /// Offset of the interleaved chroma plane in the destination.
    pub dst_chroma_offset: usize,
    /// Destination row pitch in bytes (both planes).
    pub dst_stride: u32,
}

/// Display-engine detiling accelerator.
pub trait DisplayEngine: Send + Sync {
    /// Convert a tiled picture into linear NV12 at the job's destination.
    /// Blocks until the hardware has finished.
    fn detile(&self, job: &ScalerJob) -> Result<(), PlatformError>;
}
