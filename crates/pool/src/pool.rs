//! Buffer pool: wraps decoder pictures and serves host and texture views.
//!
//! The `BufferPool` is the entry point the decoder glue talks to. Every
//! picture the decoder hands out is wrapped in a [`PooledBuffer`]; consumers
//! ask the buffer for a linear CPU view or for textures in their current
//! rendering context. The pool owns everything those views share: the tile
//! converter, the persistent host frame, the per-context GPU resources and
//! the import strategy chain.
//!
//! Configuration is interpreted once, at construction.
//!
//! # Teardown order
//!
//! Every `PooledBuffer` must be dropped before the decoder instance that
//! produced its picture is torn down: the last drop calls back into the
//! decoder to release the picture slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cv_common::{
    ContextId, DecodeError, GlDevice, PictureReleaser, PoolConfig, ReleaseToken, TiledPicture,
    TransferResult,
};
use cv_convert::{HostMemoryCache, HostPlanes, PlanarConverter};
use cv_gpu_hal::{GpuResourceCache, ImportStrategy, Importer, Platform, TextureView};
use tracing::{debug, info};

use crate::buffer::PooledBuffer;

/// Highest display-request status that still carries a picture.
const DISPLAY_REQUEST_MAX_OK: i32 = 3;

/// Statistics about the current state of the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Pictures wrapped since pool creation.
    pub wrapped: u64,
    /// Pictures returned to the decoder.
    pub released: u64,
    /// Buffers still alive (`wrapped - released`).
    pub live: u64,
    /// Frames converted into the host buffer.
    pub host_conversions: u64,
    /// Host buffer allocations, including the first.
    pub host_allocations: u64,
    /// Successful texture imports.
    pub gpu_imports: u64,
    /// Permanent import strategy downgrades.
    pub downgrades: u64,
    /// Import strategy currently in use.
    pub active_strategy: ImportStrategy,
    /// Rendering contexts holding resources.
    pub contexts: usize,
}

/// State shared by the pool and all of its buffers.
pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    pub(crate) host: HostMemoryCache,
    pub(crate) gpu: GpuResourceCache,
    pub(crate) importer: Importer,
    pub(crate) next_seq: AtomicU64,
    pub(crate) wrapped: AtomicU64,
    pub(crate) released: AtomicU64,
}

/// Wraps decoder pictures into reference-counted buffers.
///
/// # Thread safety
///
/// The pool is `Send + Sync`. Host views may be requested from any thread
/// and serialize on the host frame lock. Texture views must be requested on
/// the thread owning the context current on the passed device.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool without platform shared memory or display engine.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_platform(config, Platform::none())
    }

    /// Create a pool configured from the process environment. Callers
    /// with platform services use
    /// `with_platform(PoolConfig::from_env(), platform)`.
    pub fn from_env() -> Self {
        Self::new(PoolConfig::from_env())
    }

    pub fn with_platform(config: PoolConfig, platform: Platform) -> Self {
        let converter = PlanarConverter::new(config.converter);
        let host = HostMemoryCache::new(converter, config.host_layout);
        let gpu = GpuResourceCache::new(platform.shared_memory.clone());
        let importer = Importer::new(&config, platform, converter);

        info!(
            converter = ?converter.backend(),
            host_layout = ?config.host_layout,
            strategy = %importer.chain().active(),
            platform = ?importer.platform(),
            "Buffer pool created"
        );

        Self {
            shared: Arc::new(PoolShared {
                config,
                host,
                gpu,
                importer,
                next_seq: AtomicU64::new(0),
                wrapped: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Wrap a decoded picture. `token` fires when the last clone of the
    /// returned buffer drops.
    pub fn wrap(&self, picture: TiledPicture, token: ReleaseToken) -> PooledBuffer {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        self.shared.wrapped.fetch_add(1, Ordering::Relaxed);
        debug!(
            seq,
            pic = %picture.id(),
            display = %picture.display(),
            pts = %picture.timestamp(),
            "Wrapped picture"
        );
        PooledBuffer::new(seq, picture, token, Arc::clone(&self.shared))
    }

    /// Handle the result of a decoder display request.
    ///
    /// Statuses outside `0..=3` mean no picture is available; `picture` is
    /// dropped without being wrapped or released.
    pub fn accept_display_request(
        &self,
        status: i32,
        picture: TiledPicture,
        releaser: Arc<dyn PictureReleaser>,
    ) -> Result<PooledBuffer, DecodeError> {
        if !(0..=DISPLAY_REQUEST_MAX_OK).contains(&status) {
            debug!(status, pic = %picture.id(), "Display request failed");
            return Err(DecodeError::DisplayRequest { status });
        }
        let token = ReleaseToken::new(picture.id(), releaser);
        Ok(self.wrap(picture, token))
    }

    /// Linear CPU view of `buffer`.
    pub fn to_host_memory<'a>(&self, buffer: &'a PooledBuffer) -> HostPlanes<'a> {
        debug_assert!(buffer.belongs_to(&self.shared), "buffer from another pool");
        buffer.to_host_memory()
    }

    /// Textures holding `buffer` in the context current on `gl`.
    pub fn to_texture(&self, buffer: &PooledBuffer, gl: &dyn GlDevice) -> TransferResult<TextureView> {
        debug_assert!(buffer.belongs_to(&self.shared), "buffer from another pool");
        buffer.to_texture(gl)
    }

    /// Contexts currently holding resources.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.shared.gpu.contexts()
    }

    /// Return current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let s = &self.shared;
        let wrapped = s.wrapped.load(Ordering::Relaxed);
        let released = s.released.load(Ordering::Relaxed);
        let host = s.host.stats();
        PoolStats {
            wrapped,
            released,
            live: wrapped.saturating_sub(released),
            host_conversions: host.conversions,
            host_allocations: host.allocations,
            gpu_imports: s.importer.imports(),
            downgrades: s.importer.chain().downgrades(),
            active_strategy: s.importer.chain().active(),
            contexts: s.gpu.contexts().len(),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("BufferPool")
            .field("live", &stats.live)
            .field("strategy", &stats.active_strategy)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
