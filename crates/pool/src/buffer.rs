//! Reference-counted decoded frame.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use cv_common::{ContextId, GlDevice, ReleaseToken, TiledPicture, TransferResult};
use cv_convert::HostPlanes;
use cv_gpu_hal::TextureView;
use parking_lot::Mutex;
use tracing::trace;

use crate::pool::PoolShared;

pub(crate) struct BufferInner {
    seq: u64,
    picture: TiledPicture,
    /// Dropped together with the last handle; dropping it returns the slot.
    _token: ReleaseToken,
    views: Mutex<HashMap<ContextId, TextureView>>,
    pool: Arc<PoolShared>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.pool.released.fetch_add(1, Ordering::Relaxed);
        trace!(seq = self.seq, pic = %self.picture.id(), "Returning picture to decoder");
    }
}

/// Shared handle to one decoded picture.
///
/// Clones share the picture. When the last clone drops the picture slot is
/// released to the decoder, exactly once, regardless of which views were
/// requested.
#[derive(Clone)]
pub struct PooledBuffer {
    inner: Arc<BufferInner>,
}

impl PooledBuffer {
    pub(crate) fn new(
        seq: u64,
        picture: TiledPicture,
        token: ReleaseToken,
        pool: Arc<PoolShared>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                seq,
                picture,
                _token: token,
                views: Mutex::new(HashMap::new()),
                pool,
            }),
        }
    }

    pub fn picture(&self) -> &TiledPicture {
        &self.inner.picture
    }

    /// Pool-unique sequence number.
    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    /// Linear CPU view. Held views block other host requests of the pool
    /// but not texture requests.
    pub fn to_host_memory(&self) -> HostPlanes<'_> {
        self.inner
            .pool
            .host
            .get_host_planes(&self.inner.picture, self.inner.seq)
    }

    /// Textures in the context current on `gl`. A second request in the
    /// same context returns the view made by the first, as long as no other
    /// buffer has been delivered into the same textures since.
    pub fn to_texture(&self, gl: &dyn GlDevice) -> TransferResult<TextureView> {
        let pool = &self.inner.pool;
        let ctx = pool.gpu.bind(gl)?;

        if let Some(view) = self.inner.views.lock().get(&ctx).cloned() {
            let current = pool
                .gpu
                .with_resources(ctx, |res| res.shows_frame(&view.textures, self.inner.seq))
                .unwrap_or(false);
            if current {
                return Ok(view);
            }
        }

        let view = pool
            .importer
            .import_frame(&self.inner.picture, self.inner.seq, gl, &pool.gpu)?;
        self.inner.views.lock().insert(ctx, view.clone());
        Ok(view)
    }

    /// Number of handles sharing this picture.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<PoolShared>) -> bool {
        Arc::ptr_eq(&self.inner.pool, pool)
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("seq", &self.inner.seq)
            .field("picture", &self.inner.picture)
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}
