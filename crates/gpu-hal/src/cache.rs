//! Per-context resource map.
//!
//! Rendering handles are only valid in the context that created them, so
//! everything the texture paths create is stored under the [`ContextId`]
//! current at the time. Entries are removed by a destruction hook the cache
//! registers with the device the first time it sees a context; the cache
//! never frees resources of a context on its own.
//!
//! A context that disappears without its hook firing is indistinguishable
//! from a switch to another context. Its entry stays in the map until the
//! hook runs.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use cv_common::{ContextId, GlDevice, SharedMemory, TransferError, TransferResult};
use parking_lot::Mutex;
use tracing::debug;

use crate::resources::ContextResources;

type ResourceMap = Mutex<HashMap<ContextId, ContextResources>>;

pub struct GpuResourceCache {
    map: Arc<ResourceMap>,
    current: Mutex<Option<ContextId>>,
    shm: Option<Arc<dyn SharedMemory>>,
}

impl GpuResourceCache {
    /// `shm` is used to allocate shared import targets and to return them
    /// when a context is torn down.
    pub fn new(shm: Option<Arc<dyn SharedMemory>>) -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
            current: Mutex::new(None),
            shm,
        }
    }

    /// Make the context current on `gl` the active key, creating its entry
    /// and registering the teardown hook on first sight.
    pub fn bind(&self, gl: &dyn GlDevice) -> TransferResult<ContextId> {
        let ctx = gl.current_context().ok_or(TransferError::NoCurrentContext)?;

        {
            let mut current = self.current.lock();
            if *current != Some(ctx) {
                match *current {
                    Some(prev) => debug!(from = %prev, to = %ctx, "Rendering context changed"),
                    None => debug!(ctx = %ctx, "Rendering context bound"),
                }
                *current = Some(ctx);
            }
        }

        let inserted = {
            let mut map = self.map.lock();
            if map.contains_key(&ctx) {
                false
            } else {
                map.insert(ctx, ContextResources::default());
                true
            }
        };
        if inserted {
            gl.on_context_destroyed(ctx, self.teardown_hook(ctx));
            debug!(ctx = %ctx, "Registered context teardown");
        }
        Ok(ctx)
    }

    fn teardown_hook(&self, ctx: ContextId) -> cv_common::ContextDestroyHook {
        let map: Weak<ResourceMap> = Arc::downgrade(&self.map);
        let shm = self.shm.clone();
        Box::new(move |gl: &dyn GlDevice| {
            let Some(map) = map.upgrade() else {
                return;
            };
            let removed = map.lock().remove(&ctx);
            if let Some(resources) = removed {
                debug!(ctx = %ctx, textures = resources.texture_ids().len(), "Releasing context resources");
                resources.release(gl, shm.as_deref());
            }
        })
    }

    /// Run `f` on the resources of `ctx`. `None` if the context has no
    /// entry (never bound, or already torn down).
    pub fn with_resources<R>(
        &self,
        ctx: ContextId,
        f: impl FnOnce(&mut ContextResources) -> R,
    ) -> Option<R> {
        let mut map = self.map.lock();
        map.get_mut(&ctx).map(f)
    }

    /// Contexts that currently hold resources, in id order.
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.map.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// The context of the most recent [`bind`](Self::bind).
    pub fn current(&self) -> Option<ContextId> {
        *self.current.lock()
    }

    pub fn shared_memory(&self) -> Option<&dyn SharedMemory> {
        self.shm.as_deref()
    }
}
