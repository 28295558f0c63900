//! Heap-backed [`SharedMemory`].
//!
//! Stands in for a platform allocator where "shared" memory is ordinary
//! process memory (software rendering stacks, development hosts). Handles
//! are sequential ids and the reported physical address is the mapping
//! address, so display-engine jobs cannot target it meaningfully.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use cv_common::{PlatformError, SharedBlock, SharedMemory};
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct HeapSharedMemory {
    next_handle: AtomicU64,
    /// Live allocations: handle -> length.
    live: Mutex<HashMap<u64, usize>>,
    /// Upper bound on live bytes, if any.
    limit: Option<usize>,
}

impl HeapSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse allocations that would push live bytes past `bytes`.
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            ..Self::default()
        }
    }

    pub fn live_blocks(&self) -> usize {
        self.live.lock().len()
    }

    pub fn live_bytes(&self) -> usize {
        self.live.lock().values().sum()
    }
}

impl SharedMemory for HeapSharedMemory {
    fn allocate(&self, len: usize) -> Result<SharedBlock, PlatformError> {
        let mut live = self.live.lock();
        if let Some(limit) = self.limit {
            let used: usize = live.values().sum();
            if used + len > limit {
                return Err(PlatformError::SharedAlloc { size: len });
            }
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        let buf: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(buf) as *mut u8;
        let ptr = NonNull::new(raw).ok_or(PlatformError::SharedAlloc { size: len })?;
        live.insert(handle, len);
        debug!(handle, len, "Allocated heap shared block");

        // SAFETY: `ptr` comes from a leaked boxed slice of `len` bytes that
        // is only reclaimed in `free`.
        Ok(unsafe { SharedBlock::from_raw(handle, ptr.as_ptr() as u64, ptr, len) })
    }

    fn free(&self, block: SharedBlock) {
        let known = self.live.lock().remove(&block.handle());
        match known {
            Some(len) if len == block.len() => {
                // SAFETY: the block was produced by `allocate` above with the
                // same pointer and length, and is freed exactly once because
                // its handle has just been removed from the live set.
                unsafe {
                    let slice = std::ptr::slice_from_raw_parts_mut(block.as_ptr(), len);
                    drop(Box::from_raw(slice));
                }
            }
            _ => warn!(handle = block.handle(), "Ignoring free of unknown shared block"),
        }
    }
}
