//! `cv-pool`: Reference-counted CedarV frame buffers.
//!
//! [`BufferPool`] wraps each decoded picture into a [`PooledBuffer`] that
//! can be viewed as linear host memory or as GPU textures, and returns the
//! picture to the decoder exactly once when the last handle drops.

pub mod buffer;
pub mod pool;

pub use buffer::PooledBuffer;
pub use pool::{BufferPool, PoolStats};

pub use cv_common::{PoolConfig, TransferError};
pub use cv_convert::HostPlanes;
pub use cv_gpu_hal::{ImportStrategy, Platform, SharedSource, TextureView};
