//! Central error types for the frame bridge (thiserror-based).

use thiserror::Error;

use crate::types::ContextId;

/// Failures of platform transports (shared memory, display engine).
///
/// These are recovered locally by falling back to the next import strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Shared memory allocation failed: {size} bytes")]
    SharedAlloc { size: usize },

    #[error("Display engine job failed with status {status}")]
    Scaler { status: i32 },

    #[error("Display engine unavailable: {0}")]
    ScalerUnavailable(String),

    #[error("No shared memory platform configured")]
    NoSharedMemory,

    #[error("Picture has no native shared-memory handle")]
    NoNativeHandle,

    #[error("Picture plane {plane} has no physical address")]
    NoPhysAddr { plane: usize },
}

/// Rendering-API errors reported by a [`GlDevice`](crate::gpu_traits::GlDevice).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("Texture creation failed ({width}x{height}): {reason}")]
    TextureCreation {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Texture upload failed: {0}")]
    Upload(String),

    #[error("Image import failed: {0}")]
    ImageImport(String),

    #[error("Binding image to texture failed: {0}")]
    ImageBind(String),
}

/// Decoder-side failures surfaced to the caller as a failed frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Display request returned status {status} (picture unavailable)")]
    DisplayRequest { status: i32 },
}

/// Why one import strategy could not deliver a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Errors returned by texture and host transfers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("No rendering context is current on this thread")]
    NoCurrentContext,

    #[error("Rendering context {ctx} was destroyed during the import")]
    ContextDestroyed { ctx: ContextId },

    #[error("Import strategy {strategy} failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: StrategyError,
    },

    #[error("All import strategies failed, last error: {last}")]
    Exhausted { last: StrategyError },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Convenience Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
