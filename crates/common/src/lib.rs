//! `cv-common`: Shared types, traits, and errors for the CedarV frame bridge.
//!
//! This crate is the foundation the converter, GPU and pool crates depend on.
//! It defines:
//!
//! - **Types**: `AlignedDimensions`, `Resolution`, `TimeCode`, id newtypes
//! - **Pictures**: `TiledPicture`, `PictureMemory`, `ReleaseToken`
//! - **Mapping**: `MappingParameters`, `PlaneMapping` (what consumers see)
//! - **Collaborator traits**: `GlDevice`, `SharedMemory`, `DisplayEngine`
//! - **Errors**: `TransferError`, `PlatformError`, `GpuError`, `DecodeError`
//! - **Config**: `PoolConfig`, read once from `CEDARV_*` environment variables

pub mod color;
pub mod config;
pub mod error;
pub mod gpu_traits;
pub mod mapping;
pub mod picture;
pub mod types;

// Re-export commonly used items at crate root
pub use color::{PixelFormat, PlaneFormat};
pub use config::{ConverterBackend, HostLayout, PoolConfig, SharedImportMode};
pub use error::{
    DecodeError, GpuError, PlatformError, StrategyError, TransferError, TransferResult,
};
pub use gpu_traits::{
    ContextDestroyHook, DisplayEngine, GlDevice, ImageImport, ScalerJob, SharedBlock,
    SharedMemory,
};
pub use mapping::{MappingParameters, PlaneMapping};
pub use picture::{
    MappedPlanes, NativeHandle, OwnedPlanes, PictureMemory, PictureReleaser, ReleaseToken,
    TiledPicture,
};
pub use types::{
    AlignedDimensions, ContextId, ImageHandle, PictureId, Resolution, TextureId, TimeCode,
};
