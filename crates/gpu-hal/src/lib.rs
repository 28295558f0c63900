//! `cv-gpu-hal`: GPU side of the CedarV frame bridge.
//!
//! Keeps per-context texture, image and shared-memory resources
//! ([`GpuResourceCache`]) and delivers frames into them through a chain of
//! import strategies ([`Importer`]). All calls that take a
//! [`GlDevice`](cv_common::GlDevice) must happen on the thread owning the
//! current rendering context.

pub mod cache;
pub mod import;
pub mod resources;
pub mod select;
pub mod shared;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::GpuResourceCache;
pub use import::{ImportStrategy, Importer, Platform, SharedSource, StrategyChain, TextureView};
pub use resources::ContextResources;
pub use select::describe_strategy;
pub use shared::HeapSharedMemory;
