//! Human-readable strategy descriptions for logs.

use crate::import::{ImportStrategy, SharedSource};

/// Describe how frames reach the GPU under `strategy`.
pub fn describe_strategy(strategy: ImportStrategy, shader_detile: bool) -> &'static str {
    match (strategy, shader_detile) {
        (ImportStrategy::DisplayScaler, _) => "Display engine detiles into shared memory",
        (ImportStrategy::SharedAlloc(SharedSource::HostConversion), false) => {
            "CPU detiles into shared memory bound to textures"
        }
        (ImportStrategy::SharedAlloc(SharedSource::HostConversion), true) => {
            "CPU copies tiled planes into shared memory, shader detiles"
        }
        (ImportStrategy::SharedAlloc(SharedSource::NativeTiled), _) => {
            "Decoder memory imported without copy, shader detiles"
        }
        (ImportStrategy::DirectUpload, false) => "CPU detiles, textures updated by upload",
        (ImportStrategy::DirectUpload, true) => "Tiled planes uploaded, shader detiles",
    }
}
