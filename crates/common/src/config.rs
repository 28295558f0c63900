//! Pool configuration, interpreted once from the environment.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_SHARED_IMPORT: &str = "CEDARV_SHARED_IMPORT";
pub const ENV_HOST_FALLBACK: &str = "CEDARV_HOST_FALLBACK";
pub const ENV_SHADER_DETILE: &str = "CEDARV_SHADER_DETILE";
pub const ENV_CONVERTER: &str = "CEDARV_CONVERTER";
pub const ENV_SCALER: &str = "CEDARV_SCALER";
pub const ENV_HOST_PLANAR: &str = "CEDARV_HOST_PLANAR";
pub const ENV_NO_FALLBACK: &str = "CEDARV_NO_FALLBACK";

/// Which memory a shared-allocation import reads from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharedImportMode {
    /// No shared-memory import; textures are filled by upload.
    #[default]
    Disabled,
    /// A persistent shared region filled from the CPU conversion.
    FromHostConversion,
    /// The decoder's own picture memory, imported still tiled.
    FromNativeTiled,
}

/// Tile-to-linear converter implementation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConverterBackend {
    /// Portable scalar implementation.
    Scalar,
    /// SSE2 / NEON implementation, falling back to scalar elsewhere.
    #[default]
    Accelerated,
}

/// Layout of the CPU-visible host view.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostLayout {
    /// Y plane + interleaved CbCr, both at the luma stride.
    #[default]
    Nv12,
    /// Y, Cb, Cr planes.
    Yuv420p,
}

/// Buffer pool configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub shared_import: SharedImportMode,
    /// Use the CPU linear buffer as texture source instead of shared memory.
    pub host_fallback: bool,
    /// Upload still-tiled data; the consuming shader detiles.
    pub shader_detile: bool,
    pub converter: ConverterBackend,
    /// Allow the display-engine detiling accelerator.
    pub use_scaler: bool,
    pub host_layout: HostLayout,
    /// Fall back to the next import strategy on failure. Disabling this is a
    /// test hook: the first failure is returned to the caller instead.
    pub fallback: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            shared_import: SharedImportMode::Disabled,
            host_fallback: false,
            shader_detile: false,
            converter: ConverterBackend::Accelerated,
            use_scaler: false,
            host_layout: HostLayout::Nv12,
            fallback: true,
        }
    }
}

impl PoolConfig {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, starting from defaults.
    /// Unrecognised values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup(ENV_SHARED_IMPORT) {
            match parse_shared_import(&v) {
                Some(mode) => cfg.shared_import = mode,
                None => warn!(key = ENV_SHARED_IMPORT, value = %v, "Ignoring unrecognised value"),
            }
        }
        if let Some(v) = lookup(ENV_CONVERTER) {
            match parse_converter(&v) {
                Some(backend) => cfg.converter = backend,
                None => warn!(key = ENV_CONVERTER, value = %v, "Ignoring unrecognised value"),
            }
        }
        if let Some(b) = read_bool(&lookup, ENV_HOST_FALLBACK) {
            cfg.host_fallback = b;
        }
        if let Some(b) = read_bool(&lookup, ENV_SHADER_DETILE) {
            cfg.shader_detile = b;
        }
        if let Some(b) = read_bool(&lookup, ENV_SCALER) {
            cfg.use_scaler = b;
        }
        if let Some(b) = read_bool(&lookup, ENV_HOST_PLANAR) {
            cfg.host_layout = if b {
                HostLayout::Yuv420p
            } else {
                HostLayout::Nv12
            };
        }
        if let Some(b) = read_bool(&lookup, ENV_NO_FALLBACK) {
            cfg.fallback = !b;
        }
        cfg
    }
}

fn read_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    let parsed = parse_bool(&value);
    if parsed.is_none() {
        warn!(key, value = %value, "Ignoring unrecognised boolean");
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_shared_import(value: &str) -> Option<SharedImportMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "0" | "off" | "disabled" | "none" => Some(SharedImportMode::Disabled),
        "1" | "host" => Some(SharedImportMode::FromHostConversion),
        "2" | "tiled" | "native" => Some(SharedImportMode::FromNativeTiled),
        _ => None,
    }
}

fn parse_converter(value: &str) -> Option<ConverterBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "scalar" | "c" | "portable" => Some(ConverterBackend::Scalar),
        "simd" | "accelerated" | "neon" | "sse2" => Some(ConverterBackend::Accelerated),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(PoolConfig::from_lookup(|_| None), PoolConfig::default());
    }

    #[test]
    fn all_options_parse() {
        let cfg = PoolConfig::from_lookup(lookup(&[
            (ENV_SHARED_IMPORT, "tiled"),
            (ENV_HOST_FALLBACK, "yes"),
            (ENV_SHADER_DETILE, "1"),
            (ENV_CONVERTER, "scalar"),
            (ENV_SCALER, "on"),
            (ENV_HOST_PLANAR, "true"),
            (ENV_NO_FALLBACK, "1"),
        ]));
        assert_eq!(cfg.shared_import, SharedImportMode::FromNativeTiled);
        assert!(cfg.host_fallback);
        assert!(cfg.shader_detile);
        assert_eq!(cfg.converter, ConverterBackend::Scalar);
        assert!(cfg.use_scaler);
        assert_eq!(cfg.host_layout, HostLayout::Yuv420p);
        assert!(!cfg.fallback);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let cfg = PoolConfig::from_lookup(lookup(&[
            (ENV_SHARED_IMPORT, "sometimes"),
            (ENV_SCALER, "maybe"),
            (ENV_CONVERTER, "gpu"),
        ]));
        assert_eq!(cfg, PoolConfig::default());
    }

    #[test]
    fn config_loads_from_json() {
        let json = r#"{
            "shared_import": "FromNativeTiled",
            "host_fallback": false,
            "shader_detile": true,
            "converter": "Scalar",
            "use_scaler": false,
            "host_layout": "Nv12",
            "fallback": true
        }"#;
        let cfg: PoolConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.shared_import, SharedImportMode::FromNativeTiled);
        assert_eq!(cfg.converter, ConverterBackend::Scalar);
        assert!(cfg.shader_detile);
    }

    #[test]
    fn shared_import_host_mode() {
        let cfg = PoolConfig::from_lookup(lookup(&[(ENV_SHARED_IMPORT, " HOST ")]));
        assert_eq!(cfg.shared_import, SharedImportMode::FromHostConversion);
    }
}
