//! Engine configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) gives a working setup.
//!
//! ```toml
//! api = "vulkan"
//! asset_root = "data"
//! hot_reload = true
//! hot_reload_interval_ms = 250
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use crate::error::{Error, Result};
use crate::graphics_device::GraphicsApi;
use crate::log::LogSeverity;

/// Virtual directory holding compiled stage binaries
pub const DEFAULT_SHADER_CACHE_DIR: &str = "/engine/shaders/bin";

/// Default hot-reload polling interval
pub const DEFAULT_HOT_RELOAD_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Graphics API the device, compiler and reflector must agree on
    pub api: GraphicsApi,
    /// Directory backing the virtual root `/`
    pub asset_root: PathBuf,
    /// Virtual directory of the compiled shader cache
    pub shader_cache_dir: String,
    /// Compile shaders with debug info and strict validation
    pub debug_shaders: bool,
    /// Poll asset files for changes in `AssetManager::update`
    pub hot_reload: bool,
    pub hot_reload_interval_ms: u64,
    /// Job queue workers (0 = available parallelism)
    pub worker_threads: usize,
    pub log_level: LogSeverity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api: GraphicsApi::Vulkan,
            asset_root: PathBuf::from("."),
            shader_cache_dir: DEFAULT_SHADER_CACHE_DIR.to_string(),
            debug_shaders: cfg!(debug_assertions),
            hot_reload: false,
            hot_reload_interval_ms: DEFAULT_HOT_RELOAD_INTERVAL_MS,
            worker_threads: 0,
            log_level: LogSeverity::Info,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Parse(format!("Invalid engine configuration: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, &e))?;
        Self::from_toml_str(&text)
    }

    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }

    /// Worker count with `0` resolved to the machine's parallelism
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2)
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
