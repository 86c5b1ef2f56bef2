/// Stage compilation and the on-disk binary cache
///
/// Backends implement `StageCompiler` (GLSL to SPIR-V, HLSL to DXBC, ...).
/// `ShaderCompiler` wraps a backend with a content-addressed cache:
///
/// ```text
/// <cache_dir>/<debug|release>/<stage><xxh3 of source>.<spv|cso>
/// ```
///
/// A cache hit skips the backend entirely. Cache failures never fail a
/// compile: an unreadable entry is a miss, an unwritable directory a warning.

use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;
use crate::asset::vfs::{normalize_virtual_path, VirtualFileSystem};
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsApi, ShaderStage};

const LOG_SOURCE: &str = "lumen::ShaderCompiler";

/// Entry point symbol of every stage
pub const ENTRY_POINT: &str = "main";

/// Compilation profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    /// Debug info, no optimization, warnings as errors
    pub debug: bool,
}

impl CompileOptions {
    pub fn profile_name(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "release"
        }
    }
}

/// Backend stage compiler
///
/// Failures are `Error::Compilation` carrying the compiler diagnostic.
pub trait StageCompiler: Send + Sync {
    /// API whose binaries this compiler produces
    fn api(&self) -> GraphicsApi;

    fn compile(&self, source: &str, entry_point: &str, stage: ShaderStage, options: &CompileOptions) -> Result<Vec<u8>>;
}

/// Stage compiler with a binary cache
pub struct ShaderCompiler {
    backend: Arc<dyn StageCompiler>,
    vfs: Arc<VirtualFileSystem>,
    cache_dir: String,
    options: CompileOptions,
}

impl ShaderCompiler {
    pub fn new(
        backend: Arc<dyn StageCompiler>,
        vfs: Arc<VirtualFileSystem>,
        cache_dir: &str,
        options: CompileOptions,
    ) -> Self {
        Self {
            backend,
            vfs,
            cache_dir: normalize_virtual_path(cache_dir),
            options,
        }
    }

    pub fn api(&self) -> GraphicsApi {
        self.backend.api()
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Virtual path of the cache entry for `source`
    pub fn cache_path(&self, source: &str, stage: ShaderStage) -> String {
        format!(
            "{}/{}/{}{:016x}.{}",
            self.cache_dir.trim_end_matches('/'),
            self.options.profile_name(),
            stage.name(),
            xxh3_64(source.as_bytes()),
            self.api().binary_extension()
        )
    }

    /// Compile a stage source, going through the cache
    pub fn compile_source(&self, source: &str, stage: ShaderStage) -> Result<Vec<u8>> {
        let cache_path = self.cache_path(source, stage);

        if self.vfs.exists(&cache_path) {
            match self.vfs.read(&cache_path) {
                Ok(binary) if !binary.is_empty() => {
                    crate::engine_trace!(LOG_SOURCE, "Cache hit {}", cache_path);
                    return Ok(binary);
                }
                Ok(_) => crate::engine_debug!(LOG_SOURCE, "Empty cache entry {}, recompiling", cache_path),
                Err(e) => crate::engine_debug!(LOG_SOURCE, "Unreadable cache entry {} ({}), recompiling", cache_path, e),
            }
        }

        let binary = self.backend.compile(source, ENTRY_POINT, stage, &self.options)?;

        if let Err(e) = self.vfs.write(&cache_path, &binary) {
            crate::engine_warn!(LOG_SOURCE, "Could not write shader cache entry {}: {}", cache_path, e);
        }
        crate::engine_debug!(LOG_SOURCE, "Compiled {} stage into {}", stage, cache_path);
        Ok(binary)
    }

    /// Compile a standalone stage file, always bypassing the cache
    pub fn compile_file(&self, virtual_path: &str, stage: ShaderStage) -> Result<Vec<u8>> {
        let source = self.vfs.read_to_string(virtual_path)?;
        self.backend
            .compile(&source, ENTRY_POINT, stage, &self.options)
            .map_err(|e| match e {
                Error::Compilation(message) => Error::Compilation(format!("{}: {}", virtual_path, message)),
                other => other,
            })
    }
}

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod tests;
