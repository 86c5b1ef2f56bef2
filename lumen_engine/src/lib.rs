/*!
# Lumen Engine

Shader reflection, material binding and asset management for the Lumen
rendering engine.

A `.shader` file is parsed into stages, each stage is compiled by the active
backend (with an on-disk cache) and reflected into a declaration model of
uniform buffers, textures, vertex inputs and push constants. Materials own
CPU-mirrored copies of the material buffers and expose typed, name-based
property setters; the asset manager loads everything by virtual path,
substitutes fallbacks for broken assets and hot-reloads changed files.

## Architecture

- **GraphicsDevice**: backend-agnostic factory for buffers, textures, shader
  modules, pipelines and command lists
- **StageCompiler / ShaderReflector**: backend toolchain seams, bundled with
  the device in a `RenderContext`
- **Shader / Material**: reflected assets with cached property values
- **AssetManager**: path-keyed caches, fallbacks and hot reload

The Vulkan toolchain (GLSL compilation and SPIR-V reflection) lives in the
`lumen_engine_vulkan` crate.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod context;
pub mod graphics_device;
pub mod shader;
pub mod resource;
pub mod asset;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Main lumen namespace module
pub mod lumen {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    pub use crate::config::EngineConfig;
    pub use crate::context::RenderContext;
    pub use crate::asset::AssetManager;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger, MemoryLogger};
    }
}

// Re-export math library at crate root
pub use glam;
