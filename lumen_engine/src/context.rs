/// Render context - the backend trio chosen at startup
///
/// A device, a stage compiler and a reflector for the same graphics API,
/// plus the virtual file system they read from. Created once and passed
/// explicitly to everything that compiles shaders or creates GPU resources.

use std::sync::{Arc, Mutex, MutexGuard};
use crate::asset::vfs::VirtualFileSystem;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsApi, GraphicsDevice};
use crate::shader::compiler::{CompileOptions, ShaderCompiler, StageCompiler};
use crate::shader::reflection::ShaderReflector;

pub struct RenderContext {
    device: Arc<Mutex<dyn GraphicsDevice>>,
    compiler: ShaderCompiler,
    reflector: Arc<dyn ShaderReflector>,
    vfs: Arc<VirtualFileSystem>,
}

impl RenderContext {
    /// Check that every backend matches `config.api` and wire them together
    pub fn new(
        config: &EngineConfig,
        device: Arc<Mutex<dyn GraphicsDevice>>,
        stage_compiler: Arc<dyn StageCompiler>,
        reflector: Arc<dyn ShaderReflector>,
    ) -> Result<Self> {
        let device_api = device
            .lock()
            .map_err(|_| crate::engine_err!("lumen::RenderContext", "Graphics device lock poisoned"))?
            .api();
        for (what, api) in [
            ("graphics device", device_api),
            ("stage compiler", stage_compiler.api()),
            ("shader reflector", reflector.api()),
        ] {
            if api != config.api {
                return Err(Error::InitializationFailed(format!(
                    "The {} targets {} but the engine is configured for {}",
                    what, api, config.api
                )));
            }
        }

        let vfs = Arc::new(VirtualFileSystem::new(&config.asset_root));
        let compiler = ShaderCompiler::new(
            stage_compiler,
            Arc::clone(&vfs),
            &config.shader_cache_dir,
            CompileOptions { debug: config.debug_shaders },
        );

        crate::engine_info!(
            "lumen::RenderContext",
            "{} render context ready (asset root '{}', {} shaders)",
            config.api,
            config.asset_root.display(),
            compiler.options().profile_name()
        );

        Ok(Self { device, compiler, reflector, vfs })
    }

    pub fn api(&self) -> GraphicsApi {
        self.compiler.api()
    }

    pub fn device(&self) -> &Arc<Mutex<dyn GraphicsDevice>> {
        &self.device
    }

    pub fn lock_device(&self) -> Result<MutexGuard<'_, dyn GraphicsDevice + 'static>> {
        self.device
            .lock()
            .map_err(|_| crate::engine_err!("lumen::RenderContext", "Graphics device lock poisoned"))
    }

    pub fn compiler(&self) -> &ShaderCompiler {
        &self.compiler
    }

    pub fn reflector(&self) -> &dyn ShaderReflector {
        self.reflector.as_ref()
    }

    pub fn vfs(&self) -> &Arc<VirtualFileSystem> {
        &self.vfs
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
