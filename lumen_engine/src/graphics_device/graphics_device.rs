/// GraphicsDevice trait - factory for GPU resources

use std::fmt;
use std::sync::Arc;
use serde::Deserialize;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, Pipeline, PipelineDesc, Shader, ShaderDesc, Texture,
    TextureDesc,
};

/// Graphics API selected at startup
///
/// Chosen once from the engine configuration. The device, the stage compiler
/// and the reflector must all agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum GraphicsApi {
    #[serde(rename = "vulkan")]
    Vulkan,
    #[serde(rename = "d3d11")]
    D3D11,
}

impl GraphicsApi {
    /// Extension of compiled stage binaries in the shader cache
    pub fn binary_extension(&self) -> &'static str {
        match self {
            GraphicsApi::Vulkan => "spv",
            GraphicsApi::D3D11 => "cso",
        }
    }

    pub fn from_guard(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vulkan" => Some(GraphicsApi::Vulkan),
            "d3d11" => Some(GraphicsApi::D3D11),
            _ => None,
        }
    }
}

impl fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsApi::Vulkan => write!(f, "Vulkan"),
            GraphicsApi::D3D11 => write!(f, "Direct3D 11"),
        }
    }
}

/// Graphics device trait
///
/// Implemented by backend devices. Shared across the engine as
/// `Arc<Mutex<dyn GraphicsDevice>>`; every created resource is reference
/// counted and released when its last `Arc` is dropped.
pub trait GraphicsDevice: Send + Sync {
    /// API this device drives
    fn api(&self) -> GraphicsApi;

    /// Create a GPU buffer
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a texture, optionally uploading initial data
    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a shader module from a compiled stage binary
    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn Shader>>;

    /// Create a graphics pipeline
    fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>>;
}
