/// Shader module trait, shader stages and stage flags

use std::fmt;
use bitflags::bitflags;

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Geometry];

    /// Lowercase name, used in cache file names and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
        }
    }

    /// Parse the argument of a `#shader` directive
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vertex" | "vs" => Some(ShaderStage::Vertex),
            "fragment" | "pixel" | "fs" | "ps" => Some(ShaderStage::Fragment),
            "geometry" | "gs" => Some(ShaderStage::Geometry),
            _ => None,
        }
    }

    pub fn flag(&self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Set of shader stages a declaration is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x01;
        const FRAGMENT = 0x02;
        const GEOMETRY = 0x04;
    }
}

/// Descriptor for creating a shader module
#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    /// Compiled stage binary (SPIR-V, DXBC, ...)
    pub code: &'a [u8],
    /// Stage this module runs in
    pub stage: ShaderStage,
    /// Entry point symbol
    pub entry_point: &'a str,
}

/// Shader module resource trait
pub trait Shader: Send + Sync {
    fn stage(&self) -> ShaderStage;
}
