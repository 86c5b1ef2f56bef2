/// Reflected declaration model
///
/// Everything the engine knows about a shader's inputs comes from these
/// types: uniform buffer layouts with flattened members, bound resources,
/// vertex inputs and push constant blocks. They are produced by the
/// reflection engine from compiled binaries and never written by hand.

use rustc_hash::FxHashMap;
use crate::graphics_device::{BufferFormat, ShaderStageFlags};

/// Engine-level type of a uniform member or resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    UInt,
    Float,
    Double,
    Boolean,
    Char,
    Vec2,
    Vec3,
    Vec4,
    Matrix,
    Struct,
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCubemap,
    Unknown,
}

impl DataType {
    pub fn is_texture(&self) -> bool {
        matches!(
            self,
            DataType::Texture1D | DataType::Texture2D | DataType::Texture3D | DataType::TextureCubemap
        )
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::Vec2 | DataType::Vec3 | DataType::Vec4)
    }

    /// Size in bytes of one element when the binary does not say
    pub fn default_size(&self) -> u32 {
        match self {
            DataType::Char => 1,
            DataType::Int | DataType::UInt | DataType::Float | DataType::Boolean => 4,
            DataType::Double | DataType::Vec2 => 8,
            DataType::Vec3 => 12,
            DataType::Vec4 => 16,
            DataType::Matrix => 64,
            _ => 0,
        }
    }
}

// ============================================================================
// Uniform buffers
// ============================================================================

/// One flattened member of a uniform buffer
///
/// Nested struct members are flattened to `outer.inner` (or `outer[i].inner`
/// for arrays of structs) with absolute offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderUniformMember {
    pub name: String,
    /// Bytes from the start of the buffer
    pub offset: u32,
    /// Bytes covered by the member (all elements for arrays)
    pub size: u32,
    pub data_type: DataType,
    /// Element count, 1 for non-arrays
    pub array_size: u32,
}

impl ShaderUniformMember {
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Which owner a uniform buffer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Per-material values, one copy per Material
    Material,
    /// Per-shader values, one copy per Shader
    Shader,
    /// Engine globals (camera, lights, ...), owned by the Shader
    Global,
}

impl BufferRole {
    /// Role from a buffer name: `material` wins over `shader`, anything else is global
    pub fn from_buffer_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("material") {
            BufferRole::Material
        } else if lower.contains("shader") {
            BufferRole::Shader
        } else {
            BufferRole::Global
        }
    }
}

/// Layout of one uniform/constant buffer
#[derive(Debug, Clone)]
pub struct ShaderUniformBufferDeclaration {
    name: String,
    shader_stages: ShaderStageFlags,
    binding_set: u32,
    binding_slot: u32,
    total_size: u32,
    members: Vec<ShaderUniformMember>,
    member_index: FxHashMap<String, usize>,
}

impl ShaderUniformBufferDeclaration {
    pub fn new(
        name: impl Into<String>,
        shader_stages: ShaderStageFlags,
        binding_set: u32,
        binding_slot: u32,
        total_size: u32,
        members: Vec<ShaderUniformMember>,
    ) -> Self {
        let member_index = members
            .iter()
            .enumerate()
            .map(|(index, member)| (member.name.clone(), index))
            .collect();
        Self {
            name: name.into(),
            shader_stages,
            binding_set,
            binding_slot,
            total_size,
            members,
            member_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader_stages(&self) -> ShaderStageFlags {
        self.shader_stages
    }

    pub fn binding_set(&self) -> u32 {
        self.binding_set
    }

    pub fn binding_slot(&self) -> u32 {
        self.binding_slot
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Members in reflection order
    pub fn members(&self) -> &[ShaderUniformMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&ShaderUniformMember> {
        self.member_index.get(name).map(|&index| &self.members[index])
    }

    pub fn role(&self) -> BufferRole {
        BufferRole::from_buffer_name(&self.name)
    }

    /// Same size and identical member list
    pub fn same_layout(&self, other: &ShaderUniformBufferDeclaration) -> bool {
        self.total_size == other.total_size && self.members == other.members
    }

    pub(crate) fn add_stages(&mut self, stages: ShaderStageFlags) {
        self.shader_stages |= stages;
    }
}

// ============================================================================
// Resources
// ============================================================================

/// How a resource is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Texture sampled through a separate sampler
    Texture,
    /// Standalone sampler
    Sampler,
    /// Texture and sampler in one binding
    CombinedImageSampler,
}

/// One bound texture or sampler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResourceDeclaration {
    pub name: String,
    pub shader_stages: ShaderStageFlags,
    pub binding_set: u32,
    pub binding_slot: u32,
    /// Texture kind, or Unknown for samplers and unrecognized images
    pub data_type: DataType,
    pub kind: ResourceKind,
}

impl ShaderResourceDeclaration {
    /// True for bindings that take a texture
    pub fn takes_texture(&self) -> bool {
        self.kind != ResourceKind::Sampler
    }
}

// ============================================================================
// Vertex inputs
// ============================================================================

/// Coarse engine tag for a vertex input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexValueType {
    Float1,
    Float2,
    Float3,
    Float4,
    Int1,
    Int2,
    Int3,
    Int4,
    UInt1,
    UInt2,
    UInt3,
    UInt4,
    Unknown,
}

impl VertexValueType {
    pub fn buffer_format(&self) -> Option<BufferFormat> {
        match self {
            VertexValueType::Float1 => Some(BufferFormat::R32_SFLOAT),
            VertexValueType::Float2 => Some(BufferFormat::R32G32_SFLOAT),
            VertexValueType::Float3 => Some(BufferFormat::R32G32B32_SFLOAT),
            VertexValueType::Float4 => Some(BufferFormat::R32G32B32A32_SFLOAT),
            VertexValueType::Int1 => Some(BufferFormat::R32_SINT),
            VertexValueType::Int2 => Some(BufferFormat::R32G32_SINT),
            VertexValueType::Int3 => Some(BufferFormat::R32G32B32_SINT),
            VertexValueType::Int4 => Some(BufferFormat::R32G32B32A32_SINT),
            VertexValueType::UInt1 => Some(BufferFormat::R32_UINT),
            VertexValueType::UInt2 => Some(BufferFormat::R32G32_UINT),
            VertexValueType::UInt3 => Some(BufferFormat::R32G32B32_UINT),
            VertexValueType::UInt4 => Some(BufferFormat::R32G32B32A32_UINT),
            VertexValueType::Unknown => None,
        }
    }
}

/// One vertex shader input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInputDeclaration {
    /// Logical name with the `_INSTANCE` suffix stripped
    pub semantic: String,
    pub location: u32,
    pub value_type: VertexValueType,
    /// Fed from the per-instance vertex stream
    pub per_instance: bool,
}

// ============================================================================
// Push constants
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstantDeclaration {
    pub name: String,
    pub shader_stages: ShaderStageFlags,
    pub size: u32,
    pub members: Vec<ShaderUniformMember>,
}

#[cfg(test)]
#[path = "declaration_tests.rs"]
mod tests;
