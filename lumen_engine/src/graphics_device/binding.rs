/// Resource binding layout description
///
/// The pipeline layout is never written by hand: it is derived from the
/// reflected buffer and resource declarations of a shader.

use crate::graphics_device::ShaderStageFlags;

/// Type of resource bound at a given slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// Uniform/constant buffer
    UniformBuffer,
    /// Sampled texture without sampler
    SampledTexture,
    /// Standalone sampler
    Sampler,
    /// Texture and sampler in one binding
    CombinedImageSampler,
}

/// Description of a single binding slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSlotDesc {
    /// Binding set (`layout(set = N)`, always 0 on Direct3D 11)
    pub set: u32,
    /// Binding slot (`layout(binding = N)`, register index)
    pub binding: u32,
    pub binding_type: BindingType,
    /// Shader stages that access this binding
    pub stage_flags: ShaderStageFlags,
}
