/// SPIR-V reflection built on spirq
///
/// Produces the raw per-stage tree the engine's reflection turns into
/// declarations. Uniform blocks are named after their block type
/// (`uniform MaterialBlock { ... } material;` gives `MaterialBlock`); other
/// descriptors and vertex inputs after their variable.

use lumen_engine::graphics_device::{GraphicsApi, ShaderStage};
use lumen_engine::lumen::{Error, Result};
use lumen_engine::shader::{
    ImageDim, RawPushConstant, RawResource, RawResourceKind, RawStageReflection, RawUniformBuffer, RawVertexInput,
    ReflectedMember, ReflectedMemberType, ScalarKind, ShaderReflector,
};
use spirq::ty::{DescriptorType, ScalarType, StructType, Type};
use spirq::var::Variable;

const LOG_SOURCE: &str = "lumen::vulkan::Reflector";

/// Reinterpret a little-endian SPIR-V byte stream as words
fn spirv_words(binary: &[u8]) -> Result<Vec<u32>> {
    if binary.len() % 4 != 0 {
        return Err(Error::Reflection(format!(
            "SPIR-V binary size {} is not a multiple of 4",
            binary.len()
        )));
    }
    Ok(binary
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

fn scalar_kind(scalar: &ScalarType) -> ScalarKind {
    match scalar {
        ScalarType::Float { bits: 64 } => ScalarKind::Float64,
        ScalarType::Float { .. } => ScalarKind::Float32,
        ScalarType::Integer { bits: 8, is_signed: true } => ScalarKind::Int8,
        ScalarType::Integer { bits: 8, is_signed: false } => ScalarKind::UInt8,
        ScalarType::Integer { is_signed: true, .. } => ScalarKind::Int32,
        ScalarType::Integer { is_signed: false, .. } => ScalarKind::UInt32,
        ScalarType::Boolean => ScalarKind::Bool,
        ScalarType::Void => ScalarKind::Float32,
    }
}

fn member_type(ty: &Type) -> ReflectedMemberType {
    match ty {
        Type::Scalar(scalar) => ReflectedMemberType::Scalar(scalar_kind(scalar)),
        Type::Vector(vector) => ReflectedMemberType::Vector {
            kind: scalar_kind(&vector.scalar_ty),
            components: vector.nscalar,
        },
        Type::Matrix(matrix) => ReflectedMemberType::Matrix {
            kind: scalar_kind(&matrix.vector_ty.scalar_ty),
            columns: matrix.nvector,
            rows: matrix.vector_ty.nscalar,
        },
        Type::Array(array) => ReflectedMemberType::Array {
            element: Box::new(member_type(&array.element_ty)),
            count: array.nelement,
            stride: array.stride.map(|stride| stride as u32),
        },
        Type::Struct(structure) => ReflectedMemberType::Struct(struct_members(structure)),
        other => ReflectedMemberType::Unknown(format!("{:?}", other)),
    }
}

fn struct_members(structure: &StructType) -> Vec<ReflectedMember> {
    structure
        .members
        .iter()
        .map(|member| ReflectedMember {
            name: member.name.clone().unwrap_or_default(),
            offset: member.offset.unwrap_or(0) as u32,
            size: member.ty.nbyte().map(|size| size as u32),
            member_type: member_type(&member.ty),
        })
        .collect()
}

/// Skip the anonymous single-member struct naga wraps some blocks in
fn unwrap_block(ty: &Type) -> &Type {
    match ty {
        Type::Struct(structure) if structure.name.is_none() && structure.members.len() == 1 => {
            let inner = &structure.members[0];
            match (&inner.ty, inner.offset.unwrap_or(0)) {
                (Type::Struct(_), 0) => unwrap_block(&inner.ty),
                _ => ty,
            }
        }
        _ => ty,
    }
}

/// Block name and members of a uniform block or push constant block
fn block_layout(variable_name: &Option<String>, ty: &Type) -> (Option<String>, Option<u32>, Vec<ReflectedMember>) {
    let block = unwrap_block(ty);
    let size = block.nbyte().map(|size| size as u32);
    match block {
        Type::Struct(structure) => (
            structure.name.clone().or_else(|| variable_name.clone()),
            size,
            struct_members(structure),
        ),
        _ => (variable_name.clone(), size, Vec::new()),
    }
}

fn image_dim(dim: spirv::Dim) -> ImageDim {
    match dim {
        spirv::Dim::Dim1D => ImageDim::D1,
        spirv::Dim::Dim2D => ImageDim::D2,
        spirv::Dim::Dim3D => ImageDim::D3,
        spirv::Dim::DimCube => ImageDim::Cube,
        other => ImageDim::Other(format!("{:?}", other)),
    }
}

fn descriptor_dim(ty: &Type) -> ImageDim {
    match ty {
        Type::CombinedImageSampler(combined) => image_dim(combined.sampled_image_ty.dim),
        Type::SampledImage(sampled) => image_dim(sampled.dim),
        Type::Array(array) => descriptor_dim(&array.element_ty),
        other => ImageDim::Other(format!("{:?}", other)),
    }
}

#[derive(Debug, Default)]
pub struct VulkanShaderReflector;

impl VulkanShaderReflector {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderReflector for VulkanShaderReflector {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn reflect(&self, binary: &[u8], stage: ShaderStage) -> Result<RawStageReflection> {
        let words = spirv_words(binary)?;
        let entry_points = spirq::ReflectConfig::new()
            .spv(words.as_slice())
            .ref_all_rscs(true)
            .reflect()
            .map_err(|e| Error::Reflection(format!("{} stage: SPIR-V reflection failed: {:?}", stage, e)))?;

        let mut raw = RawStageReflection::default();
        for entry_point in &entry_points {
            for variable in &entry_point.vars {
                match variable {
                    Variable::Descriptor { name, desc_bind, desc_ty, ty, .. } => {
                        let (set, binding) = (desc_bind.set(), desc_bind.bind());
                        let kind = match desc_ty {
                            DescriptorType::UniformBuffer() => {
                                let (block_name, size, members) = block_layout(name, ty);
                                raw.uniform_buffers.push(RawUniformBuffer {
                                    name: block_name.unwrap_or_else(|| format!("set{}_binding{}", set, binding)),
                                    set,
                                    binding,
                                    size,
                                    members,
                                });
                                continue;
                            }
                            DescriptorType::CombinedImageSampler() => {
                                RawResourceKind::CombinedImageSampler(descriptor_dim(ty))
                            }
                            DescriptorType::SampledImage() => RawResourceKind::Texture(descriptor_dim(ty)),
                            DescriptorType::Sampler() => RawResourceKind::Sampler,
                            other => {
                                lumen_engine::engine_debug!(
                                    LOG_SOURCE,
                                    "{} stage: {:?} descriptor at set {} binding {} skipped",
                                    stage,
                                    other,
                                    set,
                                    binding
                                );
                                continue;
                            }
                        };
                        raw.resources.push(RawResource {
                            name: name.clone().unwrap_or_else(|| format!("set{}_binding{}", set, binding)),
                            set,
                            binding,
                            kind,
                        });
                    }
                    Variable::Input { name, location, ty } if stage == ShaderStage::Vertex => {
                        let Some(name) = name.clone() else {
                            lumen_engine::engine_debug!(
                                LOG_SOURCE,
                                "Unnamed vertex input at location {} skipped",
                                location.loc()
                            );
                            continue;
                        };
                        raw.vertex_inputs.push(RawVertexInput {
                            name,
                            location: location.loc(),
                            input_type: member_type(ty),
                        });
                    }
                    Variable::PushConstant { name, ty } => {
                        let (block_name, size, members) = block_layout(name, ty);
                        raw.push_constants.push(RawPushConstant {
                            name: block_name.unwrap_or_default(),
                            size,
                            members,
                        });
                    }
                    _ => {}
                }
            }
        }

        raw.vertex_inputs.sort_by_key(|input| input.location);
        Ok(raw)
    }
}
