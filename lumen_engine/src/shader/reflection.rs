/// Shader reflection engine
///
/// Backends implement `ShaderReflector` and describe a compiled binary as a
/// raw tree (`RawStageReflection`) of buffers with nested members, images
/// with their dimensionality and vertex inputs with their component types.
/// This module turns that tree into the engine's declarations:
///
/// - struct members are flattened to dotted names with absolute offsets,
///   arrays of structs to `name[i].member`
/// - component types are mapped to engine `DataType`s / `VertexValueType`s
/// - members overflowing their buffer are dropped with a warning
/// - the `_INSTANCE` suffix of vertex inputs selects the instance stream
///
/// `ShaderReflection::merge` then combines the stages of one shader: same
/// name at the same binding becomes one declaration visible to the union of
/// the stages, anything inconsistent is an `Error::Reflection`.

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::graphics_device::{
    BindingSlotDesc, BindingType, GraphicsApi, PushConstantRange, ShaderStage, ShaderStageFlags,
    VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};
use crate::shader::declaration::{
    BufferRole, DataType, PushConstantDeclaration, ResourceKind, ShaderResourceDeclaration,
    ShaderUniformBufferDeclaration, ShaderUniformMember, VertexInputDeclaration, VertexValueType,
};

const LOG_SOURCE: &str = "lumen::Reflection";

/// Vertex input name suffix selecting the per-instance stream
pub const INSTANCE_SUFFIX: &str = "_INSTANCE";

/// Vertex semantics the engine knows how to feed
const KNOWN_SEMANTICS: &[&str] = &[
    "POSITION",
    "NORMAL",
    "TANGENT",
    "BINORMAL",
    "BITANGENT",
    "COLOR",
    "TEXCOORD",
    "BLENDINDICES",
    "BLENDWEIGHT",
    "PSIZE",
];

// ============================================================================
// Raw reflection tree (backend output)
// ============================================================================

/// Scalar component type of a reflected member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float32,
    Float64,
    Int8,
    UInt8,
    Int32,
    UInt32,
    Bool,
}

impl ScalarKind {
    pub fn size_bytes(&self) -> u32 {
        match self {
            ScalarKind::Int8 | ScalarKind::UInt8 => 1,
            ScalarKind::Float64 => 8,
            _ => 4,
        }
    }
}

/// Type of a reflected member, as described by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectedMemberType {
    Scalar(ScalarKind),
    Vector { kind: ScalarKind, components: u32 },
    Matrix { kind: ScalarKind, columns: u32, rows: u32 },
    /// `count` is None for runtime-sized arrays
    Array { element: Box<ReflectedMemberType>, count: Option<u32>, stride: Option<u32> },
    Struct(Vec<ReflectedMember>),
    /// Anything the backend could not classify (description for diagnostics)
    Unknown(String),
}

/// A member of a reflected struct, offset relative to the struct
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedMember {
    pub name: String,
    pub offset: u32,
    /// Size reported by the backend, if known
    pub size: Option<u32>,
    pub member_type: ReflectedMemberType,
}

/// Image dimensionality
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDim {
    D1,
    D2,
    D3,
    Cube,
    /// Buffer textures, subpass inputs, ... (name for diagnostics)
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResourceKind {
    Texture(ImageDim),
    CombinedImageSampler(ImageDim),
    Sampler,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawUniformBuffer {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub size: Option<u32>,
    pub members: Vec<ReflectedMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResource {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: RawResourceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawVertexInput {
    pub name: String,
    pub location: u32,
    pub input_type: ReflectedMemberType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPushConstant {
    pub name: String,
    pub size: Option<u32>,
    pub members: Vec<ReflectedMember>,
}

/// Everything a backend found in one compiled stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStageReflection {
    pub uniform_buffers: Vec<RawUniformBuffer>,
    pub resources: Vec<RawResource>,
    pub vertex_inputs: Vec<RawVertexInput>,
    pub push_constants: Vec<RawPushConstant>,
}

/// Backend reflection trait
///
/// Must be side-effect free: the same binary always yields the same tree.
pub trait ShaderReflector: Send + Sync {
    /// API whose binaries this reflector understands
    fn api(&self) -> GraphicsApi;

    fn reflect(&self, binary: &[u8], stage: ShaderStage) -> Result<RawStageReflection>;
}

// ============================================================================
// Per-stage reflection
// ============================================================================

/// Declarations found in one stage
#[derive(Debug, Clone)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub vertex_inputs: Vec<VertexInputDeclaration>,
    pub uniform_buffers: Vec<ShaderUniformBufferDeclaration>,
    pub resources: Vec<ShaderResourceDeclaration>,
    pub push_constant: Option<PushConstantDeclaration>,
}

/// Reflect one compiled stage into declarations
pub fn reflect_stage(
    reflector: &dyn ShaderReflector,
    binary: &[u8],
    stage: ShaderStage,
) -> Result<StageReflection> {
    let raw = reflector.reflect(binary, stage)?;
    Ok(StageReflection::from_raw(raw, stage))
}

impl StageReflection {
    pub fn from_raw(raw: RawStageReflection, stage: ShaderStage) -> Self {
        let stages = stage.flag();

        let mut vertex_inputs: Vec<VertexInputDeclaration> = if stage == ShaderStage::Vertex {
            raw.vertex_inputs.iter().map(convert_vertex_input).collect()
        } else {
            Vec::new()
        };
        vertex_inputs.sort_by_key(|input| input.location);

        let uniform_buffers = raw
            .uniform_buffers
            .into_iter()
            .filter_map(|buffer| convert_uniform_buffer(buffer, stages))
            .collect();

        let resources = raw
            .resources
            .into_iter()
            .map(|resource| convert_resource(resource, stages))
            .collect();

        if raw.push_constants.len() > 1 {
            crate::engine_warn!(
                LOG_SOURCE,
                "{} stage declares {} push constant blocks, only the first is used",
                stage,
                raw.push_constants.len()
            );
        }
        let push_constant = raw
            .push_constants
            .into_iter()
            .next()
            .map(|block| convert_push_constant(block, stages));

        Self { stage, vertex_inputs, uniform_buffers, resources, push_constant }
    }
}

// ===== MEMBER FLATTENING =====

fn scalar_data_type(kind: ScalarKind) -> DataType {
    match kind {
        ScalarKind::Float32 => DataType::Float,
        ScalarKind::Float64 => DataType::Double,
        ScalarKind::Int8 | ScalarKind::UInt8 => DataType::Char,
        ScalarKind::Int32 => DataType::Int,
        ScalarKind::UInt32 => DataType::UInt,
        ScalarKind::Bool => DataType::Boolean,
    }
}

fn member_data_type(member_type: &ReflectedMemberType) -> DataType {
    match member_type {
        ReflectedMemberType::Scalar(kind) => scalar_data_type(*kind),
        ReflectedMemberType::Vector { kind, components } => match components {
            1 => scalar_data_type(*kind),
            2 => DataType::Vec2,
            3 => DataType::Vec3,
            4 => DataType::Vec4,
            _ => DataType::Unknown,
        },
        ReflectedMemberType::Matrix { .. } => DataType::Matrix,
        ReflectedMemberType::Array { element, .. } => member_data_type(element),
        ReflectedMemberType::Struct(_) => DataType::Struct,
        ReflectedMemberType::Unknown(_) => DataType::Unknown,
    }
}

/// Size of a type when the backend did not report one (std140-style matrices)
fn natural_size(member_type: &ReflectedMemberType) -> Option<u32> {
    match member_type {
        ReflectedMemberType::Scalar(kind) => Some(kind.size_bytes()),
        ReflectedMemberType::Vector { kind, components } => Some(kind.size_bytes() * components),
        ReflectedMemberType::Matrix { kind, columns, rows } => {
            let column = (kind.size_bytes() * rows).max(16);
            Some(columns * column.next_multiple_of(16))
        }
        ReflectedMemberType::Array { element, count, stride } => {
            let count = (*count)?;
            let stride = stride.or_else(|| natural_size(element))?;
            Some(count * stride)
        }
        ReflectedMemberType::Struct(members) => members
            .iter()
            .map(|m| m.size.or_else(|| natural_size(&m.member_type)).map(|s| m.offset + s))
            .try_fold(0u32, |acc, end| end.map(|e| acc.max(e))),
        ReflectedMemberType::Unknown(_) => None,
    }
}

/// Flatten `members` into `out`, prefixing names and adding `base_offset`
pub fn flatten_members(
    prefix: &str,
    base_offset: u32,
    members: &[ReflectedMember],
    out: &mut Vec<ShaderUniformMember>,
) {
    for member in members {
        let name = if prefix.is_empty() {
            member.name.clone()
        } else {
            format!("{}.{}", prefix, member.name)
        };
        let offset = base_offset + member.offset;

        match &member.member_type {
            ReflectedMemberType::Struct(inner) => flatten_members(&name, offset, inner, out),
            ReflectedMemberType::Array { element, count, stride } => {
                if let ReflectedMemberType::Struct(inner) = element.as_ref() {
                    let Some(count) = count else {
                        crate::engine_warn!(
                            LOG_SOURCE,
                            "Runtime-sized array of structs '{}' cannot be flattened, skipped",
                            name
                        );
                        continue;
                    };
                    let Some(stride) = stride.or_else(|| natural_size(element)) else {
                        crate::engine_warn!(LOG_SOURCE, "Array '{}' has no known stride, skipped", name);
                        continue;
                    };
                    for index in 0..*count {
                        flatten_members(&format!("{}[{}]", name, index), offset + index * stride, inner, out);
                    }
                } else {
                    let array_size = count.unwrap_or(1).max(1);
                    let size = member
                        .size
                        .or_else(|| natural_size(&member.member_type))
                        .unwrap_or(0);
                    out.push(ShaderUniformMember {
                        name,
                        offset,
                        size,
                        data_type: member_data_type(element),
                        array_size,
                    });
                }
            }
            other => {
                let data_type = member_data_type(other);
                if data_type == DataType::Unknown {
                    crate::engine_warn!(LOG_SOURCE, "Member '{}' has an unsupported type {:?}", name, other);
                }
                let size = member.size.or_else(|| natural_size(other)).unwrap_or(0);
                out.push(ShaderUniformMember { name, offset, size, data_type, array_size: 1 });
            }
        }
    }
}

/// Flatten, then drop duplicates and members that overflow `total_size`
fn validated_members(owner: &str, members: &[ReflectedMember], total_size: Option<u32>) -> (Vec<ShaderUniformMember>, u32) {
    let mut flat = Vec::new();
    flatten_members("", 0, members, &mut flat);

    let computed = flat.iter().map(|m| m.end()).max().unwrap_or(0);
    let total = total_size.unwrap_or(computed);

    let mut kept: Vec<ShaderUniformMember> = Vec::with_capacity(flat.len());
    for member in flat {
        if member.end() > total {
            crate::engine_warn!(
                LOG_SOURCE,
                "Member '{}' of '{}' ends at {} past the {} byte block, dropped",
                member.name,
                owner,
                member.end(),
                total
            );
        } else if kept.iter().any(|k| k.name == member.name) {
            crate::engine_warn!(LOG_SOURCE, "Duplicate member '{}' in '{}', dropped", member.name, owner);
        } else {
            kept.push(member);
        }
    }
    (kept, total)
}

fn convert_uniform_buffer(raw: RawUniformBuffer, stages: ShaderStageFlags) -> Option<ShaderUniformBufferDeclaration> {
    let (members, total) = validated_members(&raw.name, &raw.members, raw.size);
    if total == 0 {
        crate::engine_warn!(LOG_SOURCE, "Uniform buffer '{}' has no data, skipped", raw.name);
        return None;
    }
    Some(ShaderUniformBufferDeclaration::new(raw.name, stages, raw.set, raw.binding, total, members))
}

fn convert_push_constant(raw: RawPushConstant, stages: ShaderStageFlags) -> PushConstantDeclaration {
    let (members, size) = validated_members(&raw.name, &raw.members, raw.size);
    PushConstantDeclaration { name: raw.name, shader_stages: stages, size, members }
}

// ===== RESOURCES =====

fn texture_data_type(name: &str, dim: &ImageDim) -> DataType {
    match dim {
        ImageDim::D1 => DataType::Texture1D,
        ImageDim::D2 => DataType::Texture2D,
        ImageDim::D3 => DataType::Texture3D,
        ImageDim::Cube => DataType::TextureCubemap,
        ImageDim::Other(description) => {
            crate::engine_warn!(
                LOG_SOURCE,
                "Resource '{}' has unrecognized dimensionality '{}'",
                name,
                description
            );
            DataType::Unknown
        }
    }
}

fn convert_resource(raw: RawResource, stages: ShaderStageFlags) -> ShaderResourceDeclaration {
    let (data_type, kind) = match &raw.kind {
        RawResourceKind::Texture(dim) => (texture_data_type(&raw.name, dim), ResourceKind::Texture),
        RawResourceKind::CombinedImageSampler(dim) => {
            (texture_data_type(&raw.name, dim), ResourceKind::CombinedImageSampler)
        }
        RawResourceKind::Sampler => (DataType::Unknown, ResourceKind::Sampler),
    };
    ShaderResourceDeclaration {
        name: raw.name,
        shader_stages: stages,
        binding_set: raw.set,
        binding_slot: raw.binding,
        data_type,
        kind,
    }
}

// ===== VERTEX INPUTS =====

/// Split `NAME_INSTANCE` into (`NAME`, true)
pub fn split_instance_suffix(name: &str) -> (&str, bool) {
    let suffix_len = INSTANCE_SUFFIX.len();
    if name.len() > suffix_len
        && name.is_char_boundary(name.len() - suffix_len)
        && name[name.len() - suffix_len..].eq_ignore_ascii_case(INSTANCE_SUFFIX)
    {
        (&name[..name.len() - suffix_len], true)
    } else {
        (name, false)
    }
}

fn is_known_semantic(semantic: &str) -> bool {
    let base = semantic.trim_end_matches(|c: char| c.is_ascii_digit()).to_ascii_uppercase();
    KNOWN_SEMANTICS.contains(&base.as_str())
}

fn vertex_value_type(name: &str, input_type: &ReflectedMemberType) -> VertexValueType {
    let (kind, components) = match input_type {
        ReflectedMemberType::Scalar(kind) => (*kind, 1),
        ReflectedMemberType::Vector { kind, components } => (*kind, *components),
        other => {
            crate::engine_warn!(LOG_SOURCE, "Vertex input '{}' has unsupported type {:?}", name, other);
            return VertexValueType::Unknown;
        }
    };

    let family = match kind {
        ScalarKind::Float32 => 0,
        ScalarKind::Int32 => 1,
        ScalarKind::UInt32 => 2,
        ScalarKind::Float64 => {
            crate::engine_warn!(LOG_SOURCE, "Vertex input '{}' is double precision, mapped to float", name);
            0
        }
        ScalarKind::Int8 => {
            crate::engine_warn!(LOG_SOURCE, "Vertex input '{}' is 8-bit, mapped to int", name);
            1
        }
        ScalarKind::UInt8 | ScalarKind::Bool => {
            crate::engine_warn!(LOG_SOURCE, "Vertex input '{}' has type {:?}, mapped to uint", name, kind);
            2
        }
    };

    use VertexValueType::*;
    let table = [
        [Float1, Float2, Float3, Float4],
        [Int1, Int2, Int3, Int4],
        [UInt1, UInt2, UInt3, UInt4],
    ];
    match components {
        1..=4 => table[family][(components - 1) as usize],
        _ => {
            crate::engine_warn!(LOG_SOURCE, "Vertex input '{}' has {} components", name, components);
            Unknown
        }
    }
}

fn convert_vertex_input(raw: &RawVertexInput) -> VertexInputDeclaration {
    let (semantic, per_instance) = split_instance_suffix(&raw.name);
    if !is_known_semantic(semantic) {
        crate::engine_warn!(LOG_SOURCE, "Unknown vertex semantic '{}' at location {}", semantic, raw.location);
    }
    VertexInputDeclaration {
        semantic: semantic.to_string(),
        location: raw.location,
        value_type: vertex_value_type(&raw.name, &raw.input_type),
        per_instance,
    }
}

// ============================================================================
// Cross-stage merge
// ============================================================================

/// Merged declarations of all stages of one shader
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub vertex_inputs: Vec<VertexInputDeclaration>,
    pub uniform_buffers: Vec<Arc<ShaderUniformBufferDeclaration>>,
    pub resources: Vec<Arc<ShaderResourceDeclaration>>,
    pub push_constants: Vec<PushConstantDeclaration>,
}

fn merge_buffer(
    buffers: &mut Vec<ShaderUniformBufferDeclaration>,
    incoming: ShaderUniformBufferDeclaration,
) -> Result<()> {
    if let Some(existing) = buffers.iter_mut().find(|b| b.name() == incoming.name()) {
        if (existing.binding_set(), existing.binding_slot()) != (incoming.binding_set(), incoming.binding_slot()) {
            return Err(Error::Reflection(format!(
                "Uniform buffer '{}' is bound at set {} slot {} and at set {} slot {}",
                incoming.name(),
                existing.binding_set(),
                existing.binding_slot(),
                incoming.binding_set(),
                incoming.binding_slot()
            )));
        }
        if !existing.same_layout(&incoming) {
            return Err(Error::Reflection(format!(
                "Uniform buffer '{}' has different layouts across stages ({} vs {} bytes)",
                incoming.name(),
                existing.total_size(),
                incoming.total_size()
            )));
        }
        existing.add_stages(incoming.shader_stages());
        return Ok(());
    }

    if let Some(clash) = buffers.iter().find(|b| {
        b.binding_set() == incoming.binding_set() && b.binding_slot() == incoming.binding_slot()
    }) {
        return Err(Error::Reflection(format!(
            "Uniform buffers '{}' and '{}' both claim set {} slot {}",
            clash.name(),
            incoming.name(),
            incoming.binding_set(),
            incoming.binding_slot()
        )));
    }

    buffers.push(incoming);
    Ok(())
}

fn merge_resource(
    resources: &mut Vec<ShaderResourceDeclaration>,
    incoming: ShaderResourceDeclaration,
) -> Result<()> {
    if let Some(existing) = resources.iter_mut().find(|r| r.name == incoming.name) {
        if (existing.binding_set, existing.binding_slot) != (incoming.binding_set, incoming.binding_slot)
            || existing.kind != incoming.kind
            || existing.data_type != incoming.data_type
        {
            return Err(Error::Reflection(format!(
                "Resource '{}' is declared differently across stages",
                incoming.name
            )));
        }
        existing.shader_stages |= incoming.shader_stages;
        return Ok(());
    }

    if let Some(clash) = resources.iter().find(|r| {
        r.kind == incoming.kind
            && r.binding_set == incoming.binding_set
            && r.binding_slot == incoming.binding_slot
    }) {
        return Err(Error::Reflection(format!(
            "Resources '{}' and '{}' both claim set {} slot {}",
            clash.name, incoming.name, incoming.binding_set, incoming.binding_slot
        )));
    }

    resources.push(incoming);
    Ok(())
}

fn merge_push_constant(
    blocks: &mut Vec<PushConstantDeclaration>,
    incoming: PushConstantDeclaration,
) -> Result<()> {
    if let Some(existing) = blocks.iter_mut().find(|b| b.name == incoming.name) {
        if existing.size != incoming.size || existing.members != incoming.members {
            return Err(Error::Reflection(format!(
                "Push constant block '{}' has different layouts across stages",
                incoming.name
            )));
        }
        existing.shader_stages |= incoming.shader_stages;
        return Ok(());
    }
    blocks.push(incoming);
    Ok(())
}

impl ShaderReflection {
    /// Merge the reflections of every stage of one shader
    pub fn merge(stages: Vec<StageReflection>) -> Result<Self> {
        let mut vertex_inputs = Vec::new();
        let mut buffers = Vec::new();
        let mut resources = Vec::new();
        let mut push_constants = Vec::new();

        for stage in stages {
            if stage.stage == ShaderStage::Vertex {
                vertex_inputs = stage.vertex_inputs;
            }
            for buffer in stage.uniform_buffers {
                merge_buffer(&mut buffers, buffer)?;
            }
            for resource in stage.resources {
                merge_resource(&mut resources, resource)?;
            }
            if let Some(block) = stage.push_constant {
                merge_push_constant(&mut push_constants, block)?;
            }
        }

        Ok(Self {
            vertex_inputs,
            uniform_buffers: buffers.into_iter().map(Arc::new).collect(),
            resources: resources.into_iter().map(Arc::new).collect(),
            push_constants,
        })
    }

    pub fn uniform_buffer(&self, name: &str) -> Option<&Arc<ShaderUniformBufferDeclaration>> {
        self.uniform_buffers.iter().find(|b| b.name() == name)
    }

    pub fn buffers_with_role(&self, role: BufferRole) -> impl Iterator<Item = &Arc<ShaderUniformBufferDeclaration>> + '_ {
        self.uniform_buffers.iter().filter(move |b| b.role() == role)
    }

    /// Texture-taking resource with the given name
    pub fn texture_resource(&self, name: &str) -> Option<&Arc<ShaderResourceDeclaration>> {
        self.resources.iter().find(|r| r.name == name && r.takes_texture())
    }

    /// Vertex layout: per-vertex inputs in binding 0, per-instance in binding 1
    pub fn vertex_layout(&self) -> VertexLayout {
        let mut layout = VertexLayout::default();
        for (binding, per_instance, input_rate) in
            [(0u32, false, VertexInputRate::Vertex), (1u32, true, VertexInputRate::Instance)]
        {
            let mut stride = 0u32;
            for input in self.vertex_inputs.iter().filter(|i| i.per_instance == per_instance) {
                let Some(format) = input.value_type.buffer_format() else {
                    continue;
                };
                layout.attributes.push(VertexAttribute {
                    location: input.location,
                    binding,
                    format,
                    offset: stride,
                });
                stride += format.size_bytes();
            }
            if stride > 0 {
                layout.bindings.push(VertexBinding { binding, stride, input_rate });
            }
        }
        layout
    }

    /// Binding layout for pipeline creation
    pub fn binding_slots(&self) -> Vec<BindingSlotDesc> {
        let buffers = self.uniform_buffers.iter().map(|b| BindingSlotDesc {
            set: b.binding_set(),
            binding: b.binding_slot(),
            binding_type: BindingType::UniformBuffer,
            stage_flags: b.shader_stages(),
        });
        let resources = self.resources.iter().map(|r| BindingSlotDesc {
            set: r.binding_set,
            binding: r.binding_slot,
            binding_type: match r.kind {
                ResourceKind::Texture => BindingType::SampledTexture,
                ResourceKind::Sampler => BindingType::Sampler,
                ResourceKind::CombinedImageSampler => BindingType::CombinedImageSampler,
            },
            stage_flags: r.shader_stages,
        });
        buffers.chain(resources).collect()
    }

    pub fn push_constant_ranges(&self) -> Vec<PushConstantRange> {
        self.push_constants
            .iter()
            .map(|block| PushConstantRange { stages: block.shader_stages, offset: 0, size: block.size })
            .collect()
    }
}

#[cfg(test)]
#[path = "reflection_tests.rs"]
mod tests;
