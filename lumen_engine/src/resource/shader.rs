/// Shader asset
///
/// A Shader owns everything derived from one `.shader` file: the compiled
/// stage modules, the merged reflection, the pipeline, the mapped buffers of
/// its shader-role and global uniform buffers, and its own property cache.
/// Material-role buffers are only described here; every Material allocates
/// its own copy.
///
/// Lifecycle:
///
/// ```text
/// Unbound --compile--> Compiling --ok--> Reflected --bind--> Bound
///                          |                  ^                |
///                          +--error--> Unbound +---recompile---+
/// ```
///
/// A failed compile leaves nothing half-built behind: the shader is reset
/// to `Unbound`.

use std::sync::Arc;
use slotmap::new_key_type;
use crate::context::RenderContext;
use crate::asset::vfs::virtual_extension;
use crate::error::{Error, Result};
use crate::graphics_device::{
    CommandList, Pipeline, PipelineDesc, PrimitiveTopology, Shader as GpuShader, ShaderDesc, ShaderStage,
};
use crate::resource::mapped_uniform_buffer::MappedUniformBuffer;
use crate::resource::shader_maps::{update_buffers, CachedShaderMaps, PropertyKind, PropertyMaps};
use crate::resource::texture::TextureKind;
use crate::shader::compiler::ENTRY_POINT;
use crate::shader::declaration::{BufferRole, DataType, ShaderUniformBufferDeclaration};
use crate::shader::parser::{self, PipelineState, DEFAULT_QUEUE};
use crate::shader::reflection::{reflect_stage, ShaderReflection};

const LOG_SOURCE: &str = "lumen::Shader";

/// Required extension of shader files
pub const SHADER_EXTENSION: &str = "shader";

new_key_type! {
    /// Key of a shader in the asset manager
    pub struct ShaderKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderState {
    Unbound,
    Compiling,
    Reflected,
    Bound,
}

/// Called after a successful hot reload
pub type ReloadCallback = Box<dyn FnMut(&Shader) + Send>;

/// True if a texture of `kind` can feed a resource of `data_type`
pub fn texture_kind_matches(data_type: DataType, kind: TextureKind) -> bool {
    match kind {
        TextureKind::Tex2D => matches!(data_type, DataType::Texture2D | DataType::Texture1D),
        TextureKind::Cubemap => data_type == DataType::TextureCubemap,
    }
}

/// Everything a successful compile produces
struct Compiled {
    pipeline_state: PipelineState,
    queue: i32,
    includes: Vec<String>,
    reflection: ShaderReflection,
    modules: Vec<Arc<dyn GpuShader>>,
    pipeline: Arc<dyn Pipeline>,
    buffers: Vec<MappedUniformBuffer>,
}

pub struct Shader {
    name: String,
    state: ShaderState,
    source_path: Option<String>,
    pipeline_state: PipelineState,
    queue: i32,
    includes: Vec<String>,
    reflection: ShaderReflection,
    // Buffers before modules/pipeline: released first
    buffers: Vec<MappedUniformBuffer>,
    pipeline: Option<Arc<dyn Pipeline>>,
    modules: Vec<Arc<dyn GpuShader>>,
    maps: PropertyMaps,
    on_reload: Option<ReloadCallback>,
}

impl Shader {
    /// Empty, unbound shader
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ShaderState::Unbound,
            source_path: None,
            pipeline_state: PipelineState::default(),
            queue: DEFAULT_QUEUE,
            includes: Vec::new(),
            reflection: ShaderReflection::default(),
            buffers: Vec::new(),
            pipeline: None,
            modules: Vec::new(),
            maps: PropertyMaps::default(),
            on_reload: None,
        }
    }

    /// Load, compile and reflect a `.shader` file
    pub fn from_file(ctx: &RenderContext, virtual_path: &str) -> Result<Self> {
        let mut shader = Shader::new(virtual_path);
        shader.compile_file(ctx, virtual_path)?;
        Ok(shader)
    }

    // ===== COMPILATION =====

    /// (Re)compile from a `.shader` file
    pub fn compile_file(&mut self, ctx: &RenderContext, virtual_path: &str) -> Result<()> {
        if virtual_extension(virtual_path).as_deref() != Some(SHADER_EXTENSION) {
            self.reset();
            return Err(Error::Parse(format!(
                "'{}' is not a .{} file",
                virtual_path, SHADER_EXTENSION
            )));
        }
        let source = match ctx.vfs().read_to_string(virtual_path) {
            Ok(source) => source,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        self.compile_source(ctx, &source, virtual_path)?;
        self.source_path = Some(virtual_path.to_string());
        Ok(())
    }

    /// (Re)compile from source text; `origin` anchors relative includes
    pub fn compile_source(&mut self, ctx: &RenderContext, source: &str, origin: &str) -> Result<()> {
        self.state = ShaderState::Compiling;
        match Self::build(ctx, source, origin) {
            Ok(compiled) => {
                self.pipeline_state = compiled.pipeline_state;
                self.queue = compiled.queue;
                self.includes = compiled.includes;
                self.reflection = compiled.reflection;
                self.buffers = compiled.buffers;
                self.modules = compiled.modules;
                self.pipeline = Some(compiled.pipeline);
                self.maps.clear();
                self.state = ShaderState::Reflected;
                crate::engine_debug!(
                    LOG_SOURCE,
                    "'{}' reflected: {} uniform buffers, {} resources, {} vertex inputs",
                    self.name,
                    self.reflection.uniform_buffers.len(),
                    self.reflection.resources.len(),
                    self.reflection.vertex_inputs.len()
                );
                Ok(())
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn build(ctx: &RenderContext, source: &str, origin: &str) -> Result<Compiled> {
        let parsed = parser::parse(source, origin, ctx.api(), &**ctx.vfs())?;

        let mut binaries = Vec::new();
        let mut stages = Vec::new();
        for (stage, stage_source) in parsed.stages() {
            let binary = ctx.compiler().compile_source(stage_source, stage)?;
            stages.push(reflect_stage(ctx.reflector(), &binary, stage)?);
            binaries.push((stage, binary));
        }
        let reflection = ShaderReflection::merge(stages)?;

        let mut device = ctx.lock_device()?;
        let mut modules = Vec::with_capacity(binaries.len());
        for (stage, binary) in &binaries {
            modules.push(device.create_shader(ShaderDesc { code: binary, stage: *stage, entry_point: ENTRY_POINT })?);
        }
        let module_for = |stage: ShaderStage| modules.iter().find(|m| m.stage() == stage).cloned();
        let vertex_shader = module_for(ShaderStage::Vertex)
            .ok_or_else(|| Error::InvalidResource("Shader without a vertex module".to_string()))?;

        let pipeline = device.create_pipeline(PipelineDesc {
            vertex_shader,
            fragment_shader: module_for(ShaderStage::Fragment),
            geometry_shader: module_for(ShaderStage::Geometry),
            vertex_layout: reflection.vertex_layout(),
            topology: PrimitiveTopology::TriangleList,
            push_constant_ranges: reflection.push_constant_ranges(),
            bindings: reflection.binding_slots(),
            rasterization: parsed.state.rasterization,
            depth_stencil: parsed.state.depth_stencil,
            color_blend: parsed.state.color_blend,
            multisample: parsed.state.multisample,
        })?;

        let mut buffers = Vec::new();
        for declaration in reflection.uniform_buffers.iter().filter(|b| b.role() != BufferRole::Material) {
            buffers.push(MappedUniformBuffer::new(Arc::clone(declaration), &mut *device)?);
        }

        Ok(Compiled {
            pipeline_state: parsed.state,
            queue: parsed.queue,
            includes: parsed.includes,
            reflection,
            modules,
            pipeline,
            buffers,
        })
    }

    /// Drop every compiled artefact and return to `Unbound`
    fn reset(&mut self) {
        self.buffers.clear();
        self.pipeline = None;
        self.modules.clear();
        self.reflection = ShaderReflection::default();
        self.includes.clear();
        self.maps.clear();
        self.state = ShaderState::Unbound;
    }

    // ===== BINDING =====

    /// Flush and bind the pipeline and every shader-owned buffer
    pub fn bind(&mut self, cmd: &mut dyn CommandList) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| Error::InvalidResource(format!("Shader '{}' is not compiled", self.name)))?;
        cmd.bind_pipeline(pipeline)?;
        for buffer in &mut self.buffers {
            buffer.bind(cmd)?;
        }
        self.state = ShaderState::Bound;
        Ok(())
    }

    // ===== RELOAD CALLBACK =====

    pub fn set_reload_callback(&mut self, callback: impl FnMut(&Shader) + Send + 'static) {
        self.on_reload = Some(Box::new(callback));
    }

    pub(crate) fn take_reload_callback(&mut self) -> Option<ReloadCallback> {
        self.on_reload.take()
    }

    /// Install `callback` and run it
    pub(crate) fn adopt_reload_callback(&mut self, callback: Option<ReloadCallback>) {
        if let Some(mut callback) = callback {
            callback(self);
            self.on_reload = Some(callback);
        }
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ShaderState {
        self.state
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.state, ShaderState::Reflected | ShaderState::Bound)
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Files pulled in through `#include`
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn queue(&self) -> i32 {
        self.queue
    }

    pub fn pipeline_state(&self) -> &PipelineState {
        &self.pipeline_state
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    pub fn pipeline(&self) -> Option<&Arc<dyn Pipeline>> {
        self.pipeline.as_ref()
    }

    /// Shader-role and global buffers owned by this shader
    pub fn buffers(&self) -> &[MappedUniformBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, name: &str) -> Option<&MappedUniformBuffer> {
        self.buffers.iter().find(|b| b.name() == name)
    }

    /// Layouts every Material using this shader instantiates
    pub fn material_declarations(&self) -> Vec<Arc<ShaderUniformBufferDeclaration>> {
        self.reflection.buffers_with_role(BufferRole::Material).cloned().collect()
    }
}

impl CachedShaderMaps for Shader {
    fn log_source(&self) -> &str {
        LOG_SOURCE
    }

    fn owner_name(&self) -> &str {
        &self.name
    }

    fn property_maps(&self) -> &PropertyMaps {
        &self.maps
    }

    fn property_maps_mut(&mut self) -> &mut PropertyMaps {
        &mut self.maps
    }

    fn has_shader_member(&self, name: &str, kind: PropertyKind) -> bool {
        self.buffers
            .iter()
            .filter_map(|b| b.declaration().member(name))
            .any(|m| kind.accepts(m.data_type))
    }

    fn has_shader_resource(&self, name: &str, kind: TextureKind) -> bool {
        self.reflection
            .texture_resource(name)
            .map_or(false, |r| texture_kind_matches(r.data_type, kind))
    }

    fn update_shader_member(&mut self, name: &str, kind: Option<PropertyKind>, bytes: &[u8]) -> bool {
        update_buffers(&mut self.buffers, name, kind, bytes)
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
