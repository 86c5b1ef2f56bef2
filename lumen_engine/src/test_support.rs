/// Scripted backends and fixtures shared by the unit tests
///
/// `ScriptedCompiler` "compiles" a stage by returning its source text, so
/// `ScriptedReflector` can pick canned reflection trees by looking for
/// marker strings in the binary. Tests then drive layouts (and layout
/// changes for hot reload) just by editing shader sources on disk.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use crate::config::EngineConfig;
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsApi, HeadlessCounters, HeadlessGraphicsDevice, ShaderStage};
use crate::shader::compiler::{CompileOptions, StageCompiler};
use crate::shader::reflection::{
    ImageDim, RawResource, RawResourceKind, RawStageReflection, RawUniformBuffer, RawVertexInput,
    ReflectedMember, ReflectedMemberType, ScalarKind, ShaderReflector,
};

/// Marker making `ScriptedCompiler` fail
pub(crate) const COMPILE_ERROR: &str = "COMPILE_ERROR";

/// Marker making `ScriptedReflector` fail
pub(crate) const REFLECT_ERROR: &str = "REFLECT_ERROR";

// ============================================================================
// Scripted compiler
// ============================================================================

pub(crate) struct ScriptedCompiler {
    api: GraphicsApi,
    compiles: AtomicUsize,
}

impl ScriptedCompiler {
    pub(crate) fn new(api: GraphicsApi) -> Self {
        Self { api, compiles: AtomicUsize::new(0) }
    }

    pub(crate) fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl StageCompiler for ScriptedCompiler {
    fn api(&self) -> GraphicsApi {
        self.api
    }

    fn compile(&self, source: &str, _entry_point: &str, stage: ShaderStage, _options: &CompileOptions) -> Result<Vec<u8>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if source.contains(COMPILE_ERROR) {
            return Err(Error::Compilation(format!("{} stage: unexpected token '{}'", stage, COMPILE_ERROR)));
        }
        Ok(source.as_bytes().to_vec())
    }
}

// ============================================================================
// Scripted reflector
// ============================================================================

struct Rule {
    stage: Option<ShaderStage>,
    marker: String,
    raw: RawStageReflection,
}

/// Reflector returning the union of every rule whose marker is in the binary
pub(crate) struct ScriptedReflector {
    api: GraphicsApi,
    rules: Vec<Rule>,
}

impl ScriptedReflector {
    pub(crate) fn new(api: GraphicsApi) -> Self {
        Self { api, rules: Vec::new() }
    }

    /// Rule applying to every stage
    pub(crate) fn with(mut self, marker: &str, raw: RawStageReflection) -> Self {
        self.rules.push(Rule { stage: None, marker: marker.to_string(), raw });
        self
    }

    /// Rule applying to one stage only
    pub(crate) fn with_stage(mut self, stage: ShaderStage, marker: &str, raw: RawStageReflection) -> Self {
        self.rules.push(Rule { stage: Some(stage), marker: marker.to_string(), raw });
        self
    }
}

impl ShaderReflector for ScriptedReflector {
    fn api(&self) -> GraphicsApi {
        self.api
    }

    fn reflect(&self, binary: &[u8], stage: ShaderStage) -> Result<RawStageReflection> {
        let text = String::from_utf8_lossy(binary);
        if text.contains(REFLECT_ERROR) {
            return Err(Error::Reflection(format!("{} stage: unreadable binary", stage)));
        }

        let mut out = RawStageReflection::default();
        for rule in &self.rules {
            if rule.stage.map_or(true, |s| s == stage) && text.contains(rule.marker.as_str()) {
                out.uniform_buffers.extend(rule.raw.uniform_buffers.iter().cloned());
                out.resources.extend(rule.raw.resources.iter().cloned());
                out.vertex_inputs.extend(rule.raw.vertex_inputs.iter().cloned());
                out.push_constants.extend(rule.raw.push_constants.iter().cloned());
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Raw tree builders
// ============================================================================

fn member(name: &str, offset: u32, size: u32, member_type: ReflectedMemberType) -> ReflectedMember {
    ReflectedMember { name: name.to_string(), offset, size: Some(size), member_type }
}

pub(crate) fn float_member(name: &str, offset: u32) -> ReflectedMember {
    member(name, offset, 4, ReflectedMemberType::Scalar(ScalarKind::Float32))
}

pub(crate) fn int_member(name: &str, offset: u32) -> ReflectedMember {
    member(name, offset, 4, ReflectedMemberType::Scalar(ScalarKind::Int32))
}

pub(crate) fn vec4_member(name: &str, offset: u32) -> ReflectedMember {
    member(name, offset, 16, ReflectedMemberType::Vector { kind: ScalarKind::Float32, components: 4 })
}

pub(crate) fn mat4_member(name: &str, offset: u32) -> ReflectedMember {
    member(name, offset, 64, ReflectedMemberType::Matrix { kind: ScalarKind::Float32, columns: 4, rows: 4 })
}

pub(crate) fn uniform_buffer(name: &str, binding: u32, size: u32, members: Vec<ReflectedMember>) -> RawUniformBuffer {
    RawUniformBuffer { name: name.to_string(), set: 0, binding, size: Some(size), members }
}

pub(crate) fn texture_2d(name: &str, binding: u32) -> RawResource {
    RawResource {
        name: name.to_string(),
        set: 0,
        binding,
        kind: RawResourceKind::CombinedImageSampler(ImageDim::D2),
    }
}

pub(crate) fn cubemap(name: &str, binding: u32) -> RawResource {
    RawResource {
        name: name.to_string(),
        set: 0,
        binding,
        kind: RawResourceKind::CombinedImageSampler(ImageDim::Cube),
    }
}

pub(crate) fn vertex_input(name: &str, location: u32, components: u32) -> RawVertexInput {
    RawVertexInput {
        name: name.to_string(),
        location,
        input_type: ReflectedMemberType::Vector { kind: ScalarKind::Float32, components },
    }
}

pub(crate) fn buffers(list: Vec<RawUniformBuffer>) -> RawStageReflection {
    RawStageReflection { uniform_buffers: list, ..Default::default() }
}

// ============================================================================
// Standard layouts
// ============================================================================

/// Shader source whose stages carry the given reflection markers
pub(crate) fn shader_source(vertex_markers: &[&str], fragment_markers: &[&str]) -> String {
    let mut source = String::from("#vulkan\n#shader vertex\n");
    for marker in vertex_markers {
        source.push_str(&format!("#define {}\n", marker));
    }
    source.push_str("void main() {}\n#shader fragment\n");
    for marker in fragment_markers {
        source.push_str(&format!("#define {}\n", marker));
    }
    source.push_str("void main() {}\n");
    source
}

/// Reflector knowing the layouts used across the unit tests
///
/// - `MARK_MATERIAL`: MaterialBlock { vec4 tint; float roughness; int flags; } (32 bytes, binding 0)
/// - `MARK_MOVED`: MaterialBlock { float roughness; vec4 tint at 16; } (32 bytes, binding 0)
/// - `MARK_X0` / `MARK_X4`: MaterialBlock { float x; } at offset 0 / 4 (16 bytes, binding 0)
/// - `MARK_PBR`: PbrMaterial with the PBR property set plus colorMap/normalMap
/// - `MARK_SHADER`: ShaderParams { float time; } (binding 1)
/// - `MARK_GLOBAL`: Camera { mat4 viewProj; } (binding 2)
/// - `MARK_TEX`: colorMap (2D, binding 3) and sky (cube, binding 4)
/// - `MARK_INPUTS`: POSITION (loc 0) and TEXCOORD0 (loc 1) vertex inputs
/// - `MARK_CONFLICT`: fragment-only MaterialBlock with a different layout
pub(crate) fn standard_reflector(api: GraphicsApi) -> ScriptedReflector {
    let textures = RawStageReflection {
        resources: vec![texture_2d("colorMap", 3), cubemap("sky", 4)],
        ..Default::default()
    };
    let pbr = RawStageReflection {
        uniform_buffers: vec![uniform_buffer(
            "PbrMaterial",
            0,
            48,
            vec![
                vec4_member("color", 0),
                float_member("roughness", 16),
                float_member("metallic", 20),
                int_member("useColorMap", 24),
                int_member("useNormalMap", 28),
                int_member("useRoughnessMap", 32),
                int_member("useMetallicMap", 36),
            ],
        )],
        resources: vec![texture_2d("colorMap", 3), texture_2d("normalMap", 5)],
        ..Default::default()
    };
    let inputs = RawStageReflection {
        vertex_inputs: vec![vertex_input("POSITION", 0, 3), vertex_input("TEXCOORD0", 1, 2)],
        ..Default::default()
    };

    ScriptedReflector::new(api)
        .with(
            "MARK_MATERIAL",
            buffers(vec![uniform_buffer(
                "MaterialBlock",
                0,
                32,
                vec![vec4_member("tint", 0), float_member("roughness", 16), int_member("flags", 20)],
            )]),
        )
        .with(
            "MARK_MOVED",
            buffers(vec![uniform_buffer(
                "MaterialBlock",
                0,
                32,
                vec![float_member("roughness", 0), vec4_member("tint", 16)],
            )]),
        )
        .with("MARK_X0", buffers(vec![uniform_buffer("MaterialBlock", 0, 16, vec![float_member("x", 0)])]))
        .with(
            "MARK_X4",
            buffers(vec![uniform_buffer(
                "MaterialBlock",
                0,
                16,
                vec![float_member("pad", 0), float_member("x", 4)],
            )]),
        )
        .with("MARK_PBR", pbr)
        .with("MARK_SHADER", buffers(vec![uniform_buffer("ShaderParams", 1, 16, vec![float_member("time", 0)])]))
        .with("MARK_GLOBAL", buffers(vec![uniform_buffer("Camera", 2, 64, vec![mat4_member("viewProj", 0)])]))
        .with("MARK_TEX", textures)
        .with("MARK_INPUTS", inputs)
        .with_stage(
            ShaderStage::Fragment,
            "MARK_CONFLICT",
            buffers(vec![uniform_buffer("MaterialBlock", 0, 64, vec![mat4_member("tint", 0)])]),
        )
}

// ============================================================================
// Test environment
// ============================================================================

/// Temp asset root + headless device + scripted backends
pub(crate) struct TestEnv {
    pub(crate) dir: TempDir,
    pub(crate) config: EngineConfig,
    pub(crate) context: Arc<RenderContext>,
    pub(crate) counters: Arc<HeadlessCounters>,
    pub(crate) compiler: Arc<ScriptedCompiler>,
}

impl TestEnv {
    pub(crate) fn new(reflector: ScriptedReflector) -> Self {
        Self::with_config(reflector, |_| {})
    }

    pub(crate) fn with_config(reflector: ScriptedReflector, tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig {
            api: GraphicsApi::Vulkan,
            asset_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        tweak(&mut config);

        let device = HeadlessGraphicsDevice::new(config.api);
        let counters = device.counters();
        let compiler = Arc::new(ScriptedCompiler::new(config.api));
        let context = Arc::new(RenderContext::new(
            &config,
            Arc::new(Mutex::new(device)),
            compiler.clone(),
            Arc::new(reflector),
        )
        .unwrap());

        Self { dir, config, context, counters, compiler }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file under the virtual root
    pub(crate) fn write(&self, virtual_path: &str, contents: impl AsRef<[u8]>) {
        self.context.vfs().write(virtual_path, contents.as_ref()).unwrap();
    }
}
