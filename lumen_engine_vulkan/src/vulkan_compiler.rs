/// GLSL to SPIR-V stage compiler built on naga
///
/// Debug names are always emitted: reflection identifies buffers, members
/// and vertex inputs by name. The release profile skips naga's control-flow
/// uniformity analysis.

use lumen_engine::graphics_device::{GraphicsApi, ShaderStage};
use lumen_engine::lumen::{Error, Result};
use lumen_engine::shader::{CompileOptions, StageCompiler};
use naga::back::spv;
use naga::front::glsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

const LOG_SOURCE: &str = "lumen::vulkan::Compiler";

/// SPIR-V version of the emitted modules
const SPIRV_VERSION: (u8, u8) = (1, 3);

fn naga_stage(stage: ShaderStage) -> Result<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Ok(naga::ShaderStage::Vertex),
        ShaderStage::Fragment => Ok(naga::ShaderStage::Fragment),
        ShaderStage::Geometry => Err(Error::Compilation(
            "Geometry shaders are not supported by the GLSL toolchain".to_string(),
        )),
    }
}

#[derive(Debug, Default)]
pub struct VulkanStageCompiler;

impl VulkanStageCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl StageCompiler for VulkanStageCompiler {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn compile(&self, source: &str, entry_point: &str, stage: ShaderStage, options: &CompileOptions) -> Result<Vec<u8>> {
        if entry_point != "main" {
            return Err(Error::Compilation(format!(
                "GLSL entry point must be 'main', not '{}'",
                entry_point
            )));
        }

        let module = glsl::Frontend::default()
            .parse(&glsl::Options::from(naga_stage(stage)?), source)
            .map_err(|e| Error::Compilation(format!("{} stage: {:?}", stage, e)))?;

        let flags = if options.debug {
            ValidationFlags::all()
        } else {
            ValidationFlags::all() - ValidationFlags::CONTROL_FLOW_UNIFORMITY
        };
        let info = Validator::new(flags, Capabilities::all())
            .validate(&module)
            .map_err(|e| Error::Compilation(format!("{} stage failed validation: {:?}", stage, e)))?;

        let mut spv_options = spv::Options::default();
        spv_options.lang_version = SPIRV_VERSION;
        spv_options.flags.insert(spv::WriterFlags::DEBUG);

        let words = spv::write_vec(&module, &info, &spv_options, None)
            .map_err(|e| Error::Compilation(format!("{} stage: SPIR-V generation failed: {}", stage, e)))?;

        lumen_engine::engine_trace!(
            LOG_SOURCE,
            "{} stage compiled to {} SPIR-V words ({})",
            stage,
            words.len(),
            options.profile_name()
        );
        Ok(bytemuck::cast_slice(&words).to_vec())
    }
}
