/*!
# Lumen Engine - Vulkan Shader Toolchain

GLSL compilation and SPIR-V reflection for the Vulkan side of the Lumen
engine.

- **VulkanStageCompiler**: GLSL to SPIR-V through naga
- **VulkanShaderReflector**: SPIR-V reflection through spirq

Both plug into a `lumen_engine::lumen::RenderContext` next to the graphics
device.

```no_run
use std::sync::{Arc, Mutex};
use lumen_engine::graphics_device::HeadlessGraphicsDevice;
use lumen_engine::lumen::{EngineConfig, RenderContext};
use lumen_engine_vulkan::{VulkanShaderReflector, VulkanStageCompiler};

let config = EngineConfig::default();
let context = RenderContext::new(
    &config,
    Arc::new(Mutex::new(HeadlessGraphicsDevice::new(config.api))),
    Arc::new(VulkanStageCompiler::new()),
    Arc::new(VulkanShaderReflector::new()),
)?;
# Ok::<(), lumen_engine::lumen::Error>(())
```
*/

mod vulkan_compiler;
mod vulkan_reflector;

pub use vulkan_compiler::VulkanStageCompiler;
pub use vulkan_reflector::VulkanShaderReflector;
