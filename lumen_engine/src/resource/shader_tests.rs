//! Unit tests for the Shader asset lifecycle

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use crate::error::Error;
use crate::graphics_device::{CullMode, GraphicsApi, HeadlessCommandList, RecordedCommand};
use crate::resource::shader::{Shader, ShaderState};
use crate::resource::shader_maps::CachedShaderMaps;
use crate::resource::texture::TextureKind;
use crate::shader::parser::QUEUE_TRANSPARENT;
use crate::test_support::{shader_source, standard_reflector, TestEnv, COMPILE_ERROR};

fn env() -> TestEnv {
    TestEnv::new(standard_reflector(GraphicsApi::Vulkan))
}

fn lit_source() -> String {
    shader_source(
        &["MARK_INPUTS", "MARK_MATERIAL", "MARK_GLOBAL"],
        &["MARK_MATERIAL", "MARK_SHADER", "MARK_TEX"],
    )
}

// ============================================================================
// COMPILATION
// ============================================================================

#[test]
fn test_compile_file_reflects_everything() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());

    let shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();

    assert_eq!(shader.state(), ShaderState::Reflected);
    assert!(shader.is_compiled());
    assert_eq!(shader.source_path(), Some("/shaders/lit.shader"));
    assert_eq!(shader.reflection().uniform_buffers.len(), 3);
    assert_eq!(shader.reflection().vertex_inputs.len(), 2);
    assert_eq!(env.counters.shaders_created(), 2);
    assert!(shader.pipeline().is_some());
    assert_eq!(env.counters.pipelines_created(), 1);
}

#[test]
fn test_material_buffers_are_not_shader_owned() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();

    let owned: Vec<&str> = shader.buffers().iter().map(|b| b.name()).collect();
    assert_eq!(owned, vec!["Camera", "ShaderParams"]);
    let material: Vec<String> = shader.material_declarations().iter().map(|d| d.name().to_string()).collect();
    assert_eq!(material, vec!["MaterialBlock".to_string()]);
}

#[test]
fn test_pipeline_state_and_queue() {
    let env = env();
    let source = lit_source().replace("#vulkan\n", "#vulkan\n#cull none\n#queue transparent\n");
    env.write("/shaders/glass.shader", source);

    let shader = Shader::from_file(&env.context, "/shaders/glass.shader").unwrap();
    assert_eq!(shader.queue(), QUEUE_TRANSPARENT);
    assert_eq!(shader.pipeline_state().rasterization.cull_mode, CullMode::None);
}

#[test]
fn test_includes_are_recorded_and_reflected() {
    let env = env();
    env.write("/shaders/common.glsl", "#define MARK_SHADER\n");
    let source = "#vulkan\n#shader vertex\nvoid main() {}\n#shader fragment\n#include \"common.glsl\"\nvoid main() {}\n";
    env.write("/shaders/inc.shader", source);

    let shader = Shader::from_file(&env.context, "/shaders/inc.shader").unwrap();
    assert_eq!(shader.includes(), &["/shaders/common.glsl".to_string()]);
    assert!(shader.buffer("ShaderParams").is_some());
}

#[test]
fn test_wrong_extension_is_parse_error() {
    let env = env();
    env.write("/shaders/lit.glsl", lit_source());

    let mut shader = Shader::new("lit");
    let err = shader.compile_file(&env.context, "/shaders/lit.glsl").unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(shader.state(), ShaderState::Unbound);
}

#[test]
fn test_missing_file_is_io_error() {
    let env = env();
    let err = Shader::from_file(&env.context, "/shaders/none.shader").err().unwrap();
    assert!(err.is_io());
}

#[test]
fn test_compile_error_resets_to_unbound() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let mut shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();

    let broken = shader_source(&[COMPILE_ERROR], &[]);
    let err = shader.compile_source(&env.context, &broken, "/shaders/lit.shader").unwrap_err();

    assert!(matches!(err, Error::Compilation(_)));
    assert_eq!(shader.state(), ShaderState::Unbound);
    assert!(shader.pipeline().is_none());
    assert!(shader.buffers().is_empty());
    assert!(shader.reflection().uniform_buffers.is_empty());
}

#[test]
fn test_missing_api_guard_is_parse_error() {
    let env = env();
    let mut shader = Shader::new("inline");
    let err = shader.compile_source(&env.context, "#shader vertex\nvoid main() {}\n", "/inline.shader").unwrap_err();
    assert!(matches!(err, Error::Parse(ref msg) if msg.contains("No API specification before a #shader")));
}

#[test]
fn test_cross_stage_conflict_is_reflection_error() {
    let env = env();
    let source = shader_source(&["MARK_MATERIAL"], &["MARK_CONFLICT"]);
    let mut shader = Shader::new("conflict");
    let err = shader.compile_source(&env.context, &source, "/conflict.shader").unwrap_err();
    assert!(matches!(err, Error::Reflection(_)));
    assert_eq!(shader.state(), ShaderState::Unbound);
}

#[test]
fn test_stage_binaries_are_cached() {
    let env = env();
    let source = lit_source();
    let mut first = Shader::new("a");
    first.compile_source(&env.context, &source, "/a.shader").unwrap();
    let mut second = Shader::new("b");
    second.compile_source(&env.context, &source, "/b.shader").unwrap();

    assert_eq!(env.compiler.compile_count(), 2);
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn test_shader_properties_write_owned_buffers() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let mut shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();

    shader.set_float("time", 2.5);
    shader.set_float("roughness", 0.5);

    assert_eq!(shader.get_float("time"), 2.5);
    assert_eq!(shader.buffer("ShaderParams").unwrap().member_bytes("time").unwrap(), &2.5f32.to_ne_bytes());
    // Material-role members are not settable on the shader
    assert!(!shader.property_maps().floats.contains_key("roughness"));
}

#[test]
fn test_recompile_clears_caches() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let mut shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();
    shader.set_float("time", 1.0);

    shader.compile_file(&env.context, "/shaders/lit.shader").unwrap();

    assert!(shader.property_maps().is_empty());
    assert_eq!(shader.buffer("ShaderParams").unwrap().member_bytes("time").unwrap(), &[0, 0, 0, 0]);
}

#[test]
fn test_texture_resources_by_kind() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();

    assert!(shader.has_shader_resource("colorMap", TextureKind::Tex2D));
    assert!(!shader.has_shader_resource("colorMap", TextureKind::Cubemap));
    assert!(shader.has_shader_resource("sky", TextureKind::Cubemap));
    assert!(!shader.has_shader_resource("normalMap", TextureKind::Tex2D));
}

// ============================================================================
// BINDING
// ============================================================================

#[test]
fn test_bind_flushes_and_binds() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let mut shader = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();
    let mut cmd = HeadlessCommandList::new();

    shader.bind(&mut cmd).unwrap();

    assert_eq!(shader.state(), ShaderState::Bound);
    assert_eq!(cmd.commands()[0], RecordedCommand::BindPipeline);
    assert!(cmd.commands().contains(&RecordedCommand::BindUniformBuffer { set: 0, slot: 1, size: 16 }));
    assert!(cmd.commands().contains(&RecordedCommand::BindUniformBuffer { set: 0, slot: 2, size: 64 }));
    assert!(shader.buffers().iter().all(|b| b.is_up_to_date()));
}

#[test]
fn test_bind_unbound_shader_fails() {
    let mut shader = Shader::new("empty");
    let mut cmd = HeadlessCommandList::new();
    assert!(matches!(shader.bind(&mut cmd), Err(Error::InvalidResource(_))));
}

// ============================================================================
// RELOAD CALLBACK
// ============================================================================

#[test]
fn test_reload_callback_moves_to_new_shader() {
    let env = env();
    env.write("/shaders/lit.shader", lit_source());
    let mut old = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    old.set_reload_callback(move |shader: &Shader| {
        assert!(shader.is_compiled());
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let mut fresh = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();
    fresh.adopt_reload_callback(old.take_reload_callback());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut newer = Shader::from_file(&env.context, "/shaders/lit.shader").unwrap();
    newer.adopt_reload_callback(fresh.take_reload_callback());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
