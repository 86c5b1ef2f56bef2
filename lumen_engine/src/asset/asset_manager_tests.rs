//! Unit tests for the AssetManager

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use serial_test::serial;
use crate::asset::asset_manager::{AssetManager, SweepReport};
use crate::error::Error;
use crate::graphics_device::{Buffer, GraphicsApi, HeadlessCommandList, RecordedCommand, Texture as _};
use crate::lumen::log::{LogSeverity, MemoryLogger};
use crate::lumen::Engine;
use crate::resource::shader_maps::{CachedShaderMaps, Color32};
use crate::resource::texture::{TextureKind, TextureSource};
use crate::shader::parser::QUEUE_GEOMETRY;
use crate::test_support::{shader_source, standard_reflector, TestEnv, COMPILE_ERROR};

const QUAD_OBJ: &str = "\
o Quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

fn env() -> TestEnv {
    TestEnv::with_config(standard_reflector(GraphicsApi::Vulkan), |config| {
        config.hot_reload = true;
        config.worker_threads = 2;
    })
}

fn manager(env: &TestEnv) -> AssetManager {
    AssetManager::new(Arc::clone(&env.context), &env.config).unwrap()
}

fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();
    bytes
}

/// Push a file's timestamp into the future so the next poll sees a change
fn touch(env: &TestEnv, virtual_path: &str, seconds_ahead: u64) {
    let file = std::fs::File::options()
        .write(true)
        .open(env.context.vfs().resolve(virtual_path))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(seconds_ahead)).unwrap();
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ============================================================================
// FALLBACKS
// ============================================================================

#[test]
fn test_new_creates_fallbacks() {
    let env = env();
    let manager = manager(&env);
    let fallbacks = *manager.fallbacks();

    assert_eq!(manager.shader_count(), 1);
    assert_eq!(manager.material_count(), 1);
    assert_eq!(manager.texture_count(), 3);
    assert_eq!(manager.mesh_count(), 1);

    assert!(manager.shader(fallbacks.error_shader).unwrap().is_compiled());
    let error_material = manager.material(fallbacks.error_material).unwrap();
    assert_eq!(error_material.shader(), fallbacks.error_shader);

    assert_eq!(manager.texture(fallbacks.white_texture).unwrap().kind(), TextureKind::Tex2D);
    assert_eq!(manager.texture(fallbacks.flat_normal_texture).unwrap().kind(), TextureKind::Tex2D);
    assert_eq!(manager.texture(fallbacks.default_cubemap).unwrap().kind(), TextureKind::Cubemap);
    assert_eq!(manager.mesh(fallbacks.default_mesh).unwrap().index_count(), 36);
}

#[test]
fn test_error_shader_owns_its_parameters() {
    let env = env();
    let manager = manager(&env);
    let shader = manager.shader(manager.fallbacks().error_shader).unwrap();
    assert_eq!(shader.queue(), QUEUE_GEOMETRY);
    assert!(shader.material_declarations().is_empty());
}

// ============================================================================
// SHADERS
// ============================================================================

#[test]
fn test_shader_cached_by_normalized_path() {
    let env = env();
    env.write("/shaders/s.shader", shader_source(&["MARK_MATERIAL"], &["MARK_MATERIAL"]));
    let mut manager = manager(&env);
    let compiles = env.compiler.compile_count();

    let first = manager.load_shader("/shaders/s.shader");
    let second = manager.load_shader("shaders/./s.shader");
    assert_eq!(first, second);
    assert_ne!(first, manager.fallbacks().error_shader);
    assert_eq!(env.compiler.compile_count(), compiles + 2);
    assert_eq!(manager.shader_count(), 2);
}

#[test]
#[serial]
fn test_broken_shader_replaced_by_error_shader() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let env = env();
    env.write("/bad.shader", shader_source(&[COMPILE_ERROR], &[]));
    let mut manager = manager(&env);

    let key = manager.load_shader("/bad.shader");
    assert_eq!(key, manager.fallbacks().error_shader);
    assert!(logger.contains(LogSeverity::Warn, "'/bad.shader' replaced by the error shader"));
    assert!(matches!(manager.try_load_shader("/bad.shader"), Err(Error::Compilation(_))));

    Engine::reset_logger();
}

#[test]
fn test_missing_shader_is_io_error() {
    let env = env();
    let mut manager = manager(&env);
    assert!(manager.try_load_shader("/nope.shader").unwrap_err().is_io());
    assert_eq!(manager.load_shader("/nope.shader"), manager.fallbacks().error_shader);
}

#[test]
fn test_unload_shader_in_use_is_refused() {
    let env = env();
    env.write("/s.shader", shader_source(&["MARK_MATERIAL"], &[]));
    let mut manager = manager(&env);
    let shader = manager.load_shader("/s.shader");
    let material = manager.create_material("m", shader).unwrap();

    assert!(matches!(manager.unload_shader(shader), Err(Error::InvalidResource(_))));
    assert!(manager.unload_shader(manager.fallbacks().error_shader).is_err());

    assert!(manager.unload_material(material));
    manager.unload_shader(shader).unwrap();
    assert!(manager.shader(shader).is_none());

    // Reloading after unload compiles a fresh shader
    let again = manager.load_shader("/s.shader");
    assert_ne!(again, shader);
}

// ============================================================================
// MATERIALS
// ============================================================================

#[test]
fn test_material_file_end_to_end() {
    let env = env();
    env.write("/s.shader", shader_source(&["MARK_MATERIAL"], &["MARK_MATERIAL"]));
    env.write("/m.mat", r##"{"shader":"/s.shader","tint":"#FF0000FF"}"##);
    let mut manager = manager(&env);

    let key = manager.load_material("/m.mat");
    assert_ne!(key, manager.fallbacks().error_material);
    let material = manager.material(key).unwrap();
    assert_eq!(material.get_color("tint"), Color32::rgba(255, 0, 0, 255));
    assert_eq!(material.source_path(), Some("/m.mat"));

    let mut cmd = HeadlessCommandList::new();
    manager.bind_material(key, &mut cmd).unwrap();

    let buffer = manager.material(key).unwrap().buffer("MaterialBlock").unwrap();
    assert!(buffer.is_up_to_date());
    let gpu = buffer.gpu_buffer().read_back().unwrap();
    assert_eq!(floats(&gpu[..16]), vec![1.0f32, 0.0, 0.0, 1.0]);
    assert_eq!(cmd.commands()[0], RecordedCommand::BindPipeline);
}

#[test]
fn test_material_cached_by_path() {
    let env = env();
    env.write("/s.shader", shader_source(&["MARK_MATERIAL"], &[]));
    env.write("/m.mat", r#"{"shader":"/s.shader"}"#);
    let mut manager = manager(&env);
    assert_eq!(manager.load_material("/m.mat"), manager.load_material("m.mat"));
    assert_eq!(manager.material_count(), 2);
}

#[test]
fn test_material_values_typed_by_shader() {
    let env = env();
    env.write("/s.shader", shader_source(&["MARK_MATERIAL"], &[]));
    env.write("/m.mat", r#"{"shader":"/s.shader","roughness":1,"flags":3,"tint":[0.5,0.25]}"#);
    let mut manager = manager(&env);

    let material_key = manager.load_material("/m.mat");
    let material = manager.material(material_key).unwrap();
    approx::assert_relative_eq!(material.get_float("roughness"), 1.0);
    assert_eq!(material.get_int("flags"), 3);
    assert_eq!(material.get_vec4("tint"), glam::Vec4::new(0.5, 0.25, 0.0, 0.0));
}

#[test]
#[serial]
fn test_bad_property_keeps_default() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let env = env();
    env.write("/s.shader", shader_source(&["MARK_MATERIAL"], &[]));
    env.write("/m.mat", r##"{"shader":"/s.shader","tint":"#nothex","flags":2}"##);
    let mut manager = manager(&env);

    let key = manager.load_material("/m.mat");
    assert_ne!(key, manager.fallbacks().error_material);
    let material = manager.material(key).unwrap();
    assert_eq!(material.get_int("flags"), 2);
    assert!(logger.contains(LogSeverity::Warn, "property 'tint' ignored"));
    assert_eq!(material.buffer("MaterialBlock").unwrap().member_bytes("tint").unwrap(), &[0u8; 16]);

    Engine::reset_logger();
}

#[test]
fn test_invalid_material_file_gets_error_material() {
    let env = env();
    env.write("/broken.mat", "{ not json");
    env.write("/noshader.mat", r##"{"tint":"#FFFFFF"}"##);
    let mut manager = manager(&env);

    assert_eq!(manager.load_material("/broken.mat"), manager.fallbacks().error_material);
    assert!(matches!(manager.try_load_material("/broken.mat"), Err(Error::Parse(_))));
    assert!(matches!(manager.try_load_material("/noshader.mat"), Err(Error::Parse(_))));
    assert_eq!(manager.material_count(), 1);
}

#[test]
fn test_material_with_broken_shader_uses_error_shader() {
    let env = env();
    env.write("/bad.shader", shader_source(&[COMPILE_ERROR], &[]));
    env.write("/m.mat", r#"{"shader":"/bad.shader"}"#);
    let mut manager = manager(&env);

    let key = manager.load_material("/m.mat");
    assert_ne!(key, manager.fallbacks().error_material);
    assert_eq!(manager.material(key).unwrap().shader(), manager.fallbacks().error_shader);
}

#[test]
fn test_pbr_defaults_injected() {
    let env = env();
    env.write("/pbr.shader", shader_source(&["MARK_PBR"], &["MARK_PBR"]));
    env.write("/metal.pbrmat", r#"{"shader":"/pbr.shader","roughness":0.5}"#);
    env.write("/plain.mat", r#"{"shader":"/pbr.shader","roughness":0.5}"#);
    let mut manager = manager(&env);
    let flat_normal = manager.fallbacks().flat_normal_texture;

    let pbr_key = manager.load_material("/metal.pbrmat");
    let pbr = manager.material(pbr_key).unwrap();
    approx::assert_relative_eq!(pbr.get_float("roughness"), 0.5);
    approx::assert_relative_eq!(pbr.get_float("metallic"), 0.0);
    assert_eq!(pbr.get_color("color"), Color32::WHITE);
    assert_eq!(pbr.get_int("useNormalMap"), 0);
    assert_eq!(pbr.get_texture("normalMap"), Some(flat_normal));
    // colorMap has no default
    assert!(!pbr.property_maps().textures.contains_key("colorMap"));

    let plain_key = manager.load_material("/plain.mat");
    let plain = manager.material(plain_key).unwrap();
    assert!(plain.property_maps().textures.is_empty());
    assert!(!plain.property_maps().vec4s.contains_key("color"));
}

#[test]
fn test_material_textures_load_relative_to_file() {
    let env = env();
    env.write("/tex.shader", shader_source(&[], &["MARK_TEX"]));
    env.write("/materials/brick.png", png_bytes(2, 2, [200, 10, 10, 255]));
    for face in ["px", "nx", "py", "ny", "pz", "nz"] {
        env.write(&format!("/materials/sky/{}.png", face), png_bytes(4, 4, [0, 0, 255, 255]));
    }
    env.write(
        "/materials/m.mat",
        r#"{
            "shader": "/tex.shader",
            "colorMap": "brick.png",
            "sky": {
                "posX": "sky/px.png", "negX": "sky/nx.png",
                "posY": "sky/py.png", "negY": "sky/ny.png",
                "posZ": "sky/pz.png", "negZ": "sky/nz.png"
            }
        }"#,
    );
    let mut manager = manager(&env);

    let key = manager.load_material("/materials/m.mat");
    let material = manager.material(key).unwrap();
    let color_map = material.get_texture("colorMap").unwrap();
    let sky = material.get_texture("sky").unwrap();
    assert_eq!(
        manager.texture(color_map).unwrap().source(),
        &TextureSource::File("/materials/brick.png".to_string())
    );
    assert_eq!(sky.kind, TextureKind::Cubemap);
    assert_ne!(sky, manager.fallbacks().default_cubemap);
    assert_eq!(manager.texture_count(), 5);

    let mut cmd = HeadlessCommandList::new();
    manager.bind_material(key, &mut cmd).unwrap();
    assert!(cmd.commands().contains(&RecordedCommand::BindTexture { set: 0, slot: 3, width: 2, height: 2, cubemap: false }));
    assert!(cmd.commands().contains(&RecordedCommand::BindTexture { set: 0, slot: 4, width: 4, height: 4, cubemap: true }));
}

#[test]
fn test_missing_texture_falls_back_to_white() {
    let env = env();
    env.write("/tex.shader", shader_source(&[], &["MARK_TEX"]));
    env.write("/m.mat", r#"{"shader":"/tex.shader","colorMap":"missing.png"}"#);
    let mut manager = manager(&env);

    let material_key = manager.load_material("/m.mat");
    let material = manager.material(material_key).unwrap();
    assert_eq!(material.get_texture("colorMap"), Some(manager.fallbacks().white_texture));
    assert_eq!(manager.texture_count(), 3);
}

#[test]
fn test_bind_substitutes_fallback_textures() {
    let env = env();
    env.write("/tex.shader", shader_source(&[], &["MARK_TEX"]));
    env.write("/m.mat", r#"{"shader":"/tex.shader"}"#);
    let mut manager = manager(&env);
    let key = manager.load_material("/m.mat");

    let mut cmd = HeadlessCommandList::new();
    manager.bind_material(key, &mut cmd).unwrap();
    let textures: Vec<_> = cmd
        .commands()
        .iter()
        .filter(|command| matches!(command, RecordedCommand::BindTexture { .. }))
        .cloned()
        .collect();
    assert_eq!(textures.len(), 2);
    assert!(textures.contains(&RecordedCommand::BindTexture { set: 0, slot: 3, width: 1, height: 1, cubemap: false }));
    assert!(textures.contains(&RecordedCommand::BindTexture { set: 0, slot: 4, width: 1, height: 1, cubemap: true }));
}

#[test]
fn test_create_and_reassign_material() {
    let env = env();
    env.write("/a.shader", shader_source(&["MARK_MATERIAL"], &[]));
    env.write("/b.shader", shader_source(&["MARK_MOVED"], &[]));
    let mut manager = manager(&env);
    let a = manager.load_shader("/a.shader");
    let b = manager.load_shader("/b.shader");

    let key = manager.create_material("runtime", a).unwrap();
    manager.material_mut(key).unwrap().set_float("roughness", 0.3);
    assert_eq!(manager.material(key).unwrap().buffer("MaterialBlock").unwrap().declaration().member("roughness").unwrap().offset, 16);

    manager.set_material_shader(key, b).unwrap();
    let material = manager.material(key).unwrap();
    assert_eq!(material.shader(), b);
    assert!(material.property_maps().is_empty());
    assert_eq!(material.buffer("MaterialBlock").unwrap().declaration().member("roughness").unwrap().offset, 0);

    let bogus = manager.create_material("x", a).unwrap();
    assert!(manager.unload_material(bogus));
    assert!(matches!(manager.set_material_shader(bogus, a), Err(Error::InvalidResource(_))));
}

#[test]
fn test_sweep_unused() {
    let env = env();
    env.write("/tex.shader", shader_source(&[], &["MARK_TEX"]));
    env.write("/a.png", png_bytes(1, 1, [1, 2, 3, 255]));
    env.write("/a.mat", r#"{"shader":"/tex.shader","colorMap":"a.png"}"#);
    env.write("/b.mat", r#"{"shader":"/tex.shader"}"#);
    let mut manager = manager(&env);
    let a = manager.load_material("/a.mat");
    let b = manager.load_material("/b.mat");
    assert_eq!(manager.texture_count(), 4);

    let report = manager.sweep_unused(&[b]);
    assert_eq!(report, SweepReport { materials: 1, textures: 1 });
    assert!(manager.material(a).is_none());
    assert!(manager.material(b).is_some());
    assert!(manager.material(manager.fallbacks().error_material).is_some());
    assert_eq!(manager.texture_count(), 3);

    assert_eq!(manager.sweep_unused(&[b]), SweepReport::default());
    // The path cache forgot the evicted material
    assert_ne!(manager.load_material("/a.mat"), a);
}

// ============================================================================
// MESHES
// ============================================================================

#[test]
fn test_mesh_load_and_fallback() {
    let env = env();
    env.write("/quad.obj", QUAD_OBJ);
    env.write("/empty.obj", "# nothing here\n");
    let mut manager = manager(&env);

    let quad = manager.load_mesh("/quad.obj");
    assert_eq!(manager.mesh(quad).unwrap().index_count(), 6);
    assert_eq!(manager.load_mesh("quad.obj"), quad);
    assert_eq!(manager.load_mesh("/empty.obj"), manager.fallbacks().default_mesh);
    assert_eq!(manager.load_mesh("/missing.obj"), manager.fallbacks().default_mesh);

    assert!(!manager.unload_mesh(manager.fallbacks().default_mesh));
    assert!(manager.unload_mesh(quad));
    assert!(manager.mesh(quad).is_none());
}

// ============================================================================
// HOT RELOAD
// ============================================================================

#[test]
fn test_shader_reload_moves_material_values() {
    let env = env();
    env.write("/x.shader", shader_source(&["MARK_X0"], &[]));
    env.write("/m.mat", r#"{"shader":"/x.shader","x":0.5}"#);
    let mut manager = manager(&env);
    let shader = manager.load_shader("/x.shader");
    let material = manager.load_material("/m.mat");

    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reloads);
    manager.shader_mut(shader).unwrap().set_reload_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    env.write("/x.shader", shader_source(&["MARK_X4"], &[]));
    touch(&env, "/x.shader", 5);
    manager.update(Instant::now()).unwrap();

    assert_eq!(reloads.load(Ordering::SeqCst), 1);
    let buffer = manager.material(material).unwrap().buffer("MaterialBlock").unwrap();
    assert_eq!(buffer.declaration().member("x").unwrap().offset, 4);
    assert_eq!(floats(&buffer.cpu_bytes()[..8]), vec![0.0f32, 0.5]);
    approx::assert_relative_eq!(manager.material(material).unwrap().get_float("x"), 0.5);

    // The callback moved to the new shader and fires again
    env.write("/x.shader", shader_source(&["MARK_X0"], &[]));
    touch(&env, "/x.shader", 10);
    manager.update(Instant::now() + Duration::from_secs(1)).unwrap();
    assert_eq!(reloads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shader_reload_replays_runtime_material() {
    let env = env();
    env.write("/x.shader", shader_source(&["MARK_X0"], &[]));
    let mut manager = manager(&env);
    let shader = manager.load_shader("/x.shader");
    let material = manager.create_material("runtime", shader).unwrap();
    manager.material_mut(material).unwrap().set_float("x", 0.25);

    env.write("/x.shader", shader_source(&["MARK_X4"], &[]));
    assert!(manager.reload_shader(shader).unwrap());

    let buffer = manager.material(material).unwrap().buffer("MaterialBlock").unwrap();
    assert_eq!(buffer.member_bytes("x").unwrap(), &0.25f32.to_le_bytes());
    assert_eq!(buffer.declaration().member("x").unwrap().offset, 4);
}

#[test]
fn test_include_change_triggers_reload() {
    let env = env();
    env.write("/shaders/common.glsl", "#define MARK_X0\n");
    env.write(
        "/shaders/inc.shader",
        "#vulkan\n#shader vertex\n#include \"common.glsl\"\nvoid main() {}\n#shader fragment\nvoid main() {}\n",
    );
    let mut manager = manager(&env);
    let shader = manager.load_shader("/shaders/inc.shader");
    let material = manager.create_material("m", shader).unwrap();

    env.write("/shaders/common.glsl", "#define MARK_X4\n");
    touch(&env, "/shaders/common.glsl", 5);
    manager.update(Instant::now()).unwrap();

    let buffer = manager.material(material).unwrap().buffer("MaterialBlock").unwrap();
    assert_eq!(buffer.declaration().member("x").unwrap().offset, 4);
}

#[test]
#[serial]
fn test_failed_reload_keeps_previous_shader() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let env = env();
    env.write("/x.shader", shader_source(&["MARK_X0"], &[]));
    let mut manager = manager(&env);
    let shader = manager.load_shader("/x.shader");

    env.write("/x.shader", shader_source(&[COMPILE_ERROR], &[]));
    touch(&env, "/x.shader", 5);
    manager.update(Instant::now()).unwrap();

    let kept = manager.shader(shader).unwrap();
    assert!(kept.is_compiled());
    assert!(kept.buffer("MaterialBlock").is_none());
    assert_eq!(kept.material_declarations()[0].member("x").unwrap().offset, 0);
    assert!(logger.contains(LogSeverity::Warn, "keeping the previous version"));

    // Not retried until the file changes again
    let compiles = env.compiler.compile_count();
    manager.update(Instant::now() + Duration::from_secs(1)).unwrap();
    assert_eq!(env.compiler.compile_count(), compiles);

    Engine::reset_logger();
}

#[test]
fn test_fixed_shader_recovers_waiting_material() {
    let env = env();
    env.write("/x.shader", shader_source(&[COMPILE_ERROR], &[]));
    env.write("/m.mat", r#"{"shader":"/x.shader","x":0.5}"#);
    let mut manager = manager(&env);
    let material = manager.load_material("/m.mat");
    assert_eq!(manager.material(material).unwrap().shader(), manager.fallbacks().error_shader);

    // Still broken: retried once, stays on the error shader
    touch(&env, "/x.shader", 5);
    manager.update(Instant::now()).unwrap();
    assert_eq!(manager.material(material).unwrap().shader(), manager.fallbacks().error_shader);

    env.write("/x.shader", shader_source(&["MARK_X0"], &[]));
    touch(&env, "/x.shader", 10);
    manager.update(Instant::now() + Duration::from_secs(1)).unwrap();

    let shader = manager.material(material).unwrap().shader();
    assert_ne!(shader, manager.fallbacks().error_shader);
    assert_eq!(manager.shader(shader).unwrap().source_path(), Some("/x.shader"));
    approx::assert_relative_eq!(manager.material(material).unwrap().get_float("x"), 0.5);
}

#[test]
fn test_missing_file_defers_reload() {
    let env = env();
    env.write("/x.shader", shader_source(&["MARK_X0"], &[]));
    let mut manager = manager(&env);
    let shader = manager.load_shader("/x.shader");

    std::fs::remove_file(env.context.vfs().resolve("/x.shader")).unwrap();
    manager.update(Instant::now()).unwrap();
    assert!(!manager.reload_shader(shader).unwrap());
    assert!(manager.shader(shader).unwrap().is_compiled());

    env.write("/x.shader", shader_source(&["MARK_X4"], &[]));
    touch(&env, "/x.shader", 5);
    manager.update(Instant::now() + Duration::from_secs(1)).unwrap();
    assert_eq!(manager.shader(shader).unwrap().material_declarations()[0].member("x").unwrap().offset, 4);
}

#[test]
fn test_material_file_reload() {
    let env = env();
    env.write("/s.shader", shader_source(&["MARK_MATERIAL"], &[]));
    env.write("/m.mat", r##"{"shader":"/s.shader","tint":"#FF0000"}"##);
    let mut manager = manager(&env);
    let key = manager.load_material("/m.mat");

    env.write("/m.mat", r##"{"shader":"/s.shader","tint":"#00FF00"}"##);
    touch(&env, "/m.mat", 5);
    manager.update(Instant::now()).unwrap();
    assert_eq!(manager.material(key).unwrap().get_color("tint"), Color32::rgba(0, 255, 0, 255));
}

#[test]
fn test_polling_interval_and_switch() {
    let env = env();
    env.write("/s.shader", shader_source(&["MARK_X0"], &[]));
    let mut manager = manager(&env);
    let shader = manager.load_shader("/s.shader");
    let start = Instant::now();
    manager.update(start).unwrap();

    env.write("/s.shader", shader_source(&["MARK_X4"], &[]));
    touch(&env, "/s.shader", 5);
    let offset = |manager: &AssetManager| {
        manager.shader(shader).unwrap().material_declarations()[0].member("x").unwrap().offset
    };

    manager.update(start + Duration::from_millis(100)).unwrap();
    assert_eq!(offset(&manager), 0);

    manager.set_hot_reload(false);
    manager.update(start + Duration::from_secs(2)).unwrap();
    assert_eq!(offset(&manager), 0);

    manager.set_hot_reload(true);
    manager.update(start + Duration::from_secs(3)).unwrap();
    assert_eq!(offset(&manager), 4);
}

#[test]
fn test_texture_reload_on_job_queue() {
    let env = env();
    env.write("/t.png", png_bytes(1, 1, [255, 0, 0, 255]));
    let mut manager = manager(&env);
    let handle = manager.load_texture("/t.png");
    assert_eq!(manager.texture(handle).unwrap().gpu_texture().info().width, 1);

    env.write("/t.png", png_bytes(2, 2, [0, 255, 0, 255]));
    touch(&env, "/t.png", 5);
    manager.update(Instant::now()).unwrap();
    manager.wait_for_pending_loads().unwrap();

    let texture = manager.texture(handle).unwrap();
    assert_eq!(texture.gpu_texture().info().width, 2);
    assert!(texture.modified().is_some());
}

#[test]
fn test_corrupt_texture_reload_keeps_pixels() {
    let env = env();
    env.write("/t.png", png_bytes(1, 1, [255, 0, 0, 255]));
    let mut manager = manager(&env);
    let handle = manager.load_texture("/t.png");

    env.write("/t.png", b"garbage");
    touch(&env, "/t.png", 5);
    manager.update(Instant::now()).unwrap();
    manager.wait_for_pending_loads().unwrap();

    assert_eq!(manager.texture(handle).unwrap().gpu_texture().info().width, 1);
}
