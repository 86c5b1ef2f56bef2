/// Asset manager
///
/// Loads shaders, materials, textures and meshes by virtual path, caches them
/// by normalized path and hands out slotmap keys. A load that fails is
/// replaced by an engine fallback (error shader, error material, white or
/// flat-normal texture, default cubemap, unit cube) so rendering never stops
/// on a bad asset; the `try_load_*` variants return the error instead.
///
/// Hot reload is polled from `update()` on the owning thread. Shaders,
/// materials and meshes reload synchronously; texture pixels are decoded on
/// the job queue and uploaded by a later `update()`.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use crate::asset::material_loader::{
    convert_property, is_pbr_material, parse_material_file, MaterialFile, MaterialValue, PbrDefault, PBR_DEFAULTS,
};
use crate::asset::vfs::{normalize_virtual_path, VirtualFileSystem};
use crate::config::EngineConfig;
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::graphics_device::{CommandList, TextureFormat};
use crate::resource::material::{Material, MaterialKey};
use crate::resource::mesh::{Mesh, MeshData, MeshKey};
use crate::resource::shader::{texture_kind_matches, Shader, ShaderKey};
use crate::resource::shader_maps::CachedShaderMaps;
use crate::resource::texture::{
    decode_image, DecodedImage, Texture, TextureHandle, TextureKey, TextureKind, TextureSource, CUBEMAP_FACES,
};
use crate::shader::declaration::{DataType, ShaderResourceDeclaration};
use crate::utils::job_queue::JobQueue;

const LOG_SOURCE: &str = "lumen::AssetManager";

/// Pending texture decodes before `push` blocks
const JOB_QUEUE_CAPACITY: usize = 64;

const ERROR_SHADER_NAME: &str = "engine:error_shader";
const ERROR_MATERIAL_NAME: &str = "engine:error_material";

/// Magenta shader drawn in place of anything that failed to load
pub const ERROR_SHADER_SOURCE: &str = r#"#vulkan
#shader vertex
#version 450
layout(location = 0) in vec3 POSITION;
layout(set = 0, binding = 0) uniform ErrorShaderParams {
    mat4 worldViewProj;
} params;
void main() {
    gl_Position = params.worldViewProj * vec4(POSITION, 1.0);
}
#shader fragment
#version 450
layout(location = 0) out vec4 outColor;
void main() {
    outColor = vec4(1.0, 0.0, 1.0, 1.0);
}
#d3d11
#shader vertex
cbuffer ErrorShaderParams : register(b0) {
    float4x4 worldViewProj;
};
float4 main(float3 position : POSITION) : SV_POSITION {
    return mul(worldViewProj, float4(position, 1.0));
}
#shader fragment
float4 main() : SV_TARGET {
    return float4(1.0, 0.0, 1.0, 1.0);
}
"#;

/// Pixel of the flat tangent-space normal map
const FLAT_NORMAL_RGBA: [u8; 4] = [128, 128, 255, 255];

// ============================================================================
// Entries
// ============================================================================

/// Engine assets substituted for failed loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fallbacks {
    pub error_shader: ShaderKey,
    pub error_material: MaterialKey,
    pub white_texture: TextureHandle,
    pub flat_normal_texture: TextureHandle,
    pub default_cubemap: TextureHandle,
    pub default_mesh: MeshKey,
}

/// What `sweep_unused` evicted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub materials: usize,
    pub textures: usize,
}

/// A file whose timestamp is compared on each poll
#[derive(Debug, Clone)]
struct WatchedFile {
    path: String,
    modified: Option<SystemTime>,
}

struct ShaderEntry {
    shader: Shader,
    /// The shader file followed by its includes
    watched: Vec<WatchedFile>,
}

/// A shader file that failed to load, with the materials bound to the
/// error shader in its place
#[derive(Default)]
struct FailedShader {
    modified: Option<SystemTime>,
    materials: Vec<MaterialKey>,
}

struct MaterialEntry {
    material: Material,
    modified: Option<SystemTime>,
}

struct TextureEntry {
    texture: Texture,
    /// A decode job is in flight
    reloading: bool,
    /// Timestamp of a version that failed to decode or upload
    rejected: Option<SystemTime>,
}

struct MeshEntry {
    mesh: Mesh,
    modified: Option<SystemTime>,
}

/// Pixels decoded by a worker, waiting for upload
struct DecodedTexture {
    key: TextureKey,
    modified: SystemTime,
    images: Result<Vec<DecodedImage>>,
}

/// A converted material property ready to be applied
enum Property {
    Value(MaterialValue),
    Texture(TextureHandle),
}

fn watch(vfs: &VirtualFileSystem, paths: impl IntoIterator<Item = String>) -> Vec<WatchedFile> {
    paths
        .into_iter()
        .map(|path| {
            let modified = vfs.modified(&path).ok();
            WatchedFile { path, modified }
        })
        .collect()
}

fn shader_watch_list(vfs: &VirtualFileSystem, shader: &Shader) -> Vec<WatchedFile> {
    let paths = shader
        .source_path()
        .map(str::to_string)
        .into_iter()
        .chain(shader.includes().iter().cloned());
    watch(vfs, paths)
}

/// True when a watched file got a new timestamp; unreadable files count as unchanged
fn any_changed(vfs: &VirtualFileSystem, watched: &[WatchedFile]) -> bool {
    watched.iter().any(|file| match vfs.modified(&file.path) {
        Ok(modified) => Some(modified) != file.modified,
        Err(e) => {
            crate::engine_debug!(LOG_SOURCE, "Change check on '{}' deferred: {}", file.path, e);
            false
        }
    })
}

/// Newest timestamp of a group of files
fn newest_modified(vfs: &VirtualFileSystem, paths: &[&str]) -> Result<Option<SystemTime>> {
    let mut newest = None;
    for path in paths {
        let modified = vfs.modified(path)?;
        newest = newest.max(Some(modified));
    }
    Ok(newest)
}

/// Prefix a content error with the file it came from
fn in_file(path: &str, error: Error) -> Error {
    match error {
        Error::Parse(message) => Error::Parse(format!("{}: {}", path, message)),
        Error::InvalidResource(message) => Error::InvalidResource(format!("{}: {}", path, message)),
        other => other,
    }
}

/// Device failures that must reach the caller instead of a fallback
fn is_device_failure(error: &Error) -> bool {
    matches!(error, Error::OutOfMemory | Error::BackendError(_))
}

fn apply_properties(material: &mut Material, properties: Vec<(String, Property)>) {
    for (name, property) in properties {
        match property {
            Property::Value(MaterialValue::Int(value)) => material.set_int(&name, value),
            Property::Value(MaterialValue::Float(value)) => material.set_float(&name, value),
            Property::Value(MaterialValue::Vec4(value)) => material.set_vec4(&name, value),
            Property::Value(MaterialValue::Matrix(value)) => material.set_matrix(&name, value),
            Property::Value(MaterialValue::Color(value)) => material.set_color(&name, value),
            Property::Texture(handle) => material.set_texture(&name, Some(handle)),
            // Paths are turned into handles before application
            Property::Value(MaterialValue::Texture(_) | MaterialValue::Cubemap(_)) => {}
        }
    }
}

// ============================================================================
// AssetManager
// ============================================================================

pub struct AssetManager {
    context: Arc<RenderContext>,
    shaders: SlotMap<ShaderKey, ShaderEntry>,
    materials: SlotMap<MaterialKey, MaterialEntry>,
    textures: SlotMap<TextureKey, TextureEntry>,
    meshes: SlotMap<MeshKey, MeshEntry>,
    shader_paths: FxHashMap<String, ShaderKey>,
    material_paths: FxHashMap<String, MaterialKey>,
    texture_paths: FxHashMap<String, TextureHandle>,
    mesh_paths: FxHashMap<String, MeshKey>,
    failed_shaders: FxHashMap<String, FailedShader>,
    fallbacks: Fallbacks,
    hot_reload: bool,
    poll_interval: Duration,
    last_poll: Option<Instant>,
    decoded_sender: Sender<DecodedTexture>,
    decoded_receiver: Receiver<DecodedTexture>,
    jobs: JobQueue,
}

impl AssetManager {
    /// Create the manager and its fallback assets
    ///
    /// Fails when any fallback cannot be built: without them there is
    /// nothing to substitute for a bad asset.
    pub fn new(context: Arc<RenderContext>, config: &EngineConfig) -> Result<Self> {
        let fallback_error = |what: &str, e: Error| Error::InitializationFailed(format!("{}: {}", what, e));

        let mut error_shader = Shader::new(ERROR_SHADER_NAME);
        error_shader
            .compile_source(&context, ERROR_SHADER_SOURCE, ERROR_SHADER_NAME)
            .map_err(|e| fallback_error("error shader", e))?;

        let mut shaders = SlotMap::with_key();
        let mut materials = SlotMap::with_key();
        let mut textures = SlotMap::with_key();
        let mut meshes = SlotMap::with_key();

        let fallbacks = {
            let mut device = context.lock_device()?;
            let device = &mut *device;

            let error_shader_key = shaders.insert(ShaderEntry { shader: error_shader, watched: Vec::new() });
            let error_material =
                Material::new(ERROR_MATERIAL_NAME, error_shader_key, &shaders[error_shader_key].shader, &mut *device)
                    .map_err(|e| fallback_error("error material", e))?;
            let error_material_key = materials.insert(MaterialEntry { material: error_material, modified: None });

            let mut solid = |kind: TextureKind, rgba: [u8; 4], format: TextureFormat, name: &str| -> Result<TextureHandle> {
                let texture = Texture::solid(&mut *device, kind, rgba, format, name).map_err(|e| fallback_error(name, e))?;
                let key = textures.insert(TextureEntry { texture, reloading: false, rejected: None });
                Ok(TextureHandle { key, kind })
            };
            let white_texture = solid(TextureKind::Tex2D, [255; 4], TextureFormat::R8G8B8A8_SRGB, "engine:white")?;
            let flat_normal_texture =
                solid(TextureKind::Tex2D, FLAT_NORMAL_RGBA, TextureFormat::R8G8B8A8_UNORM, "engine:flat_normal")?;
            let default_cubemap =
                solid(TextureKind::Cubemap, [0, 0, 0, 255], TextureFormat::R8G8B8A8_SRGB, "engine:default_cubemap")?;

            let mesh = Mesh::new(&mut *device, &MeshData::unit_cube(), None).map_err(|e| fallback_error("default mesh", e))?;
            let default_mesh = meshes.insert(MeshEntry { mesh, modified: None });

            Fallbacks {
                error_shader: error_shader_key,
                error_material: error_material_key,
                white_texture,
                flat_normal_texture,
                default_cubemap,
                default_mesh,
            }
        };

        let jobs = JobQueue::new(config.resolved_worker_threads(), JOB_QUEUE_CAPACITY)?;
        let (decoded_sender, decoded_receiver) = unbounded();

        crate::engine_info!(
            LOG_SOURCE,
            "Asset manager ready (hot reload {}, every {} ms)",
            if config.hot_reload { "on" } else { "off" },
            config.hot_reload_interval_ms
        );

        Ok(Self {
            context,
            shaders,
            materials,
            textures,
            meshes,
            shader_paths: FxHashMap::default(),
            material_paths: FxHashMap::default(),
            texture_paths: FxHashMap::default(),
            mesh_paths: FxHashMap::default(),
            failed_shaders: FxHashMap::default(),
            fallbacks,
            hot_reload: config.hot_reload,
            poll_interval: config.hot_reload_interval(),
            last_poll: None,
            decoded_sender,
            decoded_receiver,
            jobs,
        })
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    pub fn fallbacks(&self) -> &Fallbacks {
        &self.fallbacks
    }

    pub fn set_hot_reload(&mut self, enabled: bool) {
        self.hot_reload = enabled;
    }

    // ===== SHADERS =====

    /// Load a shader, substituting the error shader on failure
    pub fn load_shader(&mut self, path: &str) -> ShaderKey {
        match self.try_load_shader(path) {
            Ok(key) => key,
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Shader '{}' replaced by the error shader: {}", path, e);
                let path = normalize_virtual_path(path);
                let modified = self.context.vfs().modified(&path).ok();
                self.failed_shaders.entry(path).or_default().modified = modified;
                self.fallbacks.error_shader
            }
        }
    }

    pub fn try_load_shader(&mut self, path: &str) -> Result<ShaderKey> {
        let path = normalize_virtual_path(path);
        if let Some(&key) = self.shader_paths.get(&path) {
            if self.shaders.contains_key(key) {
                return Ok(key);
            }
        }

        let shader = Shader::from_file(&self.context, &path)?;
        let watched = shader_watch_list(self.context.vfs(), &shader);
        let key = self.shaders.insert(ShaderEntry { shader, watched });
        self.failed_shaders.remove(&path);
        self.shader_paths.insert(path.clone(), key);
        crate::engine_info!(LOG_SOURCE, "Loaded shader '{}'", path);
        Ok(key)
    }

    pub fn shader(&self, key: ShaderKey) -> Option<&Shader> {
        self.shaders.get(key).map(|entry| &entry.shader)
    }

    pub fn shader_mut(&mut self, key: ShaderKey) -> Option<&mut Shader> {
        self.shaders.get_mut(key).map(|entry| &mut entry.shader)
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    /// Recompile a shader from its file and swap it in on success
    ///
    /// Returns `Ok(false)` when nothing was swapped: a built-in shader, a
    /// file that could not be read (retried on the next poll) or a source
    /// that no longer compiles (the previous version stays live).
    pub fn reload_shader(&mut self, key: ShaderKey) -> Result<bool> {
        let entry = self
            .shaders
            .get(key)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown shader {:?}", key)))?;
        let Some(path) = entry.shader.source_path().map(str::to_string) else {
            return Ok(false);
        };

        let context = Arc::clone(&self.context);
        let fresh = match Shader::from_file(&context, &path) {
            Ok(shader) => shader,
            Err(e) if e.is_io() => {
                crate::engine_debug!(LOG_SOURCE, "Reload of '{}' deferred: {}", path, e);
                return Ok(false);
            }
            Err(e) if is_device_failure(&e) => return Err(e),
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Reload of '{}' failed, keeping the previous version: {}", path, e);
                let entry = &mut self.shaders[key];
                let paths = entry.watched.iter().map(|file| file.path.clone()).collect::<Vec<_>>();
                entry.watched = watch(context.vfs(), paths);
                return Ok(false);
            }
        };

        let entry = &mut self.shaders[key];
        let callback = entry.shader.take_reload_callback();
        entry.watched = shader_watch_list(context.vfs(), &fresh);
        entry.shader = fresh;
        crate::engine_info!(LOG_SOURCE, "Reloaded shader '{}'", path);

        self.reapply_materials_of(key)?;
        self.shaders[key].shader.adopt_reload_callback(callback);
        Ok(true)
    }

    /// Move every material of `shader_key` onto the shader's current layout
    fn reapply_materials_of(&mut self, shader_key: ShaderKey) -> Result<()> {
        let dependents: Vec<MaterialKey> = self
            .materials
            .iter()
            .filter(|(_, entry)| entry.material.shader() == shader_key)
            .map(|(key, _)| key)
            .collect();

        for key in dependents {
            if self.materials[key].material.source_path().is_some() && self.reload_material(key)? {
                continue;
            }
            let context = Arc::clone(&self.context);
            let mut device = context.lock_device()?;
            let shader = &self.shaders[shader_key].shader;
            self.materials[key].material.rebind(shader, &mut *device)?;
        }
        Ok(())
    }

    // ===== MATERIALS =====

    /// Load a material file, substituting the error material on failure
    pub fn load_material(&mut self, path: &str) -> MaterialKey {
        match self.try_load_material(path) {
            Ok(key) => key,
            Err(e) if is_device_failure(&e) => {
                crate::engine_error!(LOG_SOURCE, "Material '{}' could not be created: {}", path, e);
                self.fallbacks.error_material
            }
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Material '{}' replaced by the error material: {}", path, e);
                self.fallbacks.error_material
            }
        }
    }

    pub fn try_load_material(&mut self, path: &str) -> Result<MaterialKey> {
        let path = normalize_virtual_path(path);
        if let Some(&key) = self.material_paths.get(&path) {
            if self.materials.contains_key(key) {
                return Ok(key);
            }
        }

        let modified = self.context.vfs().modified(&path).ok();
        let file = self.read_material_file(&path)?;
        let shader_key = self.load_shader(&file.shader);
        let properties = self.resolve_properties(shader_key, &path, &file);

        let context = Arc::clone(&self.context);
        let mut material = {
            let mut device = context.lock_device()?;
            Material::new(path.clone(), shader_key, &self.shaders[shader_key].shader, &mut *device)?
        };
        material.set_source_path(Some(path.clone()));
        apply_properties(&mut material, properties);

        let key = self.materials.insert(MaterialEntry { material, modified });
        self.material_paths.insert(path.clone(), key);
        if shader_key == self.fallbacks.error_shader {
            self.wait_for_shader(&file.shader, key);
        }
        crate::engine_info!(LOG_SOURCE, "Loaded material '{}'", path);
        Ok(key)
    }

    /// Create an empty material on a loaded shader
    pub fn create_material(&mut self, name: &str, shader_key: ShaderKey) -> Result<MaterialKey> {
        let shader = &self
            .shaders
            .get(shader_key)
            .ok_or_else(|| Error::InvalidResource(format!("Material '{}': unknown shader {:?}", name, shader_key)))?
            .shader;
        let mut device = self.context.lock_device()?;
        let material = Material::new(name, shader_key, shader, &mut *device)?;
        Ok(self.materials.insert(MaterialEntry { material, modified: None }))
    }

    /// Point a material at another shader; its cached values are cleared
    pub fn set_material_shader(&mut self, material_key: MaterialKey, shader_key: ShaderKey) -> Result<()> {
        let shader = &self
            .shaders
            .get(shader_key)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown shader {:?}", shader_key)))?
            .shader;
        let entry = self
            .materials
            .get_mut(material_key)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown material {:?}", material_key)))?;
        let mut device = self.context.lock_device()?;
        entry.material.set_shader(shader_key, shader, &mut *device)
    }

    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key).map(|entry| &entry.material)
    }

    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key).map(|entry| &mut entry.material)
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Re-apply a material from its file
    ///
    /// Returns `Ok(false)` when the material has no file or the file could
    /// not be used; the material is left as it was.
    pub fn reload_material(&mut self, key: MaterialKey) -> Result<bool> {
        let entry = self
            .materials
            .get(key)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown material {:?}", key)))?;
        let Some(path) = entry.material.source_path().map(str::to_string) else {
            return Ok(false);
        };

        let modified = self.context.vfs().modified(&path).ok();
        let file = match self.read_material_file(&path) {
            Ok(file) => file,
            Err(e) if e.is_io() => {
                crate::engine_debug!(LOG_SOURCE, "Reload of '{}' deferred: {}", path, e);
                return Ok(false);
            }
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Reload of '{}' failed, keeping the previous values: {}", path, e);
                self.materials[key].modified = modified;
                return Ok(false);
            }
        };

        let shader_key = self.load_shader(&file.shader);
        let properties = self.resolve_properties(shader_key, &path, &file);

        let context = Arc::clone(&self.context);
        let entry = &mut self.materials[key];
        {
            let mut device = context.lock_device()?;
            entry.material.set_shader(shader_key, &self.shaders[shader_key].shader, &mut *device)?;
        }
        apply_properties(&mut entry.material, properties);
        entry.modified = modified;
        if shader_key == self.fallbacks.error_shader {
            self.wait_for_shader(&file.shader, key);
        }
        crate::engine_info!(LOG_SOURCE, "Reloaded material '{}'", path);
        Ok(true)
    }

    /// Retry `material` from its file once the failed `shader_path` changes
    fn wait_for_shader(&mut self, shader_path: &str, material: MaterialKey) {
        if let Some(failed) = self.failed_shaders.get_mut(&normalize_virtual_path(shader_path)) {
            if !failed.materials.contains(&material) {
                failed.materials.push(material);
            }
        }
    }

    fn read_material_file(&self, path: &str) -> Result<MaterialFile> {
        let text = self.context.vfs().read_to_string(path)?;
        parse_material_file(&text, path)
    }

    /// Convert the file's properties against the shader's declarations
    ///
    /// Texture paths are loaded here; PBR files get defaults for the
    /// declared properties they leave out.
    fn resolve_properties(&mut self, shader_key: ShaderKey, path: &str, file: &MaterialFile) -> Vec<(String, Property)> {
        let (members, resources) = {
            let shader = &self.shaders[shader_key].shader;
            let members: FxHashMap<String, DataType> = shader
                .material_declarations()
                .iter()
                .flat_map(|declaration| declaration.members().iter())
                .map(|member| (member.name.clone(), member.data_type))
                .collect();
            let resources: FxHashMap<String, DataType> = shader
                .reflection()
                .resources
                .iter()
                .filter(|resource| resource.takes_texture())
                .map(|resource| (resource.name.clone(), resource.data_type))
                .collect();
            (members, resources)
        };

        let mut properties = Vec::with_capacity(file.properties.len());
        for (name, value) in &file.properties {
            let data_type = members.get(name).or_else(|| resources.get(name)).copied();
            let property = match convert_property(path, value, data_type) {
                Ok(MaterialValue::Texture(texture_path)) if resources.contains_key(name) => {
                    Property::Texture(self.load_texture(&texture_path))
                }
                Ok(MaterialValue::Cubemap(faces)) if resources.contains_key(name) => {
                    Property::Texture(self.load_cubemap(faces.as_slice()))
                }
                Ok(MaterialValue::Texture(_) | MaterialValue::Cubemap(_)) => {
                    crate::engine_warn!(LOG_SOURCE, "{}: no texture named '{}' in the shader, value ignored", path, name);
                    continue;
                }
                Ok(value) => Property::Value(value),
                Err(reason) => {
                    crate::engine_warn!(LOG_SOURCE, "{}: property '{}' ignored: {}", path, name, reason);
                    continue;
                }
            };
            properties.push((name.clone(), property));
        }

        if is_pbr_material(path) {
            for (name, default) in PBR_DEFAULTS {
                if file.properties.iter().any(|(set, _)| set.as_str() == *name) {
                    continue;
                }
                let declared = members.contains_key(*name);
                let property = match *default {
                    PbrDefault::Color(color) if declared => Property::Value(MaterialValue::Color(color)),
                    PbrDefault::Float(value) if declared => Property::Value(MaterialValue::Float(value)),
                    PbrDefault::Int(value) if declared => Property::Value(MaterialValue::Int(value)),
                    PbrDefault::FlatNormalMap if resources.contains_key(*name) => {
                        Property::Texture(self.fallbacks.flat_normal_texture)
                    }
                    _ => continue,
                };
                properties.push((name.to_string(), property));
            }
        }
        properties
    }

    /// Bind a material's shader, buffers and textures
    ///
    /// Texture resources without a usable texture get the white texture
    /// (or the default cubemap for cube resources).
    pub fn bind_material(&mut self, key: MaterialKey, cmd: &mut dyn CommandList) -> Result<()> {
        let entry = self
            .materials
            .get_mut(key)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown material {:?}", key)))?;
        let shader_key = entry.material.shader();
        let shader_entry = self.shaders.get_mut(shader_key).ok_or_else(|| {
            Error::InvalidResource(format!("Material '{}' uses unloaded shader {:?}", entry.material.name(), shader_key))
        })?;
        shader_entry.shader.bind(cmd)?;

        let shader_textures = &shader_entry.shader.property_maps().textures;
        let textures = &self.textures;
        let fallbacks = self.fallbacks;
        let mut resolve = |resource: &ShaderResourceDeclaration, handle: Option<TextureHandle>| {
            let handle = handle.or_else(|| shader_textures.get(&resource.name).copied());
            let texture = handle
                .and_then(|handle| textures.get(handle.key))
                .filter(|found| texture_kind_matches(resource.data_type, found.texture.kind()))
                .or_else(|| {
                    let fallback = if resource.data_type == DataType::TextureCubemap {
                        fallbacks.default_cubemap
                    } else {
                        fallbacks.white_texture
                    };
                    textures.get(fallback.key)
                })?;
            Some(Arc::clone(texture.texture.gpu_texture()))
        };
        entry.material.bind(cmd, &mut resolve)
    }

    // ===== TEXTURES =====

    /// Load a 2D texture, substituting the white texture on failure
    pub fn load_texture(&mut self, path: &str) -> TextureHandle {
        match self.try_load_texture(path) {
            Ok(handle) => handle,
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Texture '{}' replaced by the white texture: {}", path, e);
                self.fallbacks.white_texture
            }
        }
    }

    pub fn try_load_texture(&mut self, path: &str) -> Result<TextureHandle> {
        let path = normalize_virtual_path(path);
        if let Some(handle) = self.cached_texture(&path) {
            return Ok(handle);
        }

        let vfs = self.context.vfs();
        let modified = vfs.modified(&path).ok();
        let image = decode_image(&vfs.read(&path)?).map_err(|e| in_file(&path, e))?;
        let texture = {
            let mut device = self.context.lock_device()?;
            Texture::new_2d(
                &mut *device,
                &image,
                TextureFormat::R8G8B8A8_SRGB,
                TextureSource::File(path.clone()),
                modified,
            )?
        };
        crate::engine_info!(LOG_SOURCE, "Loaded texture '{}' ({}x{})", path, image.width, image.height);
        Ok(self.insert_texture(path, texture))
    }

    /// Load a cubemap from six faces, substituting the default cubemap on failure
    pub fn load_cubemap<S: AsRef<str>>(&mut self, faces: &[S]) -> TextureHandle {
        match self.try_load_cubemap(faces) {
            Ok(handle) => handle,
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Cubemap replaced by the default cubemap: {}", e);
                self.fallbacks.default_cubemap
            }
        }
    }

    /// Load a cubemap from six faces in `CUBEMAP_FACES` order
    pub fn try_load_cubemap<S: AsRef<str>>(&mut self, faces: &[S]) -> Result<TextureHandle> {
        if faces.len() != CUBEMAP_FACES.len() {
            return Err(Error::InvalidResource(format!(
                "A cubemap needs {} faces, got {}",
                CUBEMAP_FACES.len(),
                faces.len()
            )));
        }
        let faces: Vec<String> = faces.iter().map(|face| normalize_virtual_path(face.as_ref())).collect();
        let cache_key = faces.join("|");
        if let Some(handle) = self.cached_texture(&cache_key) {
            return Ok(handle);
        }

        let vfs = self.context.vfs();
        let face_refs: Vec<&str> = faces.iter().map(String::as_str).collect();
        let modified = newest_modified(vfs, &face_refs).ok().flatten();
        let images = faces
            .iter()
            .map(|face| decode_image(&vfs.read(face)?).map_err(|e| in_file(face, e)))
            .collect::<Result<Vec<_>>>()?;
        let texture = {
            let mut device = self.context.lock_device()?;
            Texture::new_cubemap(
                &mut *device,
                &images,
                TextureFormat::R8G8B8A8_SRGB,
                TextureSource::Cubemap(faces.clone()),
                modified,
            )
            .map_err(|e| in_file(&faces[0], e))?
        };
        crate::engine_info!(LOG_SOURCE, "Loaded cubemap '{}'", faces[0]);
        Ok(self.insert_texture(cache_key, texture))
    }

    fn cached_texture(&self, cache_key: &str) -> Option<TextureHandle> {
        self.texture_paths
            .get(cache_key)
            .copied()
            .filter(|handle| self.textures.contains_key(handle.key))
    }

    fn insert_texture(&mut self, cache_key: String, texture: Texture) -> TextureHandle {
        let kind = texture.kind();
        let key = self.textures.insert(TextureEntry { texture, reloading: false, rejected: None });
        let handle = TextureHandle { key, kind };
        self.texture_paths.insert(cache_key, handle);
        handle
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle.key).map(|entry| &entry.texture)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // ===== MESHES =====

    /// Load an OBJ mesh, substituting the unit cube on failure
    pub fn load_mesh(&mut self, path: &str) -> MeshKey {
        match self.try_load_mesh(path) {
            Ok(key) => key,
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "Mesh '{}' replaced by the default mesh: {}", path, e);
                self.fallbacks.default_mesh
            }
        }
    }

    pub fn try_load_mesh(&mut self, path: &str) -> Result<MeshKey> {
        let path = normalize_virtual_path(path);
        if let Some(&key) = self.mesh_paths.get(&path) {
            if self.meshes.contains_key(key) {
                return Ok(key);
            }
        }

        let modified = self.context.vfs().modified(&path).ok();
        let mesh = self.build_mesh(&path)?;
        crate::engine_info!(LOG_SOURCE, "Loaded mesh '{}' ({} indices)", path, mesh.index_count());
        let key = self.meshes.insert(MeshEntry { mesh, modified });
        self.mesh_paths.insert(path, key);
        Ok(key)
    }

    fn build_mesh(&self, path: &str) -> Result<Mesh> {
        let bytes = self.context.vfs().read(path)?;
        let data = MeshData::from_obj(&bytes).map_err(|e| in_file(path, e))?;
        let mut device = self.context.lock_device()?;
        Mesh::new(&mut *device, &data, Some(path.to_string())).map_err(|e| in_file(path, e))
    }

    pub fn mesh(&self, key: MeshKey) -> Option<&Mesh> {
        self.meshes.get(key).map(|entry| &entry.mesh)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ===== UNLOADING =====

    /// Remove a material; fallbacks stay
    pub fn unload_material(&mut self, key: MaterialKey) -> bool {
        if key == self.fallbacks.error_material || self.materials.remove(key).is_none() {
            return false;
        }
        self.material_paths.retain(|_, cached| *cached != key);
        true
    }

    /// Remove a shader no material uses any more
    pub fn unload_shader(&mut self, key: ShaderKey) -> Result<()> {
        if key == self.fallbacks.error_shader {
            return Err(Error::InvalidResource("The error shader cannot be unloaded".to_string()));
        }
        let users = self.materials.values().filter(|entry| entry.material.shader() == key).count();
        if users > 0 {
            return Err(Error::InvalidResource(format!("Shader {:?} is still used by {} material(s)", key, users)));
        }
        self.shaders
            .remove(key)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown shader {:?}", key)))?;
        self.shader_paths.retain(|_, cached| *cached != key);
        Ok(())
    }

    /// Remove a mesh; the default mesh stays
    pub fn unload_mesh(&mut self, key: MeshKey) -> bool {
        if key == self.fallbacks.default_mesh || self.meshes.remove(key).is_none() {
            return false;
        }
        self.mesh_paths.retain(|_, cached| *cached != key);
        true
    }

    fn fallback_textures(&self) -> [TextureKey; 3] {
        [
            self.fallbacks.white_texture.key,
            self.fallbacks.flat_normal_texture.key,
            self.fallbacks.default_cubemap.key,
        ]
    }

    /// Evict materials outside `keep` and textures nothing references
    ///
    /// The error material and the fallback textures are never evicted.
    pub fn sweep_unused(&mut self, keep: &[MaterialKey]) -> SweepReport {
        let keep: FxHashSet<MaterialKey> = keep.iter().copied().collect();
        let error_material = self.fallbacks.error_material;
        let before = self.materials.len();
        self.materials
            .retain(|key, _| key == error_material || keep.contains(&key));
        let materials = before - self.materials.len();

        let mut referenced: FxHashSet<TextureKey> = self.fallback_textures().into_iter().collect();
        referenced.extend(
            self.materials
                .values()
                .flat_map(|entry| entry.material.texture_handles())
                .map(|handle| handle.key),
        );
        referenced.extend(
            self.shaders
                .values()
                .flat_map(|entry| entry.shader.property_maps().textures.values())
                .map(|handle| handle.key),
        );
        let before = self.textures.len();
        self.textures.retain(|key, _| referenced.contains(&key));
        let textures = before - self.textures.len();

        let (materials_alive, textures_alive) = (&self.materials, &self.textures);
        self.material_paths.retain(|_, key| materials_alive.contains_key(*key));
        self.texture_paths.retain(|_, handle| textures_alive.contains_key(handle.key));

        if materials + textures > 0 {
            crate::engine_debug!(LOG_SOURCE, "Swept {} material(s) and {} texture(s)", materials, textures);
        }
        SweepReport { materials, textures }
    }

    // ===== HOT RELOAD =====

    /// Upload finished texture decodes and, once per interval, poll files
    pub fn update(&mut self, now: Instant) -> Result<()> {
        self.upload_decoded_textures()?;
        if !self.hot_reload {
            return Ok(());
        }
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.poll_interval {
                return Ok(());
            }
        }
        self.last_poll = Some(now);

        self.poll_shaders()?;
        self.poll_failed_shaders()?;
        self.poll_materials()?;
        self.poll_textures()?;
        self.poll_meshes()
    }

    /// Block until queued texture decodes finish, then upload them
    pub fn wait_for_pending_loads(&mut self) -> Result<()> {
        self.jobs.wait_until_queue_is_empty();
        self.upload_decoded_textures()
    }

    fn poll_shaders(&mut self) -> Result<()> {
        let vfs = Arc::clone(self.context.vfs());
        let changed: Vec<ShaderKey> = self
            .shaders
            .iter()
            .filter(|(_, entry)| any_changed(&vfs, &entry.watched))
            .map(|(key, _)| key)
            .collect();
        for key in changed {
            self.reload_shader(key)?;
        }
        Ok(())
    }

    /// Reload the materials waiting on a failed shader whose file changed
    fn poll_failed_shaders(&mut self) -> Result<()> {
        let vfs = Arc::clone(self.context.vfs());
        let changed: Vec<String> = self
            .failed_shaders
            .iter()
            .filter(|(path, failed)| any_changed(&vfs, &[WatchedFile { path: path.to_string(), modified: failed.modified }]))
            .map(|(path, _)| path.clone())
            .collect();
        for path in changed {
            let Some(failed) = self.failed_shaders.remove(&path) else {
                continue;
            };
            crate::engine_info!(LOG_SOURCE, "Shader '{}' changed, retrying {} material(s)", path, failed.materials.len());
            for key in failed.materials {
                let waiting = self
                    .materials
                    .get(key)
                    .is_some_and(|entry| entry.material.shader() == self.fallbacks.error_shader);
                if waiting {
                    self.reload_material(key)?;
                }
            }
        }
        Ok(())
    }

    fn poll_materials(&mut self) -> Result<()> {
        let vfs = Arc::clone(self.context.vfs());
        let changed: Vec<MaterialKey> = self
            .materials
            .iter()
            .filter(|(_, entry)| match entry.material.source_path() {
                Some(path) => any_changed(&vfs, &[WatchedFile { path: path.to_string(), modified: entry.modified }]),
                None => false,
            })
            .map(|(key, _)| key)
            .collect();
        for key in changed {
            self.reload_material(key)?;
        }
        Ok(())
    }

    fn poll_textures(&mut self) -> Result<()> {
        let vfs = Arc::clone(self.context.vfs());
        for (key, entry) in self.textures.iter_mut() {
            if entry.reloading {
                continue;
            }
            let paths: Vec<String> = entry.texture.source().paths().into_iter().map(str::to_string).collect();
            if paths.is_empty() {
                continue;
            }
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let modified = match newest_modified(&vfs, &path_refs) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) => {
                    crate::engine_debug!(LOG_SOURCE, "Texture reload check deferred: {}", e);
                    continue;
                }
            };
            if Some(modified) == entry.texture.modified() || Some(modified) == entry.rejected {
                continue;
            }

            entry.reloading = true;
            let vfs = Arc::clone(&vfs);
            let sender = self.decoded_sender.clone();
            self.jobs.push(move || {
                let images = paths
                    .iter()
                    .map(|path| decode_image(&vfs.read(path)?).map_err(|e| in_file(path, e)))
                    .collect::<Result<Vec<_>>>();
                // The receiver only goes away with the manager
                let _ = sender.send(DecodedTexture { key, modified, images });
            })?;
        }
        Ok(())
    }

    fn upload_decoded_textures(&mut self) -> Result<()> {
        let context = Arc::clone(&self.context);
        while let Ok(decoded) = self.decoded_receiver.try_recv() {
            // Unloaded while decoding
            let Some(entry) = self.textures.get_mut(decoded.key) else {
                continue;
            };
            entry.reloading = false;

            let images = match decoded.images {
                Ok(images) => images,
                Err(e) if e.is_io() => {
                    crate::engine_debug!(LOG_SOURCE, "Texture reload deferred: {}", e);
                    continue;
                }
                Err(e) => {
                    crate::engine_warn!(LOG_SOURCE, "Texture reload failed, keeping the previous pixels: {}", e);
                    entry.rejected = Some(decoded.modified);
                    continue;
                }
            };

            let mut device = context.lock_device()?;
            match entry.texture.reupload(&mut *device, &images, decoded.modified) {
                Ok(()) => {
                    crate::engine_info!(LOG_SOURCE, "Reloaded texture {:?}", entry.texture.source());
                }
                Err(e) if is_device_failure(&e) => return Err(e),
                Err(e) => {
                    crate::engine_warn!(LOG_SOURCE, "Texture reload rejected, keeping the previous pixels: {}", e);
                    entry.rejected = Some(decoded.modified);
                }
            }
        }
        Ok(())
    }

    fn poll_meshes(&mut self) -> Result<()> {
        let vfs = Arc::clone(self.context.vfs());
        let changed: Vec<(MeshKey, String)> = self
            .meshes
            .iter()
            .filter_map(|(key, entry)| {
                let path = entry.mesh.source()?;
                any_changed(&vfs, &[WatchedFile { path: path.to_string(), modified: entry.modified }])
                    .then(|| (key, path.to_string()))
            })
            .collect();

        for (key, path) in changed {
            let modified = vfs.modified(&path).ok();
            match self.build_mesh(&path) {
                Ok(mesh) => {
                    self.meshes[key] = MeshEntry { mesh, modified };
                    crate::engine_info!(LOG_SOURCE, "Reloaded mesh '{}'", path);
                }
                Err(e) if e.is_io() => {
                    crate::engine_debug!(LOG_SOURCE, "Reload of '{}' deferred: {}", path, e);
                }
                Err(e) if is_device_failure(&e) => return Err(e),
                Err(e) => {
                    crate::engine_warn!(LOG_SOURCE, "Reload of '{}' failed, keeping the previous mesh: {}", path, e);
                    self.meshes[key].modified = modified;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "asset_manager_tests.rs"]
mod tests;
