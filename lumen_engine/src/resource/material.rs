/// Material asset
///
/// A Material references one Shader and owns its own copy of every
/// material-role uniform buffer of that shader, so two materials never share
/// GPU memory. Property writes go through `CachedShaderMaps`, validated
/// against the shader's reflected layout.
///
/// Reassigning the shader recreates the buffers from the new declarations
/// and clears the caches. `rebind` does the same but replays the cached
/// values, so they land at the new offsets after a layout change.

use std::sync::Arc;
use slotmap::new_key_type;
use crate::error::Result;
use crate::graphics_device::{CommandList, GraphicsDevice, Texture as GpuTexture};
use crate::resource::mapped_uniform_buffer::MappedUniformBuffer;
use crate::resource::shader::{texture_kind_matches, Shader, ShaderKey};
use crate::resource::shader_maps::{update_buffers, CachedShaderMaps, PropertyKind, PropertyMaps};
use crate::resource::texture::{TextureHandle, TextureKind};
use crate::shader::declaration::{ResourceKind, ShaderResourceDeclaration};

const LOG_SOURCE: &str = "lumen::Material";

new_key_type! {
    /// Key of a material in the asset manager
    pub struct MaterialKey;
}

pub struct Material {
    name: String,
    shader: ShaderKey,
    buffers: Vec<MappedUniformBuffer>,
    resources: Vec<Arc<ShaderResourceDeclaration>>,
    maps: PropertyMaps,
    source_path: Option<String>,
}

fn create_buffers(shader: &Shader, device: &mut dyn GraphicsDevice) -> Result<Vec<MappedUniformBuffer>> {
    shader
        .material_declarations()
        .into_iter()
        .map(|declaration| MappedUniformBuffer::new(declaration, device))
        .collect()
}

impl Material {
    pub fn new(
        name: impl Into<String>,
        shader_key: ShaderKey,
        shader: &Shader,
        device: &mut dyn GraphicsDevice,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            shader: shader_key,
            buffers: create_buffers(shader, device)?,
            resources: shader.reflection().resources.clone(),
            maps: PropertyMaps::default(),
            source_path: None,
        })
    }

    /// Switch to another shader: fresh buffers, empty caches
    pub fn set_shader(&mut self, shader_key: ShaderKey, shader: &Shader, device: &mut dyn GraphicsDevice) -> Result<()> {
        self.buffers = create_buffers(shader, device)?;
        self.resources = shader.reflection().resources.clone();
        self.shader = shader_key;
        self.clear_all_maps();
        Ok(())
    }

    /// Re-derive the buffers from `shader` and replay every cached value
    pub fn rebind(&mut self, shader: &Shader, device: &mut dyn GraphicsDevice) -> Result<()> {
        let snapshot = self.maps.clone();
        self.set_shader(self.shader, shader, device)?;
        snapshot.replay_into(self);
        Ok(())
    }

    /// Flush and bind the material buffers and textures
    ///
    /// `resolve` maps each texture resource (and the handle set for it, if
    /// any) to a device texture; the asset manager substitutes fallbacks
    /// there. A resource it cannot resolve is skipped, never bound empty.
    pub fn bind(
        &mut self,
        cmd: &mut dyn CommandList,
        resolve: &mut dyn FnMut(&ShaderResourceDeclaration, Option<TextureHandle>) -> Option<Arc<dyn GpuTexture>>,
    ) -> Result<()> {
        for buffer in &mut self.buffers {
            buffer.bind(cmd)?;
        }
        for resource in &self.resources {
            if resource.kind == ResourceKind::Sampler {
                cmd.bind_sampler(resource.binding_set, resource.binding_slot)?;
                continue;
            }
            let handle = self.maps.textures.get(&resource.name).copied();
            match resolve(resource, handle) {
                Some(texture) => cmd.bind_texture(resource.binding_set, resource.binding_slot, &texture)?,
                None => crate::engine_warn!(
                    LOG_SOURCE,
                    "{}: no texture for '{}', binding skipped",
                    self.name,
                    resource.name
                ),
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> ShaderKey {
        self.shader
    }

    pub fn buffers(&self) -> &[MappedUniformBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, name: &str) -> Option<&MappedUniformBuffer> {
        self.buffers.iter().find(|b| b.name() == name)
    }

    pub fn resources(&self) -> &[Arc<ShaderResourceDeclaration>] {
        &self.resources
    }

    /// Material file this material was loaded from
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub(crate) fn set_source_path(&mut self, path: Option<String>) {
        self.source_path = path;
    }

    /// Every texture handle the material references
    pub fn texture_handles(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.maps.textures.values().copied()
    }
}

impl CachedShaderMaps for Material {
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
        self.resources
            .iter()
            .any(|r| r.name == name && r.takes_texture() && texture_kind_matches(r.data_type, kind))
    }

    fn update_shader_member(&mut self, name: &str, kind: Option<PropertyKind>, bytes: &[u8]) -> bool {
        update_buffers(&mut self.buffers, name, kind, bytes)
    }
}

#[cfg(test)]
#[path = "material_tests.rs"]
mod tests;
