/// Named property façade over reflected uniform buffers
///
/// `CachedShaderMaps` is implemented by Shader and Material. Writes are
/// validated against the owner's declarations, forwarded to every owned
/// mapped buffer that has the member, then cached so they can be read back
/// and replayed after a hot reload. Unknown names and type mismatches are
/// warnings, never errors.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use crate::resource::mapped_uniform_buffer::MappedUniformBuffer;
use crate::resource::texture::{TextureHandle, TextureKind};
use crate::shader::declaration::DataType;

/// Property category used to validate writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Int,
    Float,
    Vec4,
    Matrix,
    Color,
}

impl PropertyKind {
    /// Whether a member of `data_type` can receive this kind of value
    pub fn accepts(&self, data_type: DataType) -> bool {
        match self {
            PropertyKind::Int => matches!(data_type, DataType::Int | DataType::UInt | DataType::Boolean | DataType::Char),
            PropertyKind::Float => data_type == DataType::Float,
            PropertyKind::Vec4 => data_type.is_vector(),
            PropertyKind::Matrix => data_type == DataType::Matrix,
            PropertyKind::Color => matches!(data_type, DataType::Vec3 | DataType::Vec4),
        }
    }
}

/// `update_shader_member` over a buffer list, skipping members of another kind
pub fn update_buffers(buffers: &mut [MappedUniformBuffer], name: &str, kind: Option<PropertyKind>, bytes: &[u8]) -> bool {
    let mut written = false;
    for buffer in buffers {
        let accepted = match (kind, buffer.declaration().member(name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(kind), Some(member)) => kind.accepts(member.data_type),
        };
        if accepted {
            written |= buffer.update(name, bytes);
        }
    }
    written
}

// ===== COLOR =====

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color32 {
    pub const BLACK: Color32 = Color32::rgba(0, 0, 0, 255);
    pub const WHITE: Color32 = Color32::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.strip_prefix('#')?;
        if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }

    pub fn to_normalized(&self) -> Vec4 {
        Vec4::new(self.r as f32, self.g as f32, self.b as f32, self.a as f32) / 255.0
    }

    pub fn from_normalized(value: Vec4) -> Self {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgba(channel(value.x), channel(value.y), channel(value.z), channel(value.w))
    }
}

// ===== PROPERTY MAPS =====

/// Last validated value of every property, per kind
///
/// Colors live in `vec4s`, normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMaps {
    pub ints: FxHashMap<String, i32>,
    pub floats: FxHashMap<String, f32>,
    pub vec4s: FxHashMap<String, Vec4>,
    pub matrices: FxHashMap<String, Mat4>,
    pub textures: FxHashMap<String, TextureHandle>,
}

impl PropertyMaps {
    pub fn clear(&mut self) {
        self.ints.clear();
        self.floats.clear();
        self.vec4s.clear();
        self.matrices.clear();
        self.textures.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty()
            && self.floats.is_empty()
            && self.vec4s.is_empty()
            && self.matrices.is_empty()
            && self.textures.is_empty()
    }

    /// Push every cached value through the setters of `target`
    ///
    /// Values the target no longer declares are dropped with a warning.
    pub fn replay_into<T: CachedShaderMaps + ?Sized>(&self, target: &mut T) {
        for (name, value) in &self.ints {
            target.set_int(name, *value);
        }
        for (name, value) in &self.floats {
            target.set_float(name, *value);
        }
        for (name, value) in &self.vec4s {
            target.set_vec4(name, *value);
        }
        for (name, value) in &self.matrices {
            target.set_matrix(name, *value);
        }
        for (name, handle) in &self.textures {
            target.set_texture(name, Some(*handle));
        }
    }
}

// ===== FAÇADE =====

pub trait CachedShaderMaps {
    /// Log source of the owner ("lumen::Material", ...)
    fn log_source(&self) -> &str;

    /// Owner name used in warnings
    fn owner_name(&self) -> &str;

    fn property_maps(&self) -> &PropertyMaps;

    fn property_maps_mut(&mut self) -> &mut PropertyMaps;

    /// True if one of the owner's buffers has a member `name` accepting `kind`
    fn has_shader_member(&self, name: &str, kind: PropertyKind) -> bool;

    /// True if the owner's shader binds a texture of `kind` under `name`
    fn has_shader_resource(&self, name: &str, kind: TextureKind) -> bool;

    /// Write into every owned buffer whose member `name` accepts `kind`
    /// (any member when `kind` is None); true if any did
    fn update_shader_member(&mut self, name: &str, kind: Option<PropertyKind>, bytes: &[u8]) -> bool;

    // ===== provided =====

    /// Validate then forward a write, warning when it is rejected
    fn write_member(&mut self, name: &str, kind: PropertyKind, bytes: &[u8]) -> bool {
        if !self.has_shader_member(name, kind) {
            crate::engine_warn!(
                self.log_source(),
                "{}: no {:?} property named '{}', value ignored",
                self.owner_name(),
                kind,
                name
            );
            return false;
        }
        self.update_shader_member(name, Some(kind), bytes);
        true
    }

    fn warn_missing(&self, kind: &str, name: &str) {
        crate::engine_warn!(
            self.log_source(),
            "{}: {} property '{}' was never set, using default",
            self.owner_name(),
            kind,
            name
        );
    }

    fn get_int(&self, name: &str) -> i32 {
        match self.property_maps().ints.get(name) {
            Some(value) => *value,
            None => {
                self.warn_missing("int", name);
                0
            }
        }
    }

    fn set_int(&mut self, name: &str, value: i32) {
        if self.write_member(name, PropertyKind::Int, bytemuck::bytes_of(&value)) {
            self.property_maps_mut().ints.insert(name.to_string(), value);
        }
    }

    fn set_bool(&mut self, name: &str, value: bool) {
        self.set_int(name, value as i32);
    }

    fn get_float(&self, name: &str) -> f32 {
        match self.property_maps().floats.get(name) {
            Some(value) => *value,
            None => {
                self.warn_missing("float", name);
                0.0
            }
        }
    }

    fn set_float(&mut self, name: &str, value: f32) {
        if self.write_member(name, PropertyKind::Float, bytemuck::bytes_of(&value)) {
            self.property_maps_mut().floats.insert(name.to_string(), value);
        }
    }

    fn get_vec4(&self, name: &str) -> Vec4 {
        match self.property_maps().vec4s.get(name) {
            Some(value) => *value,
            None => {
                self.warn_missing("vector", name);
                Vec4::ZERO
            }
        }
    }

    fn set_vec4(&mut self, name: &str, value: Vec4) {
        if self.write_member(name, PropertyKind::Vec4, bytemuck::bytes_of(&value)) {
            self.property_maps_mut().vec4s.insert(name.to_string(), value);
        }
    }

    fn set_vec2(&mut self, name: &str, value: Vec2) {
        self.set_vec4(name, value.extend(0.0).extend(0.0));
    }

    fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.set_vec4(name, value.extend(0.0));
    }

    fn get_matrix(&self, name: &str) -> Mat4 {
        match self.property_maps().matrices.get(name) {
            Some(value) => *value,
            None => {
                self.warn_missing("matrix", name);
                Mat4::IDENTITY
            }
        }
    }

    fn set_matrix(&mut self, name: &str, value: Mat4) {
        if self.write_member(name, PropertyKind::Matrix, bytemuck::bytes_of(&value)) {
            self.property_maps_mut().matrices.insert(name.to_string(), value);
        }
    }

    fn get_color(&self, name: &str) -> Color32 {
        match self.property_maps().vec4s.get(name) {
            Some(value) => Color32::from_normalized(*value),
            None => {
                self.warn_missing("color", name);
                Color32::BLACK
            }
        }
    }

    fn set_color(&mut self, name: &str, color: Color32) {
        let value = color.to_normalized();
        if self.write_member(name, PropertyKind::Color, bytemuck::bytes_of(&value)) {
            self.property_maps_mut().vec4s.insert(name.to_string(), value);
        }
    }

    fn get_texture(&self, name: &str) -> Option<TextureHandle> {
        let handle = self.property_maps().textures.get(name).copied();
        if handle.is_none() {
            self.warn_missing("texture", name);
        }
        handle
    }

    fn set_texture(&mut self, name: &str, texture: Option<TextureHandle>) {
        let Some(handle) = texture else {
            crate::engine_warn!(
                self.log_source(),
                "{}: null texture for '{}', ignored",
                self.owner_name(),
                name
            );
            return;
        };
        if !self.has_shader_resource(name, handle.kind) {
            crate::engine_warn!(
                self.log_source(),
                "{}: no {:?} resource named '{}', texture ignored",
                self.owner_name(),
                handle.kind,
                name
            );
            return;
        }
        self.property_maps_mut().textures.insert(name.to_string(), handle);
    }

    /// Raw named write, no validation and no caching
    fn set_data(&mut self, name: &str, bytes: &[u8]) -> bool {
        let written = self.update_shader_member(name, None, bytes);
        if !written {
            crate::engine_warn!(self.log_source(), "{}: no member named '{}'", self.owner_name(), name);
        }
        written
    }

    fn clear_all_maps(&mut self) {
        self.property_maps_mut().clear();
    }
}

#[cfg(test)]
#[path = "shader_maps_tests.rs"]
mod tests;
