/// JSON material files
///
/// ```json
/// {
///     "shader": "/shaders/lit.shader",
///     "tint": "#FF8000",
///     "roughness": 0.4,
///     "flags": 3,
///     "offset": { "x": 1, "y": 2 },
///     "colorMap": "textures/brick.png",
///     "sky": { "posX": "sky/px.png", "negX": "sky/nx.png", ... }
/// }
/// ```
///
/// Property values only get their final type once the shader is known:
/// a number is an int when the shader member is integral, a float otherwise.
/// Relative paths resolve against the material file's directory.

use glam::{Mat4, Vec4};
use serde_json::{Map, Value};
use crate::asset::vfs::{resolve_relative, virtual_extension};
use crate::error::{Error, Result};
use crate::resource::shader_maps::Color32;
use crate::resource::texture::CUBEMAP_FACES;
use crate::shader::declaration::DataType;

/// Key naming the shader of a material
pub const SHADER_KEY: &str = "shader";

/// A material file before conversion
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialFile {
    /// Virtual path of the shader
    pub shader: String,
    /// Every other key, sorted by name
    pub properties: Vec<(String, Value)>,
}

/// A converted property value
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialValue {
    Int(i32),
    Float(f32),
    Vec4(Vec4),
    Matrix(Mat4),
    Color(Color32),
    /// Virtual path of a 2D texture
    Texture(String),
    /// Virtual paths of the six faces, in `CUBEMAP_FACES` order
    Cubemap(Vec<String>),
}

/// Parse a material file; any JSON or structure problem is `Error::Parse`
pub fn parse_material_file(text: &str, path: &str) -> Result<MaterialFile> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| Error::Parse(format!("{}: invalid JSON: {}", path, e)))?;
    let Value::Object(object) = root else {
        return Err(Error::Parse(format!("{}: a material must be a JSON object", path)));
    };

    let shader = match object.get(SHADER_KEY) {
        Some(Value::String(shader)) => resolve_relative(path, shader),
        Some(_) => return Err(Error::Parse(format!("{}: \"shader\" must be a string", path))),
        None => return Err(Error::Parse(format!("{}: missing \"shader\" key", path))),
    };

    let properties = object
        .into_iter()
        .filter(|(key, _)| key != SHADER_KEY)
        .collect();
    Ok(MaterialFile { shader, properties })
}

/// True for files whose extension asks for PBR defaults
pub fn is_pbr_material(path: &str) -> bool {
    virtual_extension(path).is_some_and(|ext| ext.contains("pbr"))
}

fn is_integral(data_type: DataType) -> bool {
    matches!(data_type, DataType::Int | DataType::UInt | DataType::Boolean | DataType::Char)
}

/// Integer value of a JSON number, `3.0` included
fn whole_number(value: &Value) -> Option<i32> {
    if let Some(v) = value.as_i64() {
        return i32::try_from(v).ok();
    }
    let v = value.as_f64()?;
    if v.fract() != 0.0 || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return None;
    }
    Some(v as i32)
}

fn number(value: &Value) -> Option<f32> {
    value.as_f64().map(|v| v as f32)
}

fn vector_from_object(object: &Map<String, Value>) -> Option<Vec4> {
    let pick = |keys: [&str; 4]| -> Option<Vec4> {
        if !keys.iter().any(|k| object.contains_key(*k)) {
            return None;
        }
        let mut out = [0.0f32; 4];
        for (slot, key) in out.iter_mut().zip(keys) {
            if let Some(component) = object.get(key) {
                *slot = number(component)?;
            }
        }
        Some(Vec4::from_array(out))
    };
    pick(["x", "y", "z", "w"]).or_else(|| pick(["r", "g", "b", "a"]))
}

/// Convert one JSON property
///
/// `member` is the type of the shader member with this name, if any. The
/// error string says why the value was rejected.
pub fn convert_property(
    material_path: &str,
    value: &Value,
    member: Option<DataType>,
) -> std::result::Result<MaterialValue, String> {
    match value {
        Value::Bool(flag) => Ok(MaterialValue::Int(*flag as i32)),
        Value::Number(_) => {
            let as_float = number(value).ok_or("number out of range")?;
            match member {
                Some(data_type) if is_integral(data_type) => whole_number(value)
                    .map(MaterialValue::Int)
                    .ok_or_else(|| format!("{} is not a 32-bit integer", value)),
                _ => Ok(MaterialValue::Float(as_float)),
            }
        }
        Value::String(text) if text.starts_with('#') => Color32::from_hex(text)
            .map(MaterialValue::Color)
            .ok_or_else(|| format!("'{}' is not a #RRGGBB or #RRGGBBAA color", text)),
        Value::String(text) => Ok(MaterialValue::Texture(resolve_relative(material_path, text))),
        Value::Array(items) => {
            let numbers: Option<Vec<f32>> = items.iter().map(number).collect();
            let numbers = numbers.ok_or("arrays must only hold numbers")?;
            match numbers.len() {
                16 => {
                    let mut columns = [0.0f32; 16];
                    columns.copy_from_slice(&numbers);
                    Ok(MaterialValue::Matrix(Mat4::from_cols_array(&columns)))
                }
                2..=4 => {
                    let mut components = [0.0f32; 4];
                    components[..numbers.len()].copy_from_slice(&numbers);
                    Ok(MaterialValue::Vec4(Vec4::from_array(components)))
                }
                n => Err(format!("array of {} numbers is neither a vector nor a 4x4 matrix", n)),
            }
        }
        Value::Object(object) if CUBEMAP_FACES.iter().any(|face| object.contains_key(*face)) => {
            let mut faces = Vec::with_capacity(CUBEMAP_FACES.len());
            for face in CUBEMAP_FACES {
                match object.get(face) {
                    Some(Value::String(path)) => faces.push(resolve_relative(material_path, path)),
                    _ => return Err(format!("cubemap face '{}' missing or not a path", face)),
                }
            }
            Ok(MaterialValue::Cubemap(faces))
        }
        Value::Object(object) => vector_from_object(object)
            .map(MaterialValue::Vec4)
            .ok_or_else(|| "objects must be x/y/z/w or r/g/b/a vectors".to_string()),
        Value::Null => Err("null value".to_string()),
    }
}

// ===== PBR DEFAULTS =====

/// Default injected into PBR materials
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PbrDefault {
    Color(Color32),
    Float(f32),
    Int(i32),
    /// The engine's flat normal texture
    FlatNormalMap,
}

/// Properties a PBR material gets when its file does not set them
pub const PBR_DEFAULTS: &[(&str, PbrDefault)] = &[
    ("color", PbrDefault::Color(Color32::WHITE)),
    ("normalMap", PbrDefault::FlatNormalMap),
    ("roughness", PbrDefault::Float(0.1)),
    ("metallic", PbrDefault::Float(0.0)),
    ("useColorMap", PbrDefault::Int(0)),
    ("useNormalMap", PbrDefault::Int(0)),
    ("useRoughnessMap", PbrDefault::Int(0)),
    ("useMetallicMap", PbrDefault::Int(0)),
];

#[cfg(test)]
#[path = "material_loader_tests.rs"]
mod tests;
