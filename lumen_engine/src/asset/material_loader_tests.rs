//! Unit tests for material file parsing and value conversion

use glam::{Mat4, Vec4};
use serde_json::json;
use crate::asset::material_loader::{
    convert_property, is_pbr_material, parse_material_file, MaterialValue, PBR_DEFAULTS,
};
use crate::error::Error;
use crate::resource::shader_maps::Color32;
use crate::shader::declaration::DataType;

const PATH: &str = "/materials/brick.mat";

// ============================================================================
// FILE PARSING
// ============================================================================

#[test]
fn test_parse_material_file() {
    let file = parse_material_file(r##"{"shader": "../shaders/lit.shader", "roughness": 0.5, "tint": "#FF0000"}"##, PATH)
        .unwrap();
    assert_eq!(file.shader, "/shaders/lit.shader");
    let names: Vec<&str> = file.properties.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["roughness", "tint"]);
}

#[test]
fn test_absolute_shader_path() {
    let file = parse_material_file(r#"{"shader": "/s.shader"}"#, PATH).unwrap();
    assert_eq!(file.shader, "/s.shader");
    assert!(file.properties.is_empty());
}

#[test]
fn test_parse_errors() {
    for text in [
        "{ not json",
        r#"["shader"]"#,
        r#"{"roughness": 1.0}"#,
        r#"{"shader": 42}"#,
    ] {
        let err = parse_material_file(text, PATH).unwrap_err();
        assert!(matches!(err, Error::Parse(ref msg) if msg.starts_with(PATH)), "{}", text);
    }
}

#[test]
fn test_is_pbr_material() {
    assert!(is_pbr_material("/m/metal.pbr"));
    assert!(is_pbr_material("/m/metal.PBRMAT"));
    assert!(!is_pbr_material("/m/metal.mat"));
    assert!(!is_pbr_material("/pbr/metal.mat"));
}

// ============================================================================
// VALUE CONVERSION
// ============================================================================

#[test]
fn test_numbers_follow_member_type() {
    assert_eq!(convert_property(PATH, &json!(3), Some(DataType::Int)), Ok(MaterialValue::Int(3)));
    assert_eq!(convert_property(PATH, &json!(1), Some(DataType::Boolean)), Ok(MaterialValue::Int(1)));
    assert_eq!(convert_property(PATH, &json!(3), Some(DataType::Float)), Ok(MaterialValue::Float(3.0)));
    assert_eq!(convert_property(PATH, &json!(0.25), None), Ok(MaterialValue::Float(0.25)));
    assert!(convert_property(PATH, &json!(0.5), Some(DataType::Int)).is_err());
}

#[test]
fn test_whole_floats_fill_integer_members() {
    assert_eq!(convert_property(PATH, &json!(3.0), Some(DataType::Int)), Ok(MaterialValue::Int(3)));
    assert_eq!(convert_property(PATH, &json!(1.0), Some(DataType::Boolean)), Ok(MaterialValue::Int(1)));
    assert_eq!(convert_property(PATH, &json!(-2.0), Some(DataType::Int)), Ok(MaterialValue::Int(-2)));
    assert!(convert_property(PATH, &json!(3.5), Some(DataType::Int)).is_err());
    assert!(convert_property(PATH, &json!(1e12), Some(DataType::UInt)).is_err());
}

#[test]
fn test_booleans_are_ints() {
    assert_eq!(convert_property(PATH, &json!(true), None), Ok(MaterialValue::Int(1)));
    assert_eq!(convert_property(PATH, &json!(false), Some(DataType::Float)), Ok(MaterialValue::Int(0)));
}

#[test]
fn test_vectors() {
    assert_eq!(
        convert_property(PATH, &json!({"x": 1, "y": 2}), None),
        Ok(MaterialValue::Vec4(Vec4::new(1.0, 2.0, 0.0, 0.0)))
    );
    assert_eq!(
        convert_property(PATH, &json!({"r": 0.5, "a": 1}), None),
        Ok(MaterialValue::Vec4(Vec4::new(0.5, 0.0, 0.0, 1.0)))
    );
    assert_eq!(
        convert_property(PATH, &json!([1, 2, 3]), None),
        Ok(MaterialValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 0.0)))
    );
    assert!(convert_property(PATH, &json!({"u": 1}), None).is_err());
    assert!(convert_property(PATH, &json!({"x": "one"}), None).is_err());
}

#[test]
fn test_matrix_is_column_major() {
    let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let converted = convert_property(PATH, &json!(values), None).unwrap();
    let expected = Mat4::from_cols_array(&[
        0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0,
    ]);
    assert_eq!(converted, MaterialValue::Matrix(expected));
    assert!(convert_property(PATH, &json!([1, 2, 3, 4, 5]), None).is_err());
    assert!(convert_property(PATH, &json!([1]), None).is_err());
}

#[test]
fn test_colors() {
    assert_eq!(
        convert_property(PATH, &json!("#FF0000FF"), None),
        Ok(MaterialValue::Color(Color32::rgba(255, 0, 0, 255)))
    );
    assert!(convert_property(PATH, &json!("#XYZ"), None).is_err());
}

#[test]
fn test_texture_paths_resolve_relative() {
    assert_eq!(
        convert_property(PATH, &json!("textures/brick.png"), None),
        Ok(MaterialValue::Texture("/materials/textures/brick.png".to_string()))
    );
    assert_eq!(
        convert_property(PATH, &json!("/engine/white.png"), None),
        Ok(MaterialValue::Texture("/engine/white.png".to_string()))
    );
}

#[test]
fn test_cubemap_faces() {
    let value = json!({
        "posX": "sky/px.png", "negX": "sky/nx.png",
        "posY": "sky/py.png", "negY": "sky/ny.png",
        "posZ": "sky/pz.png", "negZ": "/sky/nz.png"
    });
    match convert_property(PATH, &value, None) {
        Ok(MaterialValue::Cubemap(faces)) => {
            assert_eq!(faces.len(), 6);
            assert_eq!(faces[0], "/materials/sky/px.png");
            assert_eq!(faces[5], "/sky/nz.png");
        }
        other => panic!("expected a cubemap, got {:?}", other),
    }

    let incomplete = json!({"posX": "px.png"});
    assert!(convert_property(PATH, &incomplete, None).is_err());
}

#[test]
fn test_null_is_rejected() {
    assert!(convert_property(PATH, &json!(null), None).is_err());
}

#[test]
fn test_pbr_default_names() {
    let names: Vec<&str> = PBR_DEFAULTS.iter().map(|(n, _)| *n).collect();
    assert_eq!(
        names,
        vec!["color", "normalMap", "roughness", "metallic", "useColorMap", "useNormalMap", "useRoughnessMap", "useMetallicMap"]
    );
}
