//! Engine assets: shaders, materials, textures, meshes
//!
//! Shader and Material expose their properties through `CachedShaderMaps`;
//! both hold `MappedUniformBuffer`s created from reflected declarations.

pub mod mapped_uniform_buffer;
pub mod shader_maps;
pub mod shader;
pub mod material;
pub mod texture;
pub mod mesh;

pub use mapped_uniform_buffer::MappedUniformBuffer;
pub use shader_maps::{update_buffers, CachedShaderMaps, Color32, PropertyKind, PropertyMaps};
pub use shader::{ReloadCallback, Shader, ShaderKey, ShaderState, SHADER_EXTENSION};
pub use material::{Material, MaterialKey};
pub use texture::{DecodedImage, Texture, TextureHandle, TextureKey, TextureKind, TextureSource, CUBEMAP_FACES};
pub use mesh::{Mesh, MeshData, MeshKey, MeshVertex, SubMesh};
