//! Mesh asset
//!
//! Vertex and index buffers loaded from Wavefront OBJ. Every object/group of
//! the file becomes a `SubMesh` drawn from the shared buffers. Vertices are
//! interleaved position/normal/uv (32 bytes); missing normals or uvs are
//! zero-filled.

use std::io::Cursor;
use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use slotmap::new_key_type;
use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferFormat, BufferUsage, CommandList, GraphicsDevice, IndexType, VertexAttribute,
    VertexBinding, VertexInputRate, VertexLayout,
};

new_key_type! {
    /// Key of a mesh in the asset manager
    pub struct MeshKey;
}

// ============================================================================
// VERTEX DATA
// ============================================================================

/// Interleaved mesh vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

pub const VERTEX_STRIDE: u32 = std::mem::size_of::<MeshVertex>() as u32;

/// Vertex layout matching `MeshVertex` (POSITION, NORMAL, TEXCOORD0 at locations 0-2)
pub fn mesh_vertex_layout() -> VertexLayout {
    let attribute = |location, format, offset| VertexAttribute { location, binding: 0, format, offset };
    VertexLayout {
        bindings: vec![VertexBinding { binding: 0, stride: VERTEX_STRIDE, input_rate: VertexInputRate::Vertex }],
        attributes: vec![
            attribute(0, BufferFormat::R32G32B32_SFLOAT, 0),
            attribute(1, BufferFormat::R32G32B32_SFLOAT, 12),
            attribute(2, BufferFormat::R32G32_SFLOAT, 24),
        ],
    }
}

/// Drawable range of the shared buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMesh {
    pub name: String,
    pub first_index: u32,
    pub index_count: u32,
    /// Added to every index of the range
    pub vertex_offset: i32,
}

/// CPU-side geometry, before upload
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
}

impl MeshData {
    /// Parse an OBJ file (material libraries are ignored)
    pub fn from_obj(bytes: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(bytes);
        let (models, _materials) = tobj::load_obj_buf(&mut reader, &tobj::GPU_LOAD_OPTIONS, |_| {
            Err(tobj::LoadError::OpenFileFailed)
        })
        .map_err(|e| Error::Parse(format!("OBJ: {}", e)))?;

        let mut data = MeshData::default();
        for model in models {
            let mesh = &model.mesh;
            if mesh.indices.is_empty() {
                continue;
            }
            let base = data.vertices.len();
            let vertex_count = mesh.positions.len() / 3;
            for i in 0..vertex_count {
                let position = [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]];
                let normal = match mesh.normals.get(3 * i..3 * i + 3) {
                    Some(n) => [n[0], n[1], n[2]],
                    None => [0.0; 3],
                };
                let uv = match mesh.texcoords.get(2 * i..2 * i + 2) {
                    Some(t) => [t[0], t[1]],
                    None => [0.0; 2],
                };
                data.vertices.push(MeshVertex { position, normal, uv });
            }

            if let Some(bad) = mesh.indices.iter().find(|&&index| index as usize >= vertex_count) {
                return Err(Error::Parse(format!(
                    "OBJ: index {} out of range in '{}' ({} vertices)",
                    bad, model.name, vertex_count
                )));
            }
            data.submeshes.push(SubMesh {
                name: model.name.clone(),
                first_index: data.indices.len() as u32,
                index_count: mesh.indices.len() as u32,
                vertex_offset: base as i32,
            });
            data.indices.extend_from_slice(&mesh.indices);
        }

        if data.submeshes.is_empty() {
            return Err(Error::Parse("OBJ: file contains no faces".to_string()));
        }
        Ok(data)
    }

    /// Unit cube centred on the origin, 4 vertices per face, outward CCW winding
    pub fn unit_cube() -> Self {
        // (normal, u, v) with u x v = normal
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let corners = [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut data = MeshData::default();
        for (normal, u, v) in faces {
            let base = data.vertices.len() as u32;
            for (su, sv) in corners {
                let position = (normal + u * su + v * sv) * 0.5;
                data.vertices.push(MeshVertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    uv: [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
                });
            }
            data.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        data.submeshes.push(SubMesh {
            name: "cube".to_string(),
            first_index: 0,
            index_count: data.indices.len() as u32,
            vertex_offset: 0,
        });
        data
    }
}

// ============================================================================
// MESH
// ============================================================================

pub struct Mesh {
    vertex_buffer: Arc<dyn Buffer>,
    index_buffer: Arc<dyn Buffer>,
    vertex_count: u32,
    index_count: u32,
    submeshes: Vec<SubMesh>,
    source: Option<String>,
}

impl Mesh {
    /// Upload geometry into new vertex and index buffers
    pub fn new(device: &mut dyn GraphicsDevice, data: &MeshData, source: Option<String>) -> Result<Self> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(Error::InvalidResource("Mesh has no geometry".to_string()));
        }
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

        let vertex_buffer = device.create_buffer(BufferDesc {
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::Vertex,
            initial_data: Some(vertex_bytes.to_vec()),
        })?;
        let index_buffer = device.create_buffer(BufferDesc {
            size: index_bytes.len() as u64,
            usage: BufferUsage::Index,
            initial_data: Some(index_bytes.to_vec()),
        })?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            submeshes: data.submeshes.clone(),
            source,
        })
    }

    /// Bind the buffers and draw every submesh
    pub fn draw(&self, cmd: &mut dyn CommandList) -> Result<()> {
        cmd.bind_vertex_buffer(&self.vertex_buffer, 0)?;
        cmd.bind_index_buffer(&self.index_buffer, 0, IndexType::U32)?;
        for submesh in &self.submeshes {
            cmd.draw_indexed(submesh.index_count, submesh.first_index, submesh.vertex_offset)?;
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
