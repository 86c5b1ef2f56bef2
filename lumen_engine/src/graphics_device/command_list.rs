/// CommandList trait - records binds and draws for one frame

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Buffer, IndexType, Pipeline, ShaderStageFlags, Texture};

/// Command list trait
///
/// Backends translate these calls into their own command recording. Binding
/// locations are the reflected `(set, slot)` pairs.
pub trait CommandList: Send {
    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    fn bind_uniform_buffer(&mut self, set: u32, slot: u32, buffer: &Arc<dyn Buffer>) -> Result<()>;

    fn bind_texture(&mut self, set: u32, slot: u32, texture: &Arc<dyn Texture>) -> Result<()>;

    /// Bind the default sampler at a standalone sampler slot
    fn bind_sampler(&mut self, set: u32, slot: u32) -> Result<()>;

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()>;

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()>;

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) -> Result<()>;

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;
}
