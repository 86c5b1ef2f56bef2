/// Headless graphics device - GPU resources backed by CPU memory
///
/// Used by offline tools (shader validation, asset cooking) and by the test
/// suite. Buffer writes land in plain byte vectors that can be read back,
/// and every device operation is counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, CommandList, GraphicsApi, GraphicsDevice, IndexType,
    Pipeline, PipelineDesc, Shader, ShaderDesc, ShaderStage, ShaderStageFlags, Texture,
    TextureData, TextureDesc, TextureInfo,
};

// ============================================================================
// Counters
// ============================================================================

/// Operation counters shared by a headless device and everything it created
#[derive(Debug, Default)]
pub struct HeadlessCounters {
    buffers_created: AtomicU64,
    buffer_writes: AtomicU64,
    bytes_written: AtomicU64,
    textures_created: AtomicU64,
    shaders_created: AtomicU64,
    pipelines_created: AtomicU64,
}

impl HeadlessCounters {
    pub fn buffers_created(&self) -> u64 {
        self.buffers_created.load(Ordering::Relaxed)
    }

    /// Number of `Buffer::update` calls across all buffers
    pub fn buffer_writes(&self) -> u64 {
        self.buffer_writes.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn textures_created(&self) -> u64 {
        self.textures_created.load(Ordering::Relaxed)
    }

    pub fn shaders_created(&self) -> u64 {
        self.shaders_created.load(Ordering::Relaxed)
    }

    pub fn pipelines_created(&self) -> u64 {
        self.pipelines_created.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Headless Buffer
// ============================================================================

pub struct HeadlessBuffer {
    usage: BufferUsage,
    data: Mutex<Vec<u8>>,
    counters: Arc<HeadlessCounters>,
}

impl HeadlessBuffer {
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Buffer for HeadlessBuffer {
    fn size(&self) -> u64 {
        self.data.lock().map(|d| d.len() as u64).unwrap_or(0)
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut contents = self
            .data
            .lock()
            .map_err(|_| Error::BackendError("Headless buffer lock poisoned".to_string()))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(Error::InvalidResource(format!(
                "Buffer write out of range: {}..{} on a {} byte buffer",
                start,
                end,
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        self.counters.buffer_writes.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn read_back(&self) -> Result<Vec<u8>> {
        self.data
            .lock()
            .map(|d| d.clone())
            .map_err(|_| Error::BackendError("Headless buffer lock poisoned".to_string()))
    }
}

// ============================================================================
// Headless Texture
// ============================================================================

pub struct HeadlessTexture {
    info: TextureInfo,
    /// Uploaded pixels, one entry per layer
    layers: Vec<Vec<u8>>,
}

impl HeadlessTexture {
    pub fn layer(&self, index: usize) -> Option<&[u8]> {
        self.layers.get(index).map(|l| l.as_slice())
    }
}

impl Texture for HeadlessTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

// ============================================================================
// Headless Shader / Pipeline
// ============================================================================

pub struct HeadlessShader {
    stage: ShaderStage,
    code_size: usize,
}

impl HeadlessShader {
    pub fn code_size(&self) -> usize {
        self.code_size
    }
}

impl Shader for HeadlessShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }
}

pub struct HeadlessPipeline {
    binding_count: usize,
}

impl Pipeline for HeadlessPipeline {
    fn binding_count(&self) -> usize {
        self.binding_count
    }
}

// ============================================================================
// Headless CommandList
// ============================================================================

/// One recorded command
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BindPipeline,
    BindUniformBuffer { set: u32, slot: u32, size: u64 },
    BindTexture { set: u32, slot: u32, width: u32, height: u32, cubemap: bool },
    BindSampler { set: u32, slot: u32 },
    BindVertexBuffer { offset: u64 },
    BindIndexBuffer { offset: u64, index_type: IndexType },
    PushConstants { stages: ShaderStageFlags, offset: u32, size: usize },
    DrawIndexed { index_count: u32, first_index: u32, vertex_offset: i32 },
}

#[derive(Debug, Default)]
pub struct HeadlessCommandList {
    commands: Vec<RecordedCommand>,
}

impl HeadlessCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandList for HeadlessCommandList {
    fn bind_pipeline(&mut self, _pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.commands.push(RecordedCommand::BindPipeline);
        Ok(())
    }

    fn bind_uniform_buffer(&mut self, set: u32, slot: u32, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.commands.push(RecordedCommand::BindUniformBuffer { set, slot, size: buffer.size() });
        Ok(())
    }

    fn bind_texture(&mut self, set: u32, slot: u32, texture: &Arc<dyn Texture>) -> Result<()> {
        let info = texture.info();
        self.commands.push(RecordedCommand::BindTexture {
            set,
            slot,
            width: info.width,
            height: info.height,
            cubemap: info.is_cubemap(),
        });
        Ok(())
    }

    fn bind_sampler(&mut self, set: u32, slot: u32) -> Result<()> {
        self.commands.push(RecordedCommand::BindSampler { set, slot });
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, _buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        self.commands.push(RecordedCommand::BindVertexBuffer { offset });
        Ok(())
    }

    fn bind_index_buffer(&mut self, _buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.commands.push(RecordedCommand::BindIndexBuffer { offset, index_type });
        Ok(())
    }

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) -> Result<()> {
        self.commands.push(RecordedCommand::PushConstants { stages, offset, size: data.len() });
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.commands.push(RecordedCommand::DrawIndexed { index_count, first_index, vertex_offset });
        Ok(())
    }
}

// ============================================================================
// Headless Device
// ============================================================================

/// CPU-only graphics device
///
/// An optional memory budget makes buffer and texture creation fail with
/// `Error::OutOfMemory` once exceeded.
pub struct HeadlessGraphicsDevice {
    api: GraphicsApi,
    counters: Arc<HeadlessCounters>,
    memory_budget: Option<u64>,
    memory_used: u64,
}

impl HeadlessGraphicsDevice {
    pub fn new(api: GraphicsApi) -> Self {
        Self {
            api,
            counters: Arc::new(HeadlessCounters::default()),
            memory_budget: None,
            memory_used: 0,
        }
    }

    /// Shared handle on the operation counters
    pub fn counters(&self) -> Arc<HeadlessCounters> {
        Arc::clone(&self.counters)
    }

    pub fn set_memory_budget(&mut self, bytes: Option<u64>) {
        self.memory_budget = bytes;
    }

    fn reserve(&mut self, bytes: u64) -> Result<()> {
        if let Some(budget) = self.memory_budget {
            if self.memory_used + bytes > budget {
                return Err(Error::OutOfMemory);
            }
        }
        self.memory_used += bytes;
        Ok(())
    }
}

impl GraphicsDevice for HeadlessGraphicsDevice {
    fn api(&self) -> GraphicsApi {
        self.api
    }

    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        self.reserve(desc.size)?;
        let mut data = vec![0u8; desc.size as usize];
        if let Some(initial) = &desc.initial_data {
            let len = initial.len().min(data.len());
            data[..len].copy_from_slice(&initial[..len]);
        }
        self.counters.buffers_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(HeadlessBuffer {
            usage: desc.usage,
            data: Mutex::new(data),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!(
                "Texture dimensions must be non-zero ({}x{})",
                desc.width, desc.height
            )));
        }
        let layer_count = desc.texture_type.layer_count();
        let layer_size = desc.width as u64 * desc.height as u64 * desc.format.bytes_per_pixel() as u64;
        self.reserve(layer_size * layer_count as u64)?;

        let mut layers = vec![Vec::new(); layer_count as usize];
        match desc.data {
            Some(TextureData::Single(bytes)) => layers[0] = bytes,
            Some(TextureData::Layers(entries)) => {
                for entry in entries {
                    let slot = layers.get_mut(entry.layer as usize).ok_or_else(|| {
                        Error::InvalidResource(format!(
                            "Texture layer {} out of range ({} layers)",
                            entry.layer, layer_count
                        ))
                    })?;
                    *slot = entry.data;
                }
            }
            None => {}
        }

        self.counters.textures_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(HeadlessTexture {
            info: TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage,
                texture_type: desc.texture_type,
            },
            layers,
        }))
    }

    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        if desc.code.is_empty() {
            return Err(Error::InvalidResource(format!("Empty {} shader binary", desc.stage)));
        }
        self.counters.shaders_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(HeadlessShader { stage: desc.stage, code_size: desc.code.len() }))
    }

    fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        if desc.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(Error::InvalidResource(
                "Pipeline vertex shader slot holds a non-vertex module".to_string(),
            ));
        }
        self.counters.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(HeadlessPipeline { binding_count: desc.bindings.len() }))
    }
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
