/// CPU-mirrored uniform buffer
///
/// One `MappedUniformBuffer` exists per reflected buffer per owner (Shader or
/// Material). Named writes land in the CPU mirror and mark it dirty; `flush`
/// uploads the whole mirror in one transfer. The mirror size is fixed by the
/// declaration: a new layout means a new `MappedUniformBuffer`.
///
/// Every mutating method takes `&mut self`, so a buffer has exactly one
/// writer at a time.

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Buffer, BufferDesc, BufferUsage, CommandList, GraphicsDevice};
use crate::shader::declaration::ShaderUniformBufferDeclaration;

pub struct MappedUniformBuffer {
    // Field order is drop order: the GPU buffer goes first
    gpu: Arc<dyn Buffer>,
    cpu: Vec<u8>,
    declaration: Arc<ShaderUniformBufferDeclaration>,
    gpu_up_to_date: bool,
}

impl MappedUniformBuffer {
    /// Allocate a zeroed mirror and a GPU buffer of the declared size
    pub fn new(declaration: Arc<ShaderUniformBufferDeclaration>, device: &mut dyn GraphicsDevice) -> Result<Self> {
        let size = declaration.total_size() as usize;
        let gpu = device.create_buffer(BufferDesc {
            size: size as u64,
            usage: BufferUsage::Uniform,
            initial_data: None,
        })?;

        Ok(Self {
            gpu,
            cpu: vec![0u8; size],
            declaration,
            gpu_up_to_date: false,
        })
    }

    /// Copy `bytes` into the named member
    ///
    /// At most `member.size` bytes are written. Returns false (and changes
    /// nothing) when the buffer has no such member.
    pub fn update(&mut self, name: &str, bytes: &[u8]) -> bool {
        let Some(member) = self.declaration.member(name) else {
            return false;
        };
        let start = member.offset as usize;
        let len = bytes.len().min(member.size as usize);
        let end = (start + len).min(self.cpu.len());
        if end > start {
            self.cpu[start..end].copy_from_slice(&bytes[..end - start]);
        }
        self.gpu_up_to_date = false;
        true
    }

    /// Replace the buffer contents from offset 0 and upload immediately
    ///
    /// Bytes beyond the buffer size are ignored.
    pub fn update_all(&mut self, bytes: &[u8]) -> Result<()> {
        let len = bytes.len().min(self.cpu.len());
        self.cpu[..len].copy_from_slice(&bytes[..len]);
        self.gpu.update(0, &self.cpu)?;
        self.gpu_up_to_date = true;
        Ok(())
    }

    /// Upload the mirror if it changed since the last upload
    pub fn flush(&mut self) -> Result<()> {
        if self.gpu_up_to_date {
            return Ok(());
        }
        self.gpu.update(0, &self.cpu)?;
        self.gpu_up_to_date = true;
        Ok(())
    }

    /// Flush, then bind at the declared set/slot
    pub fn bind(&mut self, cmd: &mut dyn CommandList) -> Result<()> {
        self.flush()?;
        cmd.bind_uniform_buffer(self.declaration.binding_set(), self.declaration.binding_slot(), &self.gpu)
    }

    pub fn is_up_to_date(&self) -> bool {
        self.gpu_up_to_date
    }

    pub fn declaration(&self) -> &Arc<ShaderUniformBufferDeclaration> {
        &self.declaration
    }

    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn cpu_bytes(&self) -> &[u8] {
        &self.cpu
    }

    /// CPU bytes of one member
    pub fn member_bytes(&self, name: &str) -> Option<&[u8]> {
        let member = self.declaration.member(name)?;
        let end = (member.end() as usize).min(self.cpu.len());
        self.cpu.get(member.offset as usize..end)
    }

    pub fn gpu_buffer(&self) -> &Arc<dyn Buffer> {
        &self.gpu
    }
}

#[cfg(test)]
#[path = "mapped_uniform_buffer_tests.rs"]
mod tests;
