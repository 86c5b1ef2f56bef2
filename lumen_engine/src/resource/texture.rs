/// Texture asset
///
/// A 2D texture or a cubemap backed by a device texture. The asset keeps its
/// source path(s) and the modification time it was loaded from, so the asset
/// manager can detect changes and swap the device texture in place; handles
/// held by materials stay valid across reloads.

use std::sync::Arc;
use std::time::SystemTime;
use slotmap::new_key_type;
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, Texture as GpuTexture, TextureData, TextureDesc, TextureFormat, TextureLayerData,
    TextureType, TextureUsage,
};

new_key_type! {
    /// Key of a texture in the asset manager
    pub struct TextureKey;
}

/// Cubemap face order, as named in material files
pub const CUBEMAP_FACES: [&str; 6] = ["posX", "negX", "posY", "negY", "posZ", "negZ"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Tex2D,
    Cubemap,
}

impl TextureKind {
    fn texture_type(&self) -> TextureType {
        match self {
            TextureKind::Tex2D => TextureType::Tex2D,
            TextureKind::Cubemap => TextureType::Cubemap,
        }
    }
}

/// Typed reference to a texture asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub key: TextureKey,
    pub kind: TextureKind,
}

// ===== DECODING =====

/// RGBA8 pixels decoded from an image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self { width: 1, height: 1, pixels: rgba.to_vec() }
    }
}

/// Decode a PNG/JPEG file into RGBA8
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::Parse(format!("Image decode failed: {}", e)))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(DecodedImage { width, height, pixels: image.into_raw() })
}

// ===== SOURCE =====

/// Where a texture's pixels came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    File(String),
    Cubemap(Vec<String>),
    /// Engine-generated (fallbacks, solid colors)
    Builtin(String),
}

impl TextureSource {
    /// Files to watch for hot reload
    pub fn paths(&self) -> Vec<&str> {
        match self {
            TextureSource::File(path) => vec![path.as_str()],
            TextureSource::Cubemap(faces) => faces.iter().map(String::as_str).collect(),
            TextureSource::Builtin(_) => Vec::new(),
        }
    }
}

// ===== TEXTURE =====

pub struct Texture {
    gpu: Arc<dyn GpuTexture>,
    kind: TextureKind,
    format: TextureFormat,
    source: TextureSource,
    modified: Option<SystemTime>,
}

fn upload(
    device: &mut dyn GraphicsDevice,
    kind: TextureKind,
    format: TextureFormat,
    images: &[DecodedImage],
) -> Result<Arc<dyn GpuTexture>> {
    let first = images
        .first()
        .ok_or_else(|| Error::InvalidResource("Texture upload without pixels".to_string()))?;
    if images.len() != kind.texture_type().layer_count() as usize {
        return Err(Error::InvalidResource(format!(
            "{:?} texture needs {} images, got {}",
            kind,
            kind.texture_type().layer_count(),
            images.len()
        )));
    }
    if let Some(odd) = images.iter().find(|i| (i.width, i.height) != (first.width, first.height)) {
        return Err(Error::InvalidResource(format!(
            "Cubemap faces differ in size ({}x{} vs {}x{})",
            first.width, first.height, odd.width, odd.height
        )));
    }

    let data = match kind {
        TextureKind::Tex2D => TextureData::Single(first.pixels.clone()),
        TextureKind::Cubemap => TextureData::Layers(
            images
                .iter()
                .enumerate()
                .map(|(layer, image)| TextureLayerData { layer: layer as u32, data: image.pixels.clone() })
                .collect(),
        ),
    };

    device.create_texture(TextureDesc {
        width: first.width,
        height: first.height,
        format,
        usage: TextureUsage::Sampled,
        texture_type: kind.texture_type(),
        data: Some(data),
    })
}

impl Texture {
    /// Create a 2D texture
    pub fn new_2d(
        device: &mut dyn GraphicsDevice,
        image: &DecodedImage,
        format: TextureFormat,
        source: TextureSource,
        modified: Option<SystemTime>,
    ) -> Result<Self> {
        let gpu = upload(device, TextureKind::Tex2D, format, std::slice::from_ref(image))?;
        Ok(Self { gpu, kind: TextureKind::Tex2D, format, source, modified })
    }

    /// Create a cubemap from six faces in `CUBEMAP_FACES` order
    pub fn new_cubemap(
        device: &mut dyn GraphicsDevice,
        faces: &[DecodedImage],
        format: TextureFormat,
        source: TextureSource,
        modified: Option<SystemTime>,
    ) -> Result<Self> {
        let gpu = upload(device, TextureKind::Cubemap, format, faces)?;
        Ok(Self { gpu, kind: TextureKind::Cubemap, format, source, modified })
    }

    /// 1x1 texture (or cubemap) of one color
    pub fn solid(device: &mut dyn GraphicsDevice, kind: TextureKind, rgba: [u8; 4], format: TextureFormat, name: &str) -> Result<Self> {
        let faces = vec![DecodedImage::solid(rgba); kind.texture_type().layer_count() as usize];
        let gpu = upload(device, kind, format, &faces)?;
        Ok(Self {
            gpu,
            kind,
            format,
            source: TextureSource::Builtin(name.to_string()),
            modified: None,
        })
    }

    /// Replace the pixels with a freshly decoded version of the source
    pub(crate) fn reupload(
        &mut self,
        device: &mut dyn GraphicsDevice,
        images: &[DecodedImage],
        modified: SystemTime,
    ) -> Result<()> {
        self.gpu = upload(device, self.kind, self.format, images)?;
        self.modified = Some(modified);
        Ok(())
    }

    pub fn gpu_texture(&self) -> &Arc<dyn GpuTexture> {
        &self.gpu
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
