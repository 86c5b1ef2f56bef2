/// Graphics device module - backend-agnostic GPU resource traits
///
/// The engine never talks to a graphics API directly: buffers, textures,
/// shader modules, pipelines and command lists are created through the
/// `GraphicsDevice` trait. `HeadlessGraphicsDevice` is a CPU implementation
/// used by tools and tests.

pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod shader;
pub mod pipeline;
pub mod binding;
pub mod command_list;
pub mod headless;

pub use graphics_device::*;
pub use buffer::*;
pub use texture::*;
pub use shader::*;
pub use pipeline::*;
pub use binding::*;
pub use command_list::*;
pub use headless::*;
