//! Asset loading: virtual file system, material files and the asset manager

pub mod vfs;
pub mod material_loader;
pub mod asset_manager;

pub use vfs::{normalize_virtual_path, resolve_relative, virtual_extension, virtual_parent, VirtualFileSystem};
pub use material_loader::{parse_material_file, MaterialFile, MaterialValue};
pub use asset_manager::{AssetManager, Fallbacks, SweepReport, ERROR_SHADER_SOURCE};
