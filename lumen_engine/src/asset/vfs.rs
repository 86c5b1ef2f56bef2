/// Virtual file system
///
/// Engine paths are virtual and rooted at `/` (`/engine/shaders/bin`,
/// `/assets/brick.mat`). The file system maps them onto a real directory.
/// Paths are normalized (`.` and `..` collapsed, duplicate slashes removed)
/// and can never escape the root.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use crate::error::{Error, Result};

pub struct VirtualFileSystem {
    root: PathBuf,
}

/// Normalize a virtual path to the canonical `/a/b/c` form
pub fn normalize_virtual_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Directory part of a virtual path (`/a/b/c.shader` -> `/a/b`)
pub fn virtual_parent(path: &str) -> String {
    let normalized = normalize_virtual_path(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => normalized[..index].to_string(),
    }
}

/// Resolve `target` as seen from the file `from`
///
/// Absolute targets (leading `/`) are taken from the virtual root, relative
/// ones from the directory containing `from`.
pub fn resolve_relative(from: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize_virtual_path(target)
    } else {
        normalize_virtual_path(&format!("{}/{}", virtual_parent(from), target))
    }
}

/// Lowercased extension of a virtual path, if any
pub fn virtual_extension(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

impl VirtualFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Real path backing a virtual path
    pub fn resolve(&self, virtual_path: &str) -> PathBuf {
        let normalized = normalize_virtual_path(virtual_path);
        let mut real = self.root.clone();
        for part in normalized.split('/').filter(|p| !p.is_empty()) {
            real.push(part);
        }
        real
    }

    pub fn exists(&self, virtual_path: &str) -> bool {
        self.resolve(virtual_path).is_file()
    }

    pub fn read(&self, virtual_path: &str) -> Result<Vec<u8>> {
        let real = self.resolve(virtual_path);
        std::fs::read(&real).map_err(|e| Error::io(&real, &e))
    }

    pub fn read_to_string(&self, virtual_path: &str) -> Result<String> {
        let real = self.resolve(virtual_path);
        std::fs::read_to_string(&real).map_err(|e| Error::io(&real, &e))
    }

    /// Write a file, creating missing parent directories
    pub fn write(&self, virtual_path: &str, bytes: &[u8]) -> Result<()> {
        let real = self.resolve(virtual_path);
        if let Some(parent) = real.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, &e))?;
        }
        std::fs::write(&real, bytes).map_err(|e| Error::io(&real, &e))
    }

    /// Last modification time
    pub fn modified(&self, virtual_path: &str) -> Result<SystemTime> {
        let real = self.resolve(virtual_path);
        std::fs::metadata(&real)
            .and_then(|m| m.modified())
            .map_err(|e| Error::io(&real, &e))
    }
}

#[cfg(test)]
#[path = "vfs_tests.rs"]
mod tests;
