//! Error types for the Lumen engine
//!
//! This module defines the error type shared by the parser, the stage
//! compilers, the reflection engine, the graphics device layer and the
//! asset manager, plus the `engine_err!` / `engine_bail!` helpers.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for Lumen engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lumen engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Backend-specific error (Vulkan, Direct3D 11, device lock, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Out of GPU memory
    #[error("Out of GPU memory")]
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, etc.)
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Initialization failed (engine, device, fallback assets)
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Malformed shader, material or configuration file
    #[error("Parse error: {0}")]
    Parse(String),

    /// A stage compiler rejected a shader stage (carries the diagnostic)
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// Reflection could not produce a consistent layout
    #[error("Reflection error: {0}")]
    Reflection(String),

    /// File system access failed
    #[error("I/O error on '{}': {message}", path.display())]
    Io {
        path: PathBuf,
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl Error {
    /// Wrap an `std::io::Error` together with the path it occurred on
    pub fn io(path: impl AsRef<Path>, error: &std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// True for errors caused by the file system rather than by content
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

// ===== ERROR MACROS =====

/// Log an ERROR message and build an `Error::BackendError` from it
///
/// # Example
///
/// ```no_run
/// # use lumen_engine::engine_err;
/// let err = engine_err!("lumen::AssetManager", "Device lock poisoned");
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::lumen::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return early with an `Error::BackendError`
///
/// # Example
///
/// ```no_run
/// # use lumen_engine::engine_bail;
/// fn create_pipeline(name: &str) -> lumen_engine::lumen::Result<()> {
///     engine_bail!("lumen::Shader", "Pipeline creation failed for '{}'", name);
/// }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}
