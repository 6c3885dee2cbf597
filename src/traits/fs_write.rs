//! Write operations for native backends.

use std::path::Path;
use std::sync::Arc;

use crate::FsError;
use crate::stream::OutputStream;

/// Write operations for a native backend.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsWrite`.
pub trait FsWrite: Send + Sync {
    /// Write `data` to `path`, creating or truncating it.
    ///
    /// New files get mode `0644` on POSIX.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the file cannot be created or written
    /// - [`FsError::ShortWrite`] if the OS stops accepting bytes
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Remove a file (`unlink` / `DeleteFileW`).
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the path does not exist or is a directory
    fn remove_file(&self, path: &Path) -> Result<(), FsError>;

    /// Create or truncate `path` for streaming writes.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the file cannot be created
    fn open_output(&self, path: &Path) -> Result<Arc<dyn OutputStream>, FsError>;
}
