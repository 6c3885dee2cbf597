//! Link operations for native backends.

use std::path::{Path, PathBuf};

use crate::{FsError, Stats};

/// Symbolic-link aware operations.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsLink`.
pub trait FsLink: Send + Sync {
    /// Read the target of a symbolic link.
    ///
    /// POSIX sizes the buffer from the link's own `lstat` size. Windows
    /// returns the final path of the opened link, without the `\\?\` prefix.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the path does not exist or is not a link
    fn read_link(&self, path: &Path) -> Result<PathBuf, FsError>;

    /// File status without following a final symbolic link.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the path does not exist or cannot be queried
    fn lstat(&self, path: &Path) -> Result<Stats, FsError>;
}
