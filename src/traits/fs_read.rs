//! Read operations for native backends.

use std::path::Path;
use std::sync::Arc;

use crate::stream::InputStream;
use crate::{FsError, Stats};

/// Read operations for a native backend.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` to allow
/// concurrent access from any thread.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsRead`.
pub trait FsRead: Send + Sync {
    /// Read entire file contents as bytes.
    ///
    /// The file size is queried first and exactly that many bytes are read.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the file cannot be opened, sized or read
    /// - [`FsError::ShortRead`] if fewer bytes arrive than the size reported
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    /// File status, following symbolic links.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the path does not exist or cannot be queried
    fn stat(&self, path: &Path) -> Result<Stats, FsError>;

    /// Open `path` for streaming reads.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the file cannot be opened
    fn open_input(&self, path: &Path) -> Result<Arc<dyn InputStream>, FsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_read_is_object_safe() {
        fn _check(_: &dyn FsRead) {}
    }

    #[test]
    fn fs_read_requires_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        fn _check<T: FsRead>() {
            _assert_send_sync::<T>();
        }
    }
}
