//! Directory operations for native backends.

use std::path::Path;

use crate::FsError;
use crate::decode::DecodeContext;
use crate::layout::DirentLayout;

/// Callback invoked with each raw directory-entry record.
///
/// The slice is only valid for the duration of the call; the backend may
/// reuse the underlying buffer for the next entry. Returning an error stops
/// the enumeration.
pub type EntryVisitor<'a> = dyn FnMut(&[u8]) -> Result<(), FsError> + 'a;

/// Directory operations for a native backend.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsDir`.
pub trait FsDir: Send + Sync {
    /// Feed every raw entry record of `path` to `visit`.
    ///
    /// The directory handle is closed exactly once, whether enumeration
    /// completes or `visit` fails.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the directory cannot be opened
    /// - Whatever `visit` returns
    fn enumerate_directory_entries(&self, path: &Path, visit: &mut EntryVisitor<'_>) -> Result<(), FsError>;

    /// Remove an empty directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the path does not exist, is not a directory, or
    ///   is not empty
    fn remove_dir(&self, path: &Path) -> Result<(), FsError>;

    /// The layout of the records passed to the visitor.
    fn dirent_layout(&self) -> &'static DirentLayout;

    /// Context for decoding the record of the entry at `path`.
    fn decode_context<'a>(&'a self, path: &'a Path) -> DecodeContext<'a> {
        DecodeContext {
            path: Some(path),
            reparse: None,
        }
    }
}
