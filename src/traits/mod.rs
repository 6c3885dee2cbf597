//! # Backend Traits
//!
//! The operation set every OS backend implements, split by concern:
//!
//! | Trait | Operations |
//! |-------|------------|
//! | [`FsRead`] | `read_file`, `stat`, `open_input` |
//! | [`FsWrite`] | `write_file`, `remove_file`, `open_output` |
//! | [`FsDir`] | `enumerate_directory_entries`, `remove_dir`, `dirent_layout`, `decode_context` |
//! | [`FsLink`] | `read_link`, `lstat` |
//!
//! ## Blanket Implementation
//!
//! [`PlatformBackend`] is implemented for every type implementing the four
//! component traits. Implement the components, and the façade accepts it:
//!
//! ```rust
//! use rawfs::{FileSystem, FsDir, FsLink, FsRead, FsWrite, FsError, Stats};
//! use rawfs::layout::DirentLayout;
//! use rawfs::stream::{InputStream, OutputStream};
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! struct Empty;
//!
//! # impl FsRead for Empty {
//! #     fn read_file(&self, _: &Path) -> Result<Vec<u8>, FsError> { Ok(vec![]) }
//! #     fn stat(&self, _: &Path) -> Result<Stats, FsError> { Err(FsError::StreamClosed) }
//! #     fn open_input(&self, _: &Path) -> Result<Arc<dyn InputStream>, FsError> { Err(FsError::StreamClosed) }
//! # }
//! # impl FsWrite for Empty {
//! #     fn write_file(&self, _: &Path, _: &[u8]) -> Result<(), FsError> { Ok(()) }
//! #     fn remove_file(&self, _: &Path) -> Result<(), FsError> { Ok(()) }
//! #     fn open_output(&self, _: &Path) -> Result<Arc<dyn OutputStream>, FsError> { Err(FsError::StreamClosed) }
//! # }
//! # impl FsDir for Empty {
//! #     fn enumerate_directory_entries(&self, _: &Path, _: &mut rawfs::EntryVisitor<'_>) -> Result<(), FsError> { Ok(()) }
//! #     fn remove_dir(&self, _: &Path) -> Result<(), FsError> { Ok(()) }
//! #     fn dirent_layout(&self) -> &'static DirentLayout { &rawfs::layout::dirent::DIRENT_LAYOUTS[0] }
//! # }
//! # impl FsLink for Empty {
//! #     fn read_link(&self, _: &Path) -> Result<PathBuf, FsError> { Ok(PathBuf::new()) }
//! #     fn lstat(&self, _: &Path) -> Result<Stats, FsError> { Err(FsError::StreamClosed) }
//! # }
//! let fs = FileSystem::new(&Empty);
//! assert!(fs.read_dir(Path::new("/")).unwrap().is_empty());
//! ```
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` and take `&self`; the process-wide
//! backend is shared by every caller.

mod fs_dir;
mod fs_link;
mod fs_read;
mod fs_write;

pub use fs_dir::{EntryVisitor, FsDir};
pub use fs_link::FsLink;
pub use fs_read::FsRead;
pub use fs_write::FsWrite;

/// The full operation set of an OS backend.
///
/// Automatically implemented for any type implementing [`FsRead`],
/// [`FsWrite`], [`FsDir`] and [`FsLink`].
pub trait PlatformBackend: FsRead + FsWrite + FsDir + FsLink {}

impl<T: FsRead + FsWrite + FsDir + FsLink> PlatformBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_backend_is_object_safe() {
        fn _check(_: &dyn PlatformBackend) {}
    }
}
