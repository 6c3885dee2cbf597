//! # Deferred Operations
//!
//! `async` variants of the whole-operation calls. Each yields to the
//! scheduler once before doing any work, so the operation never completes
//! in the same turn it was requested in, then runs the synchronous call
//! against the native backend.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), rawfs::FsError> {
//! let names = rawfs::nonblocking::read_dir("/tmp").await?;
//! let stats = rawfs::nonblocking::stat("/tmp").await?;
//! assert!(stats.is_directory());
//! # let _ = names;
//! # Ok(())
//! # }
//! ```
//!
//! The native calls themselves are still blocking; use
//! `tokio::task::spawn_blocking` around the synchronous API to keep them off
//! a runtime's worker threads.

use std::path::{Path, PathBuf};

use crate::types::{DirEntry, FileContents, ReadOptions, WriteOptions};
use crate::{FsError, Stats};

async fn deferred<T>(op: impl FnOnce() -> Result<T, FsError>) -> Result<T, FsError> {
    tokio::task::yield_now().await;
    op()
}

/// Deferred [`read_dir`](crate::read_dir).
pub async fn read_dir(path: impl AsRef<Path>) -> Result<Vec<String>, FsError> {
    deferred(|| crate::read_dir(path)).await
}

/// Deferred [`list`](crate::list).
pub async fn list(path: impl AsRef<Path>) -> Result<Vec<DirEntry>, FsError> {
    deferred(|| crate::list(path)).await
}

/// Deferred [`read_file`](crate::read_file).
pub async fn read_file(path: impl AsRef<Path>, options: &ReadOptions) -> Result<FileContents, FsError> {
    deferred(|| crate::read_file(path, options)).await
}

/// Deferred [`read`](crate::read).
pub async fn read(path: impl AsRef<Path>) -> Result<Vec<u8>, FsError> {
    deferred(|| crate::read(path)).await
}

/// Deferred [`read_to_string`](crate::read_to_string).
pub async fn read_to_string(path: impl AsRef<Path>) -> Result<String, FsError> {
    deferred(|| crate::read_to_string(path)).await
}

/// Deferred [`write_file`](crate::write_file).
pub async fn write_file(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> Result<(), FsError> {
    deferred(|| crate::write_file(path, data)).await
}

/// Deferred [`write_text`](crate::write_text).
pub async fn write_text(path: impl AsRef<Path>, text: &str, options: &WriteOptions) -> Result<(), FsError> {
    deferred(|| crate::write_text(path, text, options)).await
}

/// Deferred [`read_link`](crate::read_link).
pub async fn read_link(path: impl AsRef<Path>) -> Result<PathBuf, FsError> {
    deferred(|| crate::read_link(path)).await
}

/// Deferred [`remove_dir`](crate::remove_dir).
pub async fn remove_dir(path: impl AsRef<Path>) -> Result<(), FsError> {
    deferred(|| crate::remove_dir(path)).await
}

/// Deferred [`remove_file`](crate::remove_file).
pub async fn remove_file(path: impl AsRef<Path>) -> Result<(), FsError> {
    deferred(|| crate::remove_file(path)).await
}

/// Deferred [`stat`](crate::stat).
pub async fn stat(path: impl AsRef<Path>) -> Result<Stats, FsError> {
    deferred(|| crate::stat(path)).await
}

/// Deferred [`lstat`](crate::lstat).
pub async fn lstat(path: impl AsRef<Path>) -> Result<Stats, FsError> {
    deferred(|| crate::lstat(path)).await
}
