//! # Extension Traits
//!
//! Convenience methods for filesystem backends.
//!
//! ## Overview
//!
//! [`FsExt`] provides commonly-needed queries that aren't part of the
//! backend traits. They are default methods with a blanket implementation,
//! so any [`PlatformBackend`] gets them for free.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`exists`](FsExt::exists) | Check if path exists (following links) |
//! | [`is_file`](FsExt::is_file) | Check if path is a regular file |
//! | [`is_dir`](FsExt::is_dir) | Check if path is a directory |
//! | [`is_symlink`](FsExt::is_symlink) | Check if path itself is a symbolic link |
//! | [`file_size`](FsExt::file_size) | Size in bytes |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, additional methods are available:
//!
//! | Method | Description |
//! |--------|-------------|
//! | `read_json` | Read and deserialize JSON file |
//! | `write_json` | Serialize and write JSON file |
//!
//! Enable with:
//! ```toml
//! [dependencies]
//! rawfs = { version = "0.1", features = ["serde"] }
//! ```

use crate::traits::PlatformBackend;
use crate::{FsError, Stats};
use std::path::Path;

/// Map "does not exist" to `Ok(None)`.
fn optional(result: Result<Stats, FsError>) -> Result<Option<Stats>, FsError> {
    match result {
        Ok(stats) => Ok(Some(stats)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Extension methods for any filesystem backend.
///
/// # Example
///
/// ```rust,no_run
/// use rawfs::{FsExt, FsError};
/// use std::path::Path;
///
/// fn check_paths() -> Result<(), FsError> {
///     let backend = rawfs::backend::native()?;
///     if backend.is_file(Path::new("/etc/hosts"))? {
///         println!("hosts file present");
///     }
///     if backend.is_dir(Path::new("/tmp"))? {
///         println!("scratch space present");
///     }
///     Ok(())
/// }
/// ```
pub trait FsExt: PlatformBackend {
    /// Check if the path exists, following symbolic links.
    ///
    /// Returns `Ok(false)` if the OS reports the path as missing.
    /// Returns `Err` only for other failures (permission denied, etc.).
    fn exists(&self, path: &Path) -> Result<bool, FsError> {
        Ok(optional(self.stat(path))?.is_some())
    }

    /// Check if the path points to a regular file.
    ///
    /// Returns `Ok(false)` if the path doesn't exist (not an error).
    fn is_file(&self, path: &Path) -> Result<bool, FsError> {
        Ok(optional(self.stat(path))?.is_some_and(|s| s.is_file()))
    }

    /// Check if the path points to a directory.
    ///
    /// Returns `Ok(false)` if the path doesn't exist (not an error).
    fn is_dir(&self, path: &Path) -> Result<bool, FsError> {
        Ok(optional(self.stat(path))?.is_some_and(|s| s.is_directory()))
    }

    /// Check if the path itself is a symbolic link.
    ///
    /// Uses `lstat`, so the link is not followed. A dangling link is still
    /// reported as a link.
    fn is_symlink(&self, path: &Path) -> Result<bool, FsError> {
        Ok(optional(self.lstat(path))?.is_some_and(|s| s.is_symbolic_link()))
    }

    /// Get the size of a file in bytes.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the path doesn't exist
    /// - [`FsError::InvalidData`] if the platform record carries no size
    fn file_size(&self, path: &Path) -> Result<u64, FsError> {
        self.stat(path)?.size().ok_or_else(|| FsError::InvalidData {
            path: path.to_path_buf(),
            details: "size not recorded".into(),
        })
    }
}

// Blanket implementation - any backend gets FsExt for free
impl<B: PlatformBackend + ?Sized> FsExt for B {}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use crate::types::TextEncoding;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FsExtJson: PlatformBackend {
        /// Read a file and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - [`FsError::Os`] if the file can't be opened or read
        /// - [`FsError::InvalidData`] if the file isn't valid UTF-8
        /// - [`FsError::Deserialization`] if JSON parsing failed
        fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, FsError> {
            let data = TextEncoding::Utf8.decode(path, self.read_file(path)?)?;
            serde_json::from_str(&data).map_err(|e| FsError::Deserialization(e.to_string()))
        }

        /// Serialize a value and write it as JSON.
        ///
        /// Uses pretty-printing with 2-space indentation.
        ///
        /// # Errors
        ///
        /// - [`FsError::Serialization`] if JSON serialization failed
        /// - Other `FsError` variants from the underlying `write_file()` call
        fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), FsError> {
            let json = serde_json::to_string_pretty(value).map_err(|e| FsError::Serialization(e.to_string()))?;
            self.write_file(path, json.as_bytes())
        }
    }

    // Blanket implementation
    impl<B: PlatformBackend + ?Sized> FsExtJson for B {}
}

#[cfg(feature = "serde")]
pub use json::FsExtJson;
