//! Error types for native filesystem access.

use std::path::PathBuf;

/// Filesystem error type with contextual variants.
///
/// Every variant carries the context needed to produce a useful message: the
/// operation, the path, and for native failures the OS-provided description.
/// The type is `Clone` so that startup failures can be memoized and handed
/// out again on every later call.
///
/// # Examples
///
/// ```rust
/// use rawfs::FsError;
/// use std::path::PathBuf;
///
/// let err = FsError::ShortRead {
///     path: PathBuf::from("/data.bin"),
///     expected: 16,
///     actual: 9,
/// };
/// assert_eq!(err.to_string(), "short read: /data.bin (expected 16 bytes, got 9)");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    // Startup Errors
    /// No record layout is registered for the running OS/architecture/ABI.
    #[error("current OS/arch combination is not supported: {platform}")]
    UnsupportedPlatform {
        /// Description of the detected platform key.
        platform: String,
    },

    /// A native entry point required by the operation is missing.
    #[error("native entry point not found: {name}")]
    SymbolNotFound {
        /// The symbol that could not be resolved.
        name: &'static str,
    },

    // Native Call Errors
    /// A native call reported failure through errno / last-error.
    #[error("{operation} failed for {path}: {message}")]
    Os {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// Raw errno or Windows last-error value.
        code: i32,
        /// The OS-provided description of `code`.
        message: String,
    },

    /// Fewer bytes were read than the file reported.
    #[error("short read: {path} (expected {expected} bytes, got {actual})")]
    ShortRead {
        /// The file being read.
        path: PathBuf,
        /// The number of bytes requested.
        expected: u64,
        /// The number of bytes the OS delivered.
        actual: u64,
    },

    /// A write made no progress before the whole buffer was written.
    #[error("short write: {path} (expected {expected} bytes, wrote {actual})")]
    ShortWrite {
        /// The file being written.
        path: PathBuf,
        /// The number of bytes that should have been written.
        expected: u64,
        /// The number of bytes written before progress stopped.
        actual: u64,
    },

    // Data Errors
    /// The path cannot be passed to the OS (it contains a NUL).
    #[error("invalid path: {path}")]
    InvalidPath {
        /// The rejected path.
        path: PathBuf,
    },

    /// File contents did not match the requested encoding.
    #[error("invalid data: {path} ({details})")]
    InvalidData {
        /// The path with invalid data.
        path: PathBuf,
        /// Details about the invalid data.
        details: String,
    },

    /// The requested text encoding label is not known.
    #[error("unknown encoding: {label}")]
    UnknownEncoding {
        /// The label that was requested.
        label: String,
    },

    /// A raw record is shorter than its layout requires.
    #[error("truncated record: field {field} needs {needed} bytes, {available} available")]
    TruncatedRecord {
        /// The field being decoded.
        field: &'static str,
        /// Bytes needed from the field offset.
        needed: usize,
        /// Bytes available from the field offset.
        available: usize,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Stream Errors
    /// An operation was issued while another one is still outstanding.
    #[error("stream busy: an operation is already in flight")]
    StreamBusy,

    /// The stream's handle has already been released.
    #[error("stream closed")]
    StreamClosed,
}

impl FsError {
    /// Returns the raw OS error code for native call failures.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FsError::Os { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if the OS reported that the path does not exist.
    ///
    /// Covers `ENOENT` on POSIX and `ERROR_FILE_NOT_FOUND` /
    /// `ERROR_PATH_NOT_FOUND` on Windows.
    pub fn is_not_found(&self) -> bool {
        match self.raw_os_error() {
            Some(code) if cfg!(windows) => code == 2 || code == 3,
            Some(code) => code == 2,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_display() {
        let err = FsError::Os {
            operation: "open",
            path: PathBuf::from("/missing"),
            code: 2,
            message: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "open failed for /missing: No such file or directory"
        );
    }

    #[test]
    fn unsupported_platform_display() {
        let err = FsError::UnsupportedPlatform {
            platform: "linux-mips".into(),
        };
        assert!(err.to_string().contains("linux-mips"));
    }

    #[test]
    fn short_write_display() {
        let err = FsError::ShortWrite {
            path: PathBuf::from("/out"),
            expected: 10,
            actual: 4,
        };
        assert_eq!(err.to_string(), "short write: /out (expected 10 bytes, wrote 4)");
    }

    #[test]
    fn not_found_detection() {
        let err = FsError::Os {
            operation: "stat",
            path: PathBuf::from("/missing"),
            code: 2,
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.raw_os_error(), Some(2));

        assert!(!FsError::StreamClosed.is_not_found());
        assert_eq!(FsError::StreamClosed.raw_os_error(), None);
    }

    #[test]
    fn errors_are_clone() {
        let err = FsError::SymbolNotFound { name: "stat" };
        assert_eq!(err.clone(), err);
    }
}
