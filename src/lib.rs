//! # rawfs
//!
//! Direct filesystem access through the operating system's **native entry
//! points**, resolved at runtime from the loaded C library (or `kernel32`
//! on Windows) instead of being linked against.
//!
//! Native status and directory records are decoded lazily through
//! per-platform **layout tables**, so the same code serves Linux (several
//! architectures and `stat` ABIs), Darwin and Windows.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rawfs::{ReadOptions, WriteOptions};
//!
//! # fn main() -> Result<(), rawfs::FsError> {
//! rawfs::write_text("/tmp/greeting.txt", "hello", &WriteOptions::default())?;
//!
//! let text = rawfs::read_to_string("/tmp/greeting.txt")?;
//! assert_eq!(text, "hello");
//!
//! let stats = rawfs::stat("/tmp/greeting.txt")?;
//! println!("{} bytes, modified {:?}", stats.size().unwrap_or(0), stats.mtime());
//!
//! for entry in rawfs::list("/tmp")? {
//!     println!("{} {:?}", entry.name, entry.file_type);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`FileSystem`] | Operations over any [`PlatformBackend`] |
//! | [`Stats`] | Lazy view over a native status record |
//! | [`DirEntry`] | Decoded directory entry |
//! | [`ReadStream`] / [`WriteStream`] | Flow-controlled chunked I/O |
//! | [`FsError`] | Error type with operation and path context |
//! | [`PlatformKey`] | The detected OS / architecture / ABI |
//!
//! ---
//!
//! ## Backend Traits
//!
//! ```text
//! FsRead + FsWrite + FsDir + FsLink = PlatformBackend
//!                                            ↑
//!                          PosixBackend (unix) / WindowsBackend (windows)
//! ```
//!
//! [`PlatformBackend`] has a **blanket implementation**: implement the four
//! component traits and the [`FileSystem`] façade accepts the type.
//! [`backend::native`] returns the process-wide instance.
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, FsError>`. Native failures carry the
//! operation, the path, the raw OS code and the OS-provided message:
//!
//! ```rust
//! use rawfs::FsError;
//! use std::path::PathBuf;
//!
//! let err = FsError::Os {
//!     operation: "open",
//!     path: PathBuf::from("/missing.txt"),
//!     code: 2,
//!     message: "No such file or directory".into(),
//! };
//! assert_eq!(err.to_string(), "open failed for /missing.txt: No such file or directory");
//! assert!(err.is_not_found());
//! ```
//!
//! Status fields the platform does not record are `None`, never zero.
//!
//! ---
//!
//! ## Asynchronous Use
//!
//! [`create_read_stream`] / [`create_write_stream`] return a
//! [`futures::Stream`] / [`futures::Sink`] with at most one native request
//! in flight. The [`nonblocking`] module has deferred variants of every
//! whole-file call.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`DirEntry`], [`StatsSnapshot`], [`Timestamp`], etc., plus [`FsExtJson`] |
//!
//! ---
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (backend selection at `debug`, symbol
//! resolution and handle release at `trace`, undecodable fields at `warn`)
//! and installs no subscriber.

// Private modules
mod error;
mod ext;
mod fs;
mod stats;
mod traits;
mod types;

// Public modules
pub mod backend;
pub mod call_table;
pub mod constants;
pub mod decode;
pub mod layout;
pub mod nonblocking;
pub mod platform;
pub mod stream;

// Public re-exports - error types
pub use error::FsError;

// Public re-exports - core types
pub use stats::{Stats, StatsSnapshot};
pub use types::{
    DirEntry, FileContents, FileType, Permissions, ReadOptions, TextEncoding, Timestamp, WriteOptions,
};

// Public re-exports - backend traits
pub use traits::{EntryVisitor, FsDir, FsLink, FsRead, FsWrite, PlatformBackend};

// Public re-exports - façade and free functions
pub use fs::{
    FileSystem, create_read_stream, create_read_stream_with, create_write_stream, create_write_stream_with, list,
    lstat, read, read_dir, read_file, read_link, read_to_string, remove_dir, remove_file, stat, write_file,
    write_text,
};

// Public re-exports - infrastructure
pub use backend::platform;
pub use constants::constants;
pub use ext::FsExt;
pub use platform::PlatformKey;
pub use stream::{ReadStream, StreamOptions, WriteStream};

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::FsExtJson;
