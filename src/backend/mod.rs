//! # Native Backends
//!
//! One backend per OS family, each implementing [`PlatformBackend`] on top
//! of its own [`CallTable`](crate::call_table::CallTable):
//!
//! | Backend | Targets | Stat entry points |
//! |---------|---------|-------------------|
//! | [`PosixBackend`] | Linux, Darwin | `stat64` → `__xstat64` → `stat` |
//! | [`WindowsBackend`] | Windows | `GetFileAttributesExW` |
//!
//! [`native`] builds the backend for the running process once, together
//! with platform detection and layout selection, and hands out the same
//! instance (or the same startup error) on every call.
//!
//! The helpers in this module hold the transfer rules both backends share:
//! whole-file reads must fill their buffer in one call (retrying only on
//! interruption), writes retry until drained, and handles are released
//! exactly once.

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use posix::PosixBackend;
#[cfg(windows)]
pub use windows::WindowsBackend;

use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::FsError;
use crate::platform::PlatformKey;
use crate::traits::PlatformBackend;

/// The backend type for the build target.
#[cfg(unix)]
pub type NativeBackend = PosixBackend;
/// The backend type for the build target.
#[cfg(windows)]
pub type NativeBackend = WindowsBackend;

#[cfg(any(unix, windows))]
fn native_backend() -> Result<&'static NativeBackend, FsError> {
    static NATIVE: OnceLock<Result<NativeBackend, FsError>> = OnceLock::new();
    NATIVE
        .get_or_init(NativeBackend::new)
        .as_ref()
        .map_err(Clone::clone)
}

/// The process-wide backend.
///
/// # Errors
///
/// - [`FsError::UnsupportedPlatform`] if no record layout matches the
///   running platform (returned on every call, not retried)
/// - [`FsError::SymbolNotFound`] if a required `stat` entry point is missing
pub fn native() -> Result<&'static dyn PlatformBackend, FsError> {
    #[cfg(any(unix, windows))]
    {
        native_backend().map(|backend| backend as &dyn PlatformBackend)
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(unsupported_target())
    }
}

/// The detected platform key.
///
/// # Errors
///
/// Same as [`native`].
pub fn platform() -> Result<PlatformKey, FsError> {
    #[cfg(any(unix, windows))]
    {
        native_backend().map(|backend| backend.platform_key())
    }
    #[cfg(not(any(unix, windows)))]
    {
        Err(unsupported_target())
    }
}

#[cfg(not(any(unix, windows)))]
fn unsupported_target() -> FsError {
    FsError::UnsupportedPlatform {
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
    }
}

/// Outcome of one native read or write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    /// This many bytes moved.
    Done(usize),
    /// The call was interrupted before moving anything.
    Interrupted,
    /// The call failed with this OS error code.
    Failed(i32),
}

/// Fill `buf` with a single successful read.
///
/// Interrupted calls are retried; any other short count is a
/// [`FsError::ShortRead`].
pub(crate) fn read_exact(
    path: &Path,
    buf: &mut [u8],
    mut read: impl FnMut(&mut [u8]) -> Transfer,
    fail: impl FnOnce(i32) -> FsError,
) -> Result<(), FsError> {
    loop {
        match read(buf) {
            Transfer::Interrupted => continue,
            Transfer::Failed(code) => return Err(fail(code)),
            Transfer::Done(n) if n == buf.len() => return Ok(()),
            Transfer::Done(n) => {
                return Err(FsError::ShortRead {
                    path: path.to_path_buf(),
                    expected: buf.len() as u64,
                    actual: n as u64,
                });
            }
        }
    }
}

/// Write all of `data`, continuing after partial writes.
///
/// A call that makes no progress ends with [`FsError::ShortWrite`].
pub(crate) fn write_all(
    path: &Path,
    data: &[u8],
    mut write: impl FnMut(&[u8]) -> Transfer,
    fail: impl FnOnce(i32) -> FsError,
) -> Result<(), FsError> {
    let mut written = 0;
    while written < data.len() {
        match write(&data[written..]) {
            Transfer::Interrupted => continue,
            Transfer::Failed(code) => return Err(fail(code)),
            Transfer::Done(0) => {
                return Err(FsError::ShortWrite {
                    path: path.to_path_buf(),
                    expected: data.len() as u64,
                    actual: written as u64,
                });
            }
            Transfer::Done(n) => written += n,
        }
    }
    Ok(())
}

/// Runs a closure when dropped; closes native handles on every exit path.
pub(crate) struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    pub(crate) fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// A raw fd or `HANDLE` that can be taken exactly once.
///
/// `-1` marks the slot as released on both platforms (`INVALID_HANDLE_VALUE`
/// is `-1` as well).
#[derive(Debug)]
pub(crate) struct HandleSlot(AtomicIsize);

impl HandleSlot {
    const RELEASED: isize = -1;

    pub(crate) fn new(raw: isize) -> Self {
        Self(AtomicIsize::new(raw))
    }

    /// The handle, if not yet released.
    pub(crate) fn get(&self) -> Option<isize> {
        let raw = self.0.load(Ordering::Acquire);
        (raw != Self::RELEASED).then_some(raw)
    }

    /// Take the handle for release; `None` after the first call.
    pub(crate) fn take(&self) -> Option<isize> {
        let raw = self.0.swap(Self::RELEASED, Ordering::AcqRel);
        (raw != Self::RELEASED).then_some(raw)
    }
}
