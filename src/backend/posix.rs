//! POSIX backend over libc entry points resolved at runtime.

use std::ffi::{CStr, CString, OsString, c_char, c_int, c_uint, c_void};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use libc::{off_t, size_t, ssize_t};

use super::{HandleSlot, OnDrop, Transfer, read_exact, write_all};
use crate::call_table::{Adapter, ApiEntry, CallTable, NativeAddress, ProcessResolver, Resolved, SymbolResolver, SysResult};
use crate::layout::stat::MAX_RECORD_SIZE;
use crate::layout::{DirentField, DirentLayout, StatLayout, dirent_layout_for, stat_layout_for};
use crate::platform::{Arch, PlatformKey};
use crate::stream::{InputStream, OutputStream};
use crate::traits::{EntryVisitor, FsDir, FsLink, FsRead, FsWrite};
use crate::{FsError, Stats};

const STAT_VERSION: Adapter = Adapter::StatVersion(Arch::CURRENT.linux_stat_version());

static POSIX_API: &[ApiEntry] = &[
    ApiEntry::fallible("open"),
    ApiEntry::plain("close"),
    ApiEntry::fallible("lseek"),
    ApiEntry::fallible("read"),
    ApiEntry::fallible("write"),
    ApiEntry::fallible("opendir"),
    ApiEntry::fallible("opendir$INODE64"),
    ApiEntry::plain("closedir"),
    ApiEntry::plain("readdir"),
    ApiEntry::plain("readdir$INODE64"),
    ApiEntry::fallible("readlink"),
    ApiEntry::fallible("rmdir"),
    ApiEntry::fallible("unlink"),
    ApiEntry::fallible("stat"),
    ApiEntry::fallible("stat64"),
    ApiEntry::fallible("__xstat64").with_adapter(STAT_VERSION),
    ApiEntry::fallible("lstat"),
    ApiEntry::fallible("lstat64"),
    ApiEntry::fallible("__lxstat64").with_adapter(STAT_VERSION),
    ApiEntry::plain("strerror"),
];

const STAT_PREFERENCE: &[&str] = &["stat64", "__xstat64", "stat"];
const LSTAT_PREFERENCE: &[&str] = &["lstat64", "__lxstat64", "lstat"];
const OPENDIR_PREFERENCE: &[&str] = &["opendir$INODE64", "opendir"];
const READDIR_PREFERENCE: &[&str] = &["readdir$INODE64", "readdir"];

/// Link buffer when `lstat` reports a zero size (procfs and friends).
const FALLBACK_LINK_SIZE: usize = 4096;

const CREATE_MODE: c_uint = 0o644;

type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
type CloseFn = unsafe extern "C" fn(c_int) -> c_int;
type LseekFn = unsafe extern "C" fn(c_int, off_t, c_int) -> off_t;
type ReadFn = unsafe extern "C" fn(c_int, *mut c_void, size_t) -> ssize_t;
type WriteFn = unsafe extern "C" fn(c_int, *const c_void, size_t) -> ssize_t;
type OpendirFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type ClosedirFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ReaddirFn = unsafe extern "C" fn(*mut c_void) -> *const u8;
type ReadlinkFn = unsafe extern "C" fn(*const c_char, *mut c_char, size_t) -> ssize_t;
type PathFn = unsafe extern "C" fn(*const c_char) -> c_int;
type StrerrorFn = unsafe extern "C" fn(c_int) -> *const c_char;

/// Reinterpret an entry point as a typed function pointer.
///
/// # Safety
///
/// `F` must be a function pointer type matching the symbol's C signature.
unsafe fn entry<F: Copy>(address: NativeAddress) -> F {
    debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
    // SAFETY: upheld by the caller.
    unsafe { std::mem::transmute_copy(&address.as_ptr()) }
}

/// Buffer for native `stat` structures, aligned for any field type.
#[repr(C, align(8))]
struct RecordBuf([u8; MAX_RECORD_SIZE]);

/// Typed wrappers over the libc call table.
#[derive(Debug)]
struct PosixApi {
    table: CallTable,
}

impl PosixApi {
    fn require(&self, name: &'static str) -> Result<Resolved, FsError> {
        self.table.resolve(name).ok_or(FsError::SymbolNotFound { name })
    }

    fn require_any(&self, names: &[&'static str]) -> Result<Resolved, FsError> {
        self.table.first_available(names).ok_or(FsError::SymbolNotFound {
            name: names.last().copied().unwrap_or("?"),
        })
    }

    fn os_error(&self, operation: &'static str, path: &Path, code: i32) -> FsError {
        FsError::Os {
            operation,
            path: path.to_path_buf(),
            code,
            message: self.describe(code),
        }
    }

    /// `strerror` text for `code`, falling back to the standard library's.
    fn describe(&self, code: i32) -> String {
        if let Some(strerror) = self.table.resolve("strerror") {
            // SAFETY: `strerror(int) -> char*`.
            let text = strerror.invoke(|addr| unsafe { entry::<StrerrorFn>(addr)(code) }).value;
            if !text.is_null() {
                // SAFETY: strerror returns a NUL-terminated string.
                return unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
            }
        }
        std::io::Error::from_raw_os_error(code).to_string()
    }

    fn open(&self, path: &CStr, flags: c_int) -> Result<SysResult<c_int>, FsError> {
        let open = self.require("open")?;
        // SAFETY: `open(const char*, int, ...)`; the mode is read only with O_CREAT.
        Ok(open.invoke(|addr| unsafe { entry::<OpenFn>(addr)(path.as_ptr(), flags, CREATE_MODE) }))
    }

    fn close(&self, fd: c_int) {
        if let Some(close) = self.table.resolve("close") {
            // SAFETY: `close(int)`; `fd` is owned by the caller and not used again.
            close.invoke(|addr| unsafe { entry::<CloseFn>(addr)(fd) });
        }
    }

    fn lseek(&self, fd: c_int, offset: off_t, whence: c_int) -> Result<SysResult<off_t>, FsError> {
        let lseek = self.require("lseek")?;
        // SAFETY: `lseek(int, off_t, int)`.
        Ok(lseek.invoke(|addr| unsafe { entry::<LseekFn>(addr)(fd, offset, whence) }))
    }

    fn read(read: &Resolved, fd: c_int, buf: &mut [u8]) -> Transfer {
        // SAFETY: `read(int, void*, size_t)` into a buffer of exactly `buf.len()` bytes.
        transfer(read.invoke(|addr| unsafe { entry::<ReadFn>(addr)(fd, buf.as_mut_ptr().cast(), buf.len()) }))
    }

    fn write(write: &Resolved, fd: c_int, data: &[u8]) -> Transfer {
        // SAFETY: `write(int, const void*, size_t)` from a buffer of `data.len()` bytes.
        transfer(write.invoke(|addr| unsafe { entry::<WriteFn>(addr)(fd, data.as_ptr().cast(), data.len()) }))
    }

    fn stat(&self, call: &Resolved, path: &CStr, buf: &mut RecordBuf) -> SysResult<c_int> {
        // SAFETY: every stat-family entry is `(const char*, struct stat*)` after
        // its version tag, and the buffer is larger than every known structure.
        unsafe { call.invoke_path_out(path.as_ptr(), buf.0.as_mut_ptr().cast()) }
    }

    fn path_call(&self, name: &'static str, path: &CStr) -> Result<SysResult<c_int>, FsError> {
        let call = self.require(name)?;
        // SAFETY: `rmdir` and `unlink` both take `const char*`.
        Ok(call.invoke(|addr| unsafe { entry::<PathFn>(addr)(path.as_ptr()) }))
    }
}

fn transfer(result: SysResult<ssize_t>) -> Transfer {
    match usize::try_from(result.value) {
        Ok(n) => Transfer::Done(n),
        Err(_) if result.error == libc::EINTR => Transfer::Interrupted,
        Err(_) => Transfer::Failed(result.error),
    }
}

fn c_path(path: &Path) -> Result<CString, FsError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| FsError::InvalidPath {
        path: path.to_path_buf(),
    })
}

/// Backend for Linux and Darwin.
///
/// Entry points are looked up in the process's C library, so the backend
/// works against whichever libc the process loaded, including ones that
/// only export the versioned `__xstat64` family.
#[derive(Debug)]
pub struct PosixBackend {
    api: Arc<PosixApi>,
    key: PlatformKey,
    stat_layout: &'static StatLayout,
    dirent_layout: &'static DirentLayout,
    name_offset: usize,
    stat_call: Resolved,
    lstat_call: Resolved,
}

impl PosixBackend {
    /// Build the backend against the running process's C library.
    ///
    /// # Errors
    ///
    /// - [`FsError::UnsupportedPlatform`] if no layouts match the platform
    /// - [`FsError::SymbolNotFound`] if no `stat` / `lstat` entry point exists
    pub fn new() -> Result<Self, FsError> {
        Self::with_resolver(Box::new(ProcessResolver))
    }

    /// Build the backend over a custom symbol resolver.
    ///
    /// # Errors
    ///
    /// Same as [`PosixBackend::new`].
    pub fn with_resolver(resolver: Box<dyn SymbolResolver>) -> Result<Self, FsError> {
        let table = CallTable::new(None, POSIX_API, resolver);
        let key = PlatformKey::detect(|name| table.has(name))?;
        let stat_layout = stat_layout_for(&key)?;
        let dirent_layout = dirent_layout_for(&key)?;
        let name_offset = dirent_layout
            .field(DirentField::Name)
            .map(|spec| spec.offset)
            .ok_or_else(|| FsError::UnsupportedPlatform {
                platform: key.to_string(),
            })?;

        let api = PosixApi { table };
        let stat_call = api.require_any(STAT_PREFERENCE)?;
        let lstat_call = api.require_any(LSTAT_PREFERENCE)?;

        tracing::debug!(
            platform = %key,
            stat_layout = stat_layout.id,
            dirent_layout = dirent_layout.id,
            stat = stat_call.name,
            lstat = lstat_call.name,
            "selected native filesystem backend"
        );

        Ok(Self {
            api: Arc::new(api),
            key,
            stat_layout,
            dirent_layout,
            name_offset,
            stat_call,
            lstat_call,
        })
    }

    /// The detected platform.
    pub fn platform_key(&self) -> PlatformKey {
        self.key
    }

    /// The layout `stat` records are decoded with.
    pub fn stat_layout(&self) -> &'static StatLayout {
        self.stat_layout
    }

    fn status(&self, operation: &'static str, call: &Resolved, path: &Path) -> Result<Stats, FsError> {
        let c_path = c_path(path)?;
        let mut buf = RecordBuf([0; MAX_RECORD_SIZE]);
        let result = self.api.stat(call, &c_path, &mut buf);
        if result.value != 0 {
            return Err(self.api.os_error(operation, path, result.error));
        }
        let record = Bytes::copy_from_slice(&buf.0[..self.stat_layout.record_size]);
        Ok(Stats::new(path, self.stat_layout, record, None))
    }

    fn open_fd(&self, path: &Path, flags: c_int) -> Result<c_int, FsError> {
        let c_path = c_path(path)?;
        let fd = self.api.open(&c_path, flags)?;
        if fd.value < 0 {
            return Err(self.api.os_error("open", path, fd.error));
        }
        tracing::trace!(path = %path.display(), fd = fd.value, "opened");
        Ok(fd.value)
    }

    fn handle(&self, path: &Path, flags: c_int) -> Result<Arc<PosixHandle>, FsError> {
        let fd = self.open_fd(path, flags)?;
        Ok(Arc::new(PosixHandle {
            api: Arc::clone(&self.api),
            path: path.to_path_buf(),
            fd: HandleSlot::new(fd as isize),
        }))
    }

    fn seek(&self, path: &Path, fd: c_int, whence: c_int) -> Result<off_t, FsError> {
        let result = self.api.lseek(fd, 0, whence)?;
        if result.value < 0 {
            return Err(self.api.os_error("lseek", path, result.error));
        }
        Ok(result.value)
    }
}

impl FsRead for PosixBackend {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let fd = self.open_fd(path, libc::O_RDONLY)?;
        let _close = OnDrop::new(|| self.api.close(fd));

        let end = self.seek(path, fd, libc::SEEK_END)?;
        self.seek(path, fd, libc::SEEK_SET)?;

        let size = usize::try_from(end).map_err(|_| FsError::InvalidData {
            path: path.to_path_buf(),
            details: format!("file size {end} does not fit in memory"),
        })?;
        let read = self.api.require("read")?;
        let mut buf = vec![0u8; size];
        read_exact(
            path,
            &mut buf,
            |chunk| PosixApi::read(&read, fd, chunk),
            |code| self.api.os_error("read", path, code),
        )?;
        Ok(buf)
    }

    fn stat(&self, path: &Path) -> Result<Stats, FsError> {
        self.status("stat", &self.stat_call, path)
    }

    fn open_input(&self, path: &Path) -> Result<Arc<dyn InputStream>, FsError> {
        Ok(self.handle(path, libc::O_RDONLY)?)
    }
}

impl FsWrite for PosixBackend {
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let handle = self.handle(path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC)?;
        let result = handle.write_sync(data);
        InputStream::release(&*handle);
        result
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        let result = self.api.path_call("unlink", &c_path(path)?)?;
        if result.value != 0 {
            return Err(self.api.os_error("unlink", path, result.error));
        }
        Ok(())
    }

    fn open_output(&self, path: &Path) -> Result<Arc<dyn OutputStream>, FsError> {
        Ok(self.handle(path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC)?)
    }
}

impl FsDir for PosixBackend {
    fn enumerate_directory_entries(&self, path: &Path, visit: &mut EntryVisitor<'_>) -> Result<(), FsError> {
        let c_path = c_path(path)?;
        let opendir = self.api.require_any(OPENDIR_PREFERENCE)?;
        let readdir = self.api.require_any(READDIR_PREFERENCE)?;
        let closedir = self.api.require("closedir")?;

        // SAFETY: `opendir(const char*) -> DIR*`.
        let dir = opendir.invoke(|addr| unsafe { entry::<OpendirFn>(addr)(c_path.as_ptr()) });
        if dir.value.is_null() {
            return Err(self.api.os_error("opendir", path, dir.error));
        }
        let dir = dir.value;
        let _close = OnDrop::new(|| {
            // SAFETY: `closedir(DIR*)` on the stream opened above, exactly once.
            closedir.invoke(|addr| unsafe { entry::<ClosedirFn>(addr)(dir) });
        });

        loop {
            // SAFETY: `readdir(DIR*) -> struct dirent*` on an open stream.
            let record = readdir.invoke(|addr| unsafe { entry::<ReaddirFn>(addr)(dir) }).value;
            if record.is_null() {
                return Ok(());
            }
            // SAFETY: the record stays valid until the next readdir call and its
            // name is NUL-terminated at `name_offset`.
            let record = unsafe {
                let name = CStr::from_ptr(record.add(self.name_offset).cast());
                std::slice::from_raw_parts(record, self.name_offset + name.to_bytes_with_nul().len())
            };
            visit(record)?;
        }
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        let result = self.api.path_call("rmdir", &c_path(path)?)?;
        if result.value != 0 {
            return Err(self.api.os_error("rmdir", path, result.error));
        }
        Ok(())
    }

    fn dirent_layout(&self) -> &'static DirentLayout {
        self.dirent_layout
    }
}

impl FsLink for PosixBackend {
    fn read_link(&self, path: &Path) -> Result<PathBuf, FsError> {
        let size = self
            .lstat(path)?
            .size()
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(FALLBACK_LINK_SIZE);

        let c_path = c_path(path)?;
        let readlink = self.api.require("readlink")?;
        let mut buf = vec![0u8; size];
        // SAFETY: `readlink(const char*, char*, size_t)` into `buf.len()` bytes.
        let result = readlink.invoke(|addr| unsafe {
            entry::<ReadlinkFn>(addr)(c_path.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
        });
        let len = usize::try_from(result.value).map_err(|_| self.api.os_error("readlink", path, result.error))?;
        buf.truncate(len);
        Ok(PathBuf::from(OsString::from_vec(buf)))
    }

    fn lstat(&self, path: &Path) -> Result<Stats, FsError> {
        self.status("lstat", &self.lstat_call, path)
    }
}

/// An open file descriptor shared with a stream.
#[derive(Debug)]
struct PosixHandle {
    api: Arc<PosixApi>,
    path: PathBuf,
    fd: HandleSlot,
}

impl PosixHandle {
    fn fd(&self) -> Result<c_int, FsError> {
        self.fd.get().map(|fd| fd as c_int).ok_or(FsError::StreamClosed)
    }

    fn read_sync(&self, len: usize) -> Result<Bytes, FsError> {
        let fd = self.fd()?;
        let read = self.api.require("read")?;
        let mut buf = vec![0u8; len];
        loop {
            match PosixApi::read(&read, fd, &mut buf) {
                Transfer::Done(n) => {
                    buf.truncate(n);
                    return Ok(Bytes::from(buf));
                }
                Transfer::Interrupted => continue,
                Transfer::Failed(code) => return Err(self.api.os_error("read", &self.path, code)),
            }
        }
    }

    fn write_sync(&self, data: &[u8]) -> Result<(), FsError> {
        let fd = self.fd()?;
        let write = self.api.require("write")?;
        write_all(
            &self.path,
            data,
            |chunk| PosixApi::write(&write, fd, chunk),
            |code| self.api.os_error("write", &self.path, code),
        )
    }
}

impl InputStream for PosixHandle {
    fn read(self: Arc<Self>, len: usize) -> BoxFuture<'static, Result<Bytes, FsError>> {
        async move {
            tokio::task::yield_now().await;
            self.read_sync(len)
        }
        .boxed()
    }

    fn release(&self) {
        if let Some(fd) = self.fd.take() {
            self.api.close(fd as c_int);
            tracing::trace!(path = %self.path.display(), fd, "closed");
        }
    }
}

impl OutputStream for PosixHandle {
    fn write_all(self: Arc<Self>, chunk: Bytes) -> BoxFuture<'static, Result<(), FsError>> {
        async move {
            tokio::task::yield_now().await;
            self.write_sync(&chunk)
        }
        .boxed()
    }

    fn release(&self) {
        InputStream::release(self);
    }
}

impl Drop for PosixHandle {
    fn drop(&mut self) {
        InputStream::release(self);
    }
}
