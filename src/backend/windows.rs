//! Windows backend over `kernel32` entry points resolved at runtime.

use std::ffi::{OsString, c_void};
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use windows_sys::Win32::Foundation::{ERROR_NOT_ENOUGH_MEMORY, ERROR_SHARING_VIOLATION, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    CREATE_ALWAYS, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, GetFileExInfoStandard, OPEN_EXISTING,
};
use windows_sys::Win32::System::Diagnostics::Debug::{FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS};

use super::{HandleSlot, OnDrop, Transfer, read_exact, write_all};
use crate::call_table::{ApiEntry, CallTable, NativeAddress, ProcessResolver, Resolved, SymbolResolver};
use crate::decode::{DecodeContext, ReparseTagLookup};
use crate::layout::dirent::{WINDOWS_FIND_DATA_SIZE, WINDOWS_RESERVED0_OFFSET};
use crate::layout::stat::MAX_RECORD_SIZE;
use crate::layout::{DirentLayout, StatLayout, dirent_layout_for, stat_layout_for};
use crate::platform::PlatformKey;
use crate::stream::{InputStream, OutputStream};
use crate::traits::{EntryVisitor, FsDir, FsLink, FsRead, FsWrite};
use crate::{FsError, Stats};

const GENERIC_READ: u32 = 0x8000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;

/// Initial `GetFinalPathNameByHandleW` buffer, in UTF-16 units.
const FINAL_PATH_CAPACITY: usize = 256;

const MESSAGE_CAPACITY: usize = 512;

static KERNEL32_API: &[ApiEntry] = &[
    ApiEntry::fallible("CreateFileW"),
    ApiEntry::fallible("DeleteFileW"),
    ApiEntry::fallible("GetFileSizeEx"),
    ApiEntry::fallible("ReadFile"),
    ApiEntry::fallible("WriteFile"),
    ApiEntry::fallible("RemoveDirectoryW"),
    ApiEntry::plain("CloseHandle"),
    ApiEntry::fallible("FindFirstFileW"),
    ApiEntry::plain("FindNextFileW"),
    ApiEntry::plain("FindClose"),
    ApiEntry::fallible("GetFileAttributesExW"),
    ApiEntry::fallible("GetFinalPathNameByHandleW"),
    ApiEntry::plain("FormatMessageW"),
];

type Handle = *mut c_void;

type CreateFileFn = unsafe extern "system" fn(*const u16, u32, u32, *const c_void, u32, u32, Handle) -> Handle;
type PathFn = unsafe extern "system" fn(*const u16) -> i32;
type GetFileSizeExFn = unsafe extern "system" fn(Handle, *mut i64) -> i32;
type ReadFileFn = unsafe extern "system" fn(Handle, *mut c_void, u32, *mut u32, *mut c_void) -> i32;
type WriteFileFn = unsafe extern "system" fn(Handle, *const c_void, u32, *mut u32, *mut c_void) -> i32;
type CloseHandleFn = unsafe extern "system" fn(Handle) -> i32;
type FindFirstFileFn = unsafe extern "system" fn(*const u16, *mut c_void) -> Handle;
type FindNextFileFn = unsafe extern "system" fn(Handle, *mut c_void) -> i32;
type FindCloseFn = unsafe extern "system" fn(Handle) -> i32;
type GetFileAttributesExFn = unsafe extern "system" fn(*const u16, i32, *mut c_void) -> i32;
type GetFinalPathNameFn = unsafe extern "system" fn(Handle, *mut u16, u32, u32) -> u32;
type FormatMessageFn = unsafe extern "system" fn(u32, *const c_void, u32, u32, *mut u16, u32, *const c_void) -> u32;

/// Reinterpret an entry point as a typed function pointer.
///
/// # Safety
///
/// `F` must be a function pointer type matching the export's signature.
unsafe fn entry<F: Copy>(address: NativeAddress) -> F {
    debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
    // SAFETY: upheld by the caller.
    unsafe { std::mem::transmute_copy(&address.as_ptr()) }
}

/// `WIN32_FIND_DATAW` storage.
#[repr(C, align(8))]
struct FindData([u8; WINDOWS_FIND_DATA_SIZE]);

/// `WIN32_FILE_ATTRIBUTE_DATA` storage (oversized).
#[repr(C, align(8))]
struct RecordBuf([u8; MAX_RECORD_SIZE]);

fn wide_path(path: &Path) -> Result<Vec<u16>, FsError> {
    let wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if wide.contains(&0) {
        return Err(FsError::InvalidPath {
            path: path.to_path_buf(),
        });
    }
    Ok(wide.into_iter().chain(std::iter::once(0)).collect())
}

/// Typed wrappers over the `kernel32` call table.
#[derive(Debug)]
struct WindowsApi {
    table: CallTable,
}

impl WindowsApi {
    fn require(&self, name: &'static str) -> Result<Resolved, FsError> {
        self.table.resolve(name).ok_or(FsError::SymbolNotFound { name })
    }

    fn os_error(&self, operation: &'static str, path: &Path, code: i32) -> FsError {
        FsError::Os {
            operation,
            path: path.to_path_buf(),
            code,
            message: self.describe(code),
        }
    }

    /// System message text for `code`, falling back to the standard library's.
    fn describe(&self, code: i32) -> String {
        if let Some(format) = self.table.resolve("FormatMessageW") {
            let mut buf = [0u16; MESSAGE_CAPACITY];
            // SAFETY: FormatMessageW writes at most `buf.len()` units into `buf`.
            let len = format
                .invoke(|addr| unsafe {
                    entry::<FormatMessageFn>(addr)(
                        FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                        ptr::null(),
                        code as u32,
                        0,
                        buf.as_mut_ptr(),
                        buf.len() as u32,
                        ptr::null(),
                    )
                })
                .value as usize;
            if len > 0 {
                return String::from_utf16_lossy(&buf[..len.min(buf.len())]).trim_end().to_string();
            }
        }
        std::io::Error::from_raw_os_error(code).to_string()
    }

    fn create_file(
        &self,
        path: &Path,
        access: u32,
        share: u32,
        disposition: u32,
        flags: u32,
    ) -> Result<Handle, FsError> {
        let wide = wide_path(path)?;
        let create = self.require("CreateFileW")?;
        // SAFETY: `wide` is NUL-terminated; no security attributes or template.
        let result = create.invoke(|addr| unsafe {
            entry::<CreateFileFn>(addr)(wide.as_ptr(), access, share, ptr::null(), disposition, flags, ptr::null_mut())
        });
        if result.value == INVALID_HANDLE_VALUE {
            return Err(self.os_error("CreateFileW", path, result.error));
        }
        Ok(result.value)
    }

    fn close_handle(&self, handle: Handle) {
        if let Some(close) = self.table.resolve("CloseHandle") {
            // SAFETY: `handle` is owned by the caller and not used again.
            close.invoke(|addr| unsafe { entry::<CloseHandleFn>(addr)(handle) });
        }
    }

    fn read(read: &Resolved, handle: Handle, buf: &mut [u8]) -> Transfer {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut n = 0u32;
        // SAFETY: reads at most `len` bytes into `buf`, synchronously.
        let result = read.invoke(|addr| unsafe {
            entry::<ReadFileFn>(addr)(handle, buf.as_mut_ptr().cast(), len, &mut n, ptr::null_mut())
        });
        if result.value == 0 {
            return Transfer::Failed(result.error);
        }
        Transfer::Done(n as usize)
    }

    fn write(write: &Resolved, handle: Handle, data: &[u8]) -> Transfer {
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let mut n = 0u32;
        // SAFETY: writes at most `len` bytes from `data`, synchronously.
        let result = write.invoke(|addr| unsafe {
            entry::<WriteFileFn>(addr)(handle, data.as_ptr().cast(), len, &mut n, ptr::null_mut())
        });
        if result.value == 0 {
            return Transfer::Failed(result.error);
        }
        Transfer::Done(n as usize)
    }

    fn path_call(&self, name: &'static str, path: &Path) -> Result<(), FsError> {
        let wide = wide_path(path)?;
        let call = self.require(name)?;
        // SAFETY: `DeleteFileW` and `RemoveDirectoryW` take one wide path.
        let result = call.invoke(|addr| unsafe { entry::<PathFn>(addr)(wide.as_ptr()) });
        if result.value == 0 {
            return Err(self.os_error(name, path, result.error));
        }
        Ok(())
    }

    /// Feed every find record matching `pattern` to `visit`.
    fn find_matching(&self, pattern: &Path, visit: &mut EntryVisitor<'_>) -> Result<(), FsError> {
        let wide = wide_path(pattern)?;
        let find_first = self.require("FindFirstFileW")?;
        let find_next = self.require("FindNextFileW")?;
        let find_close = self.require("FindClose")?;

        let mut data = FindData([0; WINDOWS_FIND_DATA_SIZE]);
        // SAFETY: `data` has room for a `WIN32_FIND_DATAW`.
        let first = find_first.invoke(|addr| unsafe {
            entry::<FindFirstFileFn>(addr)(wide.as_ptr(), data.0.as_mut_ptr().cast())
        });
        if first.value == INVALID_HANDLE_VALUE {
            return Err(self.os_error("FindFirstFileW", pattern, first.error));
        }
        let handle = first.value;
        let _close = OnDrop::new(|| {
            // SAFETY: closes the search handle opened above, exactly once.
            find_close.invoke(|addr| unsafe { entry::<FindCloseFn>(addr)(handle) });
        });

        loop {
            visit(&data.0)?;
            // SAFETY: same buffer, same open search handle.
            let more = find_next
                .invoke(|addr| unsafe { entry::<FindNextFileFn>(addr)(handle, data.0.as_mut_ptr().cast()) })
                .value;
            if more == 0 {
                return Ok(());
            }
        }
    }
}

impl ReparseTagLookup for WindowsApi {
    fn reparse_tag(&self, path: &Path) -> Result<u32, FsError> {
        let mut tag = 0;
        self.find_matching(path, &mut |record| {
            let raw = &record[WINDOWS_RESERVED0_OFFSET..WINDOWS_RESERVED0_OFFSET + 4];
            tag = u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
            Ok(())
        })?;
        Ok(tag)
    }
}

/// Backend for Windows.
#[derive(Debug)]
pub struct WindowsBackend {
    api: Arc<WindowsApi>,
    key: PlatformKey,
    stat_layout: &'static StatLayout,
    dirent_layout: &'static DirentLayout,
}

impl WindowsBackend {
    /// Build the backend against the loaded `kernel32`.
    ///
    /// # Errors
    ///
    /// - [`FsError::UnsupportedPlatform`] if no layouts match the platform
    /// - [`FsError::SymbolNotFound`] if `GetFileAttributesExW` is missing
    pub fn new() -> Result<Self, FsError> {
        Self::with_resolver(Box::new(ProcessResolver))
    }

    /// Build the backend over a custom symbol resolver.
    ///
    /// # Errors
    ///
    /// Same as [`WindowsBackend::new`].
    pub fn with_resolver(resolver: Box<dyn SymbolResolver>) -> Result<Self, FsError> {
        let table = CallTable::new(Some("kernel32.dll"), KERNEL32_API, resolver);
        let key = PlatformKey::detect(|name| table.has(name))?;
        let stat_layout = stat_layout_for(&key)?;
        let dirent_layout = dirent_layout_for(&key)?;
        let api = WindowsApi { table };
        api.require("GetFileAttributesExW")?;

        tracing::debug!(
            platform = %key,
            stat_layout = stat_layout.id,
            dirent_layout = dirent_layout.id,
            "selected native filesystem backend"
        );

        Ok(Self {
            api: Arc::new(api),
            key,
            stat_layout,
            dirent_layout,
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

    fn stats(&self, path: &Path, record: &[u8]) -> Stats {
        let lookup: Arc<dyn ReparseTagLookup> = self.api.clone();
        Stats::new(
            path,
            self.stat_layout,
            Bytes::copy_from_slice(&record[..self.stat_layout.record_size]),
            Some(lookup),
        )
    }

    fn handle(&self, path: &Path, access: u32, share: u32, disposition: u32, flags: u32) -> Result<Arc<WindowsHandle>, FsError> {
        let raw = self.api.create_file(path, access, share, disposition, flags)?;
        tracing::trace!(path = %path.display(), "opened");
        Ok(Arc::new(WindowsHandle {
            api: Arc::clone(&self.api),
            path: path.to_path_buf(),
            handle: HandleSlot::new(raw as isize),
        }))
    }

    fn output(&self, path: &Path) -> Result<Arc<WindowsHandle>, FsError> {
        self.handle(path, GENERIC_WRITE, 0, CREATE_ALWAYS, FILE_ATTRIBUTE_NORMAL)
    }
}

impl FsRead for WindowsBackend {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let handle = self.api.create_file(path, GENERIC_READ, FILE_SHARE_READ, OPEN_EXISTING, 0)?;
        let _close = OnDrop::new(|| self.api.close_handle(handle));

        let get_size = self.api.require("GetFileSizeEx")?;
        let mut size = 0i64;
        // SAFETY: `size` receives a LARGE_INTEGER.
        let result = get_size.invoke(|addr| unsafe { entry::<GetFileSizeExFn>(addr)(handle, &mut size) });
        if result.value == 0 {
            return Err(self.api.os_error("GetFileSizeEx", path, result.error));
        }
        let size = usize::try_from(size).map_err(|_| FsError::InvalidData {
            path: path.to_path_buf(),
            details: format!("file size {size} does not fit in memory"),
        })?;

        let read = self.api.require("ReadFile")?;
        let mut buf = vec![0u8; size];
        read_exact(
            path,
            &mut buf,
            |chunk| WindowsApi::read(&read, handle, chunk),
            |code| self.api.os_error("ReadFile", path, code),
        )?;
        Ok(buf)
    }

    fn stat(&self, path: &Path) -> Result<Stats, FsError> {
        let stats = self.lstat(path)?;
        if !stats.is_symbolic_link() {
            return Ok(stats);
        }
        let target = self.read_link(path)?;
        self.lstat(&target)
    }

    fn open_input(&self, path: &Path) -> Result<Arc<dyn InputStream>, FsError> {
        Ok(self.handle(path, GENERIC_READ, FILE_SHARE_READ, OPEN_EXISTING, 0)?)
    }
}

impl FsWrite for WindowsBackend {
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let handle = self.output(path)?;
        let result = handle.write_sync(data);
        InputStream::release(&*handle);
        result
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.api.path_call("DeleteFileW", path)
    }

    fn open_output(&self, path: &Path) -> Result<Arc<dyn OutputStream>, FsError> {
        Ok(self.output(path)?)
    }
}

impl FsDir for WindowsBackend {
    fn enumerate_directory_entries(&self, path: &Path, visit: &mut EntryVisitor<'_>) -> Result<(), FsError> {
        let mut pattern = path.as_os_str().to_owned();
        pattern.push("\\*");
        self.api.find_matching(Path::new(&pattern), visit)
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.api.path_call("RemoveDirectoryW", path)
    }

    fn dirent_layout(&self) -> &'static DirentLayout {
        self.dirent_layout
    }

    fn decode_context<'a>(&'a self, path: &'a Path) -> DecodeContext<'a> {
        DecodeContext {
            path: Some(path),
            reparse: Some(&*self.api),
        }
    }
}

impl FsLink for WindowsBackend {
    fn read_link(&self, path: &Path) -> Result<PathBuf, FsError> {
        let handle = self.api.create_file(
            path,
            0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS,
        )?;
        let _close = OnDrop::new(|| self.api.close_handle(handle));
        let final_path = self.api.require("GetFinalPathNameByHandleW")?;

        let mut capacity = FINAL_PATH_CAPACITY;
        loop {
            let mut buf = vec![0u16; capacity];
            // SAFETY: writes at most `capacity` units into `buf`.
            let result = final_path.invoke(|addr| unsafe {
                entry::<GetFinalPathNameFn>(addr)(handle, buf.as_mut_ptr(), capacity as u32, 0)
            });
            let len = result.value as usize;
            if len == 0 && result.error != ERROR_NOT_ENOUGH_MEMORY as i32 {
                return Err(self.api.os_error("GetFinalPathNameByHandleW", path, result.error));
            }
            if len == 0 || len >= capacity {
                capacity *= 2;
                continue;
            }
            buf.truncate(len);
            let wide = buf.strip_prefix(&[b'\\' as u16, b'\\' as u16, b'?' as u16, b'\\' as u16]).unwrap_or(&buf);
            return Ok(PathBuf::from(OsString::from_wide(wide)));
        }
    }

    fn lstat(&self, path: &Path) -> Result<Stats, FsError> {
        let wide = wide_path(path)?;
        let attributes = self.api.require("GetFileAttributesExW")?;
        let mut buf = RecordBuf([0; MAX_RECORD_SIZE]);
        // SAFETY: `buf` has room for a `WIN32_FILE_ATTRIBUTE_DATA`.
        let result = attributes.invoke(|addr| unsafe {
            entry::<GetFileAttributesExFn>(addr)(wide.as_ptr(), GetFileExInfoStandard, buf.0.as_mut_ptr().cast())
        });
        if result.value != 0 {
            return Ok(self.stats(path, &buf.0));
        }
        if result.error != ERROR_SHARING_VIOLATION as i32 {
            return Err(self.api.os_error("GetFileAttributesExW", path, result.error));
        }

        // Locked files: the find record starts with the same fields.
        tracing::trace!(path = %path.display(), "attributes locked, falling back to find data");
        let record_size = self.stat_layout.record_size;
        self.api.find_matching(path, &mut |record| {
            buf.0[..record_size].copy_from_slice(&record[..record_size]);
            Ok(())
        })?;
        Ok(self.stats(path, &buf.0))
    }
}

/// An open file handle shared with a stream.
#[derive(Debug)]
struct WindowsHandle {
    api: Arc<WindowsApi>,
    path: PathBuf,
    handle: HandleSlot,
}

impl WindowsHandle {
    fn raw(&self) -> Result<Handle, FsError> {
        self.handle.get().map(|raw| raw as Handle).ok_or(FsError::StreamClosed)
    }

    fn read_sync(&self, len: usize) -> Result<Bytes, FsError> {
        let handle = self.raw()?;
        let read = self.api.require("ReadFile")?;
        let mut buf = vec![0u8; len];
        match WindowsApi::read(&read, handle, &mut buf) {
            Transfer::Done(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Transfer::Interrupted => Ok(Bytes::new()),
            Transfer::Failed(code) => Err(self.api.os_error("ReadFile", &self.path, code)),
        }
    }

    fn write_sync(&self, data: &[u8]) -> Result<(), FsError> {
        let handle = self.raw()?;
        let write = self.api.require("WriteFile")?;
        write_all(
            &self.path,
            data,
            |chunk| WindowsApi::write(&write, handle, chunk),
            |code| self.api.os_error("WriteFile", &self.path, code),
        )
    }
}

impl InputStream for WindowsHandle {
    fn read(self: Arc<Self>, len: usize) -> BoxFuture<'static, Result<Bytes, FsError>> {
        async move {
            tokio::task::yield_now().await;
            self.read_sync(len)
        }
        .boxed()
    }

    fn release(&self) {
        if let Some(raw) = self.handle.take() {
            self.api.close_handle(raw as Handle);
            tracing::trace!(path = %self.path.display(), "closed");
        }
    }
}

impl OutputStream for WindowsHandle {
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

impl Drop for WindowsHandle {
    fn drop(&mut self) {
        InputStream::release(self);
    }
}

#[cfg(all(test, windows))]
mod tests {
    use super::*;
    use std::fs;

    fn backend() -> WindowsBackend {
        WindowsBackend::new().unwrap()
    }

    #[test]
    fn find_data_matches_the_system_structure() {
        use windows_sys::Win32::Storage::FileSystem::WIN32_FIND_DATAW;
        assert_eq!(size_of::<WIN32_FIND_DATAW>(), WINDOWS_FIND_DATA_SIZE);
    }

    #[test]
    fn reads_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        let backend = backend();
        backend.write_file(&file, b"first version").unwrap();
        backend.write_file(&file, b"second").unwrap();
        assert_eq!(backend.read_file(&file).unwrap(), b"second");
        assert_eq!(fs::read(&file).unwrap(), b"second");
    }

    #[test]
    fn stat_reports_size_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, vec![1u8; 300]).unwrap();
        let backend = backend();

        let stats = backend.stat(&file).unwrap();
        assert_eq!(stats.size(), Some(300));
        assert!(stats.is_file());
        assert!(backend.stat(dir.path()).unwrap().is_directory());
    }

    #[test]
    fn missing_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend().lstat(&dir.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn enumerates_entries_with_dot_records() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        let mut count = 0;
        backend()
            .enumerate_directory_entries(dir.path(), &mut |record| {
                assert_eq!(record.len(), WINDOWS_FIND_DATA_SIZE);
                count += 1;
                Ok(())
            })
            .unwrap();
        // ".", ".." and the file.
        assert_eq!(count, 3);
    }

    #[test]
    fn removes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let sub = dir.path().join("sub");
        fs::write(&file, b"").unwrap();
        fs::create_dir(&sub).unwrap();
        let backend = backend();
        backend.remove_file(&file).unwrap();
        backend.remove_dir(&sub).unwrap();
        assert!(!file.exists());
        assert!(!sub.exists());
    }
}
