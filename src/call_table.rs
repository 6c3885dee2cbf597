//! # Call Table
//!
//! Lazily resolves native entry points by symbol name and caches the result,
//! including "absent" results, which callers use as capability probes.
//!
//! Each entry in an API table records whether the call reports failure
//! through errno / last-error ([`CallKind::Fallible`]) and whether it needs
//! an implicit leading argument ([`Adapter`]) that the table binds itself
//! in [`Resolved::invoke_path_out`].
//!
//! ```text
//! ApiEntry ("stat64", Fallible, Adapter::None)
//!        │ first resolve()
//!        ▼
//! SymbolResolver::find_export ──▶ OnceLock<Option<NativeAddress>>  (frozen)
//!        │
//!        ▼
//! Resolved::invoke(|addr| ...) ──▶ SysResult { value, error }
//! ```

use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::ptr::NonNull;
use std::sync::OnceLock;

/// Address of a resolved native entry point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NativeAddress(NonNull<c_void>);

// SAFETY: the address of an exported function is immutable process-wide data.
unsafe impl Send for NativeAddress {}
// SAFETY: see above.
unsafe impl Sync for NativeAddress {}

impl NativeAddress {
    /// Wrap a raw address; `None` for null.
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The raw address.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeAddress({:p})", self.0)
    }
}

/// Looks up exported symbols in the running process.
///
/// The process-wide implementation is [`ProcessResolver`]; tests substitute
/// their own to simulate C libraries with different exports.
pub trait SymbolResolver: Send + Sync {
    /// Find `name`, optionally restricted to the module named `module`.
    fn find_export(&self, module: Option<&str>, name: &str) -> Option<NativeAddress>;
}

/// How a call reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Only the return value matters.
    Plain,
    /// Failure is detailed through errno (POSIX) or last-error (Windows),
    /// captured immediately after the call.
    Fallible,
}

/// Implicit argument bound by the call table rather than the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    /// The call is invoked with the caller's arguments only.
    None,
    /// glibc's `__xstat64` family takes a leading structure-version tag.
    StatVersion(i32),
}

/// One row of an API table.
#[derive(Debug, Clone, Copy)]
pub struct ApiEntry {
    /// Exported symbol name.
    pub name: &'static str,
    /// Failure reporting style.
    pub kind: CallKind,
    /// Implicit argument binding.
    pub adapter: Adapter,
}

impl ApiEntry {
    /// A call with only a return value.
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            kind: CallKind::Plain,
            adapter: Adapter::None,
        }
    }

    /// A call that reports failure through errno / last-error.
    pub const fn fallible(name: &'static str) -> Self {
        Self {
            name,
            kind: CallKind::Fallible,
            adapter: Adapter::None,
        }
    }

    /// Bind an implicit leading argument.
    pub const fn with_adapter(self, adapter: Adapter) -> Self {
        Self { adapter, ..self }
    }
}

/// Return value of a native call plus the side-channel error code.
///
/// `error` is only meaningful for [`CallKind::Fallible`] calls and only when
/// `value` signals failure; it is `0` for plain calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysResult<T> {
    /// Primary return value.
    pub value: T,
    /// errno or last-error captured right after the call.
    pub error: i32,
}

/// A resolved entry point together with its table metadata.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    /// Symbol name.
    pub name: &'static str,
    /// Entry point address.
    pub address: NativeAddress,
    /// Failure reporting style.
    pub kind: CallKind,
    /// Implicit argument binding.
    pub adapter: Adapter,
}

impl Resolved {
    /// Run `call` against the entry point and capture the error code.
    ///
    /// `call` performs the actual (unsafe) transmute-and-call; keeping it in
    /// a closure lets each typed wrapper own its signature.
    pub fn invoke<T>(&self, call: impl FnOnce(NativeAddress) -> T) -> SysResult<T> {
        let value = call(self.address);
        let error = match self.kind {
            CallKind::Fallible => last_error(),
            CallKind::Plain => 0,
        };
        SysResult { value, error }
    }

    /// Call an `int f(const char *path, void *out)` entry point.
    ///
    /// Entries with [`Adapter::StatVersion`] are invoked as
    /// `int f(int version, const char *path, void *out)` with the bound tag
    /// prepended, so callers see one signature for the whole `stat` family.
    ///
    /// # Safety
    ///
    /// The entry point must have that shape, `path` must be NUL-terminated
    /// and `out` must be writable for the structure the call fills in.
    pub unsafe fn invoke_path_out(&self, path: *const c_char, out: *mut c_void) -> SysResult<c_int> {
        type PathOutFn = unsafe extern "C" fn(*const c_char, *mut c_void) -> c_int;
        type VersionedPathOutFn = unsafe extern "C" fn(c_int, *const c_char, *mut c_void) -> c_int;

        self.invoke(|addr| match self.adapter {
            Adapter::StatVersion(version) => {
                // SAFETY: upheld by the caller.
                let call: VersionedPathOutFn = unsafe { std::mem::transmute_copy(&addr.as_ptr()) };
                // SAFETY: upheld by the caller.
                unsafe { call(version, path, out) }
            }
            Adapter::None => {
                // SAFETY: upheld by the caller.
                let call: PathOutFn = unsafe { std::mem::transmute_copy(&addr.as_ptr()) };
                // SAFETY: upheld by the caller.
                unsafe { call(path, out) }
            }
        })
    }
}

fn last_error() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Lazily-resolved, process-lifetime table of native entry points.
pub struct CallTable {
    module: Option<&'static str>,
    entries: &'static [ApiEntry],
    slots: Box<[OnceLock<Option<NativeAddress>>]>,
    resolver: Box<dyn SymbolResolver>,
}

impl CallTable {
    /// Create a table over `entries`, resolving in `module` (or the whole
    /// process when `None`).
    pub fn new(
        module: Option<&'static str>,
        entries: &'static [ApiEntry],
        resolver: Box<dyn SymbolResolver>,
    ) -> Self {
        let slots = entries.iter().map(|_| OnceLock::new()).collect();
        Self {
            module,
            entries,
            slots,
            resolver,
        }
    }

    /// Resolve `name`, caching the outcome.
    ///
    /// Returns `None` both for symbols absent from the process and for names
    /// that are not part of this table. Absence is not an error; it is the
    /// probe result used to pick an ABI variant.
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        let entry = &self.entries[index];
        let address = (*self.slots[index].get_or_init(|| {
            let address = self.resolver.find_export(self.module, entry.name);
            tracing::trace!(symbol = entry.name, found = address.is_some(), "resolved native entry point");
            address
        }))?;
        Some(Resolved {
            name: entry.name,
            address,
            kind: entry.kind,
            adapter: entry.adapter,
        })
    }

    /// Returns `true` if `name` resolves.
    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// First of `names` that resolves, in order of preference.
    pub fn first_available(&self, names: &[&str]) -> Option<Resolved> {
        names.iter().find_map(|name| self.resolve(name))
    }
}

impl fmt::Debug for CallTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTable")
            .field("module", &self.module)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Resolves symbols in the running process through the dynamic loader.
///
/// POSIX uses `dlsym` on the global namespace (or on an already-loaded
/// module when a name is given); Windows uses `GetProcAddress` on an
/// already-loaded module.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessResolver;

#[cfg(unix)]
impl SymbolResolver for ProcessResolver {
    fn find_export(&self, module: Option<&str>, name: &str) -> Option<NativeAddress> {
        use std::ffi::CString;

        let symbol = CString::new(name).ok()?;
        let handle = match module {
            None => libc::RTLD_DEFAULT,
            Some(module) => {
                let module = CString::new(module).ok()?;
                // SAFETY: RTLD_NOLOAD only returns modules that are already mapped.
                let handle = unsafe { libc::dlopen(module.as_ptr(), libc::RTLD_LAZY | libc::RTLD_NOLOAD) };
                if handle.is_null() {
                    return None;
                }
                handle
            }
        };
        // SAFETY: `symbol` is NUL-terminated and `handle` is a valid namespace.
        NativeAddress::new(unsafe { libc::dlsym(handle, symbol.as_ptr()) })
    }
}

#[cfg(windows)]
impl SymbolResolver for ProcessResolver {
    fn find_export(&self, module: Option<&str>, name: &str) -> Option<NativeAddress> {
        use std::ffi::CString;
        use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};

        let symbol = CString::new(name).ok()?;
        let module: Vec<u16> = module
            .unwrap_or("kernel32.dll")
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        // SAFETY: `module` is NUL-terminated UTF-16.
        let handle = unsafe { GetModuleHandleW(module.as_ptr()) };
        if handle.is_null() {
            return None;
        }
        // SAFETY: `handle` is a loaded module and `symbol` is NUL-terminated.
        let proc = unsafe { GetProcAddress(handle, symbol.as_ptr().cast()) }?;
        NativeAddress::new(proc as *mut c_void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Resolver backed by a fixed export list that counts lookups.
    struct FakeExports {
        exports: HashMap<&'static str, usize>,
        lookups: Mutex<Vec<String>>,
    }

    impl FakeExports {
        fn new(names: &[&'static str]) -> Self {
            let exports = names
                .iter()
                .enumerate()
                .map(|(i, name)| (*name, 0x1000 + i * 0x10))
                .collect();
            Self {
                exports,
                lookups: Mutex::new(Vec::new()),
            }
        }
    }

    impl SymbolResolver for FakeExports {
        fn find_export(&self, _module: Option<&str>, name: &str) -> Option<NativeAddress> {
            self.lookups.lock().unwrap().push(name.to_string());
            self.exports
                .get(name)
                .and_then(|addr| NativeAddress::new(*addr as *mut c_void))
        }
    }

    impl SymbolResolver for std::sync::Arc<FakeExports> {
        fn find_export(&self, module: Option<&str>, name: &str) -> Option<NativeAddress> {
            (**self).find_export(module, name)
        }
    }

    static ENTRIES: &[ApiEntry] = &[
        ApiEntry::fallible("open"),
        ApiEntry::plain("close"),
        ApiEntry::fallible("stat64"),
        ApiEntry::fallible("__xstat64").with_adapter(Adapter::StatVersion(3)),
        ApiEntry::fallible("stat"),
    ];

    fn table(exports: &[&'static str]) -> (CallTable, std::sync::Arc<FakeExports>) {
        let fake = std::sync::Arc::new(FakeExports::new(exports));
        (CallTable::new(None, ENTRIES, Box::new(fake.clone())), fake)
    }

    #[test]
    fn resolves_once_and_caches() {
        let (table, fake) = table(&["open"]);
        assert!(table.resolve("open").is_some());
        assert!(table.resolve("open").is_some());
        assert_eq!(*fake.lookups.lock().unwrap(), vec!["open".to_string()]);
    }

    #[test]
    fn absent_results_are_cached_too() {
        let (table, fake) = table(&["open"]);
        assert!(!table.has("stat64"));
        assert!(!table.has("stat64"));
        assert_eq!(fake.lookups.lock().unwrap().len(), 1);
    }

    #[test]
    fn names_outside_the_table_are_absent() {
        let (table, fake) = table(&["open", "unlink"]);
        assert!(table.resolve("unlink").is_none());
        assert!(fake.lookups.lock().unwrap().is_empty());
    }

    #[test]
    fn first_available_respects_preference_order() {
        let (table, _) = table(&["stat", "__xstat64"]);
        let call = table.first_available(&["stat64", "__xstat64", "stat"]).unwrap();
        assert_eq!(call.name, "__xstat64");
        assert_eq!(call.adapter, Adapter::StatVersion(3));
        assert_eq!(call.kind, CallKind::Fallible);
    }

    #[test]
    fn plain_calls_report_no_error_code() {
        let (table, _) = table(&["close"]);
        let close = table.resolve("close").unwrap();
        let result = close.invoke(|addr| addr.as_ptr() as usize);
        assert_eq!(result.error, 0);
        assert_ne!(result.value, 0);
    }

    unsafe extern "C" fn fill_plain(_path: *const c_char, out: *mut c_void) -> c_int {
        // SAFETY: tests pass a pointer to an `i32`.
        unsafe { *out.cast::<i32>() = -1 };
        0
    }

    unsafe extern "C" fn fill_versioned(version: c_int, _path: *const c_char, out: *mut c_void) -> c_int {
        // SAFETY: tests pass a pointer to an `i32`.
        unsafe { *out.cast::<i32>() = version };
        0
    }

    fn resolved(address: *mut c_void, adapter: Adapter) -> Resolved {
        Resolved {
            name: "stat",
            address: NativeAddress::new(address).unwrap(),
            kind: CallKind::Plain,
            adapter,
        }
    }

    #[test]
    fn version_tag_is_bound_by_the_table() {
        let mut out = 0i32;
        let path = c"/".as_ptr();

        let versioned = resolved(fill_versioned as usize as *mut c_void, Adapter::StatVersion(3));
        // SAFETY: `fill_versioned` has the adapted shape and `out` is an i32.
        let result = unsafe { versioned.invoke_path_out(path, (&raw mut out).cast()) };
        assert_eq!(result.value, 0);
        assert_eq!(out, 3);

        let plain = resolved(fill_plain as usize as *mut c_void, Adapter::None);
        // SAFETY: `fill_plain` has the plain shape and `out` is an i32.
        unsafe { plain.invoke_path_out(path, (&raw mut out).cast()) };
        assert_eq!(out, -1);
    }

    #[cfg(unix)]
    #[test]
    fn process_resolver_finds_libc_exports() {
        assert!(ProcessResolver.find_export(None, "open").is_some());
        assert!(ProcessResolver.find_export(None, "no_such_symbol_anywhere").is_none());
    }
}
