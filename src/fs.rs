//! # Filesystem Façade
//!
//! [`FileSystem`] turns the raw records a [`PlatformBackend`] produces into
//! the public API: entry names, decoded directory entries, encoded text,
//! lazy [`Stats`], and streams. The free functions at the crate root run
//! the same operations against the process-wide [`native`] backend.
//!
//! Stream creation never fails synchronously: a handle that cannot be
//! acquired produces a stream whose first poll reports the error.

use std::path::Path;

use crate::backend::native;
use crate::decode::{DecodeContext, decode_field};
use crate::layout::{DirentField, DirentLayout, TypeTag};
use crate::stream::{ReadStream, StreamOptions, WriteStream};
use crate::traits::PlatformBackend;
use crate::types::{DirEntry, FileContents, FileType, ReadOptions, TextEncoding, WriteOptions};
use crate::{FsError, Stats};

/// Filesystem operations over a backend.
///
/// # Example
///
/// ```rust,no_run
/// use rawfs::{FileSystem, ReadOptions};
/// use std::path::Path;
///
/// # fn main() -> Result<(), rawfs::FsError> {
/// let fs = FileSystem::native()?;
/// for name in fs.read_dir(Path::new("/tmp"))? {
///     println!("{name}");
/// }
/// let hosts = fs.read_file(Path::new("/etc/hosts"), &ReadOptions::encoding("utf8"))?;
/// println!("{}", hosts.as_text().unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct FileSystem<'b> {
    backend: &'b dyn PlatformBackend,
}

impl<'b> FileSystem<'b> {
    /// Operate through `backend`.
    pub fn new(backend: &'b dyn PlatformBackend) -> Self {
        Self { backend }
    }

    /// The backend operations run against.
    pub fn backend(&self) -> &'b dyn PlatformBackend {
        self.backend
    }

    /// Names of the entries in `path`, in the order the OS reports them.
    ///
    /// Pseudo-entries (`.`, `..`) are included when the OS reports them.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the directory cannot be opened
    pub fn read_dir(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let layout = self.backend.dirent_layout();
        let name = name_spec(layout)?;
        let mut names = Vec::new();
        self.backend.enumerate_directory_entries(path, &mut |record| {
            names.push(decode_name(name, record)?);
            Ok(())
        })?;
        Ok(names)
    }

    /// Decoded entries of `path`.
    ///
    /// Times and size are only filled in where the platform's directory
    /// records carry them.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the directory cannot be opened
    /// - [`FsError::TruncatedRecord`] if a record is shorter than its layout
    pub fn list(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let layout = self.backend.dirent_layout();
        let mut entries = Vec::new();
        self.backend.enumerate_directory_entries(path, &mut |record| {
            entries.push(self.decode_entry(path, layout, record)?);
            Ok(())
        })?;
        Ok(entries)
    }

    fn decode_entry(&self, dir: &Path, layout: &'static DirentLayout, record: &[u8]) -> Result<DirEntry, FsError> {
        let name = decode_name(name_spec(layout)?, record)?;
        let entry_path = dir.join(&name);
        let ctx = self.backend.decode_context(&entry_path);

        let field = |field: DirentField| {
            layout
                .field(field)
                .map(|spec| decode_field(field.name(), spec, record, &ctx))
                .transpose()
        };

        let type_tag = field(DirentField::Type)?
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        let file_type = match layout.type_tag {
            TypeTag::DirentType => FileType::from_dirent_type(type_tag),
            TypeTag::Mode => FileType::from_mode(type_tag),
        };

        Ok(DirEntry {
            name,
            type_tag,
            file_type,
            atime: field(DirentField::Atime)?.and_then(|v| v.as_time()),
            mtime: field(DirentField::Mtime)?.and_then(|v| v.as_time()),
            ctime: field(DirentField::Ctime)?.and_then(|v| v.as_time()),
            size: field(DirentField::Size)?.and_then(|v| v.as_u64()),
        })
    }

    /// Read a whole file.
    ///
    /// Returns [`FileContents::Bytes`] unless `options` names an encoding.
    ///
    /// # Errors
    ///
    /// - [`FsError::UnknownEncoding`] before any I/O if the label is unknown
    /// - [`FsError::Os`] if the file cannot be opened or read
    /// - [`FsError::ShortRead`] if fewer bytes arrive than the file's size
    /// - [`FsError::InvalidData`] if UTF-8 was requested and the bytes are not
    pub fn read_file(&self, path: &Path, options: &ReadOptions) -> Result<FileContents, FsError> {
        let encoding = options.encoding.as_deref().map(TextEncoding::for_label).transpose()?;
        let bytes = self.backend.read_file(path)?;
        match encoding {
            None => Ok(FileContents::Bytes(bytes)),
            Some(encoding) => encoding.decode(path, bytes).map(FileContents::Text),
        }
    }

    /// Read a whole file as bytes.
    ///
    /// # Errors
    ///
    /// Same as [`FileSystem::read_file`].
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.backend.read_file(path)
    }

    /// Read a whole file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`FileSystem::read_file`].
    pub fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        TextEncoding::Utf8.decode(path, self.backend.read_file(path)?)
    }

    /// Create or truncate `path` and write `data` to it.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the file cannot be created or written
    /// - [`FsError::ShortWrite`] if the OS stops accepting bytes
    pub fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        self.backend.write_file(path, data)
    }

    /// Write `text`, encoded per `options` (UTF-8 by default).
    ///
    /// # Errors
    ///
    /// - [`FsError::UnknownEncoding`] before any I/O if the label is unknown
    /// - Same as [`FileSystem::write_file`]
    pub fn write_text(&self, path: &Path, text: &str, options: &WriteOptions) -> Result<(), FsError> {
        let encoding = match options.encoding.as_deref() {
            Some(label) => TextEncoding::for_label(label)?,
            None => TextEncoding::Utf8,
        };
        self.backend.write_file(path, &encoding.encode(text))
    }

    /// Target of the symbolic link at `path`.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if `path` is missing or not a link
    pub fn read_link(&self, path: &Path) -> Result<std::path::PathBuf, FsError> {
        self.backend.read_link(path)
    }

    /// Remove an empty directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the directory is missing or not empty
    pub fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.backend.remove_dir(path)
    }

    /// Remove a file.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the file is missing or cannot be removed
    pub fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.backend.remove_file(path)
    }

    /// Status of `path`, following symbolic links.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if `path` cannot be queried
    pub fn stat(&self, path: &Path) -> Result<Stats, FsError> {
        self.backend.stat(path)
    }

    /// Status of `path` itself.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if `path` cannot be queried
    pub fn lstat(&self, path: &Path) -> Result<Stats, FsError> {
        self.backend.lstat(path)
    }

    /// Stream the contents of `path` in chunks of at most 4 MiB.
    pub fn create_read_stream(&self, path: &Path) -> ReadStream {
        self.create_read_stream_with(path, &StreamOptions::default())
    }

    /// Stream the contents of `path` with custom options.
    pub fn create_read_stream_with(&self, path: &Path, options: &StreamOptions) -> ReadStream {
        match self.backend.open_input(path) {
            Ok(input) => ReadStream::new(path, input, options),
            Err(error) => ReadStream::failed(path, error),
        }
    }

    /// A sink that creates or truncates `path`.
    pub fn create_write_stream(&self, path: &Path) -> WriteStream {
        self.create_write_stream_with(path, &StreamOptions::default())
    }

    /// A sink that creates or truncates `path`, with custom options.
    pub fn create_write_stream_with(&self, path: &Path, options: &StreamOptions) -> WriteStream {
        match self.backend.open_output(path) {
            Ok(output) => WriteStream::new(path, output, options),
            Err(error) => WriteStream::failed(path, error),
        }
    }
}

impl FileSystem<'static> {
    /// Operate through the process-wide native backend.
    ///
    /// # Errors
    ///
    /// Same as [`native`].
    pub fn native() -> Result<Self, FsError> {
        native().map(Self::new)
    }
}

impl std::fmt::Debug for FileSystem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("dirent_layout", &self.backend.dirent_layout().id)
            .finish_non_exhaustive()
    }
}

fn name_spec(layout: &'static DirentLayout) -> Result<&'static crate::layout::FieldSpec, FsError> {
    layout.field(DirentField::Name).ok_or(FsError::TruncatedRecord {
        field: DirentField::Name.name(),
        needed: 1,
        available: 0,
    })
}

fn decode_name(spec: &crate::layout::FieldSpec, record: &[u8]) -> Result<String, FsError> {
    let value = decode_field(DirentField::Name.name(), spec, record, &DecodeContext::default())?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Names of the entries in `path`.
///
/// # Errors
///
/// Same as [`FileSystem::read_dir`], plus startup errors from [`native`].
pub fn read_dir(path: impl AsRef<Path>) -> Result<Vec<String>, FsError> {
    FileSystem::native()?.read_dir(path.as_ref())
}

/// Decoded entries of `path`.
///
/// # Errors
///
/// Same as [`FileSystem::list`], plus startup errors from [`native`].
pub fn list(path: impl AsRef<Path>) -> Result<Vec<DirEntry>, FsError> {
    FileSystem::native()?.list(path.as_ref())
}

/// Read a whole file.
///
/// # Errors
///
/// Same as [`FileSystem::read_file`], plus startup errors from [`native`].
pub fn read_file(path: impl AsRef<Path>, options: &ReadOptions) -> Result<FileContents, FsError> {
    FileSystem::native()?.read_file(path.as_ref(), options)
}

/// Read a whole file as bytes.
///
/// # Errors
///
/// Same as [`FileSystem::read`], plus startup errors from [`native`].
pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>, FsError> {
    FileSystem::native()?.read(path.as_ref())
}

/// Read a whole file as UTF-8 text.
///
/// # Errors
///
/// Same as [`FileSystem::read_to_string`], plus startup errors from [`native`].
pub fn read_to_string(path: impl AsRef<Path>) -> Result<String, FsError> {
    FileSystem::native()?.read_to_string(path.as_ref())
}

/// Create or truncate `path` and write `data`.
///
/// # Errors
///
/// Same as [`FileSystem::write_file`], plus startup errors from [`native`].
pub fn write_file(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> Result<(), FsError> {
    FileSystem::native()?.write_file(path.as_ref(), data.as_ref())
}

/// Write encoded text.
///
/// # Errors
///
/// Same as [`FileSystem::write_text`], plus startup errors from [`native`].
pub fn write_text(path: impl AsRef<Path>, text: &str, options: &WriteOptions) -> Result<(), FsError> {
    FileSystem::native()?.write_text(path.as_ref(), text, options)
}

/// Target of a symbolic link.
///
/// # Errors
///
/// Same as [`FileSystem::read_link`], plus startup errors from [`native`].
pub fn read_link(path: impl AsRef<Path>) -> Result<std::path::PathBuf, FsError> {
    FileSystem::native()?.read_link(path.as_ref())
}

/// Remove an empty directory.
///
/// # Errors
///
/// Same as [`FileSystem::remove_dir`], plus startup errors from [`native`].
pub fn remove_dir(path: impl AsRef<Path>) -> Result<(), FsError> {
    FileSystem::native()?.remove_dir(path.as_ref())
}

/// Remove a file.
///
/// # Errors
///
/// Same as [`FileSystem::remove_file`], plus startup errors from [`native`].
pub fn remove_file(path: impl AsRef<Path>) -> Result<(), FsError> {
    FileSystem::native()?.remove_file(path.as_ref())
}

/// Status of `path`, following links.
///
/// # Errors
///
/// Same as [`FileSystem::stat`], plus startup errors from [`native`].
pub fn stat(path: impl AsRef<Path>) -> Result<Stats, FsError> {
    FileSystem::native()?.stat(path.as_ref())
}

/// Status of `path` itself.
///
/// # Errors
///
/// Same as [`FileSystem::lstat`], plus startup errors from [`native`].
pub fn lstat(path: impl AsRef<Path>) -> Result<Stats, FsError> {
    FileSystem::native()?.lstat(path.as_ref())
}

/// Stream a file's contents.
///
/// Startup errors are reported by the stream's first poll.
pub fn create_read_stream(path: impl AsRef<Path>) -> ReadStream {
    create_read_stream_with(path, &StreamOptions::default())
}

/// Stream a file's contents with custom options.
pub fn create_read_stream_with(path: impl AsRef<Path>, options: &StreamOptions) -> ReadStream {
    let path = path.as_ref();
    match FileSystem::native() {
        Ok(fs) => fs.create_read_stream_with(path, options),
        Err(error) => ReadStream::failed(path, error),
    }
}

/// A sink writing into a created or truncated file.
///
/// Startup errors are reported by the sink's first readiness check.
pub fn create_write_stream(path: impl AsRef<Path>) -> WriteStream {
    create_write_stream_with(path, &StreamOptions::default())
}

/// A sink writing into a created or truncated file, with custom options.
pub fn create_write_stream_with(path: impl AsRef<Path>, options: &StreamOptions) -> WriteStream {
    let path = path.as_ref();
    match FileSystem::native() {
        Ok(fs) => fs.create_write_stream_with(path, options),
        Err(error) => WriteStream::failed(path, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DT_DIR, DT_REG, S_IFDIR};
    use crate::decode::{FILE_ATTRIBUTE_DIRECTORY, filetime_to_millis};
    use crate::layout::dirent::{DIRENT_LAYOUTS, WINDOWS_FIND_DATA_SIZE};
    use crate::layout::stat::STAT_LAYOUTS;
    use crate::stream::{InputStream, OutputStream};
    use crate::traits::{EntryVisitor, FsDir, FsLink, FsRead, FsWrite};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// In-memory backend that replays canned directory records.
    struct MockBackend {
        dirent_layout: &'static DirentLayout,
        records: Vec<Vec<u8>>,
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
        read_error: Option<FsError>,
    }

    impl MockBackend {
        fn new(layout_id: &str, records: Vec<Vec<u8>>) -> Self {
            Self {
                dirent_layout: DIRENT_LAYOUTS.iter().find(|l| l.id == layout_id).unwrap(),
                records,
                files: Mutex::new(HashMap::new()),
                read_error: None,
            }
        }

        fn with_file(self, path: &str, data: &[u8]) -> Self {
            self.files.lock().unwrap().insert(PathBuf::from(path), data.to_vec());
            self
        }

        fn contents(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(Path::new(path)).cloned()
        }
    }

    fn missing(operation: &'static str, path: &Path) -> FsError {
        FsError::Os {
            operation,
            path: path.to_path_buf(),
            code: 2,
            message: "No such file or directory".into(),
        }
    }

    impl FsRead for MockBackend {
        fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
            if let Some(err) = &self.read_error {
                return Err(err.clone());
            }
            self.files.lock().unwrap().get(path).cloned().ok_or_else(|| missing("open", path))
        }

        fn stat(&self, path: &Path) -> Result<Stats, FsError> {
            self.lstat(path)
        }

        fn open_input(&self, path: &Path) -> Result<Arc<dyn InputStream>, FsError> {
            Err(missing("open", path))
        }
    }

    impl FsWrite for MockBackend {
        fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
            self.files.lock().unwrap().insert(path.to_path_buf(), data.to_vec());
            Ok(())
        }

        fn remove_file(&self, path: &Path) -> Result<(), FsError> {
            self.files.lock().unwrap().remove(path).map(drop).ok_or_else(|| missing("unlink", path))
        }

        fn open_output(&self, path: &Path) -> Result<Arc<dyn OutputStream>, FsError> {
            Err(missing("open", path))
        }
    }

    impl FsDir for MockBackend {
        fn enumerate_directory_entries(&self, _: &Path, visit: &mut EntryVisitor<'_>) -> Result<(), FsError> {
            for record in &self.records {
                visit(record)?;
            }
            Ok(())
        }

        fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
            Err(missing("rmdir", path))
        }

        fn dirent_layout(&self) -> &'static DirentLayout {
            self.dirent_layout
        }
    }

    impl FsLink for MockBackend {
        fn read_link(&self, path: &Path) -> Result<PathBuf, FsError> {
            Err(missing("readlink", path))
        }

        fn lstat(&self, path: &Path) -> Result<Stats, FsError> {
            let data = self.files.lock().unwrap().get(path).cloned().ok_or_else(|| missing("lstat", path))?;
            let layout = STAT_LAYOUTS.iter().find(|l| l.id == "linux-x64").unwrap();
            let mut record = vec![0u8; layout.record_size];
            record[24..28].copy_from_slice(&(crate::constants::S_IFREG | 0o644).to_ne_bytes());
            record[48..56].copy_from_slice(&(data.len() as i64).to_ne_bytes());
            Ok(Stats::new(path, layout, record, None))
        }
    }

    fn linux_dirent(name: &str, d_type: u8) -> Vec<u8> {
        let mut record = vec![0u8; 19];
        record[18] = d_type;
        record.extend_from_slice(name.as_bytes());
        record.push(0);
        record
    }

    fn windows_find_data(name: &str, attributes: u32, mtime_ticks: u64, size: u64) -> Vec<u8> {
        let mut record = vec![0u8; WINDOWS_FIND_DATA_SIZE];
        record[0..4].copy_from_slice(&attributes.to_ne_bytes());
        record[20..28].copy_from_slice(&mtime_ticks.to_ne_bytes());
        record[28..32].copy_from_slice(&((size >> 32) as u32).to_ne_bytes());
        record[32..36].copy_from_slice(&(size as u32).to_ne_bytes());
        for (i, unit) in name.encode_utf16().enumerate() {
            record[44 + i * 2..46 + i * 2].copy_from_slice(&unit.to_ne_bytes());
        }
        record
    }

    #[test]
    fn read_dir_returns_names_in_os_order() {
        let backend = MockBackend::new(
            "linux-64",
            vec![linux_dirent(".", DT_DIR as u8), linux_dirent("b", DT_REG as u8), linux_dirent("a", DT_REG as u8)],
        );
        let names = FileSystem::new(&backend).read_dir(Path::new("/d")).unwrap();
        assert_eq!(names, [".", "b", "a"]);
    }

    #[test]
    fn list_decodes_dirent_type_tags() {
        let backend = MockBackend::new(
            "linux-64",
            vec![linux_dirent("sub", DT_DIR as u8), linux_dirent("file", DT_REG as u8), linux_dirent("odd", 77)],
        );
        let entries = FileSystem::new(&backend).list(Path::new("/d")).unwrap();
        assert_eq!(entries[0].file_type, Some(FileType::Directory));
        assert_eq!(entries[1].file_type, Some(FileType::File));
        assert_eq!(entries[2].type_tag, 77);
        assert_eq!(entries[2].file_type, None);
        assert!(entries.iter().all(|e| e.size.is_none() && e.mtime.is_none()));
    }

    #[test]
    fn list_decodes_windows_find_data() {
        let ticks = 133_000_000_000_000_000;
        let backend = MockBackend::new(
            "windows",
            vec![
                windows_find_data("docs", FILE_ATTRIBUTE_DIRECTORY, ticks, 0),
                windows_find_data("big.bin", 0x20, ticks, 0x1_0000_0010),
            ],
        );
        let entries = FileSystem::new(&backend).list(Path::new("C:\\data")).unwrap();

        assert_eq!(entries[0].name, "docs");
        assert_eq!(entries[0].type_tag & S_IFDIR, S_IFDIR);
        assert_eq!(entries[0].file_type, Some(FileType::Directory));
        assert_eq!(entries[1].name, "big.bin");
        assert_eq!(entries[1].file_type, Some(FileType::File));
        assert_eq!(entries[1].size, Some(0x1_0000_0010));
        assert_eq!(entries[1].mtime.map(|t| t.millis()), Some(filetime_to_millis(ticks)));
    }

    #[test]
    fn truncated_records_fail_the_listing() {
        let backend = MockBackend::new("linux-64", vec![vec![0u8; 10]]);
        let err = FileSystem::new(&backend).list(Path::new("/d")).unwrap_err();
        assert!(matches!(err, FsError::TruncatedRecord { .. }));
    }

    #[test]
    fn read_file_returns_bytes_without_encoding() {
        let backend = MockBackend::new("linux-64", vec![]).with_file("/f", b"\xff\x00");
        let contents = FileSystem::new(&backend).read_file(Path::new("/f"), &ReadOptions::default()).unwrap();
        assert_eq!(contents, FileContents::Bytes(vec![0xff, 0x00]));
    }

    #[test]
    fn read_file_decodes_named_charsets() {
        // "日本" in Shift_JIS.
        let backend = MockBackend::new("linux-64", vec![]).with_file("/f", b"\x93\xfa\x96\x7b");
        let contents = FileSystem::new(&backend)
            .read_file(Path::new("/f"), &ReadOptions::encoding("shift_jis"))
            .unwrap();
        assert_eq!(contents.as_text(), Some("日本"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let backend = MockBackend::new("linux-64", vec![]).with_file("/f", b"\xff");
        let err = FileSystem::new(&backend).read_to_string(Path::new("/f")).unwrap_err();
        assert!(matches!(err, FsError::InvalidData { .. }));
    }

    #[test]
    fn unknown_encodings_fail_before_io() {
        let backend = MockBackend::new("linux-64", vec![]);
        let err = FileSystem::new(&backend)
            .read_file(Path::new("/missing"), &ReadOptions::encoding("klingon"))
            .unwrap_err();
        assert_eq!(
            err,
            FsError::UnknownEncoding {
                label: "klingon".into()
            }
        );
    }

    #[test]
    fn short_reads_propagate() {
        let mut backend = MockBackend::new("linux-64", vec![]);
        backend.read_error = Some(FsError::ShortRead {
            path: PathBuf::from("/f"),
            expected: 10,
            actual: 3,
        });
        let err = FileSystem::new(&backend).read(Path::new("/f")).unwrap_err();
        assert!(matches!(err, FsError::ShortRead { expected: 10, actual: 3, .. }));
    }

    #[test]
    fn write_text_encodes() {
        let backend = MockBackend::new("linux-64", vec![]);
        let fs = FileSystem::new(&backend);
        fs.write_text(Path::new("/a"), "héllo", &WriteOptions::default()).unwrap();
        fs.write_text(Path::new("/b"), "héllo", &WriteOptions::encoding("latin1")).unwrap();
        assert_eq!(backend.contents("/a").unwrap(), "héllo".as_bytes());
        assert_eq!(backend.contents("/b").unwrap(), b"h\xe9llo");
    }

    #[test]
    fn stat_and_remove_go_through_the_backend() {
        let backend = MockBackend::new("linux-64", vec![]).with_file("/f", b"12345");
        let fs = FileSystem::new(&backend);
        assert_eq!(fs.stat(Path::new("/f")).unwrap().size(), Some(5));
        fs.remove_file(Path::new("/f")).unwrap();
        assert!(fs.lstat(Path::new("/f")).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn stream_open_failures_surface_on_first_poll() {
        let backend = MockBackend::new("linux-64", vec![]);
        let mut stream = FileSystem::new(&backend).create_read_stream(Path::new("/missing"));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_not_found());
        assert!(stream.next().await.is_none());
    }
}
