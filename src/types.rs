//! Core value types shared by the decoder, the backends and the façade.

use std::path::Path;

use crate::FsError;
use crate::constants::{
    DT_BLK, DT_CHR, DT_DIR, DT_FIFO, DT_LNK, DT_REG, DT_SOCK, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO,
    S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
}

impl FileType {
    /// Classify a `st_mode` value by its `S_IFMT` bits.
    ///
    /// Returns `None` when the type bits match no known type.
    pub const fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(FileType::File),
            S_IFDIR => Some(FileType::Directory),
            S_IFLNK => Some(FileType::Symlink),
            S_IFCHR => Some(FileType::CharDevice),
            S_IFBLK => Some(FileType::BlockDevice),
            S_IFIFO => Some(FileType::Fifo),
            S_IFSOCK => Some(FileType::Socket),
            _ => None,
        }
    }

    /// Classify a `d_type` tag. `DT_UNKNOWN` and `DT_WHT` yield `None`.
    pub const fn from_dirent_type(tag: u32) -> Option<Self> {
        match tag {
            DT_REG => Some(FileType::File),
            DT_DIR => Some(FileType::Directory),
            DT_LNK => Some(FileType::Symlink),
            DT_CHR => Some(FileType::CharDevice),
            DT_BLK => Some(FileType::BlockDevice),
            DT_FIFO => Some(FileType::Fifo),
            DT_SOCK => Some(FileType::Socket),
            _ => None,
        }
    }

    /// The `S_IF*` bits for this type.
    pub const fn mode_bits(self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::CharDevice => S_IFCHR,
            FileType::BlockDevice => S_IFBLK,
            FileType::Fifo => S_IFIFO,
            FileType::Socket => S_IFSOCK,
        }
    }
}

/// Unix-style permissions stored as a mode bitmask.
///
/// Uses the standard Unix permission bits (rwxrwxrwx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permissions(u32);

impl Permissions {
    /// Create permissions from a Unix mode (e.g., 0o755).
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Get the raw mode value.
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.0
    }

    /// Permissions reported for, and given to, regular files (0o644).
    #[inline]
    pub const fn default_file() -> Self {
        Self(0o644)
    }

    /// Permissions reported for directories without a native mode (0o755).
    #[inline]
    pub const fn default_dir() -> Self {
        Self(0o755)
    }
}

/// A calendar timestamp with millisecond precision.
///
/// Stored as signed milliseconds since the Unix epoch so that times before
/// 1970 (possible for Windows file times) round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const UNIX_EPOCH: Timestamp = Timestamp(0);

    /// Create from milliseconds since the Unix epoch.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    #[inline]
    pub const fn millis(self) -> i64 {
        self.0
    }
}

/// A directory entry returned from [`list`](crate::list).
///
/// `type_tag` is the raw value the active dirent layout decoded: a `DT_*`
/// tag on POSIX, a synthesized `st_mode` on Windows. `file_type` is its
/// interpretation. The time and size fields are only present when the
/// platform's directory records carry them (Windows does, POSIX does not).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Name of the entry (filename only, not full path).
    pub name: String,
    /// Raw file-type tag.
    pub type_tag: u32,
    /// Decoded file type, if the tag is known.
    pub file_type: Option<FileType>,
    /// Last access time.
    pub atime: Option<Timestamp>,
    /// Last modification time.
    pub mtime: Option<Timestamp>,
    /// Change time (creation time on Windows).
    pub ctime: Option<Timestamp>,
    /// Size in bytes.
    pub size: Option<u64>,
}

/// Result of a whole-file read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContents {
    /// Raw bytes, no encoding requested.
    Bytes(Vec<u8>),
    /// Decoded text.
    Text(String),
}

impl FileContents {
    /// The contents as bytes (text is returned as UTF-8).
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContents::Bytes(bytes) => bytes,
            FileContents::Text(text) => text.into_bytes(),
        }
    }

    /// The decoded text, if an encoding was requested.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContents::Text(text) => Some(text),
            FileContents::Bytes(_) => None,
        }
    }
}

/// A resolved text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, handled without conversion.
    Utf8,
    /// Any other charset known to `encoding_rs`.
    Named(&'static encoding_rs::Encoding),
}

impl TextEncoding {
    /// Resolve an encoding label (`"utf8"`, `"utf-8"`, `"shift_jis"`, ...).
    ///
    /// # Errors
    ///
    /// - [`FsError::UnknownEncoding`] if the label names no known charset
    pub fn for_label(label: &str) -> Result<Self, FsError> {
        if label.eq_ignore_ascii_case("utf8") || label.eq_ignore_ascii_case("utf-8") {
            return Ok(TextEncoding::Utf8);
        }
        encoding_rs::Encoding::for_label(label.as_bytes())
            .map(|encoding| {
                if encoding == encoding_rs::UTF_8 {
                    TextEncoding::Utf8
                } else {
                    TextEncoding::Named(encoding)
                }
            })
            .ok_or_else(|| FsError::UnknownEncoding {
                label: label.to_string(),
            })
    }

    /// Decode raw file bytes.
    ///
    /// UTF-8 must be valid; named charsets replace malformed sequences.
    pub fn decode(self, path: &Path, bytes: Vec<u8>) -> Result<String, FsError> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes).map_err(|e| FsError::InvalidData {
                path: path.to_path_buf(),
                details: e.to_string(),
            }),
            TextEncoding::Named(encoding) => Ok(encoding.decode(&bytes).0.into_owned()),
        }
    }

    /// Encode text for writing.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Named(encoding) => encoding.encode(text).0.into_owned(),
        }
    }
}

/// Options for [`read_file`](crate::read_file).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Encoding label; `None` returns raw bytes.
    pub encoding: Option<String>,
}

impl ReadOptions {
    /// Request text decoded with `label`.
    pub fn encoding(label: impl Into<String>) -> Self {
        Self {
            encoding: Some(label.into()),
        }
    }
}

/// Options for [`write_text`](crate::write_text).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Encoding label; `None` writes UTF-8.
    pub encoding: Option<String>,
}

impl WriteOptions {
    /// Write text encoded with `label`.
    pub fn encoding(label: impl Into<String>) -> Self {
        Self {
            encoding: Some(label.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_type_per_mode() {
        let all = [
            FileType::File,
            FileType::Directory,
            FileType::Symlink,
            FileType::CharDevice,
            FileType::BlockDevice,
            FileType::Fifo,
            FileType::Socket,
        ];
        for ty in all {
            let mode = ty.mode_bits() | 0o644;
            assert_eq!(FileType::from_mode(mode), Some(ty));
        }
        assert_eq!(FileType::from_mode(0o644), None);
    }

    #[test]
    fn dirent_tags() {
        assert_eq!(FileType::from_dirent_type(DT_REG), Some(FileType::File));
        assert_eq!(FileType::from_dirent_type(DT_DIR), Some(FileType::Directory));
        assert_eq!(FileType::from_dirent_type(DT_LNK), Some(FileType::Symlink));
        assert_eq!(FileType::from_dirent_type(0), None);
        assert_eq!(FileType::from_dirent_type(14), None);
    }

    #[test]
    fn permissions_from_mode_masks_type_bits() {
        let p = Permissions::from_mode(0o100755);
        assert_eq!(p.mode(), 0o755);
        assert_eq!(Permissions::from_mode(0o4755).mode(), 0o4755);
    }

    #[test]
    fn timestamps_before_epoch_order_first() {
        let ts = Timestamp::from_millis(-1500);
        assert_eq!(ts.millis(), -1500);
        assert!(ts < Timestamp::UNIX_EPOCH);
    }

    #[test]
    fn encoding_labels() {
        assert_eq!(TextEncoding::for_label("utf8").unwrap(), TextEncoding::Utf8);
        assert_eq!(TextEncoding::for_label("UTF-8").unwrap(), TextEncoding::Utf8);
        assert_eq!(
            TextEncoding::for_label("latin1").unwrap(),
            TextEncoding::Named(encoding_rs::WINDOWS_1252)
        );
        assert!(matches!(
            TextEncoding::for_label("klingon"),
            Err(FsError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn named_encoding_round_trip() {
        let sjis = TextEncoding::for_label("shift_jis").unwrap();
        let bytes = sjis.encode("ファイル");
        assert_ne!(bytes, "ファイル".as_bytes());
        assert_eq!(sjis.decode(Path::new("x"), bytes).unwrap(), "ファイル");
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let err = TextEncoding::Utf8
            .decode(Path::new("/bad"), vec![0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, FsError::InvalidData { .. }));
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileType>();
        assert_send_sync::<Timestamp>();
        assert_send_sync::<DirEntry>();
        assert_send_sync::<FileContents>();
        assert_send_sync::<TextEncoding>();
    }
}
