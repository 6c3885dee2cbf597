//! # Stats
//!
//! A read-only view over a raw file-status record.
//!
//! Nothing is decoded up front. Every accessor looks the field up in the
//! active [`StatLayout`] and decodes it from the retained record on demand;
//! fields the layout does not carry are derived:
//!
//! | Requested | Layout lacks it | Result |
//! |-----------|-----------------|--------|
//! | `birthtime` | yes | `ctime` |
//! | `xtimeMs` | yes | `xtime` as epoch milliseconds |
//! | unknown name | n/a | `None` |
//!
//! A failure while decoding (a truncated record, or the secondary reparse
//! lookup on Windows failing) is logged and reported as an absent field by
//! [`Stats::get`]. Use [`Stats::try_get`] to see the error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::FsError;
use crate::constants::S_IFMT;
use crate::decode::{DecodeContext, FieldValue, ReparseTagLookup, decode_field};
use crate::layout::{Derivation, StatField, StatLayout};
use crate::types::{FileType, Permissions, Timestamp};

/// How many derivation steps a lookup may take (`birthtimeMs` → `birthtime`
/// → `ctime`).
const MAX_DERIVATION_DEPTH: usize = 2;

/// File status, decoded lazily from the native record.
#[derive(Clone)]
pub struct Stats {
    path: PathBuf,
    layout: &'static StatLayout,
    record: Bytes,
    reparse: Option<Arc<dyn ReparseTagLookup>>,
}

impl Stats {
    /// Wrap a raw record.
    ///
    /// `reparse` is consulted by the Windows attribute decoder; POSIX
    /// backends pass `None`.
    pub fn new(
        path: impl Into<PathBuf>,
        layout: &'static StatLayout,
        record: impl Into<Bytes>,
        reparse: Option<Arc<dyn ReparseTagLookup>>,
    ) -> Self {
        Self {
            path: path.into(),
            layout,
            record: record.into(),
            reparse,
        }
    }

    /// Path the record was obtained for.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The layout in use.
    pub fn layout(&self) -> &'static StatLayout {
        self.layout
    }

    /// The raw record bytes, exactly as the OS returned them.
    pub fn record(&self) -> &Bytes {
        &self.record
    }

    /// Decode `field`.
    ///
    /// Returns `Ok(None)` only if the field can neither be decoded nor
    /// derived.
    ///
    /// # Errors
    ///
    /// - [`FsError::TruncatedRecord`] if the record is shorter than the layout
    /// - [`FsError::Os`] if a secondary lookup fails
    pub fn try_get(&self, field: StatField) -> Result<Option<FieldValue>, FsError> {
        self.resolve(field, 0)
    }

    fn resolve(&self, field: StatField, depth: usize) -> Result<Option<FieldValue>, FsError> {
        if let Some(spec) = self.layout.field(field) {
            let ctx = DecodeContext {
                path: Some(&self.path),
                reparse: self.reparse.as_deref(),
            };
            return decode_field(field.name(), spec, &self.record, &ctx).map(Some);
        }

        if depth >= MAX_DERIVATION_DEPTH {
            return Ok(None);
        }
        match field.derivation() {
            Some(Derivation::Alias(base)) => self.resolve(base, depth + 1),
            Some(Derivation::Millis(base)) => Ok(self
                .resolve(base, depth + 1)?
                .and_then(|v| v.as_time())
                .map(|t| FieldValue::Int(t.millis()))),
            None => Ok(None),
        }
    }

    /// Decode `field`, logging and discarding any error.
    pub fn get(&self, field: StatField) -> Option<FieldValue> {
        match self.try_get(field) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    layout = self.layout.id,
                    %field,
                    %error,
                    "failed to decode stat field"
                );
                None
            }
        }
    }

    /// Look a field up by its conventional name; unknown names yield `None`.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        name.parse::<StatField>().ok().and_then(|f| self.get(f))
    }

    /// Returns `true` if `name` is a recognized field name.
    pub fn has_field(name: &str) -> bool {
        name.parse::<StatField>().is_ok()
    }

    /// The names of every field, in declaration order.
    pub fn field_names() -> impl Iterator<Item = &'static str> {
        StatField::ALL.into_iter().map(StatField::name)
    }

    fn uint(&self, field: StatField) -> Option<u64> {
        self.get(field).and_then(|v| v.as_u64())
    }

    fn time(&self, field: StatField) -> Option<Timestamp> {
        self.get(field).and_then(|v| v.as_time())
    }

    /// Device id.
    pub fn dev(&self) -> Option<u64> {
        self.uint(StatField::Dev)
    }

    /// Inode number.
    pub fn ino(&self) -> Option<u64> {
        self.uint(StatField::Ino)
    }

    /// Type and permission bits.
    pub fn mode(&self) -> Option<u32> {
        self.uint(StatField::Mode).and_then(|m| u32::try_from(m).ok())
    }

    /// Hard link count.
    pub fn nlink(&self) -> Option<u64> {
        self.uint(StatField::Nlink)
    }

    /// Owner user id.
    pub fn uid(&self) -> Option<u32> {
        self.uint(StatField::Uid).and_then(|v| u32::try_from(v).ok())
    }

    /// Owner group id.
    pub fn gid(&self) -> Option<u32> {
        self.uint(StatField::Gid).and_then(|v| u32::try_from(v).ok())
    }

    /// Device id for special files.
    pub fn rdev(&self) -> Option<u64> {
        self.uint(StatField::Rdev)
    }

    /// Size in bytes.
    pub fn size(&self) -> Option<u64> {
        self.uint(StatField::Size)
    }

    /// Allocated blocks.
    pub fn blocks(&self) -> Option<u64> {
        self.uint(StatField::Blocks)
    }

    /// Preferred I/O block size.
    pub fn blksize(&self) -> Option<u64> {
        self.uint(StatField::Blksize)
    }

    /// Last access time.
    pub fn atime(&self) -> Option<Timestamp> {
        self.time(StatField::Atime)
    }

    /// Last modification time.
    pub fn mtime(&self) -> Option<Timestamp> {
        self.time(StatField::Mtime)
    }

    /// Last status change time.
    pub fn ctime(&self) -> Option<Timestamp> {
        self.time(StatField::Ctime)
    }

    /// Creation time; the status change time where none is recorded.
    pub fn birthtime(&self) -> Option<Timestamp> {
        self.time(StatField::Birthtime)
    }

    /// Last access time in epoch milliseconds.
    pub fn atime_ms(&self) -> Option<i64> {
        self.get(StatField::AtimeMs).and_then(|v| v.as_i64())
    }

    /// Last modification time in epoch milliseconds.
    pub fn mtime_ms(&self) -> Option<i64> {
        self.get(StatField::MtimeMs).and_then(|v| v.as_i64())
    }

    /// Last status change time in epoch milliseconds.
    pub fn ctime_ms(&self) -> Option<i64> {
        self.get(StatField::CtimeMs).and_then(|v| v.as_i64())
    }

    /// Creation time in epoch milliseconds.
    pub fn birthtime_ms(&self) -> Option<i64> {
        self.get(StatField::BirthtimeMs).and_then(|v| v.as_i64())
    }

    /// Type from the mode bits.
    pub fn file_type(&self) -> Option<FileType> {
        self.mode().and_then(FileType::from_mode)
    }

    /// Permission bits from the mode.
    pub fn permissions(&self) -> Option<Permissions> {
        self.mode().map(Permissions::from_mode)
    }

    fn is(&self, bits: u32) -> bool {
        self.mode().is_some_and(|m| m & S_IFMT == bits)
    }

    /// Regular file.
    pub fn is_file(&self) -> bool {
        self.is(FileType::File.mode_bits())
    }

    /// Directory.
    pub fn is_directory(&self) -> bool {
        self.is(FileType::Directory.mode_bits())
    }

    /// Character device.
    pub fn is_character_device(&self) -> bool {
        self.is(FileType::CharDevice.mode_bits())
    }

    /// Block device.
    pub fn is_block_device(&self) -> bool {
        self.is(FileType::BlockDevice.mode_bits())
    }

    /// Named pipe.
    pub fn is_fifo(&self) -> bool {
        self.is(FileType::Fifo.mode_bits())
    }

    /// Symbolic link. Only `lstat` results can be links.
    pub fn is_symbolic_link(&self) -> bool {
        self.is(FileType::Symlink.mode_bits())
    }

    /// Socket.
    pub fn is_socket(&self) -> bool {
        self.is(FileType::Socket.mode_bits())
    }

    /// Decode every field into a plain value.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dev: self.dev(),
            ino: self.ino(),
            mode: self.mode(),
            nlink: self.nlink(),
            uid: self.uid(),
            gid: self.gid(),
            rdev: self.rdev(),
            size: self.size(),
            blocks: self.blocks(),
            blksize: self.blksize(),
            atime_ms: self.atime_ms(),
            mtime_ms: self.mtime_ms(),
            ctime_ms: self.ctime_ms(),
            birthtime_ms: self.birthtime_ms(),
        }
    }
}

impl fmt::Debug for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stats")
            .field("path", &self.path)
            .field("layout", &self.layout.id)
            .field("mode", &self.mode().map(|m| format!("{m:#o}")))
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

/// Every stat field decoded at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StatsSnapshot {
    /// Device id.
    pub dev: Option<u64>,
    /// Inode number.
    pub ino: Option<u64>,
    /// Type and permission bits.
    pub mode: Option<u32>,
    /// Hard link count.
    pub nlink: Option<u64>,
    /// Owner user id.
    pub uid: Option<u32>,
    /// Owner group id.
    pub gid: Option<u32>,
    /// Device id for special files.
    pub rdev: Option<u64>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Allocated blocks.
    pub blocks: Option<u64>,
    /// Preferred I/O block size.
    pub blksize: Option<u64>,
    /// Access time, epoch milliseconds.
    pub atime_ms: Option<i64>,
    /// Modification time, epoch milliseconds.
    pub mtime_ms: Option<i64>,
    /// Status change time, epoch milliseconds.
    pub ctime_ms: Option<i64>,
    /// Creation time, epoch milliseconds.
    pub birthtime_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{S_IFDIR, S_IFREG, S_IFSOCK};
    use crate::decode::{FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_REPARSE_POINT};
    use crate::layout::stat::STAT_LAYOUTS;
    use std::path::Path;

    fn layout(id: &str) -> &'static StatLayout {
        STAT_LAYOUTS.iter().find(|l| l.id == id).unwrap()
    }

    fn put(record: &mut [u8], offset: usize, bytes: &[u8]) {
        record[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn ts64(record: &mut [u8], offset: usize, sec: i64, nsec: i64) {
        put(record, offset, &sec.to_ne_bytes());
        put(record, offset + 8, &nsec.to_ne_bytes());
    }

    fn linux_x64_record(mode: u32) -> Vec<u8> {
        let mut r = vec![0u8; 144];
        put(&mut r, 0, &0x803u64.to_ne_bytes());
        put(&mut r, 8, &1234u64.to_ne_bytes());
        put(&mut r, 16, &1u64.to_ne_bytes());
        put(&mut r, 24, &mode.to_ne_bytes());
        put(&mut r, 28, &1000u32.to_ne_bytes());
        put(&mut r, 32, &100u32.to_ne_bytes());
        put(&mut r, 48, &4096i64.to_ne_bytes());
        put(&mut r, 56, &4096i64.to_ne_bytes());
        put(&mut r, 64, &8i64.to_ne_bytes());
        ts64(&mut r, 72, 1_700_000_000, 1_000_000);
        ts64(&mut r, 88, 1_700_000_001, 2_000_000);
        ts64(&mut r, 104, 1_700_000_002, 3_000_000);
        r
    }

    #[test]
    fn decodes_linux_x64_fields() {
        let stats = Stats::new("/f", layout("linux-x64"), linux_x64_record(S_IFREG | 0o640), None);
        assert_eq!(stats.dev(), Some(0x803));
        assert_eq!(stats.ino(), Some(1234));
        assert_eq!(stats.nlink(), Some(1));
        assert_eq!(stats.uid(), Some(1000));
        assert_eq!(stats.gid(), Some(100));
        assert_eq!(stats.size(), Some(4096));
        assert_eq!(stats.blocks(), Some(8));
        assert_eq!(stats.mtime_ms(), Some(1_700_000_001_002));
        assert_eq!(stats.permissions(), Some(Permissions::from_mode(0o640)));
        assert!(stats.is_file());
    }

    #[test]
    fn birthtime_falls_back_to_ctime() {
        let stats = Stats::new("/f", layout("linux-x64"), linux_x64_record(S_IFREG), None);
        assert_eq!(stats.birthtime(), stats.ctime());
        assert_eq!(stats.birthtime_ms(), Some(1_700_000_002_003));
        assert_eq!(stats.field("birthtimeMs"), Some(FieldValue::Int(1_700_000_002_003)));
    }

    #[test]
    fn unknown_names_are_absent_not_zero() {
        let stats = Stats::new("/f", layout("linux-x64"), linux_x64_record(S_IFREG), None);
        assert_eq!(stats.field("flags"), None);
        assert_eq!(stats.field("Ms"), None);
        assert!(!Stats::has_field("flags"));
        assert!(Stats::has_field("birthtimeMs"));
        assert_eq!(Stats::field_names().count(), 18);
    }

    #[test]
    fn predicates_are_mutually_exclusive() {
        for bits in [S_IFREG, S_IFDIR, S_IFSOCK, 0o020000, 0o060000, 0o010000, 0o120000] {
            let stats = Stats::new("/f", layout("linux-x64"), linux_x64_record(bits | 0o644), None);
            let hits = [
                stats.is_file(),
                stats.is_directory(),
                stats.is_character_device(),
                stats.is_block_device(),
                stats.is_fifo(),
                stats.is_symbolic_link(),
                stats.is_socket(),
            ];
            assert_eq!(hits.iter().filter(|h| **h).count(), 1, "mode {bits:#o}");
        }
    }

    #[test]
    fn truncated_records_yield_absent_fields() {
        let stats = Stats::new("/f", layout("linux-x64"), vec![0u8; 32], None);
        assert_eq!(stats.dev(), Some(0));
        assert_eq!(stats.size(), None);
        assert!(matches!(
            stats.try_get(StatField::Size),
            Err(FsError::TruncatedRecord { field: "size", .. })
        ));
        assert!(!stats.is_file());
    }

    fn windows_record(attributes: u32, size_high: u32, size_low: u32) -> Vec<u8> {
        let mut r = vec![0u8; 36];
        put(&mut r, 0, &attributes.to_ne_bytes());
        put(&mut r, 4, &116_444_736_000_000_000u64.to_ne_bytes());
        put(&mut r, 12, &116_444_736_020_000_000u64.to_ne_bytes());
        put(&mut r, 20, &116_444_736_010_000_000u64.to_ne_bytes());
        put(&mut r, 28, &size_high.to_ne_bytes());
        put(&mut r, 32, &size_low.to_ne_bytes());
        r
    }

    #[test]
    fn windows_records() {
        let stats = Stats::new(r"C:\dir", layout("windows"), windows_record(FILE_ATTRIBUTE_DIRECTORY, 0, 0), None);
        assert!(stats.is_directory());
        assert_eq!(stats.mode(), Some(S_IFDIR | 0o755));
        assert_eq!(stats.nlink(), Some(1));
        assert_eq!(stats.blksize(), Some(1));
        assert_eq!(stats.uid(), Some(0));
        assert_eq!(stats.birthtime_ms(), Some(0));
        assert_eq!(stats.atime_ms(), Some(2000));
        assert_eq!(stats.mtime_ms(), Some(1000));
        assert_eq!(stats.ctime_ms(), Some(1000));

        let stats = Stats::new(r"C:\big.bin", layout("windows"), windows_record(0x20, 2, 7), None);
        assert!(stats.is_file());
        assert_eq!(stats.size(), Some((2 << 32) + 7));
        assert_eq!(stats.blocks(), stats.size());
    }

    struct Unreachable;

    impl ReparseTagLookup for Unreachable {
        fn reparse_tag(&self, path: &Path) -> Result<u32, FsError> {
            Err(FsError::Os {
                operation: "FindFirstFileW",
                path: path.to_path_buf(),
                code: 2,
                message: "The system cannot find the file specified.".into(),
            })
        }
    }

    #[test]
    fn failed_secondary_lookup_is_absent_mode() {
        let stats = Stats::new(
            r"C:\gone",
            layout("windows"),
            windows_record(FILE_ATTRIBUTE_REPARSE_POINT, 0, 0),
            Some(Arc::new(Unreachable)),
        );
        assert_eq!(stats.mode(), None);
        assert!(!stats.is_symbolic_link());
        assert_eq!(stats.size(), Some(0));
        assert!(stats.try_get(StatField::Mode).unwrap_err().is_not_found());
    }

    #[test]
    fn snapshot_matches_accessors() {
        let stats = Stats::new("/f", layout("linux-x64"), linux_x64_record(S_IFREG | 0o600), None);
        let snap = stats.snapshot();
        assert_eq!(snap.mode, Some(S_IFREG | 0o600));
        assert_eq!(snap.size, Some(4096));
        assert_eq!(snap.birthtime_ms, snap.ctime_ms);
        assert_eq!(stats.record().len(), 144);
    }
}
