//! # Numeric Constants
//!
//! File-type bits, permission bits and `DT_*` directory-entry tags are the
//! same on every supported OS and form the universal set. Open flags differ
//! per OS and are merged in for the detected family, once, on first access.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::platform::OsFamily;

/// Mask selecting the file-type bits of a mode.
pub const S_IFMT: u32 = 0xf000;
/// Regular file.
pub const S_IFREG: u32 = 0x8000;
/// Directory.
pub const S_IFDIR: u32 = 0x4000;
/// Character device.
pub const S_IFCHR: u32 = 0x2000;
/// Block device.
pub const S_IFBLK: u32 = 0x6000;
/// FIFO.
pub const S_IFIFO: u32 = 0x1000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0xa000;
/// Socket.
pub const S_IFSOCK: u32 = 0xc000;

/// Unknown directory-entry type.
pub const DT_UNKNOWN: u32 = 0;
/// FIFO directory entry.
pub const DT_FIFO: u32 = 1;
/// Character device directory entry.
pub const DT_CHR: u32 = 2;
/// Directory directory entry.
pub const DT_DIR: u32 = 4;
/// Block device directory entry.
pub const DT_BLK: u32 = 6;
/// Regular file directory entry.
pub const DT_REG: u32 = 8;
/// Symbolic link directory entry.
pub const DT_LNK: u32 = 10;
/// Socket directory entry.
pub const DT_SOCK: u32 = 12;
/// Whiteout directory entry.
pub const DT_WHT: u32 = 14;

const UNIVERSAL: &[(&str, u32)] = &[
    ("S_IFMT", S_IFMT),
    ("S_IFREG", S_IFREG),
    ("S_IFDIR", S_IFDIR),
    ("S_IFCHR", S_IFCHR),
    ("S_IFBLK", S_IFBLK),
    ("S_IFIFO", S_IFIFO),
    ("S_IFLNK", S_IFLNK),
    ("S_IFSOCK", S_IFSOCK),
    ("S_IRWXU", 0o700),
    ("S_IRUSR", 0o400),
    ("S_IWUSR", 0o200),
    ("S_IXUSR", 0o100),
    ("S_IRWXG", 0o070),
    ("S_IRGRP", 0o040),
    ("S_IWGRP", 0o020),
    ("S_IXGRP", 0o010),
    ("S_IRWXO", 0o007),
    ("S_IROTH", 0o004),
    ("S_IWOTH", 0o002),
    ("S_IXOTH", 0o001),
    ("DT_UNKNOWN", DT_UNKNOWN),
    ("DT_FIFO", DT_FIFO),
    ("DT_CHR", DT_CHR),
    ("DT_DIR", DT_DIR),
    ("DT_BLK", DT_BLK),
    ("DT_REG", DT_REG),
    ("DT_LNK", DT_LNK),
    ("DT_SOCK", DT_SOCK),
    ("DT_WHT", DT_WHT),
];

const DARWIN: &[(&str, u32)] = &[
    ("O_RDONLY", 0x0),
    ("O_WRONLY", 0x1),
    ("O_RDWR", 0x2),
    ("O_CREAT", 0x200),
    ("O_EXCL", 0x800),
    ("O_NOCTTY", 0x20000),
    ("O_TRUNC", 0x400),
    ("O_APPEND", 0x8),
    ("O_DIRECTORY", 0x100000),
    ("O_NOFOLLOW", 0x100),
    ("O_SYNC", 0x80),
    ("O_DSYNC", 0x400000),
    ("O_SYMLINK", 0x200000),
    ("O_NONBLOCK", 0x4),
];

const LINUX: &[(&str, u32)] = &[
    ("O_RDONLY", 0x0),
    ("O_WRONLY", 0x1),
    ("O_RDWR", 0x2),
    ("O_CREAT", 0x40),
    ("O_EXCL", 0x80),
    ("O_NOCTTY", 0x100),
    ("O_TRUNC", 0x200),
    ("O_APPEND", 0x400),
    ("O_DIRECTORY", 0x10000),
    ("O_NOATIME", 0x40000),
    ("O_NOFOLLOW", 0x20000),
    ("O_SYNC", 0x101000),
    ("O_DSYNC", 0x1000),
    ("O_DIRECT", 0x4000),
    ("O_NONBLOCK", 0x800),
];

/// OS-specific entries merged over the universal set.
fn platform_entries(os: Option<OsFamily>) -> &'static [(&'static str, u32)] {
    match os {
        Some(OsFamily::Darwin) => DARWIN,
        Some(OsFamily::Linux) => LINUX,
        Some(OsFamily::Windows) | None => &[],
    }
}

/// Symbolic name to value mapping for the running platform.
///
/// # Example
///
/// ```rust
/// let constants = rawfs::constants();
/// assert_eq!(constants.get("S_IFDIR"), Some(0x4000));
/// assert_eq!(constants.get("NO_SUCH_CONSTANT"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constants(BTreeMap<&'static str, u32>);

impl Constants {
    /// Merge the universal set with the entries for `os`.
    pub fn for_os(os: Option<OsFamily>) -> Self {
        let mut map: BTreeMap<_, _> = UNIVERSAL.iter().copied().collect();
        map.extend(platform_entries(os).iter().copied());
        Self(map)
    }

    /// Look up a constant by name.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied()
    }

    /// Iterate over all `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        self.0.iter().map(|(name, value)| (*name, *value))
    }

    /// Number of constants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; the universal set is never empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Constants for the running platform, merged once on first access.
pub fn constants() -> &'static Constants {
    static CONSTANTS: OnceLock<Constants> = OnceLock::new();
    CONSTANTS.get_or_init(|| Constants::for_os(OsFamily::from_target_os(std::env::consts::OS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_set_is_always_present() {
        for os in [None, Some(OsFamily::Windows), Some(OsFamily::Linux), Some(OsFamily::Darwin)] {
            let c = Constants::for_os(os);
            assert_eq!(c.get("S_IFMT"), Some(0xf000));
            assert_eq!(c.get("S_IRWXU"), Some(448));
            assert_eq!(c.get("DT_WHT"), Some(14));
        }
    }

    #[test]
    fn open_flags_differ_per_os() {
        let linux = Constants::for_os(Some(OsFamily::Linux));
        let darwin = Constants::for_os(Some(OsFamily::Darwin));
        let windows = Constants::for_os(Some(OsFamily::Windows));

        assert_eq!(linux.get("O_CREAT"), Some(0x40));
        assert_eq!(darwin.get("O_CREAT"), Some(0x200));
        assert_eq!(windows.get("O_CREAT"), None);

        assert_eq!(linux.get("O_NOATIME"), Some(0x40000));
        assert_eq!(darwin.get("O_NOATIME"), None);
        assert_eq!(darwin.get("O_SYMLINK"), Some(0x200000));
    }

    #[test]
    fn file_type_bits_fit_the_mask() {
        for bits in [S_IFREG, S_IFDIR, S_IFCHR, S_IFBLK, S_IFIFO, S_IFLNK, S_IFSOCK] {
            assert_eq!(bits & S_IFMT, bits);
        }
    }

    #[test]
    fn process_constants_are_memoized() {
        assert!(std::ptr::eq(constants(), constants()));
        assert!(!constants().is_empty());
    }
}
