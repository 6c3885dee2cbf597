//! # Layout Registry
//!
//! Static, data-only descriptions of the kernel records this crate decodes:
//! the file-status record (`struct stat`, `WIN32_FILE_ATTRIBUTE_DATA`) and
//! the directory-entry record (`struct dirent`, `WIN32_FIND_DATAW`).
//!
//! Each layout maps logical field names to a byte offset and a decode rule
//! and is keyed by the parts of the [`PlatformKey`] it depends on. Adding a
//! platform means adding a table entry in [`stat`] or [`dirent`]; the
//! selection code below never changes.
//!
//! | Stat layout | Record size | Notes |
//! |-------------|-------------|-------|
//! | `windows` | 36 | attributes + file times + split size |
//! | `darwin-32` / `darwin-64` | 108 / 144 | `stat64` shape, has birthtime |
//! | `linux-ia32` / `linux-arm` | 88 | legacy 32-bit `stat` |
//! | `linux-ia32-stat64` / `linux-arm-stat64` | 96 / 104 | large-file `stat64` |
//! | `linux-x64` / `linux-arm64` | 144 / 128 | 64-bit timespecs |

pub mod dirent;
pub mod stat;

use std::fmt;
use std::str::FromStr;

use crate::FsError;
use crate::decode::CustomDecoder;
use crate::platform::{AbiVariant, Arch, OsFamily, PlatformKey, PointerWidth};

/// Fixed-width integer encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 32-bit.
    S32,
    /// Unsigned 32-bit.
    U32,
    /// Signed 64-bit.
    S64,
    /// Unsigned 64-bit.
    U64,
}

impl Primitive {
    /// Size in bytes.
    pub const fn width(self) -> usize {
        match self {
            Primitive::U8 => 1,
            Primitive::U16 => 2,
            Primitive::S32 | Primitive::U32 => 4,
            Primitive::S64 | Primitive::U64 => 8,
        }
    }
}

/// NUL-terminated string encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRule {
    /// Narrow (byte) string, decoded as UTF-8.
    Utf8,
    /// Wide string in native-endian UTF-16.
    Utf16,
}

/// How to turn the bytes at a field's offset into a value.
#[derive(Debug, Clone, Copy)]
pub enum DecodeRule {
    /// Read a fixed-width integer.
    Int(Primitive),
    /// Read a NUL-terminated string.
    Text(TextRule),
    /// Run a named decoder.
    Custom(&'static CustomDecoder),
}

impl DecodeRule {
    /// Bytes the rule needs past the field offset.
    pub const fn width(&self) -> usize {
        match self {
            DecodeRule::Int(p) => p.width(),
            DecodeRule::Text(_) => 0,
            DecodeRule::Custom(c) => c.width,
        }
    }
}

/// Byte offset plus decode rule for one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Offset from the start of the record.
    pub offset: usize,
    /// Decode rule.
    pub rule: DecodeRule,
}

impl FieldSpec {
    /// Integer field.
    pub const fn int(offset: usize, p: Primitive) -> Self {
        Self {
            offset,
            rule: DecodeRule::Int(p),
        }
    }

    /// String field.
    pub const fn text(offset: usize, t: TextRule) -> Self {
        Self {
            offset,
            rule: DecodeRule::Text(t),
        }
    }

    /// Custom-decoded field.
    pub const fn custom(offset: usize, decoder: &'static CustomDecoder) -> Self {
        Self {
            offset,
            rule: DecodeRule::Custom(decoder),
        }
    }
}

/// The parts of a [`PlatformKey`] a layout depends on; `None` matches any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutKey {
    /// Required OS family.
    pub os: OsFamily,
    /// Required architecture.
    pub arch: Option<Arch>,
    /// Required pointer width.
    pub pointer_width: Option<PointerWidth>,
    /// Required ABI variant.
    pub abi: Option<AbiVariant>,
}

impl LayoutKey {
    pub(crate) const fn os(os: OsFamily) -> Self {
        Self {
            os,
            arch: None,
            pointer_width: None,
            abi: None,
        }
    }

    pub(crate) const fn arch(self, arch: Arch) -> Self {
        Self {
            arch: Some(arch),
            ..self
        }
    }

    pub(crate) const fn width(self, width: PointerWidth) -> Self {
        Self {
            pointer_width: Some(width),
            ..self
        }
    }

    pub(crate) const fn abi(self, abi: AbiVariant) -> Self {
        Self {
            abi: Some(abi),
            ..self
        }
    }

    /// Returns `true` if `key` satisfies every constrained part.
    pub fn matches(&self, key: &PlatformKey) -> bool {
        self.os == key.os
            && self.arch.is_none_or(|a| a == key.arch)
            && self.pointer_width.is_none_or(|w| w == key.pointer_width)
            && self.abi.is_none_or(|a| a == key.abi)
    }
}

/// Logical file-status field names.
///
/// The base fields are looked up in the layout; the `*Ms` fields and
/// `Birthtime` are derived when the layout has no entry for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatField {
    /// Device id.
    Dev,
    /// Type and permission bits.
    Mode,
    /// Hard link count.
    Nlink,
    /// Owner user id.
    Uid,
    /// Owner group id.
    Gid,
    /// Device id for special files.
    Rdev,
    /// Preferred I/O block size.
    Blksize,
    /// Inode number.
    Ino,
    /// Size in bytes.
    Size,
    /// Allocated blocks.
    Blocks,
    /// Access time.
    Atime,
    /// Modification time.
    Mtime,
    /// Status change time.
    Ctime,
    /// Creation time.
    Birthtime,
    /// Access time in epoch milliseconds.
    AtimeMs,
    /// Modification time in epoch milliseconds.
    MtimeMs,
    /// Status change time in epoch milliseconds.
    CtimeMs,
    /// Creation time in epoch milliseconds.
    BirthtimeMs,
}

/// How a field without a layout entry is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Same value as another field.
    Alias(StatField),
    /// Another field's timestamp as epoch milliseconds.
    Millis(StatField),
}

impl StatField {
    /// Every field name, in declaration order.
    pub const ALL: [StatField; 18] = [
        StatField::Dev,
        StatField::Mode,
        StatField::Nlink,
        StatField::Uid,
        StatField::Gid,
        StatField::Rdev,
        StatField::Blksize,
        StatField::Ino,
        StatField::Size,
        StatField::Blocks,
        StatField::Atime,
        StatField::Mtime,
        StatField::Ctime,
        StatField::Birthtime,
        StatField::AtimeMs,
        StatField::MtimeMs,
        StatField::CtimeMs,
        StatField::BirthtimeMs,
    ];

    /// Fields every stat layout must decode directly.
    pub const CANONICAL: [StatField; 13] = [
        StatField::Dev,
        StatField::Mode,
        StatField::Nlink,
        StatField::Uid,
        StatField::Gid,
        StatField::Rdev,
        StatField::Size,
        StatField::Blocks,
        StatField::Blksize,
        StatField::Ino,
        StatField::Atime,
        StatField::Mtime,
        StatField::Ctime,
    ];

    /// The conventional name (`"mtimeMs"`, `"blksize"`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            StatField::Dev => "dev",
            StatField::Mode => "mode",
            StatField::Nlink => "nlink",
            StatField::Uid => "uid",
            StatField::Gid => "gid",
            StatField::Rdev => "rdev",
            StatField::Blksize => "blksize",
            StatField::Ino => "ino",
            StatField::Size => "size",
            StatField::Blocks => "blocks",
            StatField::Atime => "atime",
            StatField::Mtime => "mtime",
            StatField::Ctime => "ctime",
            StatField::Birthtime => "birthtime",
            StatField::AtimeMs => "atimeMs",
            StatField::MtimeMs => "mtimeMs",
            StatField::CtimeMs => "ctimeMs",
            StatField::BirthtimeMs => "birthtimeMs",
        }
    }

    /// How to derive this field when a layout lacks it.
    pub const fn derivation(self) -> Option<Derivation> {
        match self {
            StatField::Birthtime => Some(Derivation::Alias(StatField::Ctime)),
            StatField::AtimeMs => Some(Derivation::Millis(StatField::Atime)),
            StatField::MtimeMs => Some(Derivation::Millis(StatField::Mtime)),
            StatField::CtimeMs => Some(Derivation::Millis(StatField::Ctime)),
            StatField::BirthtimeMs => Some(Derivation::Millis(StatField::Birthtime)),
            _ => None,
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StatField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatField::ALL.into_iter().find(|f| f.name() == s).ok_or(())
    }
}

/// Logical directory-entry field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirentField {
    /// Entry name.
    Name,
    /// File-type tag.
    Type,
    /// Access time.
    Atime,
    /// Modification time.
    Mtime,
    /// Change / creation time.
    Ctime,
    /// Size in bytes.
    Size,
}

impl DirentField {
    /// Field name as used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            DirentField::Name => "d_name",
            DirentField::Type => "d_type",
            DirentField::Atime => "atime",
            DirentField::Mtime => "mtime",
            DirentField::Ctime => "ctime",
            DirentField::Size => "size",
        }
    }
}

/// What the dirent `Type` field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// A `DT_*` value.
    DirentType,
    /// A synthesized `st_mode`.
    Mode,
}

/// Layout of the file-status record for one platform.
#[derive(Debug)]
pub struct StatLayout {
    /// Identifier, e.g. `"linux-x64"`.
    pub id: &'static str,
    /// Platforms this layout applies to.
    pub key: LayoutKey,
    /// Size of the native structure in bytes.
    pub record_size: usize,
    /// Field table.
    pub fields: &'static [(StatField, FieldSpec)],
}

impl StatLayout {
    /// How `field` is decoded, if the layout carries it directly.
    pub fn field(&self, field: StatField) -> Option<&FieldSpec> {
        self.fields.iter().find(|(f, _)| *f == field).map(|(_, spec)| spec)
    }
}

/// Layout of the directory-entry record for one platform.
#[derive(Debug)]
pub struct DirentLayout {
    /// Identifier, e.g. `"linux-64"`.
    pub id: &'static str,
    /// Platforms this layout applies to.
    pub key: LayoutKey,
    /// Record size when fixed (Windows find data); POSIX records end at the
    /// name's terminator.
    pub record_size: Option<usize>,
    /// Interpretation of the type field.
    pub type_tag: TypeTag,
    /// Field table.
    pub fields: &'static [(DirentField, FieldSpec)],
}

impl DirentLayout {
    /// How `field` is decoded, if present.
    pub fn field(&self, field: DirentField) -> Option<&FieldSpec> {
        self.fields.iter().find(|(f, _)| *f == field).map(|(_, spec)| spec)
    }

    /// Optional fields beyond name and type that this layout provides.
    pub fn extra_fields(&self) -> impl Iterator<Item = DirentField> + '_ {
        self.fields
            .iter()
            .map(|(f, _)| *f)
            .filter(|f| !matches!(f, DirentField::Name | DirentField::Type))
    }
}

/// Select the stat layout for `key`.
///
/// # Errors
///
/// - [`FsError::UnsupportedPlatform`] if no layout matches
pub fn stat_layout_for(key: &PlatformKey) -> Result<&'static StatLayout, FsError> {
    stat::STAT_LAYOUTS
        .iter()
        .find(|layout| layout.key.matches(key))
        .ok_or_else(|| unsupported(key))
}

/// Select the dirent layout for `key`.
///
/// # Errors
///
/// - [`FsError::UnsupportedPlatform`] if no layout matches
pub fn dirent_layout_for(key: &PlatformKey) -> Result<&'static DirentLayout, FsError> {
    dirent::DIRENT_LAYOUTS
        .iter()
        .find(|layout| layout.key.matches(key))
        .ok_or_else(|| unsupported(key))
}

fn unsupported(key: &PlatformKey) -> FsError {
    FsError::UnsupportedPlatform {
        platform: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(os: OsFamily, arch: Arch, width: PointerWidth, wide: bool) -> PlatformKey {
        PlatformKey::new(os, arch, width, wide)
    }

    #[test]
    fn selection_by_platform() {
        use Arch::*;
        use OsFamily::*;
        use PointerWidth::*;

        let cases = [
            (key(Windows, X64, Bits64, false), "windows"),
            (key(Windows, Ia32, Bits32, false), "windows"),
            (key(Darwin, X64, Bits64, true), "darwin-64"),
            (key(Darwin, Arm64, Bits64, false), "darwin-64"),
            (key(Darwin, Ia32, Bits32, false), "darwin-32"),
            (key(Linux, Ia32, Bits32, false), "linux-ia32"),
            (key(Linux, Ia32, Bits32, true), "linux-ia32-stat64"),
            (key(Linux, Arm, Bits32, false), "linux-arm"),
            (key(Linux, Arm, Bits32, true), "linux-arm-stat64"),
            (key(Linux, X64, Bits64, true), "linux-x64"),
            (key(Linux, X64, Bits64, false), "linux-x64"),
            (key(Linux, Arm64, Bits64, false), "linux-arm64"),
        ];
        for (key, expected) in cases {
            assert_eq!(stat_layout_for(&key).unwrap().id, expected, "{key}");
        }
    }

    #[test]
    fn unknown_combinations_are_unsupported() {
        let key = key(OsFamily::Linux, Arch::Mips, PointerWidth::Bits32, false);
        let err = stat_layout_for(&key).unwrap_err();
        assert_eq!(
            err,
            FsError::UnsupportedPlatform {
                platform: "linux-mips".into()
            }
        );
    }

    #[test]
    fn dirent_selection_by_width() {
        let k = key(OsFamily::Linux, Arch::Arm, PointerWidth::Bits32, true);
        assert_eq!(dirent_layout_for(&k).unwrap().id, "linux-32");
        let k = key(OsFamily::Linux, Arch::Other, PointerWidth::Bits64, false);
        assert_eq!(dirent_layout_for(&k).unwrap().id, "linux-64");
        let k = key(OsFamily::Windows, Arch::X64, PointerWidth::Bits64, false);
        assert_eq!(dirent_layout_for(&k).unwrap().id, "windows");
    }

    #[test]
    fn every_stat_layout_has_the_canonical_fields() {
        for layout in stat::STAT_LAYOUTS {
            for field in StatField::CANONICAL {
                assert!(layout.field(field).is_some(), "{} lacks {field}", layout.id);
            }
        }
    }

    #[test]
    fn stat_fields_fit_their_records() {
        for layout in stat::STAT_LAYOUTS {
            for (field, spec) in layout.fields {
                assert!(
                    spec.offset + spec.rule.width() <= layout.record_size,
                    "{}: {field} overruns the record",
                    layout.id
                );
            }
        }
    }

    #[test]
    fn every_dirent_layout_has_name_and_type() {
        for layout in dirent::DIRENT_LAYOUTS {
            assert!(layout.field(DirentField::Name).is_some());
            assert!(layout.field(DirentField::Type).is_some());
        }
    }

    #[test]
    fn field_names_round_trip() {
        for field in StatField::ALL {
            assert_eq!(field.name().parse::<StatField>(), Ok(field));
        }
        assert!("bogus".parse::<StatField>().is_err());
    }

    #[test]
    fn only_windows_dirents_carry_extras() {
        for layout in dirent::DIRENT_LAYOUTS {
            let extras: Vec<_> = layout.extra_fields().collect();
            if layout.id == "windows" {
                assert_eq!(extras.len(), 4);
            } else {
                assert!(extras.is_empty(), "{}", layout.id);
            }
        }
    }
}
