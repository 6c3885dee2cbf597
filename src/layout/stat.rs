//! File-status record layouts.
//!
//! Offsets are byte offsets into the structure the native `stat` family
//! (or `GetFileAttributesExW`) fills in. Integers are native-endian.

use super::Primitive::{S32, S64, U16, U32, U64};
use super::{FieldSpec, LayoutKey, StatField, StatLayout};
use crate::decode::{
    ONE, TIMESPEC32, TIMESPEC64, WINDOWS_ATTRIBUTES, WINDOWS_FILE_SIZE, WINDOWS_FILE_TIME, ZERO,
};
use crate::platform::{AbiVariant, Arch, OsFamily, PointerWidth};

const fn int(offset: usize, p: super::Primitive) -> FieldSpec {
    FieldSpec::int(offset, p)
}

const fn ts32(offset: usize) -> FieldSpec {
    FieldSpec::custom(offset, &TIMESPEC32)
}

const fn ts64(offset: usize) -> FieldSpec {
    FieldSpec::custom(offset, &TIMESPEC64)
}

const fn filetime(offset: usize) -> FieldSpec {
    FieldSpec::custom(offset, &WINDOWS_FILE_TIME)
}

/// `WIN32_FILE_ATTRIBUTE_DATA`.
static WINDOWS: [(StatField, FieldSpec); 14] = [
    (StatField::Dev, FieldSpec::custom(0, &ZERO)),
    (StatField::Mode, FieldSpec::custom(0, &WINDOWS_ATTRIBUTES)),
    (StatField::Nlink, FieldSpec::custom(0, &ONE)),
    (StatField::Ino, FieldSpec::custom(0, &ZERO)),
    (StatField::Uid, FieldSpec::custom(0, &ZERO)),
    (StatField::Gid, FieldSpec::custom(0, &ZERO)),
    (StatField::Rdev, FieldSpec::custom(0, &ZERO)),
    (StatField::Atime, filetime(12)),
    (StatField::Mtime, filetime(20)),
    (StatField::Ctime, filetime(20)),
    (StatField::Birthtime, filetime(4)),
    (StatField::Size, FieldSpec::custom(28, &WINDOWS_FILE_SIZE)),
    (StatField::Blocks, FieldSpec::custom(28, &WINDOWS_FILE_SIZE)),
    (StatField::Blksize, FieldSpec::custom(0, &ONE)),
];

static DARWIN_32: [(StatField, FieldSpec); 14] = [
    (StatField::Dev, int(0, S32)),
    (StatField::Mode, int(4, U16)),
    (StatField::Nlink, int(6, U16)),
    (StatField::Ino, int(8, U64)),
    (StatField::Uid, int(16, U32)),
    (StatField::Gid, int(20, U32)),
    (StatField::Rdev, int(24, S32)),
    (StatField::Atime, ts32(28)),
    (StatField::Mtime, ts32(36)),
    (StatField::Ctime, ts32(44)),
    (StatField::Birthtime, ts32(52)),
    (StatField::Size, int(60, S64)),
    (StatField::Blocks, int(68, S64)),
    (StatField::Blksize, int(76, S32)),
];

static DARWIN_64: [(StatField, FieldSpec); 14] = [
    (StatField::Dev, int(0, S32)),
    (StatField::Mode, int(4, U16)),
    (StatField::Nlink, int(6, U16)),
    (StatField::Ino, int(8, U64)),
    (StatField::Uid, int(16, U32)),
    (StatField::Gid, int(20, U32)),
    (StatField::Rdev, int(24, S32)),
    (StatField::Atime, ts64(32)),
    (StatField::Mtime, ts64(48)),
    (StatField::Ctime, ts64(64)),
    (StatField::Birthtime, ts64(80)),
    (StatField::Size, int(96, S64)),
    (StatField::Blocks, int(104, S64)),
    (StatField::Blksize, int(112, S32)),
];

/// Legacy 32-bit `struct stat`, shared by ia32 and arm.
static LINUX_32: [(StatField, FieldSpec); 13] = [
    (StatField::Dev, int(0, U64)),
    (StatField::Mode, int(16, U32)),
    (StatField::Nlink, int(20, U32)),
    (StatField::Ino, int(12, U32)),
    (StatField::Uid, int(24, U32)),
    (StatField::Gid, int(28, U32)),
    (StatField::Rdev, int(32, U64)),
    (StatField::Atime, ts32(56)),
    (StatField::Mtime, ts32(64)),
    (StatField::Ctime, ts32(72)),
    (StatField::Size, int(44, S32)),
    (StatField::Blocks, int(52, S32)),
    (StatField::Blksize, int(48, S32)),
];

static LINUX_IA32_STAT64: [(StatField, FieldSpec); 13] = [
    (StatField::Dev, int(0, U64)),
    (StatField::Mode, int(16, U32)),
    (StatField::Nlink, int(20, U32)),
    (StatField::Ino, int(88, U64)),
    (StatField::Uid, int(24, U32)),
    (StatField::Gid, int(28, U32)),
    (StatField::Rdev, int(32, U64)),
    (StatField::Atime, ts32(64)),
    (StatField::Mtime, ts32(72)),
    (StatField::Ctime, ts32(80)),
    (StatField::Size, int(44, S64)),
    (StatField::Blocks, int(56, S64)),
    (StatField::Blksize, int(52, S32)),
];

static LINUX_ARM_STAT64: [(StatField, FieldSpec); 13] = [
    (StatField::Dev, int(0, U64)),
    (StatField::Mode, int(16, U32)),
    (StatField::Nlink, int(20, U32)),
    (StatField::Ino, int(96, U64)),
    (StatField::Uid, int(24, U32)),
    (StatField::Gid, int(28, U32)),
    (StatField::Rdev, int(32, U64)),
    (StatField::Atime, ts32(72)),
    (StatField::Mtime, ts32(80)),
    (StatField::Ctime, ts32(88)),
    (StatField::Size, int(48, S64)),
    (StatField::Blocks, int(64, S64)),
    (StatField::Blksize, int(56, S32)),
];

static LINUX_X64: [(StatField, FieldSpec); 13] = [
    (StatField::Dev, int(0, U64)),
    (StatField::Mode, int(24, U32)),
    (StatField::Nlink, int(16, U64)),
    (StatField::Ino, int(8, U64)),
    (StatField::Uid, int(28, U32)),
    (StatField::Gid, int(32, U32)),
    (StatField::Rdev, int(40, U64)),
    (StatField::Atime, ts64(72)),
    (StatField::Mtime, ts64(88)),
    (StatField::Ctime, ts64(104)),
    (StatField::Size, int(48, S64)),
    (StatField::Blocks, int(64, S64)),
    (StatField::Blksize, int(56, S64)),
];

static LINUX_ARM64: [(StatField, FieldSpec); 13] = [
    (StatField::Dev, int(0, U64)),
    (StatField::Mode, int(16, U32)),
    (StatField::Nlink, int(20, U32)),
    (StatField::Ino, int(8, U64)),
    (StatField::Uid, int(24, U32)),
    (StatField::Gid, int(28, U32)),
    (StatField::Rdev, int(32, U64)),
    (StatField::Atime, ts64(72)),
    (StatField::Mtime, ts64(88)),
    (StatField::Ctime, ts64(104)),
    (StatField::Size, int(48, S64)),
    (StatField::Blocks, int(64, S64)),
    (StatField::Blksize, int(56, S32)),
];

/// Every known stat layout, most specific key first.
pub static STAT_LAYOUTS: &[StatLayout] = &[
    StatLayout {
        id: "windows",
        key: LayoutKey::os(OsFamily::Windows),
        record_size: 36,
        fields: &WINDOWS,
    },
    StatLayout {
        id: "darwin-32",
        key: LayoutKey::os(OsFamily::Darwin).width(PointerWidth::Bits32),
        record_size: 108,
        fields: &DARWIN_32,
    },
    StatLayout {
        id: "darwin-64",
        key: LayoutKey::os(OsFamily::Darwin).width(PointerWidth::Bits64),
        record_size: 144,
        fields: &DARWIN_64,
    },
    StatLayout {
        id: "linux-ia32-stat64",
        key: LayoutKey::os(OsFamily::Linux)
            .arch(Arch::Ia32)
            .abi(AbiVariant::Stat64),
        record_size: 96,
        fields: &LINUX_IA32_STAT64,
    },
    StatLayout {
        id: "linux-ia32",
        key: LayoutKey::os(OsFamily::Linux)
            .arch(Arch::Ia32)
            .abi(AbiVariant::Default),
        record_size: 88,
        fields: &LINUX_32,
    },
    StatLayout {
        id: "linux-arm-stat64",
        key: LayoutKey::os(OsFamily::Linux)
            .arch(Arch::Arm)
            .abi(AbiVariant::Stat64),
        record_size: 104,
        fields: &LINUX_ARM_STAT64,
    },
    StatLayout {
        id: "linux-arm",
        key: LayoutKey::os(OsFamily::Linux)
            .arch(Arch::Arm)
            .abi(AbiVariant::Default),
        record_size: 88,
        fields: &LINUX_32,
    },
    StatLayout {
        id: "linux-x64",
        key: LayoutKey::os(OsFamily::Linux).arch(Arch::X64),
        record_size: 144,
        fields: &LINUX_X64,
    },
    StatLayout {
        id: "linux-arm64",
        key: LayoutKey::os(OsFamily::Linux).arch(Arch::Arm64),
        record_size: 128,
        fields: &LINUX_ARM64,
    },
];

/// Largest record any layout describes; native buffers are sized above it.
pub const MAX_RECORD_SIZE: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_buffer_covers_every_layout() {
        for layout in STAT_LAYOUTS {
            assert!(layout.record_size <= MAX_RECORD_SIZE, "{}", layout.id);
        }
    }

    #[test]
    fn only_windows_and_darwin_record_birthtime() {
        for layout in STAT_LAYOUTS {
            let has = layout.field(StatField::Birthtime).is_some();
            assert_eq!(has, !layout.id.starts_with("linux"), "{}", layout.id);
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))]
    #[test]
    fn linux_x64_offsets_match_libc() {
        use std::mem::offset_of;

        let layout = STAT_LAYOUTS.iter().find(|l| l.id == "linux-x64").unwrap();
        assert_eq!(layout.record_size, size_of::<libc::stat64>());
        let offset = |f| layout.field(f).unwrap().offset;
        assert_eq!(offset(StatField::Ino), offset_of!(libc::stat64, st_ino));
        assert_eq!(offset(StatField::Nlink), offset_of!(libc::stat64, st_nlink));
        assert_eq!(offset(StatField::Mode), offset_of!(libc::stat64, st_mode));
        assert_eq!(offset(StatField::Size), offset_of!(libc::stat64, st_size));
        assert_eq!(offset(StatField::Blksize), offset_of!(libc::stat64, st_blksize));
        assert_eq!(offset(StatField::Mtime), offset_of!(libc::stat64, st_mtime));
    }
}
