//! Directory-entry record layouts.

use super::Primitive::U8;
use super::TextRule::{Utf8, Utf16};
use super::{DirentField, DirentLayout, FieldSpec, LayoutKey, TypeTag};
use crate::decode::{WINDOWS_ATTRIBUTES, WINDOWS_FILE_SIZE, WINDOWS_FILE_TIME};
use crate::platform::{OsFamily, PointerWidth};

/// Size of `WIN32_FIND_DATAW`.
pub const WINDOWS_FIND_DATA_SIZE: usize = 592;

/// Offset of `dwReserved0` (the reparse tag) in `WIN32_FIND_DATAW`.
pub const WINDOWS_RESERVED0_OFFSET: usize = 36;

/// `WIN32_FIND_DATAW`. Its leading 36 bytes match `WIN32_FILE_ATTRIBUTE_DATA`.
static WINDOWS: [(DirentField, FieldSpec); 6] = [
    (DirentField::Name, FieldSpec::text(44, Utf16)),
    (DirentField::Type, FieldSpec::custom(0, &WINDOWS_ATTRIBUTES)),
    (DirentField::Atime, FieldSpec::custom(12, &WINDOWS_FILE_TIME)),
    (DirentField::Mtime, FieldSpec::custom(20, &WINDOWS_FILE_TIME)),
    (DirentField::Ctime, FieldSpec::custom(4, &WINDOWS_FILE_TIME)),
    (DirentField::Size, FieldSpec::custom(28, &WINDOWS_FILE_SIZE)),
];

static LINUX_32: [(DirentField, FieldSpec); 2] = [
    (DirentField::Name, FieldSpec::text(11, Utf8)),
    (DirentField::Type, FieldSpec::int(10, U8)),
];

static LINUX_64: [(DirentField, FieldSpec); 2] = [
    (DirentField::Name, FieldSpec::text(19, Utf8)),
    (DirentField::Type, FieldSpec::int(18, U8)),
];

/// Darwin's `dirent` has the same prefix at both widths once `$INODE64`
/// entry points are used.
static DARWIN: [(DirentField, FieldSpec); 2] = [
    (DirentField::Name, FieldSpec::text(21, Utf8)),
    (DirentField::Type, FieldSpec::int(20, U8)),
];

/// Every known dirent layout.
pub static DIRENT_LAYOUTS: &[DirentLayout] = &[
    DirentLayout {
        id: "windows",
        key: LayoutKey::os(OsFamily::Windows),
        record_size: Some(WINDOWS_FIND_DATA_SIZE),
        type_tag: TypeTag::Mode,
        fields: &WINDOWS,
    },
    DirentLayout {
        id: "linux-32",
        key: LayoutKey::os(OsFamily::Linux).width(PointerWidth::Bits32),
        record_size: None,
        type_tag: TypeTag::DirentType,
        fields: &LINUX_32,
    },
    DirentLayout {
        id: "linux-64",
        key: LayoutKey::os(OsFamily::Linux).width(PointerWidth::Bits64),
        record_size: None,
        type_tag: TypeTag::DirentType,
        fields: &LINUX_64,
    },
    DirentLayout {
        id: "darwin-32",
        key: LayoutKey::os(OsFamily::Darwin).width(PointerWidth::Bits32),
        record_size: None,
        type_tag: TypeTag::DirentType,
        fields: &DARWIN,
    },
    DirentLayout {
        id: "darwin-64",
        key: LayoutKey::os(OsFamily::Darwin).width(PointerWidth::Bits64),
        record_size: None,
        type_tag: TypeTag::DirentType,
        fields: &DARWIN,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(target_os = "linux", target_env = "gnu", target_pointer_width = "64"))]
    #[test]
    fn linux_64_offsets_match_libc() {
        use std::mem::offset_of;

        let layout = DIRENT_LAYOUTS.iter().find(|l| l.id == "linux-64").unwrap();
        let offset = |f| layout.field(f).unwrap().offset;
        assert_eq!(offset(DirentField::Name), offset_of!(libc::dirent64, d_name));
        assert_eq!(offset(DirentField::Type), offset_of!(libc::dirent64, d_type));
    }

    #[test]
    fn windows_fields_fit_find_data() {
        let layout = &DIRENT_LAYOUTS[0];
        for (field, spec) in layout.fields {
            assert!(
                spec.offset + spec.rule.width() <= WINDOWS_FIND_DATA_SIZE,
                "{}",
                field.name()
            );
        }
        assert!(layout.field(DirentField::Name).unwrap().offset > WINDOWS_RESERVED0_OFFSET);
    }
}
