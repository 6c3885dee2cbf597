//! # Field Decoder
//!
//! Reads a single field out of a raw record according to its [`FieldSpec`].
//!
//! Integer and string rules are generic. Everything platform-specific is a
//! named [`CustomDecoder`]: POSIX `timespec` pairs, Windows `FILETIME`
//! values, Windows split file sizes, and the Windows attribute word, which
//! is turned into a synthesized `st_mode`.
//!
//! Decoding never touches memory outside the record slice it is given; a
//! field that would run past the end yields [`FsError::TruncatedRecord`].

use std::fmt;
use std::path::Path;

use crate::FsError;
use crate::constants::{S_IFDIR, S_IFLNK, S_IFREG};
use crate::layout::{DecodeRule, FieldSpec, Primitive, TextRule};
use crate::types::{Permissions, Timestamp};

/// `FILE_ATTRIBUTE_DIRECTORY`.
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;
/// `FILE_ATTRIBUTE_REPARSE_POINT`.
pub const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
/// `IO_REPARSE_TAG_MOUNT_POINT` (junctions).
pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xa000_0003;
/// `IO_REPARSE_TAG_SYMLINK`.
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xa000_000c;

/// 100ns intervals per millisecond.
const FILETIME_TICKS_PER_MS: u64 = 10_000;
/// Milliseconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET_MS: i64 = 11_644_473_600_000;

/// A decoded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Point in time.
    Time(Timestamp),
    /// String.
    Text(String),
}

impl FieldValue {
    /// Integer value as `u64`, if non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::Uint(v) => Some(v),
            FieldValue::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Integer value as `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::Int(v) => Some(v),
            FieldValue::Uint(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Timestamp value.
    pub fn as_time(&self) -> Option<Timestamp> {
        match *self {
            FieldValue::Time(t) => Some(t),
            _ => None,
        }
    }

    /// String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Uint(v) => write!(f, "{v}"),
            FieldValue::Time(t) => write!(f, "{}ms", t.millis()),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Secondary lookup of a path's reparse tag.
///
/// On Windows a reparse-point attribute alone does not say whether an entry
/// is a link; the tag from the directory enumeration record does.
pub trait ReparseTagLookup: Send + Sync {
    /// Reparse tag (`dwReserved0` of the find record) for `path`.
    ///
    /// # Errors
    ///
    /// - [`FsError::Os`] if the entry cannot be enumerated
    fn reparse_tag(&self, path: &Path) -> Result<u32, FsError>;
}

/// Extra inputs some custom decoders need.
#[derive(Clone, Copy, Default)]
pub struct DecodeContext<'a> {
    /// Path of the entry the record describes.
    pub path: Option<&'a Path>,
    /// Reparse tag lookup for the Windows attribute decoder.
    pub reparse: Option<&'a dyn ReparseTagLookup>,
}

impl fmt::Debug for DecodeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeContext")
            .field("path", &self.path)
            .field("reparse", &self.reparse.is_some())
            .finish()
    }
}

/// A named, platform-specific decode routine.
///
/// `decode` receives the record starting at the field offset, already
/// checked to hold at least `width` bytes.
pub struct CustomDecoder {
    /// Name used in errors and traces.
    pub name: &'static str,
    /// Bytes read from the field offset.
    pub width: usize,
    /// The routine.
    pub decode: fn(&[u8], &DecodeContext<'_>) -> Result<FieldValue, FsError>,
}

impl fmt::Debug for CustomDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomDecoder")
            .field("name", &self.name)
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

/// `struct timespec` with 32-bit seconds and nanoseconds.
pub static TIMESPEC32: CustomDecoder = CustomDecoder {
    name: "timespec32",
    width: 8,
    decode: decode_timespec32,
};

/// `struct timespec` with 64-bit seconds and nanoseconds.
pub static TIMESPEC64: CustomDecoder = CustomDecoder {
    name: "timespec64",
    width: 16,
    decode: decode_timespec64,
};

/// `FILETIME`: 100ns ticks since 1601-01-01.
pub static WINDOWS_FILE_TIME: CustomDecoder = CustomDecoder {
    name: "filetime",
    width: 8,
    decode: decode_filetime,
};

/// Attribute word to synthesized `st_mode`.
pub static WINDOWS_ATTRIBUTES: CustomDecoder = CustomDecoder {
    name: "file_attributes",
    width: 4,
    decode: decode_windows_attributes,
};

/// High dword followed by low dword.
pub static WINDOWS_FILE_SIZE: CustomDecoder = CustomDecoder {
    name: "file_size",
    width: 8,
    decode: decode_windows_file_size,
};

/// Constant `0`, for fields the platform does not record.
pub static ZERO: CustomDecoder = CustomDecoder {
    name: "zero",
    width: 0,
    decode: decode_zero,
};

/// Constant `1`.
pub static ONE: CustomDecoder = CustomDecoder {
    name: "one",
    width: 0,
    decode: decode_one,
};

/// Decode `field` from `record`.
///
/// # Errors
///
/// - [`FsError::TruncatedRecord`] if the field extends past the record
/// - Whatever a custom decoder reports (e.g. a failed reparse lookup)
pub fn decode_field(
    field: &'static str,
    spec: &FieldSpec,
    record: &[u8],
    ctx: &DecodeContext<'_>,
) -> Result<FieldValue, FsError> {
    let needed = spec.rule.width();
    let bytes = record
        .get(spec.offset..)
        .filter(|rest| rest.len() >= needed)
        .ok_or(FsError::TruncatedRecord {
            field,
            needed: spec.offset + needed,
            available: record.len(),
        })?;

    match spec.rule {
        DecodeRule::Int(p) => read_int(field, p, bytes),
        DecodeRule::Text(TextRule::Utf8) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Ok(FieldValue::Text(String::from_utf8_lossy(&bytes[..end]).into_owned()))
        }
        DecodeRule::Text(TextRule::Utf16) => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            Ok(FieldValue::Text(String::from_utf16_lossy(&units)))
        }
        DecodeRule::Custom(decoder) => (decoder.decode)(bytes, ctx),
    }
}

fn decode_zero(_: &[u8], _: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    Ok(FieldValue::Uint(0))
}

fn decode_one(_: &[u8], _: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    Ok(FieldValue::Uint(1))
}

fn read_int(field: &'static str, p: Primitive, bytes: &[u8]) -> Result<FieldValue, FsError> {
    Ok(match p {
        Primitive::U8 => FieldValue::Uint(u64::from(take::<1>(field, bytes, 0)?[0])),
        Primitive::U16 => FieldValue::Uint(u64::from(u16::from_ne_bytes(take(field, bytes, 0)?))),
        Primitive::U32 => FieldValue::Uint(u64::from(u32::from_ne_bytes(take(field, bytes, 0)?))),
        Primitive::U64 => FieldValue::Uint(u64::from_ne_bytes(take(field, bytes, 0)?)),
        Primitive::S32 => FieldValue::Int(i64::from(i32::from_ne_bytes(take(field, bytes, 0)?))),
        Primitive::S64 => FieldValue::Int(i64::from_ne_bytes(take(field, bytes, 0)?)),
    })
}

/// Copy `N` bytes starting at `at`.
fn take<const N: usize>(field: &'static str, bytes: &[u8], at: usize) -> Result<[u8; N], FsError> {
    bytes
        .get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(FsError::TruncatedRecord {
            field,
            needed: at + N,
            available: bytes.len(),
        })
}

fn decode_timespec32(bytes: &[u8], _: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    let sec = u32::from_ne_bytes(take(TIMESPEC32.name, bytes, 0)?);
    let nsec = u32::from_ne_bytes(take(TIMESPEC32.name, bytes, 4)?);
    let millis = i64::from(sec) * 1000 + i64::from(nsec / 1_000_000);
    Ok(FieldValue::Time(Timestamp::from_millis(millis)))
}

fn decode_timespec64(bytes: &[u8], _: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    let sec = i64::from_ne_bytes(take(TIMESPEC64.name, bytes, 0)?);
    let nsec = i64::from_ne_bytes(take(TIMESPEC64.name, bytes, 8)?);
    let millis = sec.saturating_mul(1000).saturating_add(nsec / 1_000_000);
    Ok(FieldValue::Time(Timestamp::from_millis(millis)))
}

/// Convert `FILETIME` ticks to epoch milliseconds.
pub fn filetime_to_millis(ticks: u64) -> i64 {
    // Always fits: u64::MAX / 10_000 < i64::MAX.
    (ticks / FILETIME_TICKS_PER_MS) as i64 - FILETIME_EPOCH_OFFSET_MS
}

fn decode_filetime(bytes: &[u8], _: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    let ticks = u64::from_ne_bytes(take(WINDOWS_FILE_TIME.name, bytes, 0)?);
    Ok(FieldValue::Time(Timestamp::from_millis(filetime_to_millis(ticks))))
}

fn decode_windows_file_size(bytes: &[u8], _: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    let high = u32::from_ne_bytes(take(WINDOWS_FILE_SIZE.name, bytes, 0)?);
    let low = u32::from_ne_bytes(take(WINDOWS_FILE_SIZE.name, bytes, 4)?);
    Ok(FieldValue::Uint((u64::from(high) << 32) | u64::from(low)))
}

/// Synthesize an `st_mode` from a Windows attribute word.
///
/// `is_link` is the outcome of the reparse-tag check.
pub const fn windows_mode(attributes: u32, is_link: bool) -> u32 {
    let is_dir = attributes & FILE_ATTRIBUTE_DIRECTORY != 0;
    let kind = if is_link {
        S_IFLNK
    } else if is_dir {
        S_IFDIR
    } else {
        S_IFREG
    };
    let perms = if is_dir {
        Permissions::default_dir()
    } else {
        Permissions::default_file()
    };
    kind | perms.mode()
}

/// Returns `true` if `tag` marks a symbolic link or a junction.
pub const fn is_link_reparse_tag(tag: u32) -> bool {
    tag == IO_REPARSE_TAG_MOUNT_POINT || tag == IO_REPARSE_TAG_SYMLINK
}

fn decode_windows_attributes(bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<FieldValue, FsError> {
    let attributes = u32::from_ne_bytes(take(WINDOWS_ATTRIBUTES.name, bytes, 0)?);

    let mut is_link = false;
    if attributes & FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        if let (Some(lookup), Some(path)) = (ctx.reparse, ctx.path) {
            let tag = lookup.reparse_tag(path)?;
            is_link = is_link_reparse_tag(tag);
        } else {
            tracing::debug!(attributes, "reparse point without a lookup; reporting as non-link");
        }
    }

    Ok(FieldValue::Uint(u64::from(windows_mode(attributes, is_link))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn decode(spec: FieldSpec, record: &[u8]) -> Result<FieldValue, FsError> {
        decode_field("test", &spec, record, &DecodeContext::default())
    }

    struct FixedTag {
        tag: u32,
        calls: AtomicUsize,
    }

    impl ReparseTagLookup for FixedTag {
        fn reparse_tag(&self, _path: &Path) -> Result<u32, FsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tag)
        }
    }

    struct FailingLookup;

    impl ReparseTagLookup for FailingLookup {
        fn reparse_tag(&self, path: &Path) -> Result<u32, FsError> {
            Err(FsError::Os {
                operation: "FindFirstFileW",
                path: path.to_path_buf(),
                code: 5,
                message: "Access is denied.".into(),
            })
        }
    }

    #[test]
    fn integers_are_native_endian() {
        let mut record = vec![0u8; 16];
        record[4..8].copy_from_slice(&0xdead_beef_u32.to_ne_bytes());
        record[8..16].copy_from_slice(&(-42i64).to_ne_bytes());

        assert_eq!(
            decode(FieldSpec::int(4, Primitive::U32), &record).unwrap(),
            FieldValue::Uint(0xdead_beef)
        );
        assert_eq!(
            decode(FieldSpec::int(8, Primitive::S64), &record).unwrap(),
            FieldValue::Int(-42)
        );
    }

    #[test]
    fn truncated_fields_are_rejected() {
        let record = [0u8; 6];
        let err = decode(FieldSpec::int(4, Primitive::U32), &record).unwrap_err();
        assert_eq!(
            err,
            FsError::TruncatedRecord {
                field: "test",
                needed: 8,
                available: 6
            }
        );
        assert!(decode(FieldSpec::int(40, Primitive::U8), &record).is_err());
    }

    #[test]
    fn filetime_epoch() {
        let record = 116_444_736_000_000_000u64.to_ne_bytes();
        let value = decode(FieldSpec::custom(0, &WINDOWS_FILE_TIME), &record).unwrap();
        assert_eq!(value, FieldValue::Time(Timestamp::UNIX_EPOCH));
    }

    #[test]
    fn filetime_one_second_later() {
        assert_eq!(filetime_to_millis(116_444_736_010_000_000), 1000);
        assert_eq!(filetime_to_millis(0), -11_644_473_600_000);
    }

    #[test]
    fn timespec32_truncates_to_milliseconds() {
        let mut record = Vec::new();
        record.extend_from_slice(&1_700_000_000u32.to_ne_bytes());
        record.extend_from_slice(&999_999_999u32.to_ne_bytes());
        let value = decode(FieldSpec::custom(0, &TIMESPEC32), &record).unwrap();
        assert_eq!(value.as_time().unwrap().millis(), 1_700_000_000_999);
    }

    #[test]
    fn timespec64() {
        let mut record = vec![0u8; 4];
        record.extend_from_slice(&1_600_000_000i64.to_ne_bytes());
        record.extend_from_slice(&250_000_000i64.to_ne_bytes());
        let value = decode(FieldSpec::custom(4, &TIMESPEC64), &record).unwrap();
        assert_eq!(value, FieldValue::Time(Timestamp::from_millis(1_600_000_000_250)));
    }

    #[test]
    fn split_file_size() {
        let mut record = Vec::new();
        record.extend_from_slice(&1u32.to_ne_bytes());
        record.extend_from_slice(&5u32.to_ne_bytes());
        let value = decode(FieldSpec::custom(0, &WINDOWS_FILE_SIZE), &record).unwrap();
        assert_eq!(value.as_u64(), Some((1 << 32) + 5));
    }

    #[test]
    fn strings_stop_at_nul() {
        let mut record = vec![0xffu8; 3];
        record.extend_from_slice(b"hello\0garbage");
        let value = decode(FieldSpec::text(3, TextRule::Utf8), &record).unwrap();
        assert_eq!(value.as_str(), Some("hello"));

        let mut wide = Vec::new();
        for unit in "näme".encode_utf16().chain([0, 0x41]) {
            wide.extend_from_slice(&unit.to_ne_bytes());
        }
        let value = decode(FieldSpec::text(0, TextRule::Utf16), &wide).unwrap();
        assert_eq!(value.as_str(), Some("näme"));
    }

    #[test]
    fn constants_ignore_the_record() {
        assert_eq!(decode(FieldSpec::custom(0, &ZERO), &[]).unwrap(), FieldValue::Uint(0));
        assert_eq!(decode(FieldSpec::custom(0, &ONE), &[]).unwrap(), FieldValue::Uint(1));
    }

    #[test]
    fn windows_modes() {
        assert_eq!(windows_mode(0x20, false), S_IFREG | 0o644);
        assert_eq!(windows_mode(FILE_ATTRIBUTE_DIRECTORY, false), S_IFDIR | 0o755);
        assert_eq!(windows_mode(FILE_ATTRIBUTE_DIRECTORY, true), S_IFLNK | 0o755);
        assert_eq!(windows_mode(0, true), S_IFLNK | 0o644);
    }

    #[test]
    fn reparse_points_consult_the_lookup() {
        let attrs = (FILE_ATTRIBUTE_REPARSE_POINT | FILE_ATTRIBUTE_DIRECTORY).to_ne_bytes();
        let spec = FieldSpec::custom(0, &WINDOWS_ATTRIBUTES);

        let junction = FixedTag {
            tag: IO_REPARSE_TAG_MOUNT_POINT,
            calls: AtomicUsize::new(0),
        };
        let ctx = DecodeContext {
            path: Some(Path::new(r"C:\link")),
            reparse: Some(&junction),
        };
        let mode = decode_field("mode", &spec, &attrs, &ctx).unwrap();
        assert_eq!(mode.as_u64(), Some(u64::from(S_IFLNK | 0o755)));
        assert_eq!(junction.calls.load(Ordering::SeqCst), 1);

        let dedup = FixedTag {
            tag: 0x8000_0013,
            calls: AtomicUsize::new(0),
        };
        let ctx = DecodeContext {
            path: Some(Path::new(r"C:\dedup")),
            reparse: Some(&dedup),
        };
        let mode = decode_field("mode", &spec, &attrs, &ctx).unwrap();
        assert_eq!(mode.as_u64(), Some(u64::from(S_IFDIR | 0o755)));
    }

    #[test]
    fn plain_attributes_skip_the_lookup() {
        let lookup = FixedTag {
            tag: IO_REPARSE_TAG_SYMLINK,
            calls: AtomicUsize::new(0),
        };
        let ctx = DecodeContext {
            path: Some(Path::new(r"C:\file.txt")),
            reparse: Some(&lookup),
        };
        let attrs = 0x20u32.to_ne_bytes();
        let spec = FieldSpec::custom(0, &WINDOWS_ATTRIBUTES);
        let mode = decode_field("mode", &spec, &attrs, &ctx).unwrap();
        assert_eq!(mode.as_u64(), Some(u64::from(S_IFREG | 0o644)));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lookup_failures_propagate() {
        let ctx = DecodeContext {
            path: Some(Path::new(r"C:\locked")),
            reparse: Some(&FailingLookup),
        };
        let attrs = FILE_ATTRIBUTE_REPARSE_POINT.to_ne_bytes();
        let spec = FieldSpec::custom(0, &WINDOWS_ATTRIBUTES);
        let err = decode_field("mode", &spec, &attrs, &ctx).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(5));
    }
}
