//! # Platform Detection
//!
//! The [`PlatformKey`] identifies which record layouts apply to the running
//! process. Three of its parts come from the build target; the fourth, the
//! [`AbiVariant`], comes from probing which `stat` entry points the loaded
//! C library actually exports, so the same binary picks the right layout
//! against different library versions.

use std::fmt;

use crate::FsError;

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Microsoft Windows.
    Windows,
    /// Linux (glibc, musl, bionic).
    Linux,
    /// macOS / iOS.
    Darwin,
}

impl OsFamily {
    /// Map a Rust `target_os` value to a family.
    pub fn from_target_os(os: &str) -> Option<Self> {
        match os {
            "windows" => Some(OsFamily::Windows),
            "linux" | "android" => Some(OsFamily::Linux),
            "macos" | "ios" => Some(OsFamily::Darwin),
            _ => None,
        }
    }

    /// Short lowercase name used in layout identifiers.
    pub const fn name(self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Darwin => "darwin",
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86.
    Ia32,
    /// x86-64.
    X64,
    /// 32-bit ARM.
    Arm,
    /// AArch64.
    Arm64,
    /// MIPS.
    Mips,
    /// Anything else.
    Other,
}

impl Arch {
    /// Architecture of the build target.
    pub const CURRENT: Arch = if cfg!(target_arch = "x86") {
        Arch::Ia32
    } else if cfg!(target_arch = "x86_64") {
        Arch::X64
    } else if cfg!(target_arch = "arm") {
        Arch::Arm
    } else if cfg!(target_arch = "aarch64") {
        Arch::Arm64
    } else if cfg!(any(target_arch = "mips", target_arch = "mips64")) {
        Arch::Mips
    } else {
        Arch::Other
    };

    /// Map a Rust `target_arch` value to an architecture.
    pub fn from_target_arch(arch: &str) -> Self {
        match arch {
            "x86" => Arch::Ia32,
            "x86_64" => Arch::X64,
            "arm" => Arch::Arm,
            "aarch64" => Arch::Arm64,
            "mips" | "mips64" => Arch::Mips,
            _ => Arch::Other,
        }
    }

    /// Short lowercase name used in layout identifiers.
    pub const fn name(self) -> &'static str {
        match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Other => "other",
        }
    }

    /// The `_STAT_VER` tag glibc's versioned `__xstat64` family expects.
    pub const fn linux_stat_version(self) -> i32 {
        match self {
            Arch::X64 => 1,
            Arch::Arm64 => 0,
            Arch::Ia32 | Arch::Arm | Arch::Mips | Arch::Other => 3,
        }
    }
}

/// Native pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    /// 4-byte pointers.
    Bits32,
    /// 8-byte pointers.
    Bits64,
}

impl PointerWidth {
    /// Pointer width of the running process.
    pub const fn current() -> Self {
        if size_of::<usize>() == 8 {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        }
    }

    /// Width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            PointerWidth::Bits32 => 32,
            PointerWidth::Bits64 => 64,
        }
    }
}

/// Which `stat` structure shape the C library exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiVariant {
    /// The platform's default structure.
    Default,
    /// A large-file `stat64` entry point is exported.
    Stat64,
}

/// Identifies the record layouts applicable to the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformKey {
    /// Operating system family.
    pub os: OsFamily,
    /// Pointer width.
    pub pointer_width: PointerWidth,
    /// CPU architecture.
    pub arch: Arch,
    /// Probed ABI variant.
    pub abi: AbiVariant,
}

impl PlatformKey {
    /// Build a key from its parts.
    ///
    /// `has_wide_stat` is the probe result for a 64-bit capable `stat`
    /// entry point (`stat64` or `__xstat64`). It only changes the ABI
    /// variant on 32-bit Linux, where the wide call implies a different
    /// structure; elsewhere the structure is the same either way.
    pub fn new(os: OsFamily, arch: Arch, pointer_width: PointerWidth, has_wide_stat: bool) -> Self {
        let abi = match (os, pointer_width) {
            (OsFamily::Linux, PointerWidth::Bits32) if has_wide_stat => AbiVariant::Stat64,
            _ => AbiVariant::Default,
        };
        Self {
            os,
            pointer_width,
            arch,
            abi,
        }
    }

    /// Compute the key for the running process.
    ///
    /// `probe` answers whether a symbol name resolves in the process.
    ///
    /// # Errors
    ///
    /// - [`FsError::UnsupportedPlatform`] if the OS family is not one of
    ///   Windows, Linux or Darwin
    pub fn detect(probe: impl Fn(&str) -> bool) -> Result<Self, FsError> {
        let os = OsFamily::from_target_os(std::env::consts::OS).ok_or_else(|| {
            FsError::UnsupportedPlatform {
                platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            }
        })?;
        let arch = Arch::CURRENT;
        let has_wide_stat = os != OsFamily::Windows && (probe("stat64") || probe("__xstat64"));
        Ok(Self::new(os, arch, PointerWidth::current(), has_wide_stat))
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.os {
            OsFamily::Windows => f.write_str("windows"),
            OsFamily::Darwin => write!(f, "darwin-{}", self.pointer_width.bits()),
            OsFamily::Linux => {
                write!(f, "linux-{}", self.arch.name())?;
                if self.abi == AbiVariant::Stat64 {
                    f.write_str("-stat64")?;
                }
                Ok(())
            }
        }
    }
}
