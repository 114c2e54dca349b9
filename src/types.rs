//! Core value types shared by every backend.

use std::fmt;
use std::time::SystemTime;

use crate::FsError;

/// File type mask within [`Stat::mode`].
pub const S_IFMT: u32 = 0o170000;
/// Directory type bits.
pub const S_IFDIR: u32 = 0o040000;
/// Regular file type bits.
pub const S_IFREG: u32 = 0o100000;
/// Symbolic link type bits.
pub const S_IFLNK: u32 = 0o120000;

/// Longest symlink target a [`SymlinkTarget`] can carry, in bytes.
pub const SYMLINK_TARGET_MAX: usize = 1019;

/// Metadata record for a file or directory entry.
///
/// Values are plain owned data: cloning gives the caller an independent copy, so
/// caches can hand out records without sharing storage with their callers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stat {
    /// Entry name (last path component for directory scans).
    pub name: String,
    /// Owning user, as reported by the backend.
    pub owner: String,
    /// Owning group, as reported by the backend.
    pub group: String,
    /// Unix mode bits, type bits included.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub atime: SystemTime,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub mtime: SystemTime,
    /// Last status change time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub ctime: SystemTime,
}

impl Stat {
    /// Create a record with the given name and everything else zeroed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns `true` if the type bits mark a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Returns `true` if the type bits mark a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Returns `true` if the type bits mark a symbolic link.
    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits only (`0o7777`).
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            name: String::new(),
            owner: String::new(),
            group: String::new(),
            mode: 0,
            size: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Flags for opening a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenMode {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create file if it doesn't exist.
    pub create: bool,
    /// Truncate file to zero length.
    pub truncate: bool,
    /// Append to end of file.
    pub append: bool,
}

impl OpenMode {
    /// Read-only access. Also used to open directories for scanning.
    pub const READ: Self = Self {
        read: true,
        write: false,
        create: false,
        truncate: false,
        append: false,
    };

    /// Write access with create and truncate.
    pub const WRITE: Self = Self {
        read: false,
        write: true,
        create: true,
        truncate: true,
        append: false,
    };

    /// Read and write access.
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
        create: false,
        truncate: false,
        append: false,
    };

    /// Append mode - writes go to end of file.
    pub const APPEND: Self = Self {
        read: false,
        write: true,
        create: true,
        truncate: false,
        append: true,
    };
}

/// Per-file tunables a backend may expose through `get_flag`/`set_flag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileFlag {
    /// Non-blocking reads and writes.
    NonBlock,
    /// Read timeout.
    ReadTimeout,
    /// Write timeout.
    WriteTimeout,
    /// Read-ahead window.
    ReadAhead,
    /// Asynchronous writes.
    WriteAsync,
}

impl fmt::Display for FileFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFlag::NonBlock => "NONBLOCK",
            FileFlag::ReadTimeout => "READ_TIMEOUT",
            FileFlag::WriteTimeout => "WRITE_TIMEOUT",
            FileFlag::ReadAhead => "READ_AHEAD",
            FileFlag::WriteAsync => "WRITE_ASYNC",
        };
        f.write_str(name)
    }
}

/// Target text of a symbolic link, bounded to [`SYMLINK_TARGET_MAX`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymlinkTarget(String);

impl SymlinkTarget {
    /// Wrap a target, rejecting anything longer than the bound.
    pub fn new(target: impl Into<String>) -> Result<Self, FsError> {
        let target = target.into();
        if target.len() > SYMLINK_TARGET_MAX {
            return Err(FsError::TargetTooLong { len: target.len() });
        }
        Ok(Self(target))
    }

    /// The target as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymlinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serde support for SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        (duration.as_secs(), duration.subsec_nanos()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (secs, nanos): (u64, u32) = Deserialize::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }
}
