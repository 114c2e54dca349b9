//! Read-only files over an in-memory string.

use std::io::SeekFrom;
use std::sync::Arc;

use crate::{BackendKind, ConnectArgs, File, Filesystem, FsError, OpenMode, S_IFREG, Stat};

/// Connection argument holding the served text.
pub const ARG_VALUE: &str = "value";

/// Filesystem serving one string under every name.
///
/// Useful for exposing generated text (status pages, diagnostics) through the
/// same handle model as real files.
///
/// ```rust
/// use switchfs::{FsExt, FsHandle};
/// use switchfs::backends::StringFs;
///
/// let fs = FsHandle::new(StringFs::new("hello"));
/// assert_eq!(fs.read_to_string("anything").unwrap(), "hello");
/// assert_eq!(fs.file_size("anything").unwrap(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct StringFs {
    value: Arc<str>,
}

impl StringFs {
    /// Serve `value`.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Build from connection arguments; the text comes from `value` (empty if unset).
    pub fn from_args(args: &ConnectArgs) -> Result<Self, FsError> {
        Ok(Self::new(args.get_or(ARG_VALUE, "")))
    }

    fn stat_for(&self, name: &str) -> Stat {
        Stat {
            mode: S_IFREG | 0o444,
            size: self.value.len() as u64,
            ..Stat::new(name)
        }
    }
}

impl Filesystem for StringFs {
    fn kind(&self) -> BackendKind {
        BackendKind::StringFile
    }

    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn File>, FsError> {
        if mode.write || mode.append || mode.truncate {
            return Err(FsError::PermissionDenied {
                path: name.into(),
                operation: "open for writing",
            });
        }
        Ok(Box::new(StringFile {
            value: self.value.clone(),
            name: name.to_owned(),
            pos: 0,
        }))
    }

    fn stat(&self, name: &str) -> Result<Stat, FsError> {
        Ok(self.stat_for(name))
    }
}

/// Read-only open file over a shared string.
#[derive(Debug)]
pub struct StringFile {
    value: Arc<str>,
    name: String,
    pos: u64,
}

impl StringFile {
    /// File named `name` holding `value`, positioned at the start.
    pub fn new(name: impl Into<String>, value: impl Into<Arc<str>>) -> Self {
        Self {
            value: value.into(),
            name: name.into(),
            pos: 0,
        }
    }

    fn copy_at(&self, buf: &mut [u8], offset: u64) -> usize {
        let bytes = self.value.as_bytes();
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        if start >= bytes.len() {
            return 0;
        }
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        n
    }
}

impl File for StringFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        let len = self.value.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n).unwrap_or(i64::MAX),
            SeekFrom::End(delta) => len.saturating_add(delta),
            SeekFrom::Current(delta) => (self.pos as i64).saturating_add(delta),
        };
        self.pos = u64::try_from(target).map_err(|_| FsError::Backend(format!(
            "seek before start of {}",
            self.name
        )))?;
        Ok(self.pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let n = self.copy_at(buf, self.pos);
        self.pos += n as u64;
        Ok(n)
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        Ok(self.copy_at(buf, offset))
    }

    fn stat(&mut self) -> Result<Stat, FsError> {
        Ok(Stat {
            mode: S_IFREG | 0o444,
            size: self.value.len() as u64,
            ..Stat::new(self.name.as_str())
        })
    }

    fn eof(&self) -> bool {
        self.pos >= self.value.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ARG_TYPE, FsExt, FsHandle};

    #[test]
    fn reads_advance_and_stop_at_end() {
        let mut file = StringFile::new("motd", "abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert!(!file.eof());
        assert_eq!(file.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert!(file.eof());
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn pread_and_seek() {
        let mut file = StringFile::new("motd", "abcdef");
        let mut buf = [0u8; 3];
        assert_eq!(file.pread(&mut buf, 4).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(file.pread(&mut buf, 10).unwrap(), 0);

        assert_eq!(file.seek(SeekFrom::End(-2)).unwrap(), 4);
        assert_eq!(file.seek(SeekFrom::Current(-1)).unwrap(), 3);
        assert!(file.seek(SeekFrom::Current(-10)).is_err());
    }

    #[test]
    fn writes_are_refused() {
        let mut file = StringFile::new("motd", "x");
        assert!(matches!(file.write(b"y"), Err(FsError::NotSupported { .. })));

        let fs = FsHandle::new(StringFs::new("x"));
        assert!(matches!(
            fs.open("motd", OpenMode::WRITE),
            Err(FsError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn stat_reports_size() {
        let mut file = StringFile::new("motd", "hello");
        let stat = file.stat().unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.is_file());
        assert_eq!(stat.name, "motd");
    }

    #[test]
    fn from_args_reads_value() {
        let mut args = ConnectArgs::new();
        args.set(ARG_TYPE, "rostring");
        args.set(ARG_VALUE, "served");
        let fs = FsHandle::new(StringFs::from_args(&args).unwrap());
        assert_eq!(fs.kind(), BackendKind::StringFile);
        assert_eq!(fs.read_all("x").unwrap(), b"served");
    }
}
