//! # Handles
//!
//! [`FsHandle`] is a shared, reference-counted reference to one backend
//! instance. [`FileHandle`] is an open file on such a backend; it keeps its
//! filesystem alive for as long as it is open.
//!
//! ## Lifetime
//!
//! ```text
//! FsHandle::new      count = 1
//! clone()            count + 1
//! drop()             count - 1, Filesystem::release at 0
//! fs.open(..)        FileHandle holds one more count
//! file.close()       File::close, File::release, then the count is dropped
//! ```
//!
//! Release of a backend happens exactly once, when the last handle goes away.

use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{ErrorCode, File, FileFlag, Filesystem, FsError, OpenMode, Stat, SymlinkTarget};

/// Type tag of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BackendKind {
    /// Host filesystem.
    Local,
    /// 9P client.
    NineP,
    /// FISH (shell over ssh) client.
    Fish,
    /// Metadata cache decorator.
    MetaCache,
    /// Connection registry that connects on demand.
    Autoconnect,
    /// Connection registry with prefix rules.
    Connector,
    /// Mount tree.
    MountTree,
    /// Read-only in-memory string file.
    StringFile,
    /// Anything else, named by the backend.
    Custom(&'static str),
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::NineP => f.write_str("9p"),
            BackendKind::Fish => f.write_str("fish"),
            BackendKind::MetaCache => f.write_str("metacache"),
            BackendKind::Autoconnect => f.write_str("autoconnect"),
            BackendKind::Connector => f.write_str("connector"),
            BackendKind::MountTree => f.write_str("mount"),
            BackendKind::StringFile => f.write_str("rostring"),
            BackendKind::Custom(name) => f.write_str(name),
        }
    }
}

struct Shared {
    backend: Box<dyn Filesystem>,
    kind: BackendKind,
    last_error: Mutex<Option<ErrorCode>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        tracing::debug!(kind = %self.kind, "releasing filesystem");
        self.backend.release();
    }
}

/// Shared handle to a backend instance.
///
/// Cloning takes another reference; dropping the last one calls
/// [`Filesystem::release`]. Every operation records its error classification,
/// readable through [`last_error`](Self::last_error).
///
/// # Example
///
/// ```rust
/// use switchfs::{Filesystem, FsHandle};
///
/// struct Nothing;
/// impl Filesystem for Nothing {}
///
/// let fs = FsHandle::new(Nothing);
/// let other = fs.clone();
/// assert_eq!(fs.ref_count(), 2);
/// drop(other);
/// assert_eq!(fs.ref_count(), 1);
/// assert!(fs.downcast_ref::<Nothing>().is_some());
/// ```
#[derive(Clone)]
pub struct FsHandle {
    shared: Arc<Shared>,
}

impl FsHandle {
    /// Wrap a backend in a new handle with a reference count of one.
    pub fn new(backend: impl Filesystem + 'static) -> Self {
        Self::from_box(Box::new(backend))
    }

    /// Wrap an already boxed backend.
    pub fn from_box(backend: Box<dyn Filesystem>) -> Self {
        let kind = backend.kind();
        tracing::trace!(%kind, "new filesystem handle");
        Self {
            shared: Arc::new(Shared {
                backend,
                kind,
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Backend type tag.
    pub fn kind(&self) -> BackendKind {
        self.shared.kind
    }

    /// Number of live references, open files included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Whether both handles refer to the same backend instance.
    pub fn ptr_eq(&self, other: &FsHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// The backend as a concrete type, if it is one.
    pub fn downcast_ref<T: Filesystem + 'static>(&self) -> Option<&T> {
        <dyn Filesystem as crate::AsAny>::as_any(&*self.shared.backend).downcast_ref::<T>()
    }

    /// Classification of the most recent failed operation, if any.
    ///
    /// Cleared by the next successful operation.
    pub fn last_error(&self) -> Option<ErrorCode> {
        *self
            .shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record<T>(&self, result: Result<T, FsError>) -> Result<T, FsError> {
        let code = result.as_ref().err().map(FsError::code);
        *self
            .shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = code;
        result
    }

    /// Open a file; the returned handle keeps this filesystem alive.
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<FileHandle, FsError> {
        tracing::trace!(kind = %self.kind(), name, "open");
        let file = self.record(self.shared.backend.open(name, mode))?;
        Ok(FileHandle::new(self, file))
    }

    /// Metadata for a path.
    pub fn stat(&self, name: &str) -> Result<Stat, FsError> {
        self.record(self.shared.backend.stat(name))
    }

    /// Remove a path.
    pub fn unlink(&self, name: &str) -> Result<(), FsError> {
        self.record(self.shared.backend.unlink(name))
    }

    /// Rename within this filesystem.
    pub fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        self.record(self.shared.backend.rename(from, to))
    }

    /// Change permission bits.
    pub fn chmod(&self, name: &str, mode: u32) -> Result<(), FsError> {
        self.record(self.shared.backend.chmod(name, mode))
    }

    /// Change owner and group.
    pub fn chown(&self, name: &str, owner: &str, group: &str) -> Result<(), FsError> {
        self.record(self.shared.backend.chown(name, owner, group))
    }

    /// Create a directory.
    pub fn mkdir(&self, name: &str, mode: u32) -> Result<(), FsError> {
        self.record(self.shared.backend.mkdir(name, mode))
    }

    /// Create a symbolic link at `name` pointing at `target`.
    pub fn symlink(&self, target: &str, name: &str) -> Result<(), FsError> {
        self.record(self.shared.backend.symlink(target, name))
    }

    /// Read a symbolic link.
    pub fn readlink(&self, name: &str) -> Result<SymlinkTarget, FsError> {
        self.record(self.shared.backend.readlink(name))
    }
}

impl fmt::Debug for FsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsHandle")
            .field("kind", &self.kind())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// An open file or directory.
///
/// Holds a reference on its [`FsHandle`] until closed. Dropping an open
/// handle closes it; use [`close`](Self::close) to observe the close result.
///
/// Implements [`std::io::Read`], [`std::io::Write`] and [`std::io::Seek`]
/// through the backend's operations.
pub struct FileHandle {
    file: Option<Box<dyn File>>,
    fs: FsHandle,
    last_error: Option<ErrorCode>,
}

impl FileHandle {
    /// Bind an open backend file to the filesystem it came from.
    pub fn new(fs: &FsHandle, file: Box<dyn File>) -> Self {
        Self {
            file: Some(file),
            fs: fs.clone(),
            last_error: None,
        }
    }

    /// The filesystem this file belongs to.
    pub fn fs(&self) -> &FsHandle {
        &self.fs
    }

    /// Classification of the most recent failed operation on this file.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    fn with<T>(
        &mut self,
        op: impl FnOnce(&mut dyn File) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let result = match self.file.as_deref_mut() {
            Some(file) => op(file),
            None => Err(FsError::fault("file handle used after close")),
        };
        self.last_error = result.as_ref().err().map(FsError::code);
        result
    }

    fn shutdown(&mut self) -> Result<(), FsError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let result = file.close();
        file.release();
        result
    }

    /// Close the file, release it, then drop the filesystem reference.
    pub fn close(mut self) -> Result<(), FsError> {
        self.shutdown()
    }

    /// Move the file position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.with(|f| f.seek(pos))
    }

    /// Read at the current position.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        self.with(|f| f.read(buf))
    }

    /// Write at the current position.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        self.with(|f| f.write(buf))
    }

    /// Positional read.
    pub fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        self.with(|f| f.pread(buf, offset))
    }

    /// Positional write.
    pub fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        self.with(|f| f.pwrite(buf, offset))
    }

    /// Current value of a per-file flag.
    pub fn get_flag(&mut self, flag: FileFlag) -> Result<i64, FsError> {
        self.with(|f| f.get_flag(flag))
    }

    /// Set a per-file flag.
    pub fn set_flag(&mut self, flag: FileFlag, value: i64) -> Result<(), FsError> {
        self.with(|f| f.set_flag(flag, value))
    }

    /// Metadata of the open file.
    pub fn stat(&mut self) -> Result<Stat, FsError> {
        self.with(|f| f.stat())
    }

    /// Whether the position is at end of file. A closed handle reports `true`.
    pub fn eof(&self) -> bool {
        self.file.as_deref().is_none_or(|f| f.eof())
    }

    /// Open `name` inside this directory, on the same filesystem.
    pub fn lookup(&mut self, name: &str) -> Result<FileHandle, FsError> {
        let child = self.with(|f| f.lookup(name))?;
        Ok(FileHandle::new(&self.fs, child))
    }

    /// Next directory entry, or `None` at the end.
    pub fn scan(&mut self) -> Result<Option<Stat>, FsError> {
        self.with(|f| f.scan())
    }

    /// Rewind directory scanning.
    pub fn reset(&mut self) -> Result<(), FsError> {
        self.with(|f| f.reset())
    }

    /// Iterate over the remaining directory entries.
    pub fn entries(&mut self) -> DirEntries<'_> {
        DirEntries {
            file: self,
            done: false,
        }
    }

    /// Read from the current position to end of file.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, FsError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = FileHandle::read(self, &mut chunk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            tracing::warn!(%error, "close failed while dropping file handle");
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("fs", &self.fs)
            .field("open", &self.file.is_some())
            .finish()
    }
}

/// A `FileHandle` is itself a [`File`], so decorators can wrap one.
impl File for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        FileHandle::seek(self, pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        FileHandle::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        FileHandle::write(self, buf)
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        FileHandle::pread(self, buf, offset)
    }

    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        FileHandle::pwrite(self, buf, offset)
    }

    fn get_flag(&self, flag: FileFlag) -> Result<i64, FsError> {
        match self.file.as_deref() {
            Some(file) => file.get_flag(flag),
            None => Err(FsError::fault("file handle used after close")),
        }
    }

    fn set_flag(&mut self, flag: FileFlag, value: i64) -> Result<(), FsError> {
        FileHandle::set_flag(self, flag, value)
    }

    fn stat(&mut self) -> Result<Stat, FsError> {
        FileHandle::stat(self)
    }

    fn close(&mut self) -> Result<(), FsError> {
        self.shutdown()
    }

    fn eof(&self) -> bool {
        FileHandle::eof(self)
    }

    fn lookup(&mut self, name: &str) -> Result<Box<dyn File>, FsError> {
        Ok(Box::new(FileHandle::lookup(self, name)?))
    }

    fn scan(&mut self) -> Result<Option<Stat>, FsError> {
        FileHandle::scan(self)
    }

    fn reset(&mut self) -> Result<(), FsError> {
        FileHandle::reset(self)
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(FileHandle::read(self, buf)?)
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FileHandle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(FileHandle::seek(self, pos)?)
    }
}

/// Iterator over directory entries, from [`FileHandle::entries`].
///
/// Stops after the first error.
pub struct DirEntries<'a> {
    file: &'a mut FileHandle,
    done: bool,
}

impl Iterator for DirEntries<'_> {
    type Item = Result<Stat, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.scan() {
            Ok(Some(stat)) => Some(Ok(stat)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
