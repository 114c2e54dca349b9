//! Path-level operations.

use std::any::Any;

use super::{File, unsupported};
use crate::{BackendKind, FsError, OpenMode, Stat, SymlinkTarget};

/// Access to the concrete backend behind a `dyn Filesystem`.
///
/// Implemented for every `'static` type; backends never implement it by hand.
pub trait AsAny {
    /// The backend as [`Any`].
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Filesystem operations table.
///
/// Names are backend-relative paths. Backends decide whether a leading `/` is
/// significant; the mount tree hands residual paths without one.
///
/// # Thread Safety
///
/// All methods use `&self`. Backends that keep mutable state use interior
/// mutability (`Mutex`, `RwLock`), since one backend may be shared by many
/// handles and threads.
///
/// # Object Safety
///
/// This trait is object-safe; handles store `Box<dyn Filesystem>`.
///
/// # Example
///
/// ```rust
/// use switchfs::{Filesystem, FsError, FsHandle, Stat};
///
/// struct Empty;
///
/// impl Filesystem for Empty {
///     fn stat(&self, name: &str) -> Result<Stat, FsError> {
///         Ok(Stat::new(name))
///     }
/// }
///
/// let fs = FsHandle::new(Empty);
/// assert_eq!(fs.stat("x").unwrap().name, "x");
/// assert!(matches!(fs.unlink("x"), Err(FsError::NotSupported { .. })));
/// ```
pub trait Filesystem: AsAny + Send + Sync {
    /// Backend type tag, used for diagnostics and downcasts.
    fn kind(&self) -> BackendKind {
        BackendKind::Custom("unknown")
    }

    /// Open a file or directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotSupported`] if the backend cannot open files
    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn File>, FsError> {
        let _ = (name, mode);
        unsupported("open")
    }

    /// Metadata for a path.
    fn stat(&self, name: &str) -> Result<Stat, FsError> {
        let _ = name;
        unsupported("stat")
    }

    /// Remove a path.
    fn unlink(&self, name: &str) -> Result<(), FsError> {
        let _ = name;
        unsupported("unlink")
    }

    /// Rename `from` to `to`.
    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let _ = (from, to);
        unsupported("rename")
    }

    /// Change permission bits.
    fn chmod(&self, name: &str, mode: u32) -> Result<(), FsError> {
        let _ = (name, mode);
        unsupported("chmod")
    }

    /// Change owner and group. Owners are names or numeric ids as text.
    fn chown(&self, name: &str, owner: &str, group: &str) -> Result<(), FsError> {
        let _ = (name, owner, group);
        unsupported("chown")
    }

    /// Create a directory.
    fn mkdir(&self, name: &str, mode: u32) -> Result<(), FsError> {
        let _ = (name, mode);
        unsupported("mkdir")
    }

    /// Create a symbolic link at `name` pointing at `target`.
    fn symlink(&self, target: &str, name: &str) -> Result<(), FsError> {
        let _ = (target, name);
        unsupported("symlink")
    }

    /// Read the target of a symbolic link.
    fn readlink(&self, name: &str) -> Result<SymlinkTarget, FsError> {
        let _ = name;
        unsupported("readlink")
    }

    /// Free backend resources. Called exactly once, when the last handle goes away.
    fn release(&self) {}
}
