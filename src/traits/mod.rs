//! # Capability Traits
//!
//! A backend is a pair of capability tables: [`Filesystem`] for path-level
//! operations and [`File`] for operations on an open file or directory.
//!
//! ## Default Fallbacks
//!
//! Every method has a default body, so a backend implements only what it
//! supports. The defaults are:
//!
//! | Operation | Default |
//! |-----------|---------|
//! | Filesystem operations | [`FsError::NotSupported`] |
//! | `File::close` | success |
//! | `File::eof` | `false` |
//! | `File::scan` | `Ok(None)` (end of directory) |
//! | `File::seek`, `read`, `write`, `pread`, `pwrite`, `stat`, `lookup`, `reset` | [`FsError::NotSupported`] |
//! | `File::get_flag`, `set_flag` | [`FsError::NotSupported`] |
//! | `release` | no-op |
//!
//! Dispatching through a missing operation never faults.

mod file;
mod filesystem;

pub use file::File;
pub use filesystem::{AsAny, Filesystem};

use crate::FsError;

pub(crate) fn unsupported<T>(operation: &'static str) -> Result<T, FsError> {
    tracing::debug!(operation, "operation not provided by backend");
    Err(FsError::NotSupported { operation })
}
