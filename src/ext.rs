//! # Extension Traits
//!
//! Convenience methods over filesystem handles.
//!
//! ## Overview
//!
//! [`FsExt`] provides whole-file and whole-directory helpers built from the
//! capability operations. It is blanket-implemented for anything that can lend
//! an [`FsHandle`], so every handle gets it for free.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`exists`](FsExt::exists) | `stat` succeeds |
//! | [`is_file`](FsExt::is_file) | Check if path is a regular file |
//! | [`is_dir`](FsExt::is_dir) | Check if path is a directory |
//! | [`is_symlink`](FsExt::is_symlink) | Check if path is a symbolic link |
//! | [`file_size`](FsExt::file_size) | Size from `stat` |
//! | [`read_all`](FsExt::read_all) | Open, read to end, close |
//! | [`read_to_string`](FsExt::read_to_string) | As `read_all`, as UTF-8 |
//! | [`write_all`](FsExt::write_all) | Open for writing, write everything, close |
//! | [`list_dir`](FsExt::list_dir) | Open a directory and collect its entries |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, `FsExtJson` adds `read_json` and `write_json`.

use crate::{FsError, FsHandle, OpenMode, Stat};

/// Extension methods for filesystem handles.
///
/// # Example
///
/// ```rust
/// use switchfs::{FsError, FsExt, FsHandle};
///
/// fn show(fs: &FsHandle) -> Result<(), FsError> {
///     if fs.is_dir("/data")? {
///         for entry in fs.list_dir("/data")? {
///             println!("{}", entry.name);
///         }
///     }
///     Ok(())
/// }
/// ```
pub trait FsExt: AsRef<FsHandle> {
    /// Whether `stat` finds the path.
    ///
    /// Returns `Ok(false)` for [`FsError::NotFound`], `Err` for anything else.
    fn exists(&self, path: &str) -> Result<bool, FsError> {
        match self.as_ref().stat(path) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path points to a regular file.
    ///
    /// Returns `Ok(false)` if the path doesn't exist (not an error).
    fn is_file(&self, path: &str) -> Result<bool, FsError> {
        match self.as_ref().stat(path) {
            Ok(s) => Ok(s.is_file()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path points to a directory.
    ///
    /// Returns `Ok(false)` if the path doesn't exist (not an error).
    fn is_dir(&self, path: &str) -> Result<bool, FsError> {
        match self.as_ref().stat(path) {
            Ok(s) => Ok(s.is_dir()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check if the path points to a symbolic link, as the backend's `stat` reports it.
    fn is_symlink(&self, path: &str) -> Result<bool, FsError> {
        match self.as_ref().stat(path) {
            Ok(s) => Ok(s.is_symlink()),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get the size of a file in bytes.
    fn file_size(&self, path: &str) -> Result<u64, FsError> {
        Ok(self.as_ref().stat(path)?.size)
    }

    /// Read a whole file.
    fn read_all(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut file = self.as_ref().open(path, OpenMode::READ)?;
        let data = file.read_to_end()?;
        file.close()?;
        Ok(data)
    }

    /// Read a whole file as UTF-8.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidData`] if the contents are not UTF-8
    fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        let data = self.read_all(path)?;
        String::from_utf8(data).map_err(|e| FsError::InvalidData {
            path: path.into(),
            details: e.to_string(),
        })
    }

    /// Create or truncate a file and write `data` to it.
    fn write_all(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut file = self.as_ref().open(path, OpenMode::WRITE)?;
        let mut written = 0;
        while written < data.len() {
            let n = file.write(&data[written..])?;
            if n == 0 {
                return Err(FsError::Backend(format!(
                    "short write to {path}: {written} of {} bytes",
                    data.len()
                )));
            }
            written += n;
        }
        file.close()
    }

    /// Entries of a directory, in the order the backend returns them.
    fn list_dir(&self, path: &str) -> Result<Vec<Stat>, FsError> {
        let mut dir = self.as_ref().open(path, OpenMode::READ)?;
        let entries = dir.entries().collect::<Result<Vec<_>, _>>()?;
        dir.close()?;
        Ok(entries)
    }
}

impl AsRef<FsHandle> for FsHandle {
    fn as_ref(&self) -> &FsHandle {
        self
    }
}

// Blanket implementation - anything lending a handle gets FsExt for free
impl<T: AsRef<FsHandle> + ?Sized> FsExt for T {}

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FsExtJson: FsExt {
        /// Read a file and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - `FsError::NotFound` if the file doesn't exist
        /// - `FsError::InvalidData` if the file isn't valid UTF-8
        /// - `FsError::Deserialization` if JSON parsing failed
        fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FsError> {
            let data = self.read_to_string(path)?;
            serde_json::from_str(&data).map_err(|e| FsError::Deserialization(e.to_string()))
        }

        /// Serialize a value and write it as pretty-printed JSON.
        fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<(), FsError> {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| FsError::Serialization(e.to_string()))?;
            self.write_all(path, json.as_bytes())
        }
    }

    impl<B: FsExt + ?Sized> FsExtJson for B {}
}

#[cfg(feature = "serde")]
pub use json::FsExtJson;
