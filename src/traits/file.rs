//! Operations on an open file or directory.

use std::io::SeekFrom;

use super::unsupported;
use crate::{FileFlag, FsError, Stat};

/// File operations table.
///
/// An open file is owned by exactly one [`FileHandle`](crate::FileHandle), so
/// mutating methods take `&mut self`. Directories are files too: [`scan`](Self::scan)
/// walks their entries and [`lookup`](Self::lookup) opens a child.
pub trait File: Send {
    /// Move the file position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        let _ = pos;
        unsupported("seek")
    }

    /// Read at the current position.
    ///
    /// Returns the number of bytes read; `0` at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let _ = buf;
        unsupported("read")
    }

    /// Write at the current position.
    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        let _ = buf;
        unsupported("write")
    }

    /// Read at `offset` without moving the file position.
    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let _ = (buf, offset);
        unsupported("pread")
    }

    /// Write at `offset` without moving the file position.
    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        let _ = (buf, offset);
        unsupported("pwrite")
    }

    /// Current value of a per-file flag.
    fn get_flag(&self, flag: FileFlag) -> Result<i64, FsError> {
        tracing::debug!(%flag, "get_flag");
        unsupported("get_flag")
    }

    /// Set a per-file flag.
    fn set_flag(&mut self, flag: FileFlag, value: i64) -> Result<(), FsError> {
        tracing::debug!(%flag, value, "set_flag");
        unsupported("set_flag")
    }

    /// Metadata of the open file.
    fn stat(&mut self) -> Result<Stat, FsError> {
        unsupported("stat")
    }

    /// Flush and close. The handle still calls [`release`](Self::release) afterwards.
    fn close(&mut self) -> Result<(), FsError> {
        Ok(())
    }

    /// Whether the position is at end of file.
    fn eof(&self) -> bool {
        false
    }

    /// Open the entry `name` inside this directory.
    fn lookup(&mut self, name: &str) -> Result<Box<dyn File>, FsError> {
        let _ = name;
        unsupported("lookup")
    }

    /// Next directory entry, or `None` at the end.
    fn scan(&mut self) -> Result<Option<Stat>, FsError> {
        Ok(None)
    }

    /// Rewind directory scanning to the first entry.
    fn reset(&mut self) -> Result<(), FsError> {
        unsupported("reset")
    }

    /// Free per-file resources. Called once, after `close`.
    fn release(&mut self) {}
}
