//! Host filesystem driver.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{
    ARG_CHROOT, BackendKind, ConnectArgs, File, Filesystem, FsError, OpenMode, Stat,
    SymlinkTarget,
};

fn ctime(meta: &fs::Metadata) -> SystemTime {
    u64::try_from(meta.ctime())
        .map(|secs| UNIX_EPOCH + Duration::new(secs, meta.ctime_nsec().clamp(0, 999_999_999) as u32))
        .unwrap_or(UNIX_EPOCH)
}

fn stat_from(name: &str, meta: &fs::Metadata) -> Stat {
    Stat {
        name: name.to_owned(),
        owner: meta.uid().to_string(),
        group: meta.gid().to_string(),
        mode: meta.mode(),
        size: meta.size(),
        atime: meta.accessed().unwrap_or(UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(UNIX_EPOCH),
        ctime: ctime(meta),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_owned())
}

fn parse_id(id: &str) -> Result<Option<u32>, FsError> {
    if id.is_empty() {
        return Ok(None);
    }
    id.parse().map(Some).map_err(|_| FsError::NotSupported {
        operation: "chown by name",
    })
}

/// Local host filesystem.
///
/// Names are taken relative to a root directory (`/` unless configured), with or
/// without a leading slash, so residual paths from a mount tree work unchanged.
/// Owners and groups are reported and accepted as numeric ids.
#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl Default for HostFs {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFs {
    /// Driver rooted at `/`.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    /// Driver rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from connection arguments, honouring `chroot`.
    pub fn from_args(args: &ConnectArgs) -> Result<Self, FsError> {
        match args.get(ARG_CHROOT) {
            Some(root) if !root.is_empty() => {
                let root = PathBuf::from(root);
                if !root.is_dir() {
                    return Err(FsError::NotADirectory { path: root });
                }
                Ok(Self::with_root(root))
            }
            _ => Ok(Self::new()),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

impl Filesystem for HostFs {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn File>, FsError> {
        let path = self.host_path(name);
        let file = fs::OpenOptions::new()
            .read(mode.read || !mode.write)
            .write(mode.write && !mode.append)
            .append(mode.append)
            .create(mode.create)
            .truncate(mode.truncate)
            .open(&path)
            .map_err(|e| FsError::io("open", &path, e))?;
        tracing::trace!(path = %path.display(), "opened host file");
        Ok(Box::new(HostFile::new(file, path)))
    }

    fn stat(&self, name: &str) -> Result<Stat, FsError> {
        let path = self.host_path(name);
        let meta = fs::metadata(&path).map_err(|e| FsError::io("stat", &path, e))?;
        Ok(stat_from(&base_name(&path), &meta))
    }

    fn unlink(&self, name: &str) -> Result<(), FsError> {
        let path = self.host_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(_) if path.is_dir() => {
                fs::remove_dir(&path).map_err(|e| FsError::io("unlink", &path, e))
            }
            Err(e) => Err(FsError::io("unlink", &path, e)),
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let from = self.host_path(from);
        fs::rename(&from, self.host_path(to)).map_err(|e| FsError::io("rename", &from, e))
    }

    fn chmod(&self, name: &str, mode: u32) -> Result<(), FsError> {
        let path = self.host_path(name);
        fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| FsError::io("chmod", &path, e))
    }

    fn chown(&self, name: &str, owner: &str, group: &str) -> Result<(), FsError> {
        let path = self.host_path(name);
        std::os::unix::fs::chown(&path, parse_id(owner)?, parse_id(group)?)
            .map_err(|e| FsError::io("chown", &path, e))
    }

    fn mkdir(&self, name: &str, mode: u32) -> Result<(), FsError> {
        let path = self.host_path(name);
        tracing::debug!(path = %path.display(), mode, "mkdir");
        fs::DirBuilder::new()
            .mode(mode)
            .create(&path)
            .map_err(|e| FsError::io("mkdir", &path, e))
    }

    fn symlink(&self, target: &str, name: &str) -> Result<(), FsError> {
        let path = self.host_path(name);
        std::os::unix::fs::symlink(target, &path).map_err(|e| FsError::io("symlink", &path, e))
    }

    fn readlink(&self, name: &str) -> Result<SymlinkTarget, FsError> {
        let path = self.host_path(name);
        let target = fs::read_link(&path).map_err(|e| FsError::io("readlink", &path, e))?;
        SymlinkTarget::new(target.to_string_lossy())
    }

    fn release(&self) {
        tracing::debug!(root = %self.root.display(), "host filesystem released");
    }
}

/// Open host file or directory.
struct HostFile {
    file: fs::File,
    path: PathBuf,
    dir: Option<fs::ReadDir>,
    at_eof: bool,
}

impl HostFile {
    fn new(file: fs::File, path: PathBuf) -> Self {
        Self {
            file,
            path,
            dir: None,
            at_eof: false,
        }
    }

    fn io(&self, operation: &'static str, error: std::io::Error) -> FsError {
        FsError::io(operation, &self.path, error)
    }
}

impl File for HostFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.at_eof = false;
        self.file.seek(pos).map_err(|e| self.io("seek", e))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let n = self.file.read(buf).map_err(|e| self.io("read", e))?;
        self.at_eof = n == 0 && !buf.is_empty();
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        self.file.write(buf).map_err(|e| self.io("write", e))
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        self.file.read_at(buf, offset).map_err(|e| self.io("pread", e))
    }

    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        self.file.write_at(buf, offset).map_err(|e| self.io("pwrite", e))
    }

    fn stat(&mut self) -> Result<Stat, FsError> {
        let meta = self.file.metadata().map_err(|e| self.io("stat", e))?;
        Ok(stat_from(&base_name(&self.path), &meta))
    }

    fn close(&mut self) -> Result<(), FsError> {
        self.dir = None;
        self.file.flush().map_err(|e| self.io("close", e))
    }

    fn eof(&self) -> bool {
        self.at_eof
    }

    fn lookup(&mut self, name: &str) -> Result<Box<dyn File>, FsError> {
        let path = self.path.join(name.trim_start_matches('/'));
        let file = fs::File::open(&path).map_err(|e| FsError::io("lookup", &path, e))?;
        Ok(Box::new(HostFile::new(file, path)))
    }

    fn scan(&mut self) -> Result<Option<Stat>, FsError> {
        if self.dir.is_none() {
            let dir = fs::read_dir(&self.path).map_err(|e| self.io("scan", e))?;
            self.dir = Some(dir);
        }
        let Some(dir) = self.dir.as_mut() else {
            return Ok(None);
        };
        for entry in dir.by_ref() {
            let entry = entry.map_err(|e| FsError::io("scan", &self.path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            let meta = fs::metadata(entry.path())
                .or_else(|_| entry.metadata())
                .map_err(|e| FsError::io("scan", entry.path(), e))?;
            return Ok(Some(stat_from(&name, &meta)));
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<(), FsError> {
        self.dir = None;
        Ok(())
    }
}
