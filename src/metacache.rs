//! # Metadata Cache
//!
//! [`MetaCache`] wraps any [`FsHandle`] and serves repeated `stat` calls from a
//! TTL-bounded map.
//!
//! ## Freshness
//!
//! An entry answers `stat` while `now - refreshed < ttl` and it holds a record.
//! Failed lookups and invalidated paths store "no record", so the next `stat`
//! always reaches the backend.
//!
//! ## Invalidation
//!
//! | Operation | Cleared before delegating |
//! |-----------|---------------------------|
//! | `unlink`, `chmod`, `chown`, `mkdir`, `symlink` | the path |
//! | `rename` | both paths |
//! | `open` for writing, file `write`/`pwrite` | the file's path |
//!
//! Directory scans refresh `dir/name` for every entry they return.
//!
//! Entries are overwritten in place and never evicted; memory grows with the
//! number of distinct paths touched. [`MetaCache::invalidate_all`] empties the map.

use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::{
    BackendKind, File, FileFlag, FileHandle, Filesystem, FsError, FsHandle, Layer, OpenMode,
    Stat, SymlinkTarget,
};

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Time source for freshness checks.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// ```rust
/// use switchfs::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(6));
/// assert_eq!(clock.now() - start, Duration::from_secs(6));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetaCacheConfig {
    /// How long a stored record stays fresh.
    pub ttl: Duration,
}

impl MetaCacheConfig {
    /// Set the freshness window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for MetaCacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

#[derive(Debug)]
struct CacheEntry {
    stat: Option<Stat>,
    refreshed: Instant,
}

struct CacheState {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheState {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, path: &str) -> Option<Stat> {
        let now = self.clock.now();
        let entries = self.entries();
        let entry = entries.get(path)?;
        if now.saturating_duration_since(entry.refreshed) < self.ttl {
            entry.stat.clone()
        } else {
            None
        }
    }

    fn store(&self, path: &str, stat: Option<Stat>) {
        let refreshed = self.clock.now();
        self.entries()
            .insert(path.to_owned(), CacheEntry { stat, refreshed });
    }

    fn invalidate(&self, path: &str) {
        tracing::trace!(path, "invalidating cached stat");
        self.store(path, None);
    }

    fn stat_with(
        &self,
        path: &str,
        fetch: impl FnOnce() -> Result<Stat, FsError>,
    ) -> Result<Stat, FsError> {
        if let Some(stat) = self.lookup(path) {
            tracing::debug!(path, "stat cache hit");
            return Ok(stat);
        }
        tracing::debug!(path, "stat cache miss");
        let result = fetch();
        self.store(path, result.as_ref().ok().cloned());
        result
    }
}

fn child_path(parent: &str, name: &str) -> String {
    let mut path = String::with_capacity(parent.len() + name.len() + 1);
    path.push_str(parent);
    if !parent.ends_with('/') {
        path.push('/');
    }
    path.push_str(name);
    path
}

/// Stat-caching decorator over another filesystem.
///
/// # Example
///
/// ```rust
/// use switchfs::{Filesystem, FsError, FsHandle, LayerExt, MetaCacheLayer, Stat};
///
/// struct Slow;
/// impl Filesystem for Slow {
///     fn stat(&self, name: &str) -> Result<Stat, FsError> {
///         Ok(Stat::new(name))
///     }
/// }
///
/// let cached = FsHandle::new(FsHandle::new(Slow).layer(MetaCacheLayer::new()));
/// assert_eq!(cached.stat("a").unwrap().name, "a");
/// ```
pub struct MetaCache {
    inner: FsHandle,
    state: Arc<CacheState>,
}

impl MetaCache {
    /// Cache over `inner` with default settings.
    pub fn new(inner: FsHandle) -> Self {
        Self::with_config(inner, MetaCacheConfig::default())
    }

    /// Cache over `inner` with explicit settings.
    pub fn with_config(inner: FsHandle, config: MetaCacheConfig) -> Self {
        Self::with_clock(inner, config, Arc::new(SystemClock))
    }

    /// Cache over `inner` reading time from `clock`.
    pub fn with_clock(inner: FsHandle, config: MetaCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            state: Arc::new(CacheState {
                ttl: config.ttl,
                clock,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The wrapped filesystem.
    pub fn inner(&self) -> &FsHandle {
        &self.inner
    }

    /// Freshness window in use.
    pub fn ttl(&self) -> Duration {
        self.state.ttl
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.state.entries().clear();
    }

    /// Drop the record for one path.
    pub fn invalidate(&self, path: &str) {
        self.state.invalidate(path);
    }

    /// Paths that currently hold a record, fresh or stale, sorted.
    pub fn cached_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state
            .entries()
            .iter()
            .filter(|(_, entry)| entry.stat.is_some())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }
}

impl fmt::Debug for MetaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaCache")
            .field("inner", &self.inner)
            .field("ttl", &self.state.ttl)
            .field("entries", &self.state.entries().len())
            .finish()
    }
}

impl Filesystem for MetaCache {
    fn kind(&self) -> BackendKind {
        BackendKind::MetaCache
    }

    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn File>, FsError> {
        if mode.write || mode.truncate || mode.append {
            self.state.invalidate(name);
        }
        let file = self.inner.open(name, mode)?;
        Ok(Box::new(CachedFile {
            inner: file,
            path: name.to_owned(),
            state: self.state.clone(),
        }))
    }

    fn stat(&self, name: &str) -> Result<Stat, FsError> {
        self.state.stat_with(name, || self.inner.stat(name))
    }

    fn unlink(&self, name: &str) -> Result<(), FsError> {
        self.state.invalidate(name);
        self.inner.unlink(name)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        self.state.invalidate(from);
        self.state.invalidate(to);
        self.inner.rename(from, to)
    }

    fn chmod(&self, name: &str, mode: u32) -> Result<(), FsError> {
        self.state.invalidate(name);
        self.inner.chmod(name, mode)
    }

    fn chown(&self, name: &str, owner: &str, group: &str) -> Result<(), FsError> {
        self.state.invalidate(name);
        self.inner.chown(name, owner, group)
    }

    fn mkdir(&self, name: &str, mode: u32) -> Result<(), FsError> {
        self.state.invalidate(name);
        self.inner.mkdir(name, mode)
    }

    fn symlink(&self, target: &str, name: &str) -> Result<(), FsError> {
        self.state.invalidate(name);
        self.inner.symlink(target, name)
    }

    fn readlink(&self, name: &str) -> Result<SymlinkTarget, FsError> {
        self.inner.readlink(name)
    }

    fn release(&self) {
        tracing::debug!(entries = self.state.entries().len(), "releasing metadata cache");
    }
}

/// [`Layer`] producing a [`MetaCache`].
pub struct MetaCacheLayer {
    config: MetaCacheConfig,
    clock: Arc<dyn Clock>,
}

impl MetaCacheLayer {
    /// Default settings and the system clock.
    pub fn new() -> Self {
        Self::with_config(MetaCacheConfig::default())
    }

    /// Explicit settings and the system clock.
    pub fn with_config(config: MetaCacheConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for MetaCacheLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer<FsHandle> for MetaCacheLayer {
    type Backend = MetaCache;

    fn layer(self, backend: FsHandle) -> MetaCache {
        MetaCache::with_clock(backend, self.config, self.clock)
    }
}

/// Open file on a [`MetaCache`]; I/O goes straight to the backend file.
struct CachedFile {
    inner: FileHandle,
    path: String,
    state: Arc<CacheState>,
}

impl File for CachedFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.inner.seek(pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        self.state.invalidate(&self.path);
        self.inner.write(buf)
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        self.inner.pread(buf, offset)
    }

    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        self.state.invalidate(&self.path);
        self.inner.pwrite(buf, offset)
    }

    fn get_flag(&self, flag: FileFlag) -> Result<i64, FsError> {
        File::get_flag(&self.inner, flag)
    }

    fn set_flag(&mut self, flag: FileFlag, value: i64) -> Result<(), FsError> {
        self.inner.set_flag(flag, value)
    }

    fn stat(&mut self) -> Result<Stat, FsError> {
        let inner = &mut self.inner;
        self.state.stat_with(&self.path, || inner.stat())
    }

    fn close(&mut self) -> Result<(), FsError> {
        File::close(&mut self.inner)
    }

    fn eof(&self) -> bool {
        self.inner.eof()
    }

    fn lookup(&mut self, name: &str) -> Result<Box<dyn File>, FsError> {
        let child = self.inner.lookup(name)?;
        Ok(Box::new(CachedFile {
            inner: child,
            path: child_path(&self.path, name),
            state: self.state.clone(),
        }))
    }

    fn scan(&mut self) -> Result<Option<Stat>, FsError> {
        let entry = self.inner.scan()?;
        if let Some(stat) = &entry {
            self.state
                .store(&child_path(&self.path, &stat.name), Some(stat.clone()));
        }
        Ok(entry)
    }

    fn reset(&mut self) -> Result<(), FsError> {
        self.inner.reset()
    }
}
