//! Integration tests exercising the switches together.
//!
//! These tests verify that:
//! 1. Registries connect once per canonical key and route by residual path
//! 2. The metadata cache serves, expires and invalidates stat records
//! 3. Mount trees resolve to the deepest mount
//! 4. Handle reference counts track open files and release backends exactly once
//! 5. Switches nest: a mount tree over a cache over a registry behaves as one filesystem

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchfs::*;

// =============================================================================
// In-memory backend with call counters
// =============================================================================

#[derive(Default)]
struct Counters {
    stats: AtomicUsize,
    opens: AtomicUsize,
    released: AtomicUsize,
}

#[derive(Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    modes: BTreeMap<String, u32>,
    links: BTreeMap<String, String>,
}

/// Flat in-memory filesystem. Paths are normalised by dropping leading slashes,
/// so `"/a"` and `"a"` name the same file.
struct MemFs {
    tree: Arc<Mutex<Tree>>,
    counters: Arc<Counters>,
}

fn key(name: &str) -> String {
    name.trim_start_matches('/').trim_end_matches('/').to_owned()
}

fn not_found(name: &str) -> FsError {
    FsError::NotFound { path: name.into() }
}

impl MemFs {
    fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let mut tree = Tree::default();
        tree.dirs.insert(String::new());
        let fs = Self {
            tree: Arc::new(Mutex::new(tree)),
            counters: counters.clone(),
        };
        (fs, counters)
    }

    fn with_file(self, name: &str, data: &[u8]) -> Self {
        self.tree
            .lock()
            .unwrap()
            .files
            .insert(key(name), data.to_vec());
        self
    }

    fn with_dir(self, name: &str) -> Self {
        self.tree.lock().unwrap().dirs.insert(key(name));
        self
    }

    fn children(tree: &Tree, dir: &str) -> Vec<Stat> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let direct = |path: &String| {
            path.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_owned)
        };
        let mut out: Vec<Stat> = tree
            .files
            .iter()
            .filter_map(|(path, data)| {
                direct(path).map(|name| Stat {
                    mode: S_IFREG | 0o644,
                    size: data.len() as u64,
                    ..Stat::new(name)
                })
            })
            .chain(tree.dirs.iter().filter_map(|path| {
                direct(path).map(|name| Stat {
                    mode: S_IFDIR | 0o755,
                    ..Stat::new(name)
                })
            }))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl Filesystem for MemFs {
    fn kind(&self) -> BackendKind {
        BackendKind::Custom("mem")
    }

    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn File>, FsError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let path = key(name);
        let mut tree = self.tree.lock().unwrap();
        if tree.dirs.contains(&path) {
            let entries = Self::children(&tree, &path);
            return Ok(Box::new(MemDir { entries, next: 0 }));
        }
        let data = match tree.files.get(&path) {
            Some(_) if mode.truncate => Vec::new(),
            Some(data) => data.clone(),
            None if mode.create => {
                tree.files.insert(path.clone(), Vec::new());
                Vec::new()
            }
            None => return Err(not_found(name)),
        };
        Ok(Box::new(MemFile {
            tree: self.tree.clone(),
            path,
            data,
            pos: 0,
            dirty: mode.truncate,
        }))
    }

    fn stat(&self, name: &str) -> Result<Stat, FsError> {
        self.counters.stats.fetch_add(1, Ordering::SeqCst);
        let path = key(name);
        let tree = self.tree.lock().unwrap();
        let extra = tree.modes.get(&path).copied();
        if let Some(data) = tree.files.get(&path) {
            return Ok(Stat {
                mode: S_IFREG | extra.unwrap_or(0o644),
                size: data.len() as u64,
                ..Stat::new(path)
            });
        }
        if tree.dirs.contains(&path) {
            return Ok(Stat {
                mode: S_IFDIR | extra.unwrap_or(0o755),
                ..Stat::new(path)
            });
        }
        if tree.links.contains_key(&path) {
            return Ok(Stat {
                mode: S_IFLNK | 0o777,
                ..Stat::new(path)
            });
        }
        Err(not_found(name))
    }

    fn unlink(&self, name: &str) -> Result<(), FsError> {
        let path = key(name);
        let mut tree = self.tree.lock().unwrap();
        let removed = tree.files.remove(&path).is_some()
            || tree.links.remove(&path).is_some()
            || tree.dirs.remove(&path);
        if removed { Ok(()) } else { Err(not_found(name)) }
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let mut tree = self.tree.lock().unwrap();
        let data = tree.files.remove(&key(from)).ok_or_else(|| not_found(from))?;
        tree.files.insert(key(to), data);
        Ok(())
    }

    fn chmod(&self, name: &str, mode: u32) -> Result<(), FsError> {
        let path = key(name);
        let mut tree = self.tree.lock().unwrap();
        if !tree.files.contains_key(&path) && !tree.dirs.contains(&path) {
            return Err(not_found(name));
        }
        tree.modes.insert(path, mode & 0o7777);
        Ok(())
    }

    fn mkdir(&self, name: &str, _mode: u32) -> Result<(), FsError> {
        let path = key(name);
        let mut tree = self.tree.lock().unwrap();
        if !tree.dirs.insert(path.clone()) {
            return Err(FsError::AlreadyExists {
                path: path.into(),
                operation: "mkdir",
            });
        }
        Ok(())
    }

    fn symlink(&self, target: &str, name: &str) -> Result<(), FsError> {
        self.tree
            .lock()
            .unwrap()
            .links
            .insert(key(name), target.to_owned());
        Ok(())
    }

    fn readlink(&self, name: &str) -> Result<SymlinkTarget, FsError> {
        let tree = self.tree.lock().unwrap();
        let target = tree.links.get(&key(name)).ok_or_else(|| not_found(name))?;
        SymlinkTarget::new(target.as_str())
    }

    fn release(&self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemFile {
    tree: Arc<Mutex<Tree>>,
    path: String,
    data: Vec<u8>,
    pos: usize,
    dirty: bool,
}

impl File for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.pos = match pos {
            SeekFrom::Start(n) => n as usize,
            SeekFrom::End(d) => (self.data.len() as i64 + d) as usize,
            SeekFrom::Current(d) => (self.pos as i64 + d) as usize,
        };
        Ok(self.pos as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let n = buf.len().min(rest.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        let end = self.pos + buf.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        self.dirty = true;
        Ok(buf.len())
    }

    fn stat(&mut self) -> Result<Stat, FsError> {
        Ok(Stat {
            mode: S_IFREG | 0o644,
            size: self.data.len() as u64,
            ..Stat::new(self.path.as_str())
        })
    }

    fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn close(&mut self) -> Result<(), FsError> {
        if self.dirty {
            self.tree
                .lock()
                .unwrap()
                .files
                .insert(self.path.clone(), std::mem::take(&mut self.data));
            self.dirty = false;
        }
        Ok(())
    }
}

struct MemDir {
    entries: Vec<Stat>,
    next: usize,
}

impl File for MemDir {
    fn scan(&mut self) -> Result<Option<Stat>, FsError> {
        let entry = self.entries.get(self.next).cloned();
        self.next += 1;
        Ok(entry)
    }

    fn reset(&mut self) -> Result<(), FsError> {
        self.next = 0;
        Ok(())
    }
}

fn cached(inner: FsHandle, clock: &Arc<ManualClock>) -> FsHandle {
    let clock: Arc<dyn Clock> = clock.clone();
    FsHandle::new(MetaCache::with_clock(
        inner,
        MetaCacheConfig::default(),
        clock,
    ))
}

// =============================================================================
// Tests: Address parsing
// =============================================================================

#[test]
fn address_round_trips_through_display() {
    for text in [
        "9p://user:secret@host:564/a/b",
        "fish://root@box/etc",
        "9p://host:564/",
        "local:///tmp/x",
    ] {
        let parsed = Address::parse(text).unwrap();
        assert_eq!(parsed.to_string(), text);
        assert_eq!(Address::parse(&parsed.to_string()).unwrap(), parsed);
    }
}

#[test]
fn canonical_key_ignores_path() {
    let a = Address::parse("9p://srv:564/a").unwrap();
    let b = Address::parse("9p://srv:564/b/c").unwrap();
    assert_eq!(a.canonical_key(), b.canonical_key());
    assert_eq!(a.canonical_key(), "9p://srv:564/");
}

#[test]
fn malformed_addresses_report_their_defect() {
    let kind = |text: &str| Address::parse(text).unwrap_err().code();
    assert_eq!(kind("nothing"), ErrorCode::Parse(ParseError::MissingScheme));
    assert_eq!(kind("://x"), ErrorCode::Parse(ParseError::EmptyScheme));
    assert_eq!(kind("9p:host"), ErrorCode::Parse(ParseError::MissingSlashSlash));
    assert_eq!(kind("9p://host:"), ErrorCode::Parse(ParseError::Incomplete));
}

// =============================================================================
// Tests: Connection registries
// =============================================================================

#[test]
fn autoconnect_reuses_connection_per_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let switch = Autoconnect::new(move |_: &ConnectArgs| {
        seen.fetch_add(1, Ordering::SeqCst);
        let (fs, _) = MemFs::new();
        Ok::<_, FsError>(FsHandle::new(fs.with_file("a", b"1").with_file("b", b"2")))
    });

    let (first, rest) = switch.resolve("9p://host:564/a").unwrap();
    assert_eq!(rest, "a");
    let (second, rest) = switch.resolve("9p://host:564/b").unwrap();
    assert_eq!(rest, "b");

    assert!(first.ptr_eq(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(switch.list_connections(), vec!["9p://host:564/"]);

    switch.resolve("9p://other/a").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn autoconnect_routes_operations_by_address() {
    let switch = FsHandle::new(Autoconnect::new(|_: &ConnectArgs| {
        let (fs, _) = MemFs::new();
        Ok::<_, FsError>(FsHandle::new(fs.with_file("motd", b"hello")))
    }));

    assert_eq!(switch.read_to_string("mem://box/motd").unwrap(), "hello");
    switch.write_all("mem://box/new", b"fresh").unwrap();
    assert_eq!(switch.read_all("mem://box/new").unwrap(), b"fresh");
    assert!(matches!(
        switch.stat("mem://box/missing"),
        Err(FsError::NotFound { .. })
    ));
    assert_eq!(
        connections_of(&switch).unwrap(),
        vec!["mem://box/".to_owned()]
    );
}

#[test]
fn scheme_registry_backs_autoconnect() {
    let mut schemes = SchemeRegistry::new();
    schemes.register("mem", |_: &ConnectArgs| {
        let (fs, _) = MemFs::new();
        Ok::<_, FsError>(FsHandle::new(fs.with_file("x", b"y")))
    });
    let switch = FsHandle::new(Autoconnect::new(schemes));

    assert_eq!(switch.read_all("mem://h/x").unwrap(), b"y");
    assert!(matches!(
        switch.stat("nfs://h/x"),
        Err(FsError::UnknownScheme { .. })
    ));
}

#[test]
fn connector_reports_matching_rule_and_still_connects() {
    let connector = Connector::new(|_: &ConnectArgs| {
        let (fs, _) = MemFs::new();
        Ok::<_, FsError>(FsHandle::new(fs.with_file("f", b"")))
    })
    .with_rule(PrefixRule::new("9p://old/", "9p://new/"));

    let (_, rest) = connector.resolve("9p://old/f").unwrap();
    assert_eq!(rest, "f");
    assert_eq!(connector.list_connections(), vec!["9p://old/"]);
    assert!(connector.matching_rule("9p://old/f").is_some());
    assert!(connector.matching_rule("9p://new/f").is_none());
}

// =============================================================================
// Tests: Metadata cache
// =============================================================================

#[test]
fn stat_is_served_from_cache_until_ttl() {
    let (mem, counters) = MemFs::new();
    let clock = Arc::new(ManualClock::new());
    let fs = cached(FsHandle::new(mem.with_file("f", b"abc")), &clock);

    assert_eq!(fs.stat("f").unwrap().size, 3);
    clock.advance(Duration::from_secs(4));
    assert_eq!(fs.stat("f").unwrap().size, 3);
    assert_eq!(counters.stats.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(1));
    fs.stat("f").unwrap();
    assert_eq!(counters.stats.load(Ordering::SeqCst), 2);
}

#[test]
fn mutations_invalidate_cached_stat() {
    let (mem, counters) = MemFs::new();
    let clock = Arc::new(ManualClock::new());
    let fs = cached(FsHandle::new(mem.with_file("f", b"abc")), &clock);

    assert_eq!(fs.stat("f").unwrap().permissions(), 0o644);
    fs.chmod("f", 0o600).unwrap();
    assert_eq!(fs.stat("f").unwrap().permissions(), 0o600);
    assert_eq!(counters.stats.load(Ordering::SeqCst), 2);

    fs.unlink("f").unwrap();
    assert!(matches!(fs.stat("f"), Err(FsError::NotFound { .. })));
}

#[test]
fn writes_through_cache_refresh_size() {
    let (mem, _) = MemFs::new();
    let clock = Arc::new(ManualClock::new());
    let fs = cached(FsHandle::new(mem.with_file("f", b"abc")), &clock);

    assert_eq!(fs.file_size("f").unwrap(), 3);
    fs.write_all("f", b"longer contents").unwrap();
    assert_eq!(fs.file_size("f").unwrap(), 15);
}

#[test]
fn cache_layer_stacks_on_handle() {
    let (mem, counters) = MemFs::new();
    let fs = FsHandle::new(mem.with_dir("d").with_file("d/x", b"1"))
        .wrap(MetaCacheLayer::with_config(
            MetaCacheConfig::default().with_ttl(Duration::from_secs(60)),
        ));
    assert_eq!(fs.kind(), BackendKind::MetaCache);

    let names: Vec<_> = fs.list_dir("d").unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["x"]);
    assert!(fs.is_file("d/x").unwrap());
    assert_eq!(counters.stats.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Tests: Mount tree
// =============================================================================

#[test]
fn mount_tree_resolves_deepest_mount() {
    let (a, _) = MemFs::new();
    let (b, _) = MemFs::new();
    let (fs_a, fs_b) = (FsHandle::new(a), FsHandle::new(b));
    let tree = MountTree::new();
    tree.mount("/", fs_a.clone());
    tree.mount("/mnt", fs_b.clone());

    let (fs, rest) = tree.resolve("/mnt/x").unwrap();
    assert!(fs.ptr_eq(&fs_b));
    assert_eq!(rest, "x");

    let (fs, rest) = tree.resolve("/etc/passwd").unwrap();
    assert!(fs.ptr_eq(&fs_a));
    assert_eq!(rest, "etc/passwd");
}

#[test]
fn mount_tree_operations_reach_mounted_backend() {
    let (a, _) = MemFs::new();
    let (b, _) = MemFs::new();
    let tree = FsHandle::new(MountTree::new());
    let mounts = tree.downcast_ref::<MountTree>().unwrap();
    mounts.mount("/", FsHandle::new(a.with_file("etc/hosts", b"127.0.0.1")));
    mounts.mount("/mnt", FsHandle::new(b));

    tree.mkdir("/mnt/d", 0o755).unwrap();
    tree.write_all("/mnt/d/f", b"data").unwrap();
    assert_eq!(tree.read_all("/mnt/d/f").unwrap(), b"data");
    assert!(!tree.exists("/d/f").unwrap());
    assert_eq!(tree.read_to_string("/etc/hosts").unwrap(), "127.0.0.1");

    tree.symlink("/etc/hosts", "/mnt/link").unwrap();
    assert_eq!(tree.readlink("/mnt/link").unwrap().as_str(), "/etc/hosts");
    assert!(matches!(
        tree.rename("/mnt/d/f", "/etc/f"),
        Err(FsError::NotSupported { .. })
    ));
}

// =============================================================================
// Tests: Reference counting
// =============================================================================

#[test]
fn open_file_holds_filesystem_reference() {
    let (mem, counters) = MemFs::new();
    let fs = FsHandle::new(mem.with_file("f", b"abc"));
    assert_eq!(fs.ref_count(), 1);

    let mut file = fs.open("f", OpenMode::READ).unwrap();
    assert_eq!(fs.ref_count(), 2);
    drop(fs);
    assert_eq!(counters.released.load(Ordering::SeqCst), 0);

    let mut buf = String::new();
    file.read_to_string(&mut buf).unwrap();
    assert_eq!(buf, "abc");
    file.close().unwrap();
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[test]
fn backend_released_once_across_layers() {
    let (mem, counters) = MemFs::new();
    let base = FsHandle::new(mem);
    let tree = MountTree::new();
    tree.mount("/a", base.clone());
    tree.mount("/b", base.clone());
    let cache = FsHandle::new(MetaCache::new(base.clone()));
    assert_eq!(base.ref_count(), 4);

    drop(base);
    drop(cache);
    assert_eq!(counters.released.load(Ordering::SeqCst), 0);
    tree.unmount("/a");
    drop(tree);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[test]
fn file_handle_speaks_std_io() {
    let (mem, _) = MemFs::new();
    let fs = FsHandle::new(mem);
    {
        let mut file = fs.open("log", OpenMode::WRITE).unwrap();
        writeln!(file, "line one").unwrap();
        writeln!(file, "line two").unwrap();
    }
    let mut file = fs.open("log", OpenMode::READ).unwrap();
    assert_eq!(file.read_to_end().unwrap(), b"line one\nline two\n");
    assert!(file.eof());
}

// =============================================================================
// Tests: Composition
// =============================================================================

#[test]
fn mount_over_cache_over_registry() {
    let connects = Arc::new(AtomicUsize::new(0));
    let stats = Arc::new(Mutex::new(Vec::<Arc<Counters>>::new()));
    let (seen, backends) = (connects.clone(), stats.clone());
    let registry = FsHandle::new(Autoconnect::new(move |args: &ConnectArgs| {
        seen.fetch_add(1, Ordering::SeqCst);
        assert!(args.get(ARG_PATH).is_none());
        let (fs, counters) = MemFs::new();
        backends.lock().unwrap().push(counters);
        Ok::<_, FsError>(FsHandle::new(fs.with_file("data", b"remote")))
    }));

    let (local, _) = MemFs::new();
    let tree = MountTree::new();
    tree.mount("/", FsHandle::new(local.with_file("etc/motd", b"local")));
    tree.mount("/net", registry.wrap(MetaCacheLayer::new()));
    let root = FsHandle::new(tree);

    assert_eq!(root.read_to_string("/etc/motd").unwrap(), "local");
    assert_eq!(root.read_to_string("/net/9p://srv/data").unwrap(), "remote");
    assert_eq!(root.file_size("/net/9p://srv/data").unwrap(), 6);
    assert_eq!(root.file_size("/net/9p://srv/data").unwrap(), 6);

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    let backends = stats.lock().unwrap();
    assert_eq!(backends[0].stats.load(Ordering::SeqCst), 1);
}
