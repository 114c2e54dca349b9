//! # Connection Registries
//!
//! Switches that turn an address into a pooled backend connection.
//!
//! | Type | Behaviour |
//! |------|-----------|
//! | [`Autoconnect`] | Connects on first use, reuses by canonical key |
//! | [`Connector`] | As above, consulting [`PrefixRule`]s first |
//!
//! Both implement [`Filesystem`](crate::Filesystem): names passed to them are
//! full addresses (`9p://srv/tmp/x`, `/etc/passwd`), and each operation runs on
//! the pooled connection with the address path as residual.
//!
//! ```rust
//! use switchfs::{Autoconnect, ConnectArgs, Filesystem, FsError, FsHandle, Stat};
//!
//! struct Remote;
//! impl Filesystem for Remote {
//!     fn stat(&self, name: &str) -> Result<Stat, FsError> {
//!         Ok(Stat::new(name))
//!     }
//! }
//!
//! let switch = Autoconnect::new(|_: &ConnectArgs| Ok::<_, FsError>(FsHandle::new(Remote)));
//! assert_eq!(switch.stat("9p://srv/a").unwrap().name, "a");
//! assert_eq!(switch.stat("9p://srv/b").unwrap().name, "b");
//! assert_eq!(switch.list_connections(), vec!["9p://srv/"]);
//! ```

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::delegate::resolving_filesystem;
use crate::{ARG_PATH, Address, BackendFactory, BackendKind, ConnectArgs, FsError, FsHandle};

/// Pool of live connections keyed by canonical address.
///
/// Holds one reference per pooled connection; they are released when the pool
/// is dropped.
pub struct ConnectionPool {
    factory: Box<dyn BackendFactory>,
    connections: Mutex<Vec<(String, FsHandle)>>,
}

impl ConnectionPool {
    /// Empty pool creating connections through `factory`.
    pub fn new(factory: impl BackendFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Pooled connection for `address`, connecting on a miss.
    ///
    /// The factory receives the address arguments with `path` cleared.
    pub fn connect(&self, address: &Address) -> Result<FsHandle, FsError> {
        let key = address.canonical_key();
        if let Some(fs) = self.pooled(&key) {
            tracing::trace!(%key, "reusing connection");
            return Ok(fs);
        }

        // Connect without holding the lock.
        let mut args = ConnectArgs::from_address(address);
        args.remove(ARG_PATH);
        tracing::debug!(%key, "opening new connection");
        let fs = self.factory.connect(&args)?;

        let mut connections = self.lock();
        if let Some((_, existing)) = connections.iter().find(|(k, _)| *k == key) {
            tracing::debug!(%key, "connection raced; keeping the pooled one");
            return Ok(existing.clone());
        }
        connections.push((key, fs.clone()));
        Ok(fs)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, FsHandle)>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn pooled(&self, key: &str) -> Option<FsHandle> {
        self.lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, fs)| fs.clone())
    }

    /// Parse `text` and return its connection plus the residual path
    /// (`/` when the address has none).
    pub fn resolve(&self, text: &str) -> Result<(FsHandle, String), FsError> {
        let address = Address::parse(text)?;
        let fs = self.connect(&address)?;
        let residual = address.path_or_root().to_owned();
        Ok((fs, residual))
    }

    /// Canonical keys of the pooled connections, oldest first.
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of pooled connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pooled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the pool's reference to the connection under `key`.
    pub fn disconnect(&self, key: &str) -> bool {
        let removed = {
            let mut connections = self.lock();
            let position = connections.iter().position(|(k, _)| k == key);
            position.map(|i| connections.remove(i))
        };
        removed.is_some()
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.keys())
            .finish()
    }
}

/// Newline-separated list of keys, for operators.
fn diagnostics(keys: &[String]) -> String {
    let mut out = String::with_capacity(keys.iter().map(|k| k.len() + 1).sum());
    for key in keys {
        out.push_str(key);
        out.push('\n');
    }
    out
}

/// Registry that connects on demand.
#[derive(Debug)]
pub struct Autoconnect {
    pool: ConnectionPool,
}

impl Autoconnect {
    /// New registry with an empty pool.
    pub fn new(factory: impl BackendFactory + 'static) -> Self {
        Self {
            pool: ConnectionPool::new(factory),
        }
    }

    /// Connection and residual path for an address.
    pub fn resolve(&self, address: &str) -> Result<(FsHandle, String), FsError> {
        self.pool.resolve(address)
    }

    /// Canonical keys of the pooled connections.
    pub fn list_connections(&self) -> Vec<String> {
        self.pool.keys()
    }

    /// Pooled keys, one per line.
    pub fn diagnostics(&self) -> String {
        diagnostics(&self.list_connections())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

resolving_filesystem!(Autoconnect, BackendKind::Autoconnect);

/// Address prefix rule consulted by a [`Connector`].
///
/// Only the prefix takes part in matching. The replacement is kept with the rule
/// but not applied to the address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrefixRule {
    /// Text the original address must start with.
    pub prefix: String,
    /// Replacement text for the matched prefix.
    pub replacement: String,
}

impl PrefixRule {
    /// New rule.
    pub fn new(prefix: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            replacement: replacement.into(),
        }
    }

    /// Whether `address` starts with this rule's prefix.
    pub fn matches(&self, address: &str) -> bool {
        address.starts_with(&self.prefix)
    }
}

/// Registry with an ordered list of prefix rules.
///
/// Before connecting, the first rule whose prefix matches the address text is
/// reported. Resolution then proceeds exactly as for [`Autoconnect`].
#[derive(Debug)]
pub struct Connector {
    pool: ConnectionPool,
    rules: RwLock<Vec<PrefixRule>>,
}

impl Connector {
    /// New registry with no rules.
    pub fn new(factory: impl BackendFactory + 'static) -> Self {
        Self {
            pool: ConnectionPool::new(factory),
            rules: RwLock::new(Vec::new()),
        }
    }

    /// Builder form of [`add_rule`](Self::add_rule).
    pub fn with_rule(self, rule: PrefixRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Append a rule; earlier rules win.
    pub fn add_rule(&self, rule: PrefixRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rule);
    }

    /// Current rules in order.
    pub fn rules(&self) -> Vec<PrefixRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First rule matching `address`, if any.
    pub fn matching_rule(&self, address: &str) -> Option<PrefixRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|rule| rule.matches(address))
            .cloned()
    }

    /// Connection and residual path for an address.
    pub fn resolve(&self, address: &str) -> Result<(FsHandle, String), FsError> {
        if let Some(rule) = self.matching_rule(address) {
            tracing::warn!(
                address,
                prefix = %rule.prefix,
                replacement = %rule.replacement,
                "prefix rule matched; address used unchanged"
            );
        }
        self.pool.resolve(address)
    }

    /// Canonical keys of the pooled connections.
    pub fn list_connections(&self) -> Vec<String> {
        self.pool.keys()
    }

    /// Pooled keys, one per line.
    pub fn diagnostics(&self) -> String {
        diagnostics(&self.list_connections())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

resolving_filesystem!(Connector, BackendKind::Connector);

/// Pooled connection keys of a registry handle, or `None` for other backends.
pub fn connections_of(fs: &FsHandle) -> Option<Vec<String>> {
    match fs.kind() {
        BackendKind::Autoconnect => fs.downcast_ref::<Autoconnect>().map(Autoconnect::list_connections),
        BackendKind::Connector => fs.downcast_ref::<Connector>().map(Connector::list_connections),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Filesystem, OpenMode, Stat};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    impl Filesystem for Echo {
        fn stat(&self, name: &str) -> Result<Stat, FsError> {
            Ok(Stat::new(name))
        }
    }

    fn counting_factory(calls: Arc<AtomicUsize>) -> impl BackendFactory + 'static {
        move |args: &ConnectArgs| -> Result<FsHandle, FsError> {
            assert_eq!(args.get(ARG_PATH), None);
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(FsHandle::new(Echo))
        }
    }

    #[test]
    fn same_key_connects_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let switch = Autoconnect::new(counting_factory(calls.clone()));

        let (a, path_a) = switch.resolve("9p://u:s@srv:564/a/b").unwrap();
        let (b, path_b) = switch.resolve("9p://u:s@srv:564/other").unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(path_a, "a/b");
        assert_eq!(path_b, "other");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        switch.resolve("9p://srv:564/a/b").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            switch.list_connections(),
            vec!["9p://u:s@srv:564/", "9p://srv:564/"]
        );
        assert_eq!(switch.diagnostics(), "9p://u:s@srv:564/\n9p://srv:564/\n");
    }

    #[test]
    fn residual_defaults_to_root() {
        let switch = Autoconnect::new(counting_factory(Arc::new(AtomicUsize::new(0))));
        let (_, path) = switch.resolve("9p://srv").unwrap();
        assert_eq!(path, "/");
        let (_, path) = switch.resolve("/etc/passwd").unwrap();
        assert_eq!(path, "/etc/passwd");
    }

    #[test]
    fn operations_delegate_with_residual() {
        let switch = Autoconnect::new(counting_factory(Arc::new(AtomicUsize::new(0))));
        assert_eq!(switch.stat("fish://me@box/home/me").unwrap().name, "home/me");
        assert!(matches!(
            switch.unlink("fish://me@box/home/me"),
            Err(FsError::NotSupported { .. })
        ));
        assert!(matches!(
            switch.open("fish://me@box/x", OpenMode::READ),
            Err(FsError::NotSupported { .. })
        ));
        assert_eq!(switch.pool().len(), 1);
    }

    #[test]
    fn failures_are_not_pooled() {
        let switch = Autoconnect::new(|_: &ConnectArgs| -> Result<FsHandle, FsError> {
            Err(FsError::Backend("connection refused".into()))
        });
        assert!(matches!(
            switch.stat("9p://down/x"),
            Err(FsError::Backend(_))
        ));
        assert!(matches!(
            switch.stat("relative"),
            Err(FsError::Parse { .. })
        ));
        assert!(switch.pool().is_empty());
    }

    #[test]
    fn pooled_lookup_not_blocked_by_slow_connect() {
        use crate::ARG_HOST;
        use std::sync::mpsc;

        let (entered_tx, entered_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let go_rx = Mutex::new(go_rx);
        let switch = Arc::new(Autoconnect::new(
            move |args: &ConnectArgs| -> Result<FsHandle, FsError> {
                if args.get(ARG_HOST) == Some("slow") {
                    entered_tx.send(()).unwrap();
                    go_rx.lock().unwrap().recv().unwrap();
                }
                Ok(FsHandle::new(Echo))
            },
        ));

        let (fast, _) = switch.resolve("9p://fast/y").unwrap();
        let slow = {
            let switch = switch.clone();
            std::thread::spawn(move || switch.resolve("9p://slow/x").map(|(fs, _)| fs))
        };
        entered_rx.recv().unwrap();

        let (again, rest) = switch.resolve("9p://fast/z").unwrap();
        assert!(again.ptr_eq(&fast));
        assert_eq!(rest, "z");
        assert_eq!(switch.list_connections(), vec!["9p://fast/"]);

        go_tx.send(()).unwrap();
        slow.join().unwrap().unwrap();
        assert_eq!(switch.list_connections(), vec!["9p://fast/", "9p://slow/"]);
    }

    #[test]
    fn pool_releases_on_drop() {
        let switch = Autoconnect::new(counting_factory(Arc::new(AtomicUsize::new(0))));
        let (fs, _) = switch.resolve("9p://srv/x").unwrap();
        assert_eq!(fs.ref_count(), 2);
        assert!(switch.pool().disconnect("9p://srv/"));
        assert_eq!(fs.ref_count(), 1);
        assert!(!switch.pool().disconnect("9p://srv/"));
    }

    #[test]
    fn connector_matches_first_rule_without_rewriting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let connector = Connector::new(counting_factory(calls.clone()))
            .with_rule(PrefixRule::new("9p://srv/home", "fish://me@box/"))
            .with_rule(PrefixRule::new("9p://srv", "9p://mirror/"));

        let rule = connector.matching_rule("9p://srv/home/me").unwrap();
        assert_eq!(rule.replacement, "fish://me@box/");
        assert_eq!(
            connector.matching_rule("9p://srv/tmp").unwrap().prefix,
            "9p://srv"
        );
        assert!(connector.matching_rule("/tmp").is_none());

        let (_, path) = connector.resolve("9p://srv/home/me").unwrap();
        assert_eq!(path, "home/me");
        assert_eq!(connector.list_connections(), vec!["9p://srv/"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connections_of_downcasts() {
        let switch = FsHandle::new(Autoconnect::new(counting_factory(Arc::new(
            AtomicUsize::new(0),
        ))));
        switch.stat("9p://srv/x").unwrap();
        assert_eq!(connections_of(&switch), Some(vec!["9p://srv/".to_owned()]));
        assert_eq!(connections_of(&FsHandle::new(Echo)), None);
    }
}
