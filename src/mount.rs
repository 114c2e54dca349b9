//! Mount tree with longest-match resolution.
//!
//! ```text
//! /            fsA
//! └── mnt      fsB
//!     └── usb  fsC
//! ```
//!
//! `/mnt/usb/a` resolves to `(fsC, "a")`, `/mnt/x` to `(fsB, "x")`, and anything
//! else to `(fsA, path-without-leading-slash)`. A path with no mounted ancestor
//! is [`FsError::NotFound`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::delegate::resolving_filesystem;
use crate::{BackendKind, FsError, FsHandle};

#[derive(Default)]
struct MountNode {
    fs: Option<FsHandle>,
    children: BTreeMap<String, MountNode>,
}

impl MountNode {
    fn resolve(&self, path: &str) -> Option<(FsHandle, String)> {
        let path = path.trim_start_matches('/');
        let (first, rest) = path.split_once('/').unwrap_or((path, ""));
        if let Some(found) = self
            .children
            .get(first)
            .and_then(|child| child.resolve(rest))
        {
            return Some(found);
        }
        self.fs.as_ref().map(|fs| (fs.clone(), path.to_owned()))
    }

    /// Remove the mount at `components`, pruning nodes left empty.
    fn unmount(&mut self, components: &[&str]) -> Option<FsHandle> {
        let Some((first, rest)) = components.split_first() else {
            return self.fs.take();
        };
        let child = self.children.get_mut(*first)?;
        let removed = child.unmount(rest);
        if child.fs.is_none() && child.children.is_empty() {
            self.children.remove(*first);
        }
        removed
    }

    fn collect(&self, prefix: &str, out: &mut Vec<(String, FsHandle)>) {
        if let Some(fs) = &self.fs {
            let path = if prefix.is_empty() { "/" } else { prefix };
            out.push((path.to_owned(), fs.clone()));
        }
        for (name, child) in &self.children {
            child.collect(&format!("{prefix}/{name}"), out);
        }
    }
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Tree of mount points.
///
/// Each node holds at most one filesystem; mounting over an occupied node
/// releases the previous reference first.
///
/// # Example
///
/// ```rust
/// use switchfs::{Filesystem, FsHandle, MountTree};
///
/// struct Disk;
/// impl Filesystem for Disk {}
///
/// let (root, mnt) = (FsHandle::new(Disk), FsHandle::new(Disk));
/// let tree = MountTree::new();
/// tree.mount("/", root.clone());
/// tree.mount("/mnt", mnt.clone());
///
/// let (fs, rest) = tree.resolve("/mnt/x").unwrap();
/// assert!(fs.ptr_eq(&mnt));
/// assert_eq!(rest, "x");
///
/// let (fs, rest) = tree.resolve("/etc/passwd").unwrap();
/// assert!(fs.ptr_eq(&root));
/// assert_eq!(rest, "etc/passwd");
/// ```
#[derive(Default)]
pub struct MountTree {
    root: RwLock<MountNode>,
}

impl MountTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `fs` at `path`, creating intermediate nodes. `/` mounts on the root.
    pub fn mount(&self, path: &str, fs: FsHandle) {
        tracing::debug!(path, kind = %fs.kind(), "mounting");
        let previous = {
            let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
            let mut node = &mut *root;
            for component in components(path) {
                node = node.children.entry(component.to_owned()).or_default();
            }
            node.fs.replace(fs)
        };
        // Released after the write lock is gone.
        if let Some(previous) = previous {
            tracing::warn!(path, kind = %previous.kind(), "replaced mounted filesystem");
        }
    }

    /// Release the filesystem mounted exactly at `path`.
    ///
    /// Returns `false` if nothing was mounted there.
    pub fn unmount(&self, path: &str) -> bool {
        let removed = self
            .root
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unmount(&components(path));
        match removed {
            Some(fs) => {
                tracing::debug!(path, kind = %fs.kind(), "unmounted");
                true
            }
            None => false,
        }
    }

    /// Mounted paths with their filesystems, in path order.
    pub fn mounts(&self) -> Vec<(String, FsHandle)> {
        let mut out = Vec::new();
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .collect("", &mut out);
        out
    }

    /// Mounted paths, one per line.
    pub fn diagnostics(&self) -> String {
        self.mounts()
            .into_iter()
            .map(|(path, fs)| format!("{path}\t{}\n", fs.kind()))
            .collect()
    }

    /// Deepest mounted filesystem for `path`, and the path below that mount.
    ///
    /// # Errors
    ///
    /// [`FsError::NotFound`] if neither `path` nor any ancestor is mounted.
    pub fn resolve(&self, path: &str) -> Result<(FsHandle, String), FsError> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(path)
            .ok_or_else(|| {
                tracing::debug!(path, "no mount");
                FsError::NotFound {
                    path: PathBuf::from(path),
                }
            })
    }
}

impl fmt::Debug for MountTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<_> = self.mounts().into_iter().map(|(p, _)| p).collect();
        f.debug_struct("MountTree").field("mounts", &paths).finish()
    }
}

resolving_filesystem!(MountTree, BackendKind::MountTree);
