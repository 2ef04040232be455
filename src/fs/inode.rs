//! Inode <-> path mapping.
//!
//! Inodes are process-lifetime: a monotonically increasing counter hands out
//! numbers on first exposure of a path, and a number stays bound to its path
//! until the path is removed or renamed. The root path `/` is pinned to the
//! kernel's well-known root inode.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The kernel's root inode number.
pub const ROOT_INODE: u64 = 1;

/// Component C4: bidirectional inode table.
#[derive(Debug)]
pub struct InodeTable {
    next_inode: AtomicU64,
    inode_to_path: DashMap<u64, String>,
    path_to_inode: DashMap<String, u64>,
}

impl InodeTable {
    pub fn new() -> Self {
        let inode_to_path = DashMap::new();
        let path_to_inode = DashMap::new();
        inode_to_path.insert(ROOT_INODE, "/".to_string());
        path_to_inode.insert("/".to_string(), ROOT_INODE);
        Self {
            next_inode: AtomicU64::new(ROOT_INODE + 1),
            inode_to_path,
            path_to_inode,
        }
    }

    /// Return the inode bound to a path, allocating one on first exposure.
    pub fn assign(&self, path: &str) -> u64 {
        match self.path_to_inode.entry(path.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => *e.get(),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let inode = self.next_inode.fetch_add(1, Ordering::SeqCst);
                e.insert(inode);
                self.inode_to_path.insert(inode, path.to_string());
                inode
            }
        }
    }

    /// Path bound to an inode, if any.
    pub fn lookup_path(&self, inode: u64) -> Option<String> {
        self.inode_to_path.get(&inode).map(|p| p.clone())
    }

    /// Inode bound to a path, if any.
    pub fn lookup_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).map(|i| *i)
    }

    /// Drop the binding for a single path. Returns the inode it held.
    /// The root binding is never dropped.
    pub fn forget(&self, path: &str) -> Option<u64> {
        if path == "/" {
            return None;
        }
        let (_, inode) = self.path_to_inode.remove(path)?;
        self.inode_to_path.remove(&inode);
        Some(inode)
    }

    /// Drop the bindings for a path and everything beneath it. Returns the
    /// inode formerly bound to `path` itself.
    pub fn forget_subtree(&self, path: &str) -> Option<u64> {
        let removed = self.forget(path);
        if path == "/" {
            return None;
        }
        let prefix = format!("{}/", path);
        let descendants: Vec<String> = self
            .path_to_inode
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();
        for descendant in descendants {
            self.forget(&descendant);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
