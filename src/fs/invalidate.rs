//! Kernel cache invalidation.
//!
//! After a catalog mutation the kernel may still hold cached directory
//! entries and attributes for up to the configured TTLs. The invalidator
//! asks the kernel to forget them so listings update live. Everything here
//! is best-effort: "entry not cached" answers from the kernel are expected
//! and benign.

use fuser::Notifier;
use std::ffi::OsString;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::catalog::path::{basename, parent_of};
use crate::fs::inode::InodeTable;

/// Component C10.
pub struct CacheInvalidator {
    inodes: Arc<InodeTable>,
    notifier: Mutex<Option<Notifier>>,
}

impl CacheInvalidator {
    pub fn new(inodes: Arc<InodeTable>) -> Self {
        Self {
            inodes,
            notifier: Mutex::new(None),
        }
    }

    /// Attach the notifier captured from the live session at mount time.
    pub fn set_notifier(&self, notifier: Notifier) {
        *self.notifier.lock().expect("notifier lock poisoned") = Some(notifier);
    }

    /// Detach on unmount; later invalidations become no-ops.
    pub fn clear_notifier(&self) {
        *self.notifier.lock().expect("notifier lock poisoned") = None;
    }

    /// A file appeared at `path`; `new_parent_inodes` are directories that
    /// were created (and given inodes) as part of the same mutation.
    pub fn file_added(&self, path: &str, new_parent_inodes: &[u64]) {
        let parent = parent_of(path);
        let parent_ino = self.inodes.lookup_inode(&parent);
        let name = OsString::from(basename(path));
        let new_parents = new_parent_inodes.to_vec();
        let path = path.to_string();

        self.dispatch(move |notifier| {
            if let Some(parent_ino) = parent_ino {
                log_outcome(
                    notifier.inval_entry(parent_ino, &name),
                    &path,
                    "entry after add",
                );
            }
            for ino in new_parents {
                log_outcome(
                    notifier.inval_inode(ino, 0, 0),
                    &path,
                    "attrs of created parent",
                );
            }
        });
    }

    /// `path` was removed; `removed_inode` is the inode it held, if it was
    /// ever exposed. Also sweeps two ancestor levels in case pruning deleted
    /// them.
    pub fn entry_removed(&self, path: &str, removed_inode: Option<u64>) {
        let parent = parent_of(path);
        let grandparent = parent_of(&parent);
        let great_grandparent = parent_of(&grandparent);

        let parent_ino = self.inodes.lookup_inode(&parent);
        let grandparent_ino = (parent != "/").then(|| self.inodes.lookup_inode(&grandparent)).flatten();
        let great_grandparent_ino = (grandparent != "/")
            .then(|| self.inodes.lookup_inode(&great_grandparent))
            .flatten();

        let name = OsString::from(basename(path));
        let parent_name = OsString::from(basename(&parent));
        let grandparent_name = OsString::from(basename(&grandparent));
        let path = path.to_string();

        self.dispatch(move |notifier| {
            if let Some(parent_ino) = parent_ino {
                // The deleted hint purges cached dentries pointing at the
                // removed inode; fall back to a plain entry invalidation
                // when the path was never exposed.
                let result = match removed_inode {
                    Some(child) => notifier.delete(parent_ino, child, &name),
                    None => notifier.inval_entry(parent_ino, &name),
                };
                log_outcome(result, &path, "entry after remove");
            }

            // Ancestors may have been pruned with the entry.
            if let (Some(gp), false) = (grandparent_ino, parent_name.is_empty()) {
                log_outcome(
                    notifier.inval_entry(gp, &parent_name),
                    &path,
                    "possibly pruned parent",
                );
            }
            if let (Some(ggp), false) = (great_grandparent_ino, grandparent_name.is_empty()) {
                log_outcome(
                    notifier.inval_entry(ggp, &grandparent_name),
                    &path,
                    "possibly pruned grandparent",
                );
            }
        });
    }

    /// `old` moved to `new`; `old_inode` is the inode the old path held.
    pub fn entry_renamed(&self, old: &str, new: &str, old_inode: Option<u64>) {
        let old_parent_ino = self.inodes.lookup_inode(&parent_of(old));
        let new_parent_ino = self.inodes.lookup_inode(&parent_of(new));
        let old_name = OsString::from(basename(old));
        let new_name = OsString::from(basename(new));
        let old = old.to_string();

        self.dispatch(move |notifier| {
            if let Some(parent_ino) = old_parent_ino {
                let result = match old_inode {
                    Some(child) => notifier.delete(parent_ino, child, &old_name),
                    None => notifier.inval_entry(parent_ino, &old_name),
                };
                log_outcome(result, &old, "old entry after rename");
            }
            if let Some(parent_ino) = new_parent_ino {
                log_outcome(
                    notifier.inval_entry(parent_ino, &new_name),
                    &old,
                    "new entry after rename",
                );
            }
        });
    }

    /// Run a notification job off the mutating caller's critical path. When
    /// no session is mounted this is a no-op.
    fn dispatch(&self, job: impl FnOnce(Notifier) + Send + 'static) {
        let notifier = {
            let guard = self.notifier.lock().expect("notifier lock poisoned");
            guard.clone()
        };
        let Some(notifier) = notifier else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || job(notifier));
            }
            Err(_) => job(notifier),
        }
    }
}

fn log_outcome(result: std::io::Result<()>, path: &str, what: &str) {
    match result {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
            // Kernel never cached it; nothing to invalidate.
            debug!(path = %path, what = what, "Invalidation skipped (not cached)");
        }
        Err(e) => {
            warn!(path = %path, what = what, error = %e, "Cache invalidation failed");
        }
    }
}
