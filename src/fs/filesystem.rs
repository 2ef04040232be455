//! The kernel-facing FUSE adapter.
//!
//! Callbacks arrive on the FUSE dispatch thread. Anything that touches the
//! catalog or the network is spawned onto the tokio runtime with the reply
//! object moved into the task, so the dispatch thread is never blocked for
//! the duration of a database query or a multi-megabyte HTTP fetch.

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::catalog::{Catalog, EntryView};
use crate::config::FuseConfig;
use crate::error::VfsError;
use crate::fs::handle::HandleTable;
use crate::fs::inode::{InodeTable, ROOT_INODE};
use crate::fs::reader::StreamingReader;
use crate::catalog::path::{join_child, parent_of};
use crate::metrics::Metrics;

/// Size reported for files whose true size is still unknown. Many players
/// refuse to open zero-length files, so a large stable placeholder is
/// reported until the real size is learned.
pub const UNKNOWN_SIZE_BYTES: u64 = 1337 * 1024 * 1024;

/// Component C9: the `fuser::Filesystem` implementation.
pub struct DebridFs {
    catalog: Arc<Catalog>,
    inodes: Arc<InodeTable>,
    handles: Arc<HandleTable>,
    reader: Arc<StreamingReader>,
    metrics: Arc<Metrics>,
    entry_ttl: Duration,
    attr_ttl: Duration,
    read_timeout: Duration,
    runtime: tokio::runtime::Handle,
}

impl DebridFs {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<Catalog>,
        inodes: Arc<InodeTable>,
        handles: Arc<HandleTable>,
        reader: Arc<StreamingReader>,
        metrics: Arc<Metrics>,
        fuse: &FuseConfig,
        read_timeout: Duration,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            catalog,
            inodes,
            handles,
            reader,
            metrics,
            entry_ttl: fuse.entry_timeout(),
            attr_ttl: fuse.attr_timeout(),
            read_timeout,
            runtime,
        }
    }

    /// Synthesize kernel attributes from a catalog view.
    fn attr_for(inode: u64, view: &EntryView) -> FileAttr {
        let now = SystemTime::now();
        let uid = unsafe { libc::geteuid() };
        let gid = unsafe { libc::getegid() };

        if view.is_directory {
            FileAttr {
                ino: inode,
                size: 0,
                blocks: 0,
                atime: now,
                mtime: now,
                ctime: now,
                crtime: now,
                kind: FileType::Directory,
                perm: 0o755,
                nlink: 2,
                uid,
                gid,
                rdev: 0,
                flags: 0,
                blksize: 4096,
            }
        } else {
            let size = if view.size == 0 {
                UNKNOWN_SIZE_BYTES
            } else {
                view.size
            };
            FileAttr {
                ino: inode,
                size,
                blocks: size.div_ceil(512),
                atime: now,
                mtime: now,
                ctime: now,
                crtime: now,
                kind: FileType::RegularFile,
                perm: 0o644,
                nlink: 1,
                uid,
                gid,
                rdev: 0,
                flags: 0,
                blksize: 4096,
            }
        }
    }

    fn path_for(&self, inode: u64) -> Option<String> {
        self.inodes.lookup_path(inode)
    }
}

impl Filesystem for DebridFs {
    /// Resolve one name inside a directory. `.` and `..` map to the
    /// directory itself and its parent.
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        let child_path = match name {
            "." => parent_path.clone(),
            ".." => parent_of(&parent_path),
            other => join_child(&parent_path, other),
        };

        debug!(fuse_op = "lookup", parent = parent, name = name, path = %child_path);
        self.metrics.record_lookup();

        let catalog = Arc::clone(&self.catalog);
        let inodes = Arc::clone(&self.inodes);
        let entry_ttl = self.entry_ttl;
        self.runtime.spawn(async move {
            match catalog.get_entry(&child_path).await {
                Ok(Some(view)) => {
                    let inode = inodes.assign(&child_path);
                    reply.entry(&entry_ttl, &Self::attr_for(inode, &view), 0);
                }
                Ok(None) => reply.error(libc::ENOENT),
                Err(e) => {
                    warn!(fuse_op = "lookup", path = %child_path, error = %e, "Lookup failed");
                    reply.error(e.to_errno());
                }
            }
        });
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let catalog = Arc::clone(&self.catalog);
        let attr_ttl = self.attr_ttl;
        self.runtime.spawn(async move {
            match catalog.get_entry(&path).await {
                Ok(Some(view)) => reply.attr(&attr_ttl, &Self::attr_for(ino, &view)),
                Ok(None) => reply.error(libc::ENOENT),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let catalog = Arc::clone(&self.catalog);
        self.runtime.spawn(async move {
            match catalog.get_entry(&path).await {
                Ok(Some(view)) if view.is_directory => reply.opened(ino, 0),
                Ok(Some(_)) => reply.error(libc::ENOTDIR),
                Ok(None) => reply.error(libc::ENOENT),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    /// Enumerate `.`, `..`, then the catalog listing sorted by name.
    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        debug!(fuse_op = "readdir", ino = ino, path = %path, offset = offset);

        let catalog = Arc::clone(&self.catalog);
        let inodes = Arc::clone(&self.inodes);
        self.runtime.spawn(async move {
            let entries = match catalog.list_directory(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    reply.error(e.to_errno());
                    return;
                }
            };

            let parent_ino = inodes
                .lookup_inode(&parent_of(&path))
                .unwrap_or(ROOT_INODE);

            let mut items: Vec<(u64, FileType, String)> = Vec::with_capacity(entries.len() + 2);
            items.push((ino, FileType::Directory, ".".to_string()));
            items.push((parent_ino, FileType::Directory, "..".to_string()));
            for entry in entries {
                let kind = if entry.is_directory {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                let child_ino = inodes.assign(&entry.path);
                items.push((child_ino, kind, entry.name));
            }

            for (idx, (child_ino, kind, name)) in
                items.iter().enumerate().skip(offset as usize)
            {
                if reply.add(*child_ino, (idx + 1) as i64, *kind, name) {
                    break;
                }
            }
            reply.ok();
        });
    }

    /// Open a file for reading. Any write intent is denied up front.
    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            debug!(fuse_op = "open", path = %path, "Write access denied");
            self.metrics.record_error();
            reply.error(libc::EACCES);
            return;
        }

        let catalog = Arc::clone(&self.catalog);
        let handles = Arc::clone(&self.handles);
        self.runtime.spawn(async move {
            match catalog.get_entry(&path).await {
                Ok(Some(view)) if !view.is_directory => {
                    let fh = handles.allocate(&path);
                    debug!(fuse_op = "open", path = %path, fh = fh, "Opened");
                    reply.opened(fh, 0);
                }
                Ok(_) => reply.error(libc::ENOENT),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let Some(handle) = self.handles.get(fh) else {
            debug!(fuse_op = "read", fh = fh, "Unknown handle");
            self.metrics.record_error();
            reply.error(libc::EBADF);
            return;
        };

        let reader = Arc::clone(&self.reader);
        let metrics = Arc::clone(&self.metrics);
        let read_timeout = self.read_timeout;
        let offset = offset as u64;
        self.runtime.spawn(async move {
            match tokio::time::timeout(read_timeout, reader.read(&handle, offset, size)).await {
                Ok(Ok(bytes)) => reply.data(&bytes),
                Ok(Err(e)) => {
                    metrics.record_error();
                    warn!(fuse_op = "read", fh = fh, path = %handle.path, offset = offset,
                          error = %e, "Read failed");
                    reply.error(e.to_errno());
                }
                Err(_) => {
                    metrics.record_error();
                    warn!(fuse_op = "read", fh = fh, path = %handle.path, offset = offset,
                          "Read timed out");
                    reply.error(VfsError::Timeout.to_errno());
                }
            }
        });
    }

    /// Close a handle. Always succeeds; the handle's HTTP client is dropped
    /// with it.
    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(handle) = self.handles.remove(fh) {
            debug!(fuse_op = "release", fh = fh, path = %handle.path, "Released");
        }
        reply.ok();
    }

    /// Read-only tree: writes are denied, reads verified against the catalog.
    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        if mask & libc::W_OK != 0 {
            reply.error(libc::EACCES);
            return;
        }

        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let catalog = Arc::clone(&self.catalog);
        self.runtime.spawn(async move {
            match catalog.exists(&path).await {
                Ok(true) => reply.ok(),
                Ok(false) => reply.error(libc::ENOENT),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn fsync(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    // Structural changes happen only through the internal API; everything
    // the kernel sends is rejected as a read-only filesystem.

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(fuse_op = "unlink", parent = parent, name = ?name, "Denied: read-only");
        reply.error(libc::EROFS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(fuse_op = "rmdir", parent = parent, name = ?name, "Denied: read-only");
        reply.error(libc::EROFS);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(fuse_op = "rename", parent = parent, name = ?name,
               newparent = newparent, newname = ?newname, "Denied: read-only");
        reply.error(libc::EROFS);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!(fuse_op = "mkdir", parent = parent, name = ?name, "Denied: read-only");
        reply.error(libc::EROFS);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!(fuse_op = "create", parent = parent, name = ?name, "Denied: read-only");
        reply.error(libc::EROFS);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(libc::EROFS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn view(path: &str, size: u64, is_directory: bool) -> EntryView {
        EntryView {
            path: path.to_string(),
            name: crate::catalog::path::basename(path).to_string(),
            size,
            is_directory,
            modified: Some(Utc::now()),
        }
    }

    #[test]
    fn test_directory_attr() {
        let attr = DebridFs::attr_for(ROOT_INODE, &view("/", 0, true));
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.size, 0);
    }

    #[test]
    fn test_file_attr() {
        let attr = DebridFs::attr_for(42, &view("/movies/a.mkv", 5000, false));
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.size, 5000);
        assert_eq!(attr.ino, 42);
    }

    #[test]
    fn test_unknown_size_placeholder_is_stable() {
        let a = DebridFs::attr_for(7, &view("/movies/a.mkv", 0, false));
        let b = DebridFs::attr_for(7, &view("/movies/a.mkv", 0, false));
        assert_eq!(a.size, UNKNOWN_SIZE_BYTES);
        assert_eq!(a.size, b.size);
        assert!(a.size >= 1024 * 1024);
    }
}
