//! The virtual filesystem facade.
//!
//! [`DebridVfs`] owns every component: the catalog, the inode and handle
//! tables, the streaming reader, and the mounted FUSE session. The kernel
//! sees a read-only tree; all structural changes go through the mutation API
//! here, which keeps the catalog, the inode table, and the kernel caches in
//! step.

use fuser::MountOption;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::catalog::path::{normalize, parent_of};
use crate::catalog::{Catalog, EntryView, RenameOverrides};
use crate::config::Config;
use crate::error::{VfsError, VfsResult};
use crate::fs::{CacheInvalidator, DebridFs, HandleTable, InodeTable, StreamingReader};
use crate::http::RangeFetcher;
use crate::metrics::Metrics;
use crate::mount;
use crate::providers::ProviderRegistry;
use crate::resolver::UrlResolver;

/// How long `close` waits for the dispatch thread before giving up on it.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct MountedSession {
    mountpoint: PathBuf,
    unmounter: fuser::SessionUnmounter,
    dispatch: std::thread::JoinHandle<std::io::Result<()>>,
}

/// The assembled virtual filesystem (component C11 plus the internal API).
pub struct DebridVfs {
    config: Config,
    catalog: Arc<Catalog>,
    inodes: Arc<InodeTable>,
    handles: Arc<HandleTable>,
    reader: Arc<StreamingReader>,
    invalidator: Arc<CacheInvalidator>,
    metrics: Arc<Metrics>,
    session: Mutex<Option<MountedSession>>,
}

impl DebridVfs {
    /// Build the filesystem: connect the catalog (creating the schema and
    /// default roots) and wire the read path. Nothing is mounted yet.
    pub async fn new(config: Config, providers: ProviderRegistry) -> VfsResult<Self> {
        config.validate()?;

        let metrics = Arc::new(Metrics::new());
        let catalog = Arc::new(Catalog::connect(&config.database.url).await?);
        let providers = Arc::new(providers);
        let resolver = Arc::new(UrlResolver::new(
            Arc::clone(&catalog),
            Arc::clone(&providers),
            Arc::clone(&metrics),
        ));
        let fetcher = RangeFetcher::new(config.http.clone());
        let reader = Arc::new(StreamingReader::new(
            Arc::clone(&catalog),
            resolver,
            fetcher,
            config.streaming.clone(),
            Arc::clone(&metrics),
        ));
        let inodes = Arc::new(InodeTable::new());
        let invalidator = Arc::new(CacheInvalidator::new(Arc::clone(&inodes)));

        if config.streaming.max_concurrent_requests_per_file > 1 {
            info!(
                max = config.streaming.max_concurrent_requests_per_file,
                serialized = config.streaming.enable_request_serialization,
                "Per-file request limits above 1 are advisory; serialization is binary"
            );
        }

        Ok(Self {
            config,
            catalog,
            inodes,
            handles: Arc::new(HandleTable::new()),
            reader,
            invalidator,
            metrics,
            session: Mutex::new(None),
        })
    }

    /// Mount the filesystem and start the kernel dispatch loop on a worker
    /// thread. Must be called from within a tokio runtime; the dispatch
    /// thread hands blocking work back to it.
    pub fn mount(&self) -> VfsResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| VfsError::Mount("mount requires a running tokio runtime".into()))?;

        let mut guard = self.session.lock().expect("session lock poisoned");
        if guard.is_some() {
            return Err(VfsError::Mount("filesystem is already mounted".into()));
        }

        let mountpoint = self.absolute_mountpoint();
        mount::prepare_mountpoint(&mountpoint)
            .map_err(|e| VfsError::Mount(format!("failed to prepare mountpoint: {e}")))?;

        let mut options = vec![
            MountOption::FSName(self.config.mount.fs_name.clone()),
            MountOption::AllowOther,
            MountOption::RO,
            MountOption::NoAtime,
            MountOption::AutoUnmount,
        ];
        if self.config.mount.debug_fuse {
            options.push(MountOption::CUSTOM("debug".to_string()));
        }

        let fs = DebridFs::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.inodes),
            Arc::clone(&self.handles),
            Arc::clone(&self.reader),
            Arc::clone(&self.metrics),
            &self.config.fuse,
            self.config.streaming.read_timeout(),
            runtime,
        );

        let mut session = fuser::Session::new(fs, &mountpoint, &options)
            .map_err(|e| VfsError::Mount(format!("failed to mount at {}: {e}", mountpoint.display())))?;

        self.invalidator.set_notifier(session.notifier());
        let unmounter = session.unmount_callable();

        let dispatch = std::thread::Builder::new()
            .name("fuse-dispatch".to_string())
            .spawn(move || session.run())
            .map_err(|e| VfsError::Mount(format!("failed to spawn dispatch thread: {e}")))?;

        *guard = Some(MountedSession {
            mountpoint: mountpoint.clone(),
            unmounter,
            dispatch,
        });

        info!(mountpoint = %mountpoint.display(), fs_name = %self.config.mount.fs_name,
              "Filesystem mounted");
        Ok(())
    }

    /// Unmount and tear the session down. Safe to call more than once; all
    /// teardown errors are logged and swallowed.
    pub fn close(&self) {
        let Some(mut mounted) = self
            .session
            .lock()
            .expect("session lock poisoned")
            .take()
        else {
            return;
        };

        info!(mountpoint = %mounted.mountpoint.display(), "Unmounting filesystem");
        self.invalidator.clear_notifier();

        if let Err(e) = mounted.unmounter.unmount() {
            warn!(error = %e, "Graceful unmount request failed");
        }

        let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
        while !mounted.dispatch.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        if mounted.dispatch.is_finished() {
            match mounted.dispatch.join() {
                Ok(Ok(())) => debug!("Dispatch loop exited cleanly"),
                Ok(Err(e)) => warn!(error = %e, "Dispatch loop exited with error"),
                Err(_) => warn!("Dispatch thread panicked"),
            }
        } else {
            warn!("Dispatch thread did not exit in time; detaching");
        }

        mount::final_unmount(&mounted.mountpoint);
        mount::remove_mountpoint_if_empty(&mounted.mountpoint);
        self.metrics.log_summary();
    }

    fn absolute_mountpoint(&self) -> PathBuf {
        let configured = &self.config.mount.mount_point;
        if configured.is_absolute() {
            configured.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(configured))
                .unwrap_or_else(|_| configured.clone())
        }
    }

    // === Internal mutation API ===

    /// Add a virtual file, creating missing parent directories. An existing
    /// row at the path is updated in place.
    pub async fn add_file(
        &self,
        path: &str,
        url: &str,
        size: Option<u64>,
        provider: Option<&str>,
        provider_download_id: Option<&str>,
    ) -> VfsResult<bool> {
        let path = normalize(path);
        self.catalog
            .add_file(
                &path,
                Some(url),
                size.unwrap_or(0),
                provider,
                provider_download_id,
            )
            .await?;

        self.inodes.assign(&path);
        let new_parents = self.expose_parent_chain(&path);
        self.invalidator.file_added(&path, &new_parents);

        info!(path = %path, provider = ?provider, "Added virtual file");
        Ok(true)
    }

    /// Expose a row that was inserted out-of-band: bind inodes and refresh
    /// kernel caches without touching the catalog.
    pub async fn register_existing_file(&self, path: &str) -> VfsResult<bool> {
        let path = normalize(path);
        if !self.catalog.exists(&path).await? {
            warn!(path = %path, "Cannot register non-existent file");
            return Ok(false);
        }

        self.inodes.assign(&path);
        let new_parents = self.expose_parent_chain(&path);
        self.invalidator.file_added(&path, &new_parents);

        info!(path = %path, "Registered existing file");
        Ok(true)
    }

    /// Move a file or directory (descendants included) to a new path.
    pub async fn rename_file(&self, old_path: &str, new_path: &str) -> VfsResult<bool> {
        let old_path = normalize(old_path);
        let new_path = normalize(new_path);

        if !self
            .catalog
            .rename(&old_path, &new_path, RenameOverrides::default())
            .await?
        {
            warn!(old = %old_path, new = %new_path, "Rename failed: source missing");
            return Ok(false);
        }

        let old_inode = self.inodes.forget_subtree(&old_path);
        self.inodes.assign(&new_path);
        let new_parents = self.expose_parent_chain(&new_path);

        self.invalidator
            .entry_renamed(&old_path, &new_path, old_inode);
        self.invalidator.file_added(&new_path, &new_parents);

        debug!(old = %old_path, new = %new_path, "Renamed virtual file");
        Ok(true)
    }

    /// Remove a path and everything beneath it, pruning empty ancestors.
    pub async fn remove_file(&self, path: &str) -> VfsResult<bool> {
        let path = normalize(path);
        if path == "/" {
            return Ok(false);
        }

        let removed_inode = self.inodes.forget_subtree(&path);
        let removed = self.catalog.remove(&path).await?;

        if removed {
            self.invalidator.entry_removed(&path, removed_inode);
            info!(path = %path, "Removed virtual file");
        }
        Ok(removed)
    }

    /// Check whether a virtual path exists.
    pub async fn file_exists(&self, path: &str) -> VfsResult<bool> {
        self.catalog.exists(path).await
    }

    /// Entry metadata for a virtual path.
    pub async fn get_file_info(&self, path: &str) -> VfsResult<Option<EntryView>> {
        self.catalog.get_entry(path).await
    }

    /// List a virtual directory, sorted by name.
    pub async fn list_directory(&self, path: &str) -> VfsResult<Vec<EntryView>> {
        self.catalog.list_directory(path).await
    }

    /// The underlying catalog, for embedding applications that insert rows
    /// out-of-band (see [`register_existing_file`](Self::register_existing_file)).
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Inodes newly assigned for parent directories that were not exposed to
    /// the kernel before this mutation.
    fn expose_parent_chain(&self, path: &str) -> Vec<u64> {
        let mut new_parents = Vec::new();
        let mut parent = parent_of(path);
        while parent != "/" && self.inodes.lookup_inode(&parent).is_none() {
            new_parents.push(self.inodes.assign(&parent));
            parent = parent_of(&parent);
        }
        new_parents
    }
}

impl Drop for DebridVfs {
    fn drop(&mut self) {
        self.close();
    }
}
