//! # debrid-fuse
//!
//! A read-only FUSE filesystem that makes remote, provider-hosted media
//! files appear as ordinary files in a local directory tree, streaming their
//! bytes on demand via HTTP range requests.
//!
//! ## Overview
//!
//! Media players open paths like `/movies/Foo (2020)/foo.mkv` that do not
//! exist on disk. The kernel's read syscalls are translated into HTTP range
//! fetches against a debrid-style provider (Real-Debrid, AllDebrid, TorBox,
//! Premiumize): the persistent catalog maps the virtual path to a restricted
//! URL, the provider adapter resolves it into a time-limited unrestricted
//! URL, and a per-handle readahead buffer turns small sequential kernel
//! reads into a few large range requests with seek-friendly latency.
//!
//! ```text
//! kernel read ──> FUSE dispatch ──> handle buffer ──┬─ hit ──> bytes
//!                                                   └─ miss ─> URL cache / resolver
//!                                                              └─> HTTP range GET
//! ```
//!
//! ## Key behaviors
//!
//! - **Read-only to the kernel**: `rm`, `mv`, `mkdir` and friends fail with
//!   `EROFS`; all structural changes go through [`DebridVfs`]'s mutation API.
//! - **Lazy URL resolution**: unrestricted URLs are cached with a TTL and
//!   refreshed once per read when the remote side answers 403/404/410 or
//!   redirects a mid-file range request to a full response.
//! - **Live listings**: catalog mutations push kernel cache invalidations so
//!   new and removed entries appear without waiting for TTL expiry.
//! - **Crash-tolerant mounting**: stale mounts from a dead process are
//!   unmounted before remounting.
//!
//! ## Usage
//!
//! ```ignore
//! use debrid_fuse::{Config, DebridVfs, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let vfs = DebridVfs::new(config, ProviderRegistry::new()).await?;
//!     vfs.mount()?;
//!     vfs.add_file(
//!         "/movies/example.mkv",
//!         "https://real-debrid.com/d/ABC123",
//!         Some(1_073_741_824),
//!         Some("realdebrid"),
//!         Some("ABC123"),
//!     )
//!     .await?;
//!     tokio::signal::ctrl_c().await?;
//!     vfs.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] - persistent path -> entry table and path normalization
//! - [`providers`] - provider adapters and the registry
//! - [`resolver`] - restricted -> unrestricted URL resolution
//! - [`http`] - HTTP range fetching
//! - [`fs`] - inode/handle tables, the read path, and the FUSE adapter
//! - [`mount`] - mountpoint preparation and unmount helpers
//! - [`vfs`] - the assembled filesystem and its mutation API
//! - [`config`] - layered configuration
//! - [`error`] - the unified error type with errno mapping
//! - [`metrics`] - operation counters

pub mod catalog;
pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod metrics;
pub mod mount;
pub mod providers;
pub mod resolver;
pub mod vfs;

pub use catalog::{Catalog, EntryView};
pub use config::Config;
pub use error::{VfsError, VfsResult};
pub use metrics::Metrics;
pub use providers::{ProviderAdapter, ProviderKind, ProviderRegistry, ResolvedLink};
pub use vfs::DebridVfs;

use tracing::info;

/// Run the filesystem until interrupted.
///
/// Builds the VFS, mounts it, and blocks until SIGINT/SIGTERM, then tears
/// the mount down. This is the whole lifecycle the CLI binary uses; library
/// consumers that need to mutate the tree hold on to a [`DebridVfs`] instead.
pub async fn run(config: Config, providers: ProviderRegistry) -> anyhow::Result<()> {
    let vfs = DebridVfs::new(config, providers).await?;
    vfs.mount()?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    vfs.close();
    Ok(())
}
