//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use debrid_fuse::catalog::Catalog;
use debrid_fuse::config::{HttpConfig, StreamingConfig};
use debrid_fuse::fs::{HandleTable, StreamingReader};
use debrid_fuse::http::RangeFetcher;
use debrid_fuse::metrics::Metrics;
use debrid_fuse::providers::{ProviderAdapter, ProviderKind, ProviderRegistry, ResolvedLink};
use debrid_fuse::resolver::UrlResolver;

/// An in-memory catalog with the default roots in place.
pub async fn test_catalog() -> Arc<Catalog> {
    Arc::new(Catalog::connect("sqlite::memory:").await.unwrap())
}

/// A scripted provider adapter: hands out the queued links in order,
/// repeating the last one, and counts invocations.
pub struct StubProvider {
    links: Mutex<VecDeque<ResolvedLink>>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn returning(links: Vec<ResolvedLink>) -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(links.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn link(url: &str, size: u64) -> ResolvedLink {
        ResolvedLink {
            download_url: url.to_string(),
            name: "file".to_string(),
            size,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubProvider {
    async fn resolve_link(&self, _restricted_url: &str) -> anyhow::Result<Option<ResolvedLink>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut links = self.links.lock().unwrap();
        if links.len() > 1 {
            Ok(links.pop_front())
        } else {
            Ok(links.front().cloned())
        }
    }
}

/// A registry with one Real-Debrid stub registered.
pub fn registry_with(stub: Arc<StubProvider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::RealDebrid, stub);
    registry
}

pub struct ReadFixture {
    pub catalog: Arc<Catalog>,
    pub reader: Arc<StreamingReader>,
    pub handles: HandleTable,
    pub metrics: Arc<Metrics>,
}

/// Assemble the read path against an in-memory catalog.
pub async fn read_fixture(registry: ProviderRegistry, readahead_mb: u64) -> ReadFixture {
    let catalog = test_catalog().await;
    let metrics = Arc::new(Metrics::new());
    let resolver = Arc::new(UrlResolver::new(
        Arc::clone(&catalog),
        Arc::new(registry),
        Arc::clone(&metrics),
    ));
    let streaming = StreamingConfig {
        readahead_buffer_mb: readahead_mb,
        ..StreamingConfig::default()
    };
    let reader = Arc::new(StreamingReader::new(
        Arc::clone(&catalog),
        resolver,
        RangeFetcher::new(HttpConfig::default()),
        streaming,
        Arc::clone(&metrics),
    ));

    ReadFixture {
        catalog,
        reader,
        handles: HandleTable::new(),
        metrics,
    }
}

/// Deterministic body bytes for the absolute range `[offset, offset + len)`,
/// so any slice can be checked against the offsets it claims to hold.
pub fn pattern_at(offset: usize, len: usize) -> Vec<u8> {
    (offset..offset + len).map(|i| (i % 251) as u8).collect()
}
