//! Lightweight operation counters.
//!
//! Process-wide atomics updated from the FUSE task pool and the read path.
//! There is no external metrics surface; the counters feed the shutdown
//! summary and ad-hoc debugging.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    lookups: AtomicU64,
    reads: AtomicU64,
    bytes_served: AtomicU64,
    buffer_hits: AtomicU64,
    http_requests: AtomicU64,
    url_resolutions: AtomicU64,
    url_cache_hits: AtomicU64,
    errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_buffer_hit(&self) {
        self.buffer_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_url_resolution(&self) {
        self.url_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_url_cache_hit(&self) {
        self.url_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn http_requests(&self) -> u64 {
        self.http_requests.load(Ordering::Relaxed)
    }

    pub fn buffer_hits(&self) -> u64 {
        self.buffer_hits.load(Ordering::Relaxed)
    }

    pub fn url_resolutions(&self) -> u64 {
        self.url_resolutions.load(Ordering::Relaxed)
    }

    /// Log a one-line summary of the counters, used at unmount.
    pub fn log_summary(&self) {
        tracing::info!(
            lookups = self.lookups.load(Ordering::Relaxed),
            reads = self.reads.load(Ordering::Relaxed),
            bytes_served = self.bytes_served.load(Ordering::Relaxed),
            buffer_hits = self.buffer_hits.load(Ordering::Relaxed),
            http_requests = self.http_requests.load(Ordering::Relaxed),
            url_resolutions = self.url_resolutions.load(Ordering::Relaxed),
            url_cache_hits = self.url_cache_hits.load(Ordering::Relaxed),
            errors = self.errors.load(Ordering::Relaxed),
            "Session metrics"
        );
    }
}
