//! The streaming read path.
//!
//! Serves kernel reads from the per-handle readahead buffer when possible,
//! otherwise fetches a block of at least the readahead size around the
//! requested range over HTTP. URL resolutions are shared process-wide
//! through a TTL cache so every handle on a path benefits from one
//! resolution; in-flight HTTP requests are serialized per path by default.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::config::StreamingConfig;
use crate::error::{VfsError, VfsResult};
use crate::fs::handle::{OpenHandle, ReadBuffer};
use crate::http::{RangeFetcher, RangeOutcome};
use crate::metrics::Metrics;
use crate::resolver::UrlResolver;

/// Components C7 + C8: the read algorithm with its URL cache and per-path
/// lock map.
pub struct StreamingReader {
    catalog: Arc<Catalog>,
    resolver: Arc<UrlResolver>,
    fetcher: RangeFetcher,
    url_cache: moka::sync::Cache<String, String>,
    request_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    streaming: StreamingConfig,
    metrics: Arc<Metrics>,
}

impl StreamingReader {
    pub fn new(
        catalog: Arc<Catalog>,
        resolver: Arc<UrlResolver>,
        fetcher: RangeFetcher,
        streaming: StreamingConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let url_cache = moka::sync::Cache::builder()
            .time_to_live(streaming.url_cache_ttl())
            .build();
        Self {
            catalog,
            resolver,
            fetcher,
            url_cache,
            request_locks: DashMap::new(),
            streaming,
            metrics,
        }
    }

    /// Read up to `size` bytes at `offset` through the given handle.
    ///
    /// Returns fewer bytes than requested only at EOF. A catalog row that
    /// vanished mid-read surfaces as [`VfsError::NoSuchEntry`].
    pub async fn read(&self, handle: &OpenHandle, offset: u64, size: u32) -> VfsResult<Bytes> {
        let path = handle.path.as_str();

        let row = self
            .catalog
            .fetch_row(path)
            .await?
            .ok_or_else(|| VfsError::NoSuchEntry(path.to_string()))?;
        if row.is_directory {
            return Err(VfsError::NoSuchEntry(path.to_string()));
        }
        let file_size = row.size();

        if size == 0 || (file_size > 0 && offset >= file_size) {
            return Ok(Bytes::new());
        }

        let url = self.cached_url(path).await?;

        // Serialize in-flight HTTP requests per path when configured. The
        // lock is taken before the buffer check so a concurrent handle's
        // fetch completes first and the check sees its fresh window.
        let lock = self.request_lock(path);
        let _serialized = if self.streaming.enable_request_serialization {
            Some(lock.lock().await)
        } else {
            None
        };

        let mut state = handle.state.lock().await;

        let mut request_end = offset + size as u64 - 1;
        if file_size > 0 {
            request_end = request_end.min(file_size - 1);
        }

        if state.buffer.covers(offset, request_end) {
            self.metrics.record_buffer_hit();
            return Ok(state.buffer.slice(offset, request_end));
        }

        // Buffer miss: fetch at least the readahead window starting at the
        // requested offset.
        let fetch_start = offset;
        let fetch_len = (request_end - offset + 1).max(self.streaming.readahead_bytes());
        let mut fetch_end = fetch_start + fetch_len - 1;
        if file_size > 0 {
            fetch_end = fetch_end.min(file_size - 1);
        }

        let client = match state.client.clone() {
            Some(client) => client,
            None => {
                let client = self.fetcher.build_client()?;
                state.client = Some(client.clone());
                client
            }
        };

        let data = self
            .fetch_with_refresh(path, &client, url, fetch_start, fetch_end)
            .await?;

        state.buffer = ReadBuffer {
            start: fetch_start,
            end: fetch_start + data.len() as u64,
            data,
        };

        let available_end = state.buffer.end.saturating_sub(1);
        if state.buffer.data.is_empty() || offset > available_end {
            return Ok(Bytes::new());
        }
        let end = request_end.min(available_end);
        let result = state.buffer.slice(offset, end);
        self.metrics.record_read(result.len() as u64);
        debug!(path = %path, offset = offset, bytes = result.len(), "Read served");
        Ok(result)
    }

    /// Fetch a block, refreshing the URL and retrying once when the remote
    /// side signals a stale link (403/404/410/redirected-200) or fails at
    /// the transport level.
    async fn fetch_with_refresh(
        &self,
        path: &str,
        client: &reqwest::Client,
        mut url: String,
        start: u64,
        end: u64,
    ) -> VfsResult<Bytes> {
        const MAX_ATTEMPTS: u32 = 2;

        for attempt in 0..MAX_ATTEMPTS {
            self.metrics.record_http_request();
            match self.fetcher.get(client, &url, start, end).await {
                Ok(RangeOutcome::Data(bytes)) => return Ok(bytes),
                Ok(RangeOutcome::Empty) => return Ok(Bytes::new()),
                Ok(RangeOutcome::StaleUrl(status)) => {
                    warn!(path = %path, status = status, attempt = attempt,
                          "Range request rejected; URL may be stale");
                    if attempt + 1 < MAX_ATTEMPTS {
                        if let Some(fresh) = self.refresh_url(path).await? {
                            url = fresh;
                            continue;
                        }
                    }
                    return Err(VfsError::Io(format!(
                        "range request for {path} failed with status {status} after URL refresh"
                    )));
                }
                Err(e) if e.is_refreshable() && attempt + 1 < MAX_ATTEMPTS => {
                    warn!(path = %path, error = %e, attempt = attempt,
                          "Range request failed; refreshing URL");
                    match self.refresh_url(path).await? {
                        Some(fresh) if fresh != url => {
                            url = fresh;
                            continue;
                        }
                        _ => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(VfsError::Io(format!("range request for {path} exhausted retries")))
    }

    /// URL for a path, from the TTL cache or a fresh resolution.
    async fn cached_url(&self, path: &str) -> VfsResult<String> {
        if let Some(url) = self.url_cache.get(path) {
            self.metrics.record_url_cache_hit();
            return Ok(url);
        }
        let url = self
            .resolver
            .resolve(path, true, false)
            .await?
            .ok_or_else(|| VfsError::NoSuchEntry(path.to_string()))?;
        self.url_cache.insert(path.to_string(), url.clone());
        debug!(path = %path, "URL cache refreshed");
        Ok(url)
    }

    /// Evict the cached URL and force a provider resolution. At most one
    /// refresh happens per read call.
    async fn refresh_url(&self, path: &str) -> VfsResult<Option<String>> {
        self.url_cache.invalidate(path);
        let fresh = self.resolver.resolve(path, true, true).await?;
        if let Some(url) = &fresh {
            self.url_cache.insert(path.to_string(), url.clone());
        }
        Ok(fresh)
    }

    fn request_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.request_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
