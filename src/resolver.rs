//! URL resolution for catalog entries.
//!
//! Combines the catalog row with the provider registry: callers that persist
//! URLs get the stable restricted `download_url`; the HTTP read path gets an
//! unrestricted URL, lazily refreshed through the provider adapter.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::VfsResult;
use crate::metrics::Metrics;
use crate::providers::{ProviderKind, ProviderRegistry};

/// Component C3: path -> best available URL.
pub struct UrlResolver {
    catalog: Arc<Catalog>,
    providers: Arc<ProviderRegistry>,
    metrics: Arc<Metrics>,
}

impl UrlResolver {
    pub fn new(
        catalog: Arc<Catalog>,
        providers: Arc<ProviderRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            providers,
            metrics,
        }
    }

    /// Resolve the URL for a path.
    ///
    /// With `for_http` false the stored restricted URL is returned for
    /// persistence. With `for_http` true the persisted unrestricted URL is
    /// preferred unless `force_resolve` demands a fresh resolution; a
    /// successful resolution is written back to the row. A row that vanished
    /// concurrently yields `Ok(None)`.
    pub async fn resolve(
        &self,
        path: &str,
        for_http: bool,
        force_resolve: bool,
    ) -> VfsResult<Option<String>> {
        let Some(row) = self.catalog.fetch_row(path).await? else {
            debug!(path = %path, "URL resolution: entry missing");
            return Ok(None);
        };

        if !for_http {
            return Ok(row.download_url);
        }

        if let Some(url) = &row.unrestricted_url {
            if !force_resolve {
                debug!(path = %path, "Using persisted unrestricted URL");
                return Ok(Some(url.clone()));
            }
        }

        let Some(download_url) = &row.download_url else {
            debug!(path = %path, "No download_url available; cannot resolve");
            return Ok(None);
        };

        let Some(kind) = row
            .provider
            .as_deref()
            .and_then(|p| ProviderKind::from_str(p).ok())
        else {
            if row.provider.is_some() {
                warn!(path = %path, provider = ?row.provider, "Unknown provider tag");
            } else {
                warn!(path = %path, "No provider recorded for entry");
            }
            return Ok(row.unrestricted_url.or(Some(download_url.clone())));
        };

        let Some(adapter) = self.providers.adapter(kind) else {
            warn!(path = %path, provider = %kind, "Provider not registered");
            return Ok(row.unrestricted_url.or(Some(download_url.clone())));
        };

        match adapter.resolve_link(download_url).await {
            Ok(Some(link)) if !link.download_url.is_empty() => {
                self.metrics.record_url_resolution();
                let learned_size = (row.file_size == 0 && link.size > 0).then_some(link.size);
                self.catalog
                    .record_resolution(path, &link.download_url, learned_size)
                    .await?;
                debug!(path = %path, provider = %kind, "Refreshed unrestricted URL");
                Ok(Some(link.download_url))
            }
            Ok(_) => {
                debug!(path = %path, provider = %kind, "Provider returned no link");
                Ok(row.unrestricted_url.or(Some(download_url.clone())))
            }
            Err(e) => {
                warn!(path = %path, provider = %kind, error = %e, "Link resolution failed");
                Ok(row.unrestricted_url.or(Some(download_url.clone())))
            }
        }
    }
}
