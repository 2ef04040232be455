//! URL resolution: persistence vs HTTP callers, lazy refresh, fallbacks.

mod common;

use common::{registry_with, test_catalog, StubProvider};
use debrid_fuse::metrics::Metrics;
use debrid_fuse::providers::ProviderRegistry;
use debrid_fuse::resolver::UrlResolver;
use std::sync::Arc;

async fn resolver_with(
    catalog: &Arc<debrid_fuse::Catalog>,
    registry: ProviderRegistry,
) -> UrlResolver {
    UrlResolver::new(
        Arc::clone(catalog),
        Arc::new(registry),
        Arc::new(Metrics::new()),
    )
}

#[tokio::test]
async fn test_persistence_callers_get_stored_download_url() {
    let catalog = test_catalog().await;
    let stub = StubProvider::returning(vec![StubProvider::link("https://cdn/u1", 0)]);
    catalog
        .add_file("/movies/a.mkv", Some("R"), 10, Some("realdebrid"), None)
        .await
        .unwrap();

    let resolver = resolver_with(&catalog, registry_with(Arc::clone(&stub))).await;
    let url = resolver.resolve("/movies/a.mkv", false, false).await.unwrap();
    assert_eq!(url.as_deref(), Some("R"));
    // Persistence reads never touch the provider.
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_persisted_unrestricted_url_is_preferred() {
    let catalog = test_catalog().await;
    let stub = StubProvider::returning(vec![StubProvider::link("https://cdn/u2", 0)]);
    catalog
        .add_file("/movies/a.mkv", Some("R"), 10, Some("realdebrid"), None)
        .await
        .unwrap();
    catalog
        .record_resolution("/movies/a.mkv", "https://cdn/u1", None)
        .await
        .unwrap();

    let resolver = resolver_with(&catalog, registry_with(Arc::clone(&stub))).await;
    let url = resolver.resolve("/movies/a.mkv", true, false).await.unwrap();
    assert_eq!(url.as_deref(), Some("https://cdn/u1"));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn test_first_http_resolution_persists_url_and_size() {
    let catalog = test_catalog().await;
    let stub = StubProvider::returning(vec![StubProvider::link("https://cdn/u1", 5555)]);
    catalog
        .add_file("/movies/a.mkv", Some("R"), 0, Some("realdebrid"), None)
        .await
        .unwrap();

    let resolver = resolver_with(&catalog, registry_with(Arc::clone(&stub))).await;
    let url = resolver.resolve("/movies/a.mkv", true, false).await.unwrap();
    assert_eq!(url.as_deref(), Some("https://cdn/u1"));
    assert_eq!(stub.calls(), 1);

    let row = catalog.fetch_row("/movies/a.mkv").await.unwrap().unwrap();
    assert_eq!(row.unrestricted_url.as_deref(), Some("https://cdn/u1"));
    // Size was unknown and the adapter reported one.
    assert_eq!(row.file_size, 5555);
}

#[tokio::test]
async fn test_force_resolve_refreshes_despite_persisted_url() {
    let catalog = test_catalog().await;
    let stub = StubProvider::returning(vec![StubProvider::link("https://cdn/u2", 0)]);
    catalog
        .add_file("/movies/a.mkv", Some("R"), 10, Some("realdebrid"), None)
        .await
        .unwrap();
    catalog
        .record_resolution("/movies/a.mkv", "https://cdn/u1", None)
        .await
        .unwrap();

    let resolver = resolver_with(&catalog, registry_with(Arc::clone(&stub))).await;
    let url = resolver.resolve("/movies/a.mkv", true, true).await.unwrap();
    assert_eq!(url.as_deref(), Some("https://cdn/u2"));
    assert_eq!(stub.calls(), 1);

    let row = catalog.fetch_row("/movies/a.mkv").await.unwrap().unwrap();
    assert_eq!(row.unrestricted_url.as_deref(), Some("https://cdn/u2"));
}

#[tokio::test]
async fn test_unregistered_provider_falls_back_to_stored_urls() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/a.mkv", Some("R"), 10, Some("premiumize"), None)
        .await
        .unwrap();

    // Registry has no premiumize adapter.
    let resolver = resolver_with(&catalog, ProviderRegistry::new()).await;
    let url = resolver.resolve("/movies/a.mkv", true, false).await.unwrap();
    assert_eq!(url.as_deref(), Some("R"));
}

#[tokio::test]
async fn test_entry_without_download_url_resolves_to_none() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/a.mkv", None, 10, None, None)
        .await
        .unwrap();

    let resolver = resolver_with(&catalog, ProviderRegistry::new()).await;
    assert!(resolver
        .resolve("/movies/a.mkv", true, false)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_entry_resolves_to_none() {
    let catalog = test_catalog().await;
    let resolver = resolver_with(&catalog, ProviderRegistry::new()).await;
    assert!(resolver
        .resolve("/movies/ghost.mkv", true, false)
        .await
        .unwrap()
        .is_none());
}
