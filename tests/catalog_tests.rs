//! Catalog behavior: directory synthesis, listing, rename, removal with
//! pruning, and idempotence.

mod common;

use common::test_catalog;
use debrid_fuse::catalog::RenameOverrides;

#[tokio::test]
async fn test_add_and_list() {
    let catalog = test_catalog().await;
    catalog
        .add_file(
            "/movies/A/a.mkv",
            Some("https://real-debrid.com/d/XYZ"),
            1000,
            Some("realdebrid"),
            Some("XYZ"),
        )
        .await
        .unwrap();

    let movies = catalog.list_directory("/movies").await.unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].name, "A");
    assert!(movies[0].is_directory);
    assert_eq!(movies[0].size, 0);

    let inside = catalog.list_directory("/movies/A").await.unwrap();
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].name, "a.mkv");
    assert!(!inside[0].is_directory);
    assert_eq!(inside[0].size, 1000);
}

#[tokio::test]
async fn test_get_file_info_round_trip() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/a.mkv", Some("https://host/a"), 4242, None, None)
        .await
        .unwrap();

    let info = catalog.get_entry("/movies/a.mkv").await.unwrap().unwrap();
    assert_eq!(info.size, 4242);
    assert!(!info.is_directory);
    assert_eq!(info.name, "a.mkv");
    assert!(info.modified.is_some());
}

#[tokio::test]
async fn test_remove_with_pruning() {
    let catalog = test_catalog().await;
    catalog
        .add_file(
            "/movies/A/a.mkv",
            Some("https://real-debrid.com/d/XYZ"),
            1000,
            Some("realdebrid"),
            Some("XYZ"),
        )
        .await
        .unwrap();

    assert!(catalog.remove("/movies/A/a.mkv").await.unwrap());

    // The now-empty intermediate directory is pruned...
    assert!(!catalog.exists("/movies/A").await.unwrap());
    assert!(catalog.list_directory("/movies").await.unwrap().is_empty());
    // ...but the default root survives.
    assert!(catalog.exists("/movies").await.unwrap());
}

#[tokio::test]
async fn test_pruning_stops_at_populated_ancestor() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/A/B/c.mkv", Some("u"), 1, None, None)
        .await
        .unwrap();
    catalog
        .add_file("/movies/A/d.mkv", Some("u"), 1, None, None)
        .await
        .unwrap();

    assert!(catalog.remove("/movies/A/B/c.mkv").await.unwrap());

    assert!(!catalog.exists("/movies/A/B").await.unwrap());
    assert!(catalog.exists("/movies/A").await.unwrap());
    assert!(catalog.exists("/movies/A/d.mkv").await.unwrap());
}

#[tokio::test]
async fn test_remove_cascades_to_descendants() {
    let catalog = test_catalog().await;
    for path in [
        "/shows/X/s1/e1.mkv",
        "/shows/X/s1/e2.mkv",
        "/shows/X/s2/e1.mkv",
    ] {
        catalog.add_file(path, Some("u"), 1, None, None).await.unwrap();
    }

    assert!(catalog.remove("/shows/X").await.unwrap());

    for path in [
        "/shows/X",
        "/shows/X/s1",
        "/shows/X/s1/e1.mkv",
        "/shows/X/s1/e2.mkv",
        "/shows/X/s2",
        "/shows/X/s2/e1.mkv",
    ] {
        assert!(!catalog.exists(path).await.unwrap(), "{path} survived");
    }
    assert!(catalog.exists("/shows").await.unwrap());
}

#[tokio::test]
async fn test_remove_root_is_refused() {
    let catalog = test_catalog().await;
    assert!(!catalog.remove("/").await.unwrap());
    assert!(catalog.exists("/movies").await.unwrap());
}

#[tokio::test]
async fn test_rename_directory_moves_descendants() {
    let catalog = test_catalog().await;
    catalog
        .add_file(
            "/shows/X/s1/e1.mkv",
            Some("https://real-debrid.com/d/EP1"),
            7777,
            Some("realdebrid"),
            Some("EP1"),
        )
        .await
        .unwrap();

    assert!(catalog
        .rename("/shows/X", "/shows/Y", RenameOverrides::default())
        .await
        .unwrap());

    assert!(!catalog.exists("/shows/X").await.unwrap());
    assert!(!catalog.exists("/shows/X/s1/e1.mkv").await.unwrap());

    let moved = catalog
        .get_entry("/shows/Y/s1/e1.mkv")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.size, 7777);

    let row = catalog
        .fetch_row("/shows/Y/s1/e1.mkv")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.provider.as_deref(), Some("realdebrid"));
    assert_eq!(row.download_url.as_deref(), Some("https://real-debrid.com/d/EP1"));
}

#[tokio::test]
async fn test_rename_same_path_is_noop() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/a.mkv", Some("u"), 10, None, None)
        .await
        .unwrap();
    let before = catalog.fetch_row("/movies/a.mkv").await.unwrap().unwrap();

    assert!(catalog
        .rename("/movies/a.mkv", "/movies/a.mkv", RenameOverrides::default())
        .await
        .unwrap());

    let after = catalog.fetch_row("/movies/a.mkv").await.unwrap().unwrap();
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn test_rename_missing_source_fails() {
    let catalog = test_catalog().await;
    assert!(!catalog
        .rename("/movies/ghost.mkv", "/movies/real.mkv", RenameOverrides::default())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_rename_applies_overrides() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/a.mkv", Some("R1"), 0, Some("realdebrid"), Some("A"))
        .await
        .unwrap();

    let overrides = RenameOverrides {
        size: Some(9000),
        download_url: Some("R2".to_string()),
        ..RenameOverrides::default()
    };
    assert!(catalog
        .rename("/movies/a.mkv", "/movies/b.mkv", overrides)
        .await
        .unwrap());

    let row = catalog.fetch_row("/movies/b.mkv").await.unwrap().unwrap();
    assert_eq!(row.file_size, 9000);
    assert_eq!(row.download_url.as_deref(), Some("R2"));
    // Untouched fields carry over.
    assert_eq!(row.provider.as_deref(), Some("realdebrid"));
}

#[tokio::test]
async fn test_add_directory_is_idempotent() {
    let catalog = test_catalog().await;
    catalog.add_directory("/movies/Collection").await.unwrap();
    catalog.add_directory("/movies/Collection").await.unwrap();

    let listing = catalog.list_directory("/movies").await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "Collection");
    assert!(listing[0].is_directory);
}

#[tokio::test]
async fn test_update_size() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/movies/a.mkv", Some("u"), 0, None, None)
        .await
        .unwrap();
    catalog.update_size("/movies/a.mkv", 123456).await.unwrap();

    let info = catalog.get_entry("/movies/a.mkv").await.unwrap().unwrap();
    assert_eq!(info.size, 123456);
}

#[tokio::test]
async fn test_paths_are_normalized_at_the_boundary() {
    let catalog = test_catalog().await;
    catalog
        .add_file("movies//A/./b.mkv", Some("u"), 5, None, None)
        .await
        .unwrap();

    assert!(catalog.exists("/movies/A/b.mkv").await.unwrap());
    assert!(catalog.exists("/movies/A/b.mkv/").await.unwrap());
    let info = catalog
        .get_entry("/movies/A/../A/b.mkv")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.size, 5);
}

#[tokio::test]
async fn test_listing_is_sorted_by_name() {
    let catalog = test_catalog().await;
    for name in ["zeta.mkv", "alpha.mkv", "Beta.mkv"] {
        catalog
            .add_file(&format!("/movies/{name}"), Some("u"), 1, None, None)
            .await
            .unwrap();
    }

    let names: Vec<String> = catalog
        .list_directory("/movies")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    // Case-sensitive ascending order.
    assert_eq!(names, vec!["Beta.mkv", "alpha.mkv", "zeta.mkv"]);
}

#[tokio::test]
async fn test_every_row_has_a_directory_parent() {
    let catalog = test_catalog().await;
    catalog
        .add_file("/anime_shows/Show/s1/e1.mkv", Some("u"), 1, None, None)
        .await
        .unwrap();
    catalog
        .add_file("/movies/Solo (2020)/solo.mkv", Some("u"), 1, None, None)
        .await
        .unwrap();

    for path in [
        "/anime_shows/Show",
        "/anime_shows/Show/s1",
        "/movies/Solo (2020)",
    ] {
        let entry = catalog.get_entry(path).await.unwrap().unwrap();
        assert!(entry.is_directory, "{path} should be a directory");
    }
}
