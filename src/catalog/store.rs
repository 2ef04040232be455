//! Persistent path -> entry catalog.
//!
//! The `fs_entries` table is the source of truth for the virtual tree. Every
//! mutation runs inside a transaction; directory structure is synthesized
//! from path prefixes rather than parent pointers, which keeps rename a
//! string rewrite and makes cycles impossible.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

use crate::catalog::path::{ancestor_chain, basename, escape_like, normalize, parent_of};
use crate::error::VfsResult;

/// Directories created unconditionally at startup and never pruned.
pub const DEFAULT_ROOTS: [&str; 4] = ["/movies", "/shows", "/anime_movies", "/anime_shows"];

/// A full catalog row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FsEntry {
    pub path: String,
    pub is_directory: bool,
    pub file_size: i64,
    pub provider: Option<String>,
    pub provider_download_id: Option<String>,
    pub download_url: Option<String>,
    pub unrestricted_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FsEntry {
    /// File size clamped to unsigned. Zero means unknown.
    pub fn size(&self) -> u64 {
        self.file_size.max(0) as u64
    }
}

/// Public projection of a catalog row, as handed to FUSE and API callers.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryView {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
    pub modified: Option<DateTime<Utc>>,
}

impl EntryView {
    fn from_entry(entry: FsEntry) -> Self {
        let name = basename(&entry.path).to_string();
        Self {
            size: entry.size(),
            is_directory: entry.is_directory,
            modified: Some(entry.updated_at),
            name,
            path: entry.path,
        }
    }

    fn synthetic_root() -> Self {
        Self {
            path: "/".to_string(),
            name: "/".to_string(),
            size: 0,
            is_directory: true,
            modified: None,
        }
    }
}

/// Optional field overrides applied by [`Catalog::rename`] to the moved row.
#[derive(Debug, Clone, Default)]
pub struct RenameOverrides {
    pub provider: Option<String>,
    pub provider_download_id: Option<String>,
    pub download_url: Option<String>,
    pub size: Option<u64>,
}

impl RenameOverrides {
    fn is_empty(&self) -> bool {
        self.provider.is_none()
            && self.provider_download_id.is_none()
            && self.download_url.is_none()
            && self.size.is_none()
    }
}

/// The persistent catalog (component C1).
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open (or create) the catalog database and ensure the schema and
    /// default root directories exist.
    pub async fn connect(database_url: &str) -> VfsResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database must stay on a single connection; each pool
        // connection would otherwise see its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.init_schema().await?;
        catalog.ensure_default_roots().await?;
        Ok(catalog)
    }

    async fn init_schema(&self) -> VfsResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS fs_entries (
                path TEXT PRIMARY KEY,
                is_directory INTEGER NOT NULL DEFAULT 0,
                file_size INTEGER NOT NULL DEFAULT 0,
                provider TEXT,
                provider_download_id TEXT,
                download_url TEXT,
                unrestricted_url TEXT,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_default_roots(&self) -> VfsResult<()> {
        let mut tx = self.pool.begin().await?;
        for root in DEFAULT_ROOTS {
            sqlx::query(
                "INSERT OR IGNORE INTO fs_entries (path, is_directory, file_size, updated_at)
                 VALUES (?1, 1, 0, ?2)",
            )
            .bind(root)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(roots = ?DEFAULT_ROOTS, "Default directory roots ensured");
        Ok(())
    }

    // === Queries ===

    /// Fetch the full row for a path, if present.
    pub async fn fetch_row(&self, path: &str) -> VfsResult<Option<FsEntry>> {
        let path = normalize(path);
        let row = sqlx::query_as::<_, FsEntry>("SELECT * FROM fs_entries WHERE path = ?1")
            .bind(&path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Entry view for a path. The root is synthesized when no row exists.
    pub async fn get_entry(&self, path: &str) -> VfsResult<Option<EntryView>> {
        let path = normalize(path);
        match self.fetch_row(&path).await? {
            Some(entry) => Ok(Some(EntryView::from_entry(entry))),
            None if path == "/" => Ok(Some(EntryView::synthetic_root())),
            None => Ok(None),
        }
    }

    /// List the immediate children of a directory, sorted by name.
    pub async fn list_directory(&self, path: &str) -> VfsResult<Vec<EntryView>> {
        let path = normalize(path);

        let rows = if path == "/" {
            sqlx::query_as::<_, FsEntry>("SELECT * FROM fs_entries")
                .fetch_all(&self.pool)
                .await?
        } else {
            let pattern = format!("{}/%", escape_like(&path));
            sqlx::query_as::<_, FsEntry>(
                r"SELECT * FROM fs_entries WHERE path LIKE ?1 ESCAPE '\'",
            )
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?
        };

        let mut out: Vec<EntryView> = rows
            .into_iter()
            .filter(|row| row.path != "/" && parent_of(&row.path) == path)
            .map(EntryView::from_entry)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// True for the root, otherwise a single-row lookup.
    pub async fn exists(&self, path: &str) -> VfsResult<bool> {
        let path = normalize(path);
        if path == "/" {
            return Ok(true);
        }
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM fs_entries WHERE path = ?1")
            .bind(&path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    // === Mutations ===

    /// Create a directory row if absent. Idempotent.
    pub async fn add_directory(&self, path: &str) -> VfsResult<String> {
        let path = normalize(path);
        if path != "/" {
            let mut tx = self.pool.begin().await?;
            Self::ensure_dir_chain(&mut tx, &path).await?;
            tx.commit().await?;
        }
        Ok(path)
    }

    /// Insert a file row, creating missing parent directories. If the path
    /// already exists, the url/size/provider fields are updated in place;
    /// `unrestricted_url` is preserved.
    pub async fn add_file(
        &self,
        path: &str,
        url: Option<&str>,
        size: u64,
        provider: Option<&str>,
        provider_download_id: Option<&str>,
    ) -> VfsResult<String> {
        let path = normalize(path);
        let parent = parent_of(&path);

        let mut tx = self.pool.begin().await?;
        Self::ensure_dir_chain(&mut tx, &parent).await?;
        sqlx::query(
            r"
            INSERT INTO fs_entries
                (path, is_directory, file_size, provider, provider_download_id, download_url, updated_at)
            VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(path) DO UPDATE SET
                file_size = excluded.file_size,
                provider = excluded.provider,
                provider_download_id = excluded.provider_download_id,
                download_url = excluded.download_url,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&path)
        .bind(size as i64)
        .bind(provider)
        .bind(provider_download_id)
        .bind(url)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(path = %path, size = size, provider = ?provider, "Catalog file upserted");
        Ok(path)
    }

    /// Set the file size and bump `updated_at`.
    pub async fn update_size(&self, path: &str, size: u64) -> VfsResult<()> {
        let path = normalize(path);
        sqlx::query("UPDATE fs_entries SET file_size = ?1, updated_at = ?2 WHERE path = ?3")
            .bind(size as i64)
            .bind(Utc::now())
            .bind(&path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist the outcome of a provider resolution: the fresh unrestricted
    /// URL, and the size when it was previously unknown.
    pub async fn record_resolution(
        &self,
        path: &str,
        unrestricted_url: &str,
        size: Option<u64>,
    ) -> VfsResult<()> {
        let path = normalize(path);
        let size = size.unwrap_or(0) as i64;
        sqlx::query(
            r"
            UPDATE fs_entries SET
                unrestricted_url = ?1,
                file_size = CASE WHEN file_size = 0 AND ?2 > 0 THEN ?2 ELSE file_size END,
                updated_at = ?3
            WHERE path = ?4
            ",
        )
        .bind(unrestricted_url)
        .bind(size)
        .bind(Utc::now())
        .bind(&path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a row (and every descendant) from `old` to `new`, creating the
    /// destination parent chain. Returns false when `old` does not exist.
    ///
    /// A same-path rename with no overrides is a successful no-op.
    pub async fn rename(
        &self,
        old: &str,
        new: &str,
        overrides: RenameOverrides,
    ) -> VfsResult<bool> {
        let old = normalize(old);
        let new = normalize(new);
        if old == new && overrides.is_empty() {
            return Ok(true);
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, FsEntry>("SELECT * FROM fs_entries WHERE path = ?1")
            .bind(&old)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        Self::ensure_dir_chain(&mut tx, &parent_of(&new)).await?;

        sqlx::query(
            r"
            UPDATE fs_entries SET
                path = ?1,
                provider = ?2,
                provider_download_id = ?3,
                download_url = ?4,
                file_size = ?5,
                updated_at = ?6
            WHERE path = ?7
            ",
        )
        .bind(&new)
        .bind(overrides.provider.as_deref().or(row.provider.as_deref()))
        .bind(
            overrides
                .provider_download_id
                .as_deref()
                .or(row.provider_download_id.as_deref()),
        )
        .bind(
            overrides
                .download_url
                .as_deref()
                .or(row.download_url.as_deref()),
        )
        .bind(overrides.size.map(|s| s as i64).unwrap_or(row.file_size))
        .bind(Utc::now())
        .bind(&old)
        .execute(&mut *tx)
        .await?;

        // Rewrite every descendant path, ensuring each one's new parent chain.
        let pattern = format!("{}/%", escape_like(&old));
        let children: Vec<String> = sqlx::query_scalar(
            r"SELECT path FROM fs_entries WHERE path LIKE ?1 ESCAPE '\'",
        )
        .bind(&pattern)
        .fetch_all(&mut *tx)
        .await?;

        for child in children {
            let suffix = &child[old.len()..];
            let new_child = format!("{}{}", new, suffix);
            Self::ensure_dir_chain(&mut tx, &parent_of(&new_child)).await?;
            sqlx::query("UPDATE fs_entries SET path = ?1 WHERE path = ?2")
                .bind(&new_child)
                .bind(&child)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(old = %old, new = %new, "Catalog entry renamed");
        Ok(true)
    }

    /// Delete a row and all its descendants, then prune empty ancestor
    /// directories up to the first non-empty one, a default root, or `/`.
    pub async fn remove(&self, path: &str) -> VfsResult<bool> {
        let path = normalize(path);
        if path == "/" {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        let pattern = format!("{}/%", escape_like(&path));
        sqlx::query(r"DELETE FROM fs_entries WHERE path = ?1 OR path LIKE ?2 ESCAPE '\'")
            .bind(&path)
            .bind(&pattern)
            .execute(&mut *tx)
            .await?;

        let mut current = parent_of(&path);
        while current != "/" && !DEFAULT_ROOTS.contains(&current.as_str()) {
            let child_pattern = format!("{}/%", escape_like(&current));
            let has_children: Option<i64> = sqlx::query_scalar(
                r"SELECT 1 FROM fs_entries WHERE path LIKE ?1 ESCAPE '\' LIMIT 1",
            )
            .bind(&child_pattern)
            .fetch_optional(&mut *tx)
            .await?;
            if has_children.is_some() {
                break;
            }
            sqlx::query("DELETE FROM fs_entries WHERE path = ?1 AND is_directory = 1")
                .bind(&current)
                .execute(&mut *tx)
                .await?;
            current = parent_of(&current);
        }

        tx.commit().await?;
        debug!(path = %path, "Catalog entry removed");
        Ok(true)
    }

    /// Create every missing directory row along `path`, top down.
    async fn ensure_dir_chain(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        path: &str,
    ) -> VfsResult<()> {
        if path == "/" {
            return Ok(());
        }
        for ancestor in ancestor_chain(path) {
            sqlx::query(
                "INSERT OR IGNORE INTO fs_entries (path, is_directory, file_size, updated_at)
                 VALUES (?1, 1, 0, ?2)",
            )
            .bind(&ancestor)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn catalog() -> Catalog {
        Catalog::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_default_roots_exist() {
        let c = catalog().await;
        for root in DEFAULT_ROOTS {
            assert!(c.exists(root).await.unwrap(), "{root} missing");
            let view = c.get_entry(root).await.unwrap().unwrap();
            assert!(view.is_directory);
            assert_eq!(view.size, 0);
        }
    }

    #[tokio::test]
    async fn test_root_is_synthetic() {
        let c = catalog().await;
        assert!(c.exists("/").await.unwrap());
        let root = c.get_entry("/").await.unwrap().unwrap();
        assert!(root.is_directory);
        assert_eq!(root.name, "/");
    }

    #[tokio::test]
    async fn test_add_file_creates_parent_chain() {
        let c = catalog().await;
        c.add_file("/movies/A/a.mkv", Some("https://host/x"), 1000, None, None)
            .await
            .unwrap();

        let dir = c.get_entry("/movies/A").await.unwrap().unwrap();
        assert!(dir.is_directory);
        assert_eq!(dir.size, 0);

        let file = c.get_entry("/movies/A/a.mkv").await.unwrap().unwrap();
        assert!(!file.is_directory);
        assert_eq!(file.size, 1000);
    }

    #[tokio::test]
    async fn test_add_file_updates_in_place_preserving_unrestricted() {
        let c = catalog().await;
        c.add_file("/movies/a.mkv", Some("R1"), 10, Some("realdebrid"), Some("ID"))
            .await
            .unwrap();
        c.record_resolution("/movies/a.mkv", "U1", None).await.unwrap();

        c.add_file("/movies/a.mkv", Some("R2"), 20, Some("torbox"), Some("ID2"))
            .await
            .unwrap();

        let row = c.fetch_row("/movies/a.mkv").await.unwrap().unwrap();
        assert_eq!(row.download_url.as_deref(), Some("R2"));
        assert_eq!(row.file_size, 20);
        assert_eq!(row.provider.as_deref(), Some("torbox"));
        assert_eq!(row.unrestricted_url.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn test_record_resolution_only_fills_unknown_size() {
        let c = catalog().await;
        c.add_file("/movies/a.mkv", Some("R"), 0, None, None)
            .await
            .unwrap();
        c.record_resolution("/movies/a.mkv", "U", Some(5000))
            .await
            .unwrap();
        let row = c.fetch_row("/movies/a.mkv").await.unwrap().unwrap();
        assert_eq!(row.file_size, 5000);

        // A known size is never overwritten by resolution metadata.
        c.record_resolution("/movies/a.mkv", "U2", Some(9000))
            .await
            .unwrap();
        let row = c.fetch_row("/movies/a.mkv").await.unwrap().unwrap();
        assert_eq!(row.file_size, 5000);
        assert_eq!(row.unrestricted_url.as_deref(), Some("U2"));
    }

    #[tokio::test]
    async fn test_like_special_characters_in_paths() {
        let c = catalog().await;
        c.add_file("/movies/100%_legit/a.mkv", Some("R"), 1, None, None)
            .await
            .unwrap();
        c.add_file("/movies/100x_legit/b.mkv", Some("R"), 1, None, None)
            .await
            .unwrap();

        let listing = c.list_directory("/movies/100%_legit").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "a.mkv");

        assert!(c.remove("/movies/100%_legit").await.unwrap());
        assert!(!c.exists("/movies/100%_legit/a.mkv").await.unwrap());
        assert!(c.exists("/movies/100x_legit/b.mkv").await.unwrap());
    }
}
