//! Embedded libSQL storage layer for Newsdesk.
//!
//! The [`Storage`] struct wraps a libSQL database holding news sources,
//! reconciled articles and user preferences.
//!
//! **Access rules:**
//! - `fetch`, `sources seed` and `prefs` writes: read-write via [`Storage::open`]
//! - Query commands may use [`Storage::open_readonly`]; writes are rejected
//!
//! The ingestion pipeline only sees two narrow seams, [`SourceCatalog`] and
//! [`ArticleCollection`], so it can run against in-memory fakes in tests.

mod articles;
mod migrations;
mod news_sources;
mod preferences;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use newsdesk_shared::{CanonicalArticle, NewsSource, NewsdeskError, Result, StoredArticle};

pub use articles::ArticleCount;

// ---------------------------------------------------------------------------
// Seams used by the ingestion pipeline
// ---------------------------------------------------------------------------

/// Read access to configured news sources.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Look up a source by its routing slug, active or not.
    async fn source_by_slug(&self, slug: &str) -> Result<Option<NewsSource>>;

    /// All sources flagged active, ordered by id.
    async fn active_sources(&self) -> Result<Vec<NewsSource>>;
}

/// Whether an upsert inserted a new row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

/// The persistent article collection the reconciler writes into.
///
/// Each write is a single statement; there is no batch transaction.
#[async_trait]
pub trait ArticleCollection: Send + Sync {
    /// Fail fast when the collection cannot accept writes at all.
    fn ensure_writable(&self) -> Result<()>;

    /// Find the stored article for `(source_id, external_id)`.
    async fn find_article(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<Option<StoredArticle>>;

    /// Insert the article keyed by `(source_id, external_id)`, or overwrite
    /// every mutable field of the existing row, atomically.
    async fn upsert_article(
        &self,
        source_id: i64,
        article: &CanonicalArticle,
    ) -> Result<UpsertAction>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NewsdeskError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NewsdeskError::Storage(format!(
                "database not found at {}; run `newsdesk sources seed` first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Whether this handle rejects writes.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    NewsdeskError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NewsdeskError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub(crate) fn db_err(e: libsql::Error) -> NewsdeskError {
    NewsdeskError::Storage(e.to_string())
}

/// Parse a stored RFC 3339 column.
pub(crate) fn parse_stored_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NewsdeskError::Storage(format!("invalid date '{raw}': {e}")))
}

pub(crate) fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| NewsdeskError::Storage(e.to_string()))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| NewsdeskError::Storage(format!("invalid JSON column: {e}")))
}
