//! News source rows: seeding from config and catalog lookups.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use newsdesk_shared::{NewsSource, NewsdeskError, Result, SourceEntry, format_timestamp};

use crate::{SourceCatalog, Storage, db_err, from_json, to_json};

const SOURCE_COLUMNS: &str = "id, name, slug, api_url, api_key, config_json, is_active";

impl Storage {
    /// Insert or update a source by slug. `api_key` is the resolved credential.
    pub async fn upsert_source(&self, entry: &SourceEntry, api_key: &str) -> Result<NewsSource> {
        self.check_writable()?;
        let now = format_timestamp(&Utc::now());
        let config_json = to_json(&entry.config)?;

        self.conn
            .execute(
                "INSERT INTO news_sources (name, slug, api_url, api_key, config_json, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(slug) DO UPDATE SET
                   name = excluded.name,
                   api_url = excluded.api_url,
                   api_key = excluded.api_key,
                   config_json = excluded.config_json,
                   is_active = excluded.is_active,
                   updated_at = excluded.updated_at",
                params![
                    entry.name.as_str(),
                    entry.slug.as_str(),
                    entry.api_url.as_str(),
                    api_key,
                    config_json.as_str(),
                    i64::from(entry.is_active),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        self.source_by_slug(&entry.slug).await?.ok_or_else(|| {
            NewsdeskError::Storage(format!("source '{}' missing after upsert", entry.slug))
        })
    }

    /// Get a source by id.
    pub async fn source_by_id(&self, id: i64) -> Result<Option<NewsSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM news_sources WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_source(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List every source, active or not, ordered by id.
    pub async fn list_sources(&self) -> Result<Vec<NewsSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM news_sources ORDER BY id");
        self.collect_sources(&sql).await
    }

    async fn collect_sources(&self, sql: &str) -> Result<Vec<NewsSource>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_source(&row)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl SourceCatalog for Storage {
    async fn source_by_slug(&self, slug: &str) -> Result<Option<NewsSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM news_sources WHERE slug = ?1");
        let mut rows = self.conn.query(&sql, params![slug]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_source(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn active_sources(&self) -> Result<Vec<NewsSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM news_sources WHERE is_active = 1 ORDER BY id");
        self.collect_sources(&sql).await
    }
}

/// Convert a database row to a [`NewsSource`].
fn row_to_source(row: &libsql::Row) -> Result<NewsSource> {
    let config_json: String = row.get(5).map_err(db_err)?;
    Ok(NewsSource {
        id: row.get::<i64>(0).map_err(db_err)?,
        name: row.get::<String>(1).map_err(db_err)?,
        slug: row.get::<String>(2).map_err(db_err)?,
        api_url: row.get::<String>(3).map_err(db_err)?,
        api_key: row.get::<String>(4).unwrap_or_default(),
        config: from_json(&config_json)?,
        is_active: row.get::<i64>(6).map_err(db_err)? != 0,
    })
}
