//! Article rows: the reconciler's write path and the query-side reads.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use libsql::params::Params;
use libsql::Value;
use newsdesk_shared::{
    ArticleQuery, CanonicalArticle, NewsdeskError, Result, SourceSummary, StoredArticle,
    UserPreference, format_timestamp,
};
use uuid::Uuid;

use crate::{ArticleCollection, Storage, UpsertAction, db_err, from_json, parse_stored_timestamp, to_json};

const ARTICLE_COLUMNS: &str = "id, source_id, external_id, title, description, content, url, \
     image_url, author, category, tags_json, published_at, created_at, updated_at";

/// Article count for one active source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArticleCount {
    pub source: SourceSummary,
    pub articles: u64,
}

#[async_trait]
impl ArticleCollection for Storage {
    fn ensure_writable(&self) -> Result<()> {
        self.check_writable()
    }

    async fn find_article(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<Option<StoredArticle>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE source_id = ?1 AND external_id = ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![source_id, external_id])
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_article(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn upsert_article(
        &self,
        source_id: i64,
        article: &CanonicalArticle,
    ) -> Result<UpsertAction> {
        self.check_writable()?;
        let external_id = article
            .external_key()
            .ok_or_else(|| NewsdeskError::validation("article has no external id"))?;

        let id = Uuid::now_v7().to_string();
        let now = format_timestamp(&Utc::now());
        let tags_json = to_json(&article.tags)?;

        // `id` is never touched by the update arm, so a returned id other than
        // ours means the row already existed.
        let mut rows = self
            .conn
            .query(
                "INSERT INTO articles (id, source_id, external_id, title, description, content, url,
                   image_url, author, category, tags_json, published_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(source_id, external_id) DO UPDATE SET
                   title = excluded.title,
                   description = excluded.description,
                   content = excluded.content,
                   url = excluded.url,
                   image_url = excluded.image_url,
                   author = excluded.author,
                   category = excluded.category,
                   tags_json = excluded.tags_json,
                   published_at = excluded.published_at,
                   updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    id.as_str(),
                    source_id,
                    external_id,
                    article.title.as_str(),
                    article.description.as_str(),
                    article.content.as_str(),
                    article.url.as_deref(),
                    article.image_url.as_deref(),
                    article.author.as_deref(),
                    article.category.as_deref(),
                    tags_json.as_str(),
                    format_timestamp(&article.published_at),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        let row = rows
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| NewsdeskError::Storage("upsert returned no row".into()))?;
        let stored_id: String = row.get(0).map_err(db_err)?;

        Ok(if stored_id == id {
            UpsertAction::Created
        } else {
            UpsertAction::Updated
        })
    }
}

impl Storage {
    /// Get an article by its id.
    pub async fn get_article(&self, id: &str) -> Result<Option<StoredArticle>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_article(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Run a filtered, preference-aware listing. Returns the requested page of
    /// rows (newest first) and the total number of matches.
    pub async fn query_articles(
        &self,
        query: &ArticleQuery,
        prefs: Option<&UserPreference>,
    ) -> Result<(Vec<StoredArticle>, u64)> {
        let mut filter = WhereClause::default();
        filter.apply_query(query);
        if let Some(prefs) = prefs {
            filter.apply_preferences(prefs);
        }
        let where_sql = filter.sql();

        let count_sql = format!("SELECT COUNT(*) FROM articles{where_sql}");
        let mut rows = self
            .conn
            .query(&count_sql, Params::Positional(filter.values.clone()))
            .await
            .map_err(db_err)?;
        let total = match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>(0).map_err(db_err)?.max(0) as u64,
            None => 0,
        };

        let mut values = filter.values;
        values.push(Value::Integer(i64::from(query.per_page)));
        values.push(Value::Integer(
            i64::try_from(query.offset()).unwrap_or(i64::MAX),
        ));
        let data_sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles{where_sql}
             ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let articles = self
            .collect_articles(&data_sql, Params::Positional(values))
            .await?;

        Ok((articles, total))
    }

    /// The most recently published articles.
    pub async fn latest_articles(&self, limit: u32) -> Result<Vec<StoredArticle>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY published_at DESC, id DESC LIMIT ?"
        );
        self.collect_articles(&sql, Params::Positional(vec![Value::Integer(i64::from(limit))]))
            .await
    }

    /// Distinct non-empty categories, alphabetically.
    pub async fn distinct_categories(&self) -> Result<Vec<String>> {
        self.collect_strings(
            "SELECT DISTINCT category FROM articles
             WHERE category IS NOT NULL AND category <> '' ORDER BY category",
        )
        .await
    }

    /// Distinct non-empty authors, alphabetically.
    pub async fn distinct_authors(&self) -> Result<Vec<String>> {
        self.collect_strings(
            "SELECT DISTINCT author FROM articles
             WHERE author IS NOT NULL AND author <> '' ORDER BY author",
        )
        .await
    }

    /// Total number of stored articles.
    pub async fn count_articles(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM articles", params![])
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Article counts for every active source, ordered by source id.
    pub async fn article_counts_by_source(&self) -> Result<Vec<ArticleCount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.name, s.slug, COUNT(a.id)
                 FROM news_sources s
                 LEFT JOIN articles a ON a.source_id = s.id
                 WHERE s.is_active = 1
                 GROUP BY s.id, s.name, s.slug
                 ORDER BY s.id",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(ArticleCount {
                source: SourceSummary {
                    id: row.get::<i64>(0).map_err(db_err)?,
                    name: row.get::<String>(1).map_err(db_err)?,
                    slug: row.get::<String>(2).map_err(db_err)?,
                },
                articles: row.get::<i64>(3).map_err(db_err)?.max(0) as u64,
            });
        }
        Ok(results)
    }

    async fn collect_articles(&self, sql: &str, params: Params) -> Result<Vec<StoredArticle>> {
        let mut rows = self.conn.query(sql, params).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }

    async fn collect_strings(&self, sql: &str) -> Result<Vec<String>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row.get::<String>(0).map_err(db_err)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Dynamic WHERE builder
// ---------------------------------------------------------------------------

/// Accumulates `AND`-joined conditions with anonymous `?` placeholders.
#[derive(Default)]
struct WhereClause {
    parts: Vec<String>,
    values: Vec<Value>,
}

impl WhereClause {
    fn push(&mut self, sql: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.parts.push(sql.into());
        self.values.extend(values);
    }

    /// `column IN (..)` or `column NOT IN (..)`. Empty lists add nothing.
    /// With `keep_null`, a negated filter still matches rows where the column is NULL.
    fn push_in(&mut self, column: &str, values: Vec<Value>, negate: bool, keep_null: bool) {
        if values.is_empty() {
            return;
        }
        let marks = vec!["?"; values.len()].join(", ");
        let sql = match (negate, keep_null) {
            (false, _) => format!("{column} IN ({marks})"),
            (true, false) => format!("{column} NOT IN ({marks})"),
            (true, true) => format!("({column} IS NULL OR {column} NOT IN ({marks}))"),
        };
        self.push(sql, values);
    }

    fn apply_query(&mut self, query: &ArticleQuery) {
        if let Some(search) = non_blank(query.search.as_deref()) {
            let pattern = like_pattern(search);
            self.push(
                "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' OR content LIKE ? ESCAPE '\\')",
                [
                    Value::Text(pattern.clone()),
                    Value::Text(pattern.clone()),
                    Value::Text(pattern),
                ],
            );
        }
        if let Some(category) = non_blank(query.category.as_deref()) {
            self.push("category = ?", [Value::Text(category.to_string())]);
        }
        if let Some(author) = non_blank(query.author.as_deref()) {
            self.push("author LIKE ? ESCAPE '\\'", [Value::Text(like_pattern(author))]);
        }
        if let Some(source_id) = query.source_id {
            self.push("source_id = ?", [Value::Integer(source_id)]);
        }
        if let Some(start) = query.start_date {
            self.push("published_at >= ?", [Value::Text(format_timestamp(&start))]);
        }
        if let Some(end) = query.end_date {
            self.push("published_at <= ?", [Value::Text(format_timestamp(&end))]);
        }
    }

    fn apply_preferences(&mut self, prefs: &UserPreference) {
        let ids = |list: &[i64]| list.iter().map(|id| Value::Integer(*id)).collect::<Vec<_>>();
        let texts = |list: &[String]| {
            list.iter()
                .map(|s| Value::Text(s.clone()))
                .collect::<Vec<_>>()
        };

        self.push_in("source_id", ids(&prefs.selected_sources), false, false);
        self.push_in("source_id", ids(&prefs.excluded_sources), true, false);
        self.push_in("category", texts(&prefs.selected_categories), false, false);
        self.push_in("category", texts(&prefs.excluded_categories), true, true);
        self.push_in("author", texts(&prefs.selected_authors), false, false);
        self.push_in("author", texts(&prefs.excluded_authors), true, true);
    }

    fn sql(&self) -> String {
        if self.parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.parts.join(" AND "))
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Substring pattern with LIKE wildcards in the input escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Convert a database row to a [`StoredArticle`].
fn row_to_article(row: &libsql::Row) -> Result<StoredArticle> {
    let tags_json: String = row.get(10).map_err(db_err)?;
    let published_at: String = row.get(11).map_err(db_err)?;
    let created_at: String = row.get(12).map_err(db_err)?;
    let updated_at: String = row.get(13).map_err(db_err)?;

    Ok(StoredArticle {
        id: row.get::<String>(0).map_err(db_err)?,
        source_id: row.get::<i64>(1).map_err(db_err)?,
        external_id: row.get::<String>(2).map_err(db_err)?,
        title: row.get::<String>(3).map_err(db_err)?,
        description: row.get::<String>(4).unwrap_or_default(),
        content: row.get::<String>(5).unwrap_or_default(),
        url: row.get::<String>(6).ok(),
        image_url: row.get::<String>(7).ok(),
        author: row.get::<String>(8).ok(),
        category: row.get::<String>(9).ok(),
        tags: from_json(&tags_json)?,
        published_at: parse_stored_timestamp(&published_at)?,
        created_at: parse_stored_timestamp(&created_at)?,
        updated_at: parse_stored_timestamp(&updated_at)?,
    })
}
