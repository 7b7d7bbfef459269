//! In-memory fakes shared by the core tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use newsdesk_shared::{CanonicalArticle, NewsSource, NewsdeskError, Result, StoredArticle};
use newsdesk_sources::{AdapterRegistry, SourceAdapter};
use newsdesk_storage::{ArticleCollection, SourceCatalog, UpsertAction};

pub fn canonical(external_id: &str, title: &str) -> CanonicalArticle {
    CanonicalArticle {
        external_id: Some(external_id.into()),
        title: title.into(),
        description: format!("{title} description"),
        content: format!("{title} content"),
        url: Some(format!("https://news.example.com/{external_id}")),
        image_url: Some(format!("https://img.example.com/{external_id}.jpg")),
        author: Some("Staff".into()),
        category: Some("World".into()),
        tags: vec!["World".into()],
        published_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    }
}

pub fn news_source(id: i64, slug: &str, articles: u64) -> NewsSource {
    let mut config = serde_json::Map::new();
    config.insert("articles".into(), serde_json::json!(articles));
    NewsSource {
        id,
        name: format!("Source {slug}"),
        slug: slug.into(),
        api_url: "http://localhost".into(),
        api_key: String::new(),
        config,
        is_active: true,
    }
}

// ---------------------------------------------------------------------------
// Article collection
// ---------------------------------------------------------------------------

/// Vec-backed collection. Writes of titles in `fail_titles` fail; writes of
/// titles in `stall_titles` never complete.
#[derive(Default)]
pub struct MemoryCollection {
    rows: Mutex<Vec<StoredArticle>>,
    next_id: AtomicUsize,
    pub fail_titles: Vec<String>,
    pub stall_titles: Vec<String>,
    pub readonly: bool,
}

impl MemoryCollection {
    pub fn failing_on(titles: &[&str]) -> Self {
        Self {
            fail_titles: titles.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn stalling_on(titles: &[&str]) -> Self {
        Self {
            stall_titles: titles.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn readonly() -> Self {
        Self {
            readonly: true,
            ..Default::default()
        }
    }

    pub fn rows(&self) -> Vec<StoredArticle> {
        self.rows.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ArticleCollection for MemoryCollection {
    fn ensure_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NewsdeskError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn find_article(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<Option<StoredArticle>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.source_id == source_id && r.external_id == external_id)
            .cloned())
    }

    /// Looks up, yields, then writes: unlike libSQL this is not atomic, so
    /// unsynchronized writers on one key collide on the unique key.
    async fn upsert_article(
        &self,
        source_id: i64,
        article: &CanonicalArticle,
    ) -> Result<UpsertAction> {
        self.ensure_writable()?;
        if self.fail_titles.iter().any(|t| t == &article.title) {
            return Err(NewsdeskError::Storage("disk I/O error".into()));
        }
        if self.stall_titles.iter().any(|t| t == &article.title) {
            std::future::pending::<()>().await;
        }
        let external_id = article
            .external_key()
            .ok_or_else(|| NewsdeskError::validation("article has no external id"))?;

        let existing = self.find_article(source_id, external_id).await?;
        tokio::task::yield_now().await;

        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        match existing {
            Some(existing) => {
                let row = rows
                    .iter_mut()
                    .find(|r| r.id == existing.id)
                    .ok_or_else(|| NewsdeskError::Storage("article vanished".into()))?;
                row.title = article.title.clone();
                row.description = article.description.clone();
                row.content = article.content.clone();
                row.url = article.url.clone();
                row.image_url = article.image_url.clone();
                row.author = article.author.clone();
                row.category = article.category.clone();
                row.tags = article.tags.clone();
                row.published_at = article.published_at;
                row.updated_at = now;
                Ok(UpsertAction::Updated)
            }
            None => {
                if rows
                    .iter()
                    .any(|r| r.source_id == source_id && r.external_id == external_id)
                {
                    return Err(NewsdeskError::Storage(
                        "UNIQUE constraint failed: articles.source_id, articles.external_id"
                            .into(),
                    ));
                }
                rows.push(StoredArticle {
                    id: format!("article-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                    source_id,
                    external_id: external_id.to_string(),
                    title: article.title.clone(),
                    description: article.description.clone(),
                    content: article.content.clone(),
                    url: article.url.clone(),
                    image_url: article.image_url.clone(),
                    author: article.author.clone(),
                    category: article.category.clone(),
                    tags: article.tags.clone(),
                    published_at: article.published_at,
                    created_at: now,
                    updated_at: now,
                });
                Ok(UpsertAction::Created)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Source catalog
// ---------------------------------------------------------------------------

pub struct MemoryCatalog(pub Vec<NewsSource>);

#[async_trait]
impl SourceCatalog for MemoryCatalog {
    async fn source_by_slug(&self, slug: &str) -> Result<Option<NewsSource>> {
        Ok(self.0.iter().find(|s| s.slug == slug).cloned())
    }

    async fn active_sources(&self) -> Result<Vec<NewsSource>> {
        Ok(self.0.iter().filter(|s| s.is_active).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Serves `config.articles` generated articles; panics when `config.panic` is set.
pub struct CannedAdapter {
    source: NewsSource,
}

#[async_trait]
impl SourceAdapter for CannedAdapter {
    fn source(&self) -> &NewsSource {
        &self.source
    }

    fn name(&self) -> &str {
        &self.source.name
    }

    async fn fetch_articles(&self) -> Vec<CanonicalArticle> {
        if self.source.config.get("panic").and_then(|v| v.as_bool()) == Some(true) {
            panic!("adapter for {} blew up", self.source.slug);
        }
        let count = self.source.config_u64("articles").unwrap_or(0);
        (1..=count)
            .map(|i| {
                canonical(
                    &format!("{}-{i}", self.source.slug),
                    &format!("{} story {i}", self.source.name),
                )
            })
            .collect()
    }
}

/// Registry mapping the given slugs to [`CannedAdapter`].
pub fn canned_registry(slugs: &[&str]) -> AdapterRegistry {
    let mut registry = AdapterRegistry::empty();
    for slug in slugs {
        registry.register(*slug, |source, _client| -> Box<dyn SourceAdapter> {
            Box::new(CannedAdapter { source })
        });
    }
    registry
}
