//! Read-side operations over stored articles and sources.

use std::collections::HashMap;

use newsdesk_shared::{
    ArticleQuery, ArticleView, NewsSource, NewsdeskError, Page, Result, SourceSummary,
    StoredArticle,
};
use newsdesk_storage::{ArticleCount, SourceCatalog, Storage};
use serde::Serialize;
use tracing::{debug, instrument};

/// Number of articles returned by [`latest_articles`].
pub const LATEST_LIMIT: u32 = 10;

/// Number of recent articles included in [`StatusReport`].
pub const STATUS_RECENT_LIMIT: u32 = 5;

/// Snapshot of the store for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub total_articles: u64,
    pub active_sources: usize,
    pub recent_articles: Vec<ArticleView>,
    pub articles_per_source: Vec<ArticleCount>,
}

/// List articles matching `query`, narrowed by `user_id`'s preferences when given.
#[instrument(skip_all, fields(page = query.page, per_page = query.per_page))]
pub async fn list_articles(
    storage: &Storage,
    query: &ArticleQuery,
    user_id: Option<&str>,
) -> Result<Page<ArticleView>> {
    query.validate()?;
    if let Some(source_id) = query.source_id {
        if storage.source_by_id(source_id).await?.is_none() {
            return Err(NewsdeskError::validation(format!(
                "source_id {source_id} does not exist"
            )));
        }
    }

    let prefs = match user_id {
        Some(user_id) => storage.get_preferences(user_id).await?,
        None => None,
    };
    let (articles, total) = storage.query_articles(query, prefs.as_ref()).await?;
    debug!(total, returned = articles.len(), "articles listed");

    let sources = source_index(storage).await?;
    Ok(Page::new(articles, query, total).map(|article| attach(article, &sources)))
}

/// A single article by id.
pub async fn show_article(storage: &Storage, id: &str) -> Result<Option<ArticleView>> {
    let Some(article) = storage.get_article(id).await? else {
        return Ok(None);
    };
    let source = storage
        .source_by_id(article.source_id)
        .await?
        .map(|s| s.summary());
    Ok(Some(ArticleView {
        article,
        news_source: source,
    }))
}

/// The [`LATEST_LIMIT`] most recently published articles.
pub async fn latest_articles(storage: &Storage) -> Result<Vec<ArticleView>> {
    recent(storage, LATEST_LIMIT).await
}

/// Distinct non-empty categories.
pub async fn categories(storage: &Storage) -> Result<Vec<String>> {
    storage.distinct_categories().await
}

/// Distinct non-empty authors.
pub async fn authors(storage: &Storage) -> Result<Vec<String>> {
    storage.distinct_authors().await
}

/// Sources currently flagged active.
pub async fn active_sources(storage: &Storage) -> Result<Vec<NewsSource>> {
    storage.active_sources().await
}

/// Totals, recent articles and per-source counts.
pub async fn status(storage: &Storage) -> Result<StatusReport> {
    let total_articles = storage.count_articles().await?;
    let articles_per_source = storage.article_counts_by_source().await?;
    let recent_articles = recent(storage, STATUS_RECENT_LIMIT).await?;

    Ok(StatusReport {
        total_articles,
        active_sources: articles_per_source.len(),
        recent_articles,
        articles_per_source,
    })
}

async fn recent(storage: &Storage, limit: u32) -> Result<Vec<ArticleView>> {
    let articles = storage.latest_articles(limit).await?;
    let sources = source_index(storage).await?;
    Ok(articles
        .into_iter()
        .map(|article| attach(article, &sources))
        .collect())
}

async fn source_index(storage: &Storage) -> Result<HashMap<i64, SourceSummary>> {
    Ok(storage
        .list_sources()
        .await?
        .iter()
        .map(|s| (s.id, s.summary()))
        .collect())
}

fn attach(article: StoredArticle, sources: &HashMap<i64, SourceSummary>) -> ArticleView {
    let news_source = sources.get(&article.source_id).cloned();
    ArticleView {
        article,
        news_source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::canonical;
    use newsdesk_shared::{SourceEntry, UserPreference};
    use newsdesk_storage::ArticleCollection;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let path = std::env::temp_dir().join(format!("nd_test_{}.db", Uuid::now_v7()));
        Storage::open(&path).await.expect("open test storage")
    }

    fn entry(slug: &str, active: bool) -> SourceEntry {
        SourceEntry {
            name: format!("Source {slug}"),
            slug: slug.into(),
            api_url: "http://localhost".into(),
            api_key_env: "NEWSDESK_TEST_UNSET_KEY".into(),
            is_active: active,
            config: serde_json::Map::new(),
        }
    }

    async fn seeded() -> (Storage, NewsSource, NewsSource) {
        let storage = test_storage().await;
        let guardian = storage.upsert_source(&entry("guardian", true), "").await.unwrap();
        let newsapi = storage.upsert_source(&entry("newsapi", true), "").await.unwrap();

        storage
            .upsert_article(guardian.id, &canonical("g-1", "Guardian one"))
            .await
            .unwrap();
        let mut politics = canonical("n-1", "NewsAPI politics");
        politics.category = Some("Politics".into());
        politics.author = Some("Ann Reporter".into());
        storage.upsert_article(newsapi.id, &politics).await.unwrap();

        (storage, guardian, newsapi)
    }

    #[tokio::test]
    async fn list_attaches_source_summary() {
        let (storage, guardian, _) = seeded().await;
        let page = list_articles(&storage, &ArticleQuery::default(), None)
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.current_page, 1);
        assert_eq!(page.from, Some(1));
        assert_eq!(page.to, Some(2));
        let g = page
            .data
            .iter()
            .find(|v| v.article.external_id == "g-1")
            .unwrap();
        assert_eq!(g.news_source.as_ref().map(|s| s.id), Some(guardian.id));
        assert_eq!(g.news_source.as_ref().map(|s| s.slug.as_str()), Some("guardian"));
    }

    #[tokio::test]
    async fn unknown_source_filter_is_rejected() {
        let (storage, _, _) = seeded().await;
        let query = ArticleQuery {
            source_id: Some(999),
            ..Default::default()
        };
        let err = list_articles(&storage, &query, None).await.unwrap_err();
        assert!(matches!(err, NewsdeskError::Validation { .. }));
    }

    #[tokio::test]
    async fn invalid_query_is_rejected_before_reading() {
        let storage = test_storage().await;
        let query = ArticleQuery {
            per_page: 0,
            ..Default::default()
        };
        assert!(list_articles(&storage, &query, None).await.is_err());
    }

    #[tokio::test]
    async fn preferences_narrow_listing() {
        let (storage, _, newsapi) = seeded().await;
        let mut prefs = UserPreference::new("reader");
        prefs.excluded_sources = vec![newsapi.id];
        storage.upsert_preferences(&prefs).await.unwrap();

        let page = list_articles(&storage, &ArticleQuery::default(), Some("reader"))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].article.external_id, "g-1");

        let anonymous = list_articles(&storage, &ArticleQuery::default(), Some("nobody"))
            .await
            .unwrap();
        assert_eq!(anonymous.total, 2);
    }

    #[tokio::test]
    async fn show_missing_article_is_none() {
        let storage = test_storage().await;
        assert!(show_article(&storage, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn show_article_includes_source() {
        let (storage, guardian, _) = seeded().await;
        let latest = latest_articles(&storage).await.unwrap();
        let id = latest
            .iter()
            .find(|v| v.article.source_id == guardian.id)
            .map(|v| v.article.id.clone())
            .unwrap();

        let view = show_article(&storage, &id).await.unwrap().unwrap();
        assert_eq!(view.article.title, "Guardian one");
        assert_eq!(view.news_source.unwrap().name, "Source guardian");
    }

    #[tokio::test]
    async fn status_counts_active_sources_only() {
        let (storage, _, _) = seeded().await;
        storage.upsert_source(&entry("nytimes", false), "").await.unwrap();

        let report = status(&storage).await.unwrap();
        assert_eq!(report.total_articles, 2);
        assert_eq!(report.active_sources, 2);
        assert_eq!(report.recent_articles.len(), 2);
        assert!(report.articles_per_source.iter().all(|c| c.articles == 1));
        assert_eq!(active_sources(&storage).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn distinct_values_pass_through() {
        let (storage, _, _) = seeded().await;
        assert_eq!(categories(&storage).await.unwrap(), vec!["Politics", "World"]);
        assert_eq!(authors(&storage).await.unwrap(), vec!["Ann Reporter", "Staff"]);
    }
}
