//! NewsAPI.org adapter (`top-headlines` listing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_shared::{CanonicalArticle, NewsSource, dedup_tags};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{NewsProvider, decode_items, endpoint, get_json, lenient, non_empty, published_or};

const DEFAULT_COUNTRY: &str = "us";
const DEFAULT_CATEGORY: &str = "technology";
const DEFAULT_PAGE_SIZE: u64 = 5;

#[derive(Debug, Deserialize)]
struct TopHeadlines {
    #[serde(default)]
    articles: Option<Vec<Value>>,
}

/// One entry of NewsAPI's `articles[]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsApiItem {
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<NewsApiOrigin>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub content: Option<String>,
}

/// The publisher NewsAPI aggregated the article from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsApiOrigin {
    pub name: Option<String>,
}

/// Adapter for the `newsapi` source.
pub struct NewsApiAdapter {
    source: NewsSource,
    client: Client,
}

impl NewsApiAdapter {
    pub fn new(source: NewsSource, client: Client) -> Self {
        Self { source, client }
    }
}

#[async_trait]
impl NewsProvider for NewsApiAdapter {
    type Raw = NewsApiItem;

    fn news_source(&self) -> &NewsSource {
        &self.source
    }

    async fn fetch_raw(&self) -> Vec<NewsApiItem> {
        let source = &self.source;
        let query = [
            (
                "country",
                source.config_str("country").unwrap_or(DEFAULT_COUNTRY).to_string(),
            ),
            (
                "category",
                source.config_str("category").unwrap_or(DEFAULT_CATEGORY).to_string(),
            ),
            (
                "pageSize",
                source
                    .config_u64("page_size")
                    .unwrap_or(DEFAULT_PAGE_SIZE)
                    .to_string(),
            ),
            ("apiKey", source.api_key.clone()),
        ];

        let url = endpoint(source, "top-headlines");
        let articles = get_json::<TopHeadlines>(&self.client, source, &url, &query)
            .await
            .and_then(|payload| payload.articles)
            .unwrap_or_default();
        let items: Vec<NewsApiItem> = decode_items(source, articles);

        debug!(source = %source.name, count = items.len(), "fetched NewsAPI headlines");
        items
    }

    fn normalize(&self, raw: NewsApiItem, now: DateTime<Utc>) -> CanonicalArticle {
        let publisher = raw.source.and_then(|origin| non_empty(origin.name));

        CanonicalArticle {
            external_id: non_empty(raw.url.clone()),
            title: raw.title.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            content: raw.content.unwrap_or_default(),
            url: non_empty(raw.url),
            image_url: non_empty(raw.url_to_image),
            author: non_empty(raw.author),
            // NewsAPI carries no category.
            category: None,
            tags: dedup_tags(publisher),
            published_at: published_or(raw.published_at.as_deref(), now),
        }
    }
}
