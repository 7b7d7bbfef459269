//! The Guardian Open Platform adapter (`/search` listing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_shared::{CanonicalArticle, NewsSource, dedup_tags};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{NewsProvider, decode_items, endpoint, get_json, lenient, non_empty, published_or};

const SHOW_FIELDS: &str = "trailText,bodyText,thumbnail,byline";
const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchResponse,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<Vec<Value>>,
}

/// One entry of the Guardian's `response.results[]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianItem {
    pub id: Option<String>,
    pub web_title: Option<String>,
    pub web_url: Option<String>,
    pub web_publication_date: Option<String>,
    pub section_name: Option<String>,
    pub pillar_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fields: Option<GuardianFields>,
}

/// The optional `show-fields` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianFields {
    pub trail_text: Option<String>,
    pub body_text: Option<String>,
    pub thumbnail: Option<String>,
    pub byline: Option<String>,
}

/// Adapter for the `guardian` source.
pub struct GuardianAdapter {
    source: NewsSource,
    client: Client,
}

impl GuardianAdapter {
    pub fn new(source: NewsSource, client: Client) -> Self {
        Self { source, client }
    }
}

#[async_trait]
impl NewsProvider for GuardianAdapter {
    type Raw = GuardianItem;

    fn news_source(&self) -> &NewsSource {
        &self.source
    }

    async fn fetch_raw(&self) -> Vec<GuardianItem> {
        let source = &self.source;
        let mut query = vec![
            ("api-key", source.api_key.clone()),
            ("show-fields", SHOW_FIELDS.to_string()),
            ("order-by", "newest".to_string()),
            (
                "page-size",
                source
                    .config_u64("page_size")
                    .unwrap_or(DEFAULT_PAGE_SIZE)
                    .to_string(),
            ),
        ];
        if let Some(section) = source.config_str("section") {
            query.push(("section", section.to_string()));
        }

        let url = endpoint(source, "search");
        let results = get_json::<SearchEnvelope>(&self.client, source, &url, &query)
            .await
            .and_then(|payload| payload.response.results)
            .unwrap_or_default();
        let items: Vec<GuardianItem> = decode_items(source, results);

        debug!(source = %source.name, count = items.len(), "fetched Guardian results");
        items
    }

    fn normalize(&self, raw: GuardianItem, now: DateTime<Utc>) -> CanonicalArticle {
        let section = non_empty(raw.section_name);
        let pillar = non_empty(raw.pillar_name);
        let fields = raw.fields.unwrap_or_default();

        CanonicalArticle {
            external_id: non_empty(raw.id),
            title: raw.web_title.unwrap_or_default(),
            description: fields.trail_text.unwrap_or_default(),
            content: fields.body_text.unwrap_or_default(),
            url: non_empty(raw.web_url),
            image_url: non_empty(fields.thumbnail),
            author: non_empty(fields.byline),
            tags: dedup_tags(section.iter().chain(pillar.iter()).cloned()),
            category: section,
            published_at: published_or(raw.web_publication_date.as_deref(), now),
        }
    }
}
