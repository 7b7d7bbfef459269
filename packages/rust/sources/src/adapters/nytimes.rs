//! New York Times Article Search adapter.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_shared::{CanonicalArticle, NewsSource, dedup_tags};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{NewsProvider, decode_items, endpoint, get_json, lenient, non_empty, published_or};

const FIELD_LIST: &str = "headline,abstract,byline,web_url,multimedia,pub_date,section_name,subsection_name,des_facet,uri";
const DEFAULT_QUERY: &str = "news";
const MAX_FACET_TAGS: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchResponse,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Option<Vec<Value>>,
}

/// One entry of `response.docs[]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NyTimesItem {
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub headline: Option<NyTimesHeadline>,
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub web_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub byline: Option<NyTimesByline>,
    pub pub_date: Option<String>,
    pub section_name: Option<String>,
    pub subsection_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub des_facet: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NyTimesHeadline {
    pub main: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NyTimesByline {
    pub original: Option<String>,
}

/// Adapter for the `nytimes` source.
pub struct NyTimesAdapter {
    source: NewsSource,
    client: Client,
}

impl NyTimesAdapter {
    pub fn new(source: NewsSource, client: Client) -> Self {
        Self { source, client }
    }
}

#[async_trait]
impl NewsProvider for NyTimesAdapter {
    type Raw = NyTimesItem;

    fn news_source(&self) -> &NewsSource {
        &self.source
    }

    async fn fetch_raw(&self) -> Vec<NyTimesItem> {
        let source = &self.source;
        let query = [
            ("api-key", source.api_key.clone()),
            (
                "q",
                source.config_str("query").unwrap_or(DEFAULT_QUERY).to_string(),
            ),
            ("sort", "newest".to_string()),
            ("fl", FIELD_LIST.to_string()),
        ];

        let url = endpoint(source, "search/v2/articlesearch.json");
        let docs = get_json::<SearchEnvelope>(&self.client, source, &url, &query)
            .await
            .and_then(|payload| payload.response.docs)
            .unwrap_or_default();
        let items: Vec<NyTimesItem> = decode_items(source, docs);

        debug!(source = %source.name, count = items.len(), "fetched NYTimes docs");
        items
    }

    fn normalize(&self, raw: NyTimesItem, now: DateTime<Utc>) -> CanonicalArticle {
        let section = non_empty(raw.section_name);
        let subsection = non_empty(raw.subsection_name);
        let facets = raw.des_facet.unwrap_or_default();

        let tags = dedup_tags(
            section
                .iter()
                .chain(subsection.iter())
                .cloned()
                .chain(facets.into_iter().flatten().take(MAX_FACET_TAGS)),
        );
        let summary = raw.summary.unwrap_or_default();

        CanonicalArticle {
            external_id: non_empty(raw.uri),
            title: raw.headline.and_then(|h| h.main).unwrap_or_default(),
            description: summary.clone(),
            // Article Search only exposes the abstract.
            content: summary,
            url: non_empty(raw.web_url),
            // Multimedia is requested but not mapped; stored articles carry no image.
            image_url: None,
            author: raw
                .byline
                .and_then(|b| b.original)
                .map(|original| strip_byline_prefix(&original))
                .and_then(|author| non_empty(Some(author))),
            category: section,
            tags,
            published_at: published_or(raw.pub_date.as_deref(), now),
        }
    }
}

/// Remove a leading `By ` from an NYT byline.
fn strip_byline_prefix(byline: &str) -> String {
    static BY_PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = BY_PREFIX.get_or_init(|| Regex::new(r"^By\s+").expect("byline regex"));
    re.replace(byline, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SourceAdapter;
    use crate::adapters::test_support::{client, source};
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc(facets: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "uri": "nyt://article/123",
            "headline": { "main": "Senate passes bill", "print_headline": "Bill passes" },
            "abstract": "The vote was close.",
            "web_url": "https://www.nytimes.com/2024/05/01/us/politics/bill.html",
            "byline": { "original": "By Carl Hulse and Emily Cochrane" },
            "multimedia": { "default": { "url": "https://static01.nyt.com/bill.jpg" } },
            "pub_date": "2024-05-01T14:05:12+0000",
            "section_name": "U.S.",
            "subsection_name": "Politics",
            "des_facet": facets
        })
    }

    #[test]
    fn normalize_maps_fields() {
        let adapter = NyTimesAdapter::new(source("nytimes", "http://unused"), client());
        let raw: NyTimesItem = serde_json::from_value(doc(&["Law"])).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let article = adapter.normalize(raw, now);
        assert_eq!(article.external_id.as_deref(), Some("nyt://article/123"));
        assert_eq!(article.title, "Senate passes bill");
        assert_eq!(article.description, "The vote was close.");
        assert_eq!(article.content, "The vote was close.");
        assert_eq!(article.author.as_deref(), Some("Carl Hulse and Emily Cochrane"));
        assert_eq!(article.category.as_deref(), Some("U.S."));
        assert_eq!(
            article.published_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 14, 5, 12).unwrap()
        );
    }

    #[test]
    fn image_url_is_never_populated() {
        let adapter = NyTimesAdapter::new(source("nytimes", "http://unused"), client());
        let raw: NyTimesItem = serde_json::from_value(doc(&[])).unwrap();
        assert_eq!(adapter.normalize(raw, Utc::now()).image_url, None);
    }

    #[test]
    fn tags_deduplicate_and_cap_facets() {
        let adapter = NyTimesAdapter::new(source("nytimes", "http://unused"), client());
        let raw: NyTimesItem =
            serde_json::from_value(doc(&["Politics", "Law", "Senate", "Budget", "Taxes", "Votes"]))
                .unwrap();

        let article = adapter.normalize(raw, Utc::now());
        // "Politics" repeats the subsection; only the first five facets are considered.
        assert_eq!(
            article.tags,
            vec!["U.S.", "Politics", "Law", "Senate", "Budget", "Taxes"]
        );
    }

    #[test]
    fn byline_prefix_only_stripped_at_start() {
        assert_eq!(strip_byline_prefix("By  Jane Doe"), "Jane Doe");
        assert_eq!(strip_byline_prefix("Reporting By Jane"), "Reporting By Jane");
        assert_eq!(strip_byline_prefix("By "), "");
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let adapter = NyTimesAdapter::new(source("nytimes", "http://unused"), client());
        let raw: NyTimesItem = serde_json::from_value(serde_json::json!({
            "uri": "nyt://article/456",
            "byline": { "original": null },
            "des_facet": null
        }))
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let article = adapter.normalize(raw, now);
        assert_eq!(article.title, "");
        assert_eq!(article.author, None);
        assert_eq!(article.category, None);
        assert!(article.tags.is_empty());
        assert_eq!(article.published_at, now);
    }

    #[tokio::test]
    async fn fetch_hits_article_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/v2/articlesearch.json"))
            .and(query_param("api-key", "test-key"))
            .and(query_param("q", "news"))
            .and(query_param("sort", "newest"))
            .and(query_param("fl", FIELD_LIST))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "response": { "docs": [doc(&["Law"]), doc(&[])] }
            })))
            .mount(&server)
            .await;

        let adapter = NyTimesAdapter::new(source("nytimes", &server.uri()), client());
        let articles = adapter.fetch_articles().await;
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Senate passes bill");
    }

    #[tokio::test]
    async fn malformed_nested_values_keep_the_batch() {
        let server = MockServer::start().await;
        let odd = serde_json::json!({
            "uri": "nyt://article/789",
            "headline": { "main": "Odd shapes" },
            "byline": [],
            "des_facet": ["Law", null, "Courts"]
        });
        Mock::given(method("GET"))
            .and(path("/search/v2/articlesearch.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": { "docs": [doc(&["Law"]), odd, "not an object"] }
            })))
            .mount(&server)
            .await;

        let adapter = NyTimesAdapter::new(source("nytimes", &server.uri()), client());
        let articles = adapter.fetch_articles().await;
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[1].title, "Odd shapes");
        assert_eq!(articles[1].author, None);
        assert_eq!(articles[1].tags, vec!["Law", "Courts"]);
    }

    #[tokio::test]
    async fn rate_limited_response_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/v2/articlesearch.json"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let adapter = NyTimesAdapter::new(source("nytimes", &server.uri()), client());
        assert!(adapter.fetch_articles().await.is_empty());
    }
}
