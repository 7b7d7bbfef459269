//! Source adapter traits and the built-in provider adapters.
//!
//! Each provider implements the typed [`NewsProvider`] contract (raw payload
//! type, one fetch, a pure normalizer). Every provider is also a
//! [`SourceAdapter`], the object-safe form handed out by the registry.

mod guardian;
mod newsapi;
mod nytimes;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_shared::{CanonicalArticle, NewsSource, parse_timestamp};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

pub use guardian::{GuardianAdapter, GuardianItem};
pub use newsapi::{NewsApiAdapter, NewsApiItem};
pub use nytimes::{NyTimesAdapter, NyTimesItem};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Typed contract for one upstream provider.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// One item of the provider's listing payload.
    type Raw: Send;

    /// The source record this adapter was built for.
    fn news_source(&self) -> &NewsSource;

    /// Fetch the provider's listing. Upstream failures are logged and
    /// degrade to an empty vector; this never returns an error.
    async fn fetch_raw(&self) -> Vec<Self::Raw>;

    /// Map one raw item to the canonical schema. `now` substitutes for a
    /// missing or unparseable publication time.
    fn normalize(&self, raw: Self::Raw, now: DateTime<Utc>) -> CanonicalArticle;
}

/// Object-safe adapter handed out by the [`AdapterRegistry`](crate::AdapterRegistry).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> &NewsSource;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// Fetch and normalize the provider's current listing.
    async fn fetch_articles(&self) -> Vec<CanonicalArticle>;
}

#[async_trait]
impl<P: NewsProvider> SourceAdapter for P {
    fn source(&self) -> &NewsSource {
        self.news_source()
    }

    fn name(&self) -> &str {
        &self.news_source().name
    }

    async fn fetch_articles(&self) -> Vec<CanonicalArticle> {
        let raw = self.fetch_raw().await;
        let now = Utc::now();
        raw.into_iter().map(|item| self.normalize(item, now)).collect()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// GET `url` and decode the JSON body. Any failure is logged with source
/// context and yields `None`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    source: &NewsSource,
    url: &str,
    query: &[(&str, String)],
) -> Option<T> {
    debug!(source = %source.name, %url, "requesting provider listing");

    let response = match client.get(url).query(query).send().await {
        Ok(response) => response,
        Err(e) => {
            let timeout = e.is_timeout();
            // Strip the URL: it carries the API key as a query parameter.
            let e = e.without_url();
            warn!(
                source = %source.name,
                slug = %source.slug,
                timeout,
                error = %e,
                "provider request failed"
            );
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(
            source = %source.name,
            slug = %source.slug,
            status = status.as_u16(),
            body = %truncate(&body, 300),
            "provider request returned non-success status"
        );
        return None;
    }

    match response.json::<T>().await {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(
                source = %source.name,
                slug = %source.slug,
                error = %e.without_url(),
                "provider response could not be decoded"
            );
            None
        }
    }
}

/// Decode each listing entry on its own. Entries that do not fit the item
/// type are logged and skipped, the rest of the batch is kept.
pub(crate) fn decode_items<T: DeserializeOwned>(source: &NewsSource, items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(
                    source = %source.name,
                    slug = %source.slug,
                    index,
                    error = %e,
                    "skipping undecodable provider item"
                );
                None
            }
        })
        .collect()
}

/// `deserialize_with` for optional nested objects: `null` or a value of the
/// wrong shape becomes `None` instead of failing the whole item.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Join the source's base URL and an endpoint path.
pub(crate) fn endpoint(source: &NewsSource, path: &str) -> String {
    format!(
        "{}/{}",
        source.api_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Trimmed value, `None` when absent or blank.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Publication time, falling back to `now`.
pub(crate) fn published_or(value: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    value.and_then(parse_timestamp).unwrap_or(now)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
