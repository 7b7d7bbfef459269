//! Core domain types for Newsdesk: sources, articles and user preferences.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Format a timestamp the way it is stored: fixed-width RFC 3339 in UTC, so
/// lexical order matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a provider or user supplied timestamp.
///
/// Accepts RFC 3339, the offset-without-colon form (`2024-05-01T10:00:00+0000`)
/// and a bare date (interpreted as midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// NewsSource
// ---------------------------------------------------------------------------

/// A configured upstream news provider.
///
/// Read-only from the ingestion pipeline's perspective; rows are written by
/// `sources seed` from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSource {
    /// Store-assigned identifier.
    pub id: i64,
    /// Human-readable name (e.g. "The Guardian").
    pub name: String,
    /// Stable routing key used to pick an adapter (e.g. `guardian`).
    pub slug: String,
    /// Upstream API base URL.
    pub api_url: String,
    /// Resolved credential. Never serialized to output.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Free-form provider options.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Inactive sources are skipped by ingestion and hidden from listings.
    pub is_active: bool,
}

impl NewsSource {
    /// Read a string option from the provider config.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Read an unsigned integer option from the provider config.
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(|v| v.as_u64())
    }

    /// Compact summary attached to query results.
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            id: self.id,
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

/// Identifying subset of a [`NewsSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

/// Provider-agnostic article produced by every source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalArticle {
    /// Provider-assigned identifier; required before persistence.
    pub external_id: Option<String>,
    pub title: String,
    pub description: String,
    pub content: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    /// Ordered, deduplicated, no empty entries.
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
}

impl CanonicalArticle {
    /// Title used when reporting errors about this article.
    pub fn display_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() { "Unknown" } else { title }
    }

    /// The external id, if present and non-blank.
    pub fn external_key(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A persisted article: canonical fields plus identity and storage timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    /// UUID v7 identifier.
    pub id: String,
    pub source_id: i64,
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Drop blank entries and later duplicates, keeping first-seen order.
pub fn dedup_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag: String = tag.into();
        let tag = tag.trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

// ---------------------------------------------------------------------------
// Ingestion outcomes
// ---------------------------------------------------------------------------

/// A single article that failed to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub title: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// UserPreference
// ---------------------------------------------------------------------------

/// Per-user inclusion/exclusion lists applied on the query side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    #[serde(default)]
    pub selected_sources: Vec<i64>,
    #[serde(default)]
    pub excluded_sources: Vec<i64>,
    #[serde(default)]
    pub selected_categories: Vec<String>,
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default)]
    pub selected_authors: Vec<String>,
    #[serde(default)]
    pub excluded_authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPreference {
    /// Empty preferences for a user (nothing selected, nothing excluded).
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            selected_sources: Vec::new(),
            excluded_sources: Vec::new(),
            selected_categories: Vec::new(),
            excluded_categories: Vec::new(),
            selected_authors: Vec::new(),
            excluded_authors: Vec::new(),
            updated_at: None,
        }
    }

    /// Whether any list is non-empty.
    pub fn has_filters(&self) -> bool {
        !(self.selected_sources.is_empty()
            && self.excluded_sources.is_empty()
            && self.selected_categories.is_empty()
            && self.excluded_categories.is_empty()
            && self.selected_authors.is_empty()
            && self.excluded_authors.is_empty())
    }
}

/// One entry of a user's "selected" lists, for add/remove operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceItem {
    Source(i64),
    Category(String),
    Author(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_formats_are_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        let (fa, fb) = (format_timestamp(&a), format_timestamp(&b));
        assert_eq!(fa, "2024-05-01T10:00:00.000000Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
    }

    #[test]
    fn parse_timestamp_accepts_provider_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00+0000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn dedup_tags_keeps_first_occurrence() {
        let tags = dedup_tags(["World", "", "Europe", "World", " Europe "]);
        assert_eq!(tags, vec!["World".to_string(), "Europe".to_string()]);
    }

    #[test]
    fn display_title_falls_back_to_unknown() {
        let article = CanonicalArticle {
            external_id: None,
            title: "   ".into(),
            description: String::new(),
            content: String::new(),
            url: None,
            image_url: None,
            author: None,
            category: None,
            tags: vec![],
            published_at: Utc::now(),
        };
        assert_eq!(article.display_title(), "Unknown");
        assert_eq!(article.external_key(), None);
    }

    #[test]
    fn source_config_accessors() {
        let source: NewsSource = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "NewsAPI.org",
            "slug": "newsapi",
            "api_url": "https://newsapi.org/v2",
            "config": { "country": "gb", "page_size": 10, "category": "  " },
            "is_active": true
        }))
        .expect("deserialize source");
        assert_eq!(source.config_str("country"), Some("gb"));
        assert_eq!(source.config_str("category"), None);
        assert_eq!(source.config_u64("page_size"), Some(10));
        assert!(source.api_key.is_empty());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let source = NewsSource {
            id: 1,
            name: "The Guardian".into(),
            slug: "guardian".into(),
            api_url: "https://content.guardianapis.com".into(),
            api_key: "secret".into(),
            config: Default::default(),
            is_active: true,
        };
        let json = serde_json::to_string(&source).expect("serialize");
        assert!(!json.contains("secret"));
    }

    #[test]
    fn preference_filters_detection() {
        let mut prefs = UserPreference::new("alice");
        assert!(!prefs.has_filters());
        prefs.excluded_authors.push("Staff".into());
        assert!(prefs.has_filters());
    }
}
