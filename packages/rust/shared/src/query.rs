//! Query-side types: article filters and paginated results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NewsdeskError, Result};
use crate::types::{SourceSummary, StoredArticle};

/// Default page size for article listings.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: u32 = 100;

const MAX_SEARCH_LEN: usize = 255;
const MAX_FILTER_LEN: usize = 100;

/// Filters for listing articles. Every filter is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleQuery {
    /// Substring match over title, description and content.
    #[serde(default)]
    pub search: Option<String>,
    /// Exact category match.
    #[serde(default)]
    pub category: Option<String>,
    /// Substring match on author.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    /// Inclusive lower bound on `published_at`.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `published_at`.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            author: None,
            source_id: None,
            start_date: None,
            end_date: None,
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl ArticleQuery {
    /// Check bounds on every filter.
    pub fn validate(&self) -> Result<()> {
        check_len("search", self.search.as_deref(), MAX_SEARCH_LEN)?;
        check_len("category", self.category.as_deref(), MAX_FILTER_LEN)?;
        check_len("author", self.author.as_deref(), MAX_FILTER_LEN)?;

        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(NewsdeskError::validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        if self.page < 1 {
            return Err(NewsdeskError::validation("page must be at least 1"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(NewsdeskError::validation(
                    "end_date must be after or equal to start_date",
                ));
            }
        }
        Ok(())
    }

    /// Zero-based row offset of the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// Reject values longer than `max` characters.
pub fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(NewsdeskError::validation(format!(
            "{field} may not be longer than {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// Maximum length of a category or author preference value.
pub const MAX_PREFERENCE_VALUE_LEN: usize = MAX_FILTER_LEN;

/// A stored article with its owning source attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: StoredArticle,
    /// `None` when the source row no longer exists.
    pub news_source: Option<SourceSummary>,
}

/// One page of results plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
    /// 1-based index of the first item on this page, `None` when empty.
    pub from: Option<u64>,
    /// 1-based index of the last item on this page, `None` when empty.
    pub to: Option<u64>,
}

impl<T> Page<T> {
    /// Assemble pagination metadata around a fetched slice of rows.
    pub fn new(data: Vec<T>, query: &ArticleQuery, total: u64) -> Self {
        let per_page = u64::from(query.per_page.max(1));
        let last_page = total.div_ceil(per_page).max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let first = query.offset() + 1;
            (Some(first), Some(first + data.len() as u64 - 1))
        };
        Self {
            data,
            current_page: query.page,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            per_page: query.per_page,
            total,
            from,
            to,
        }
    }

    /// Transform the items while keeping pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            current_page: self.current_page,
            last_page: self.last_page,
            per_page: self.per_page,
            total: self.total,
            from: self.from,
            to: self.to,
        }
    }
}
