//! Shared types, error model, and configuration for Newsdesk.
//!
//! This crate is the foundation depended on by all other Newsdesk crates.
//! It provides:
//! - [`NewsdeskError`], the unified error type
//! - Domain types ([`NewsSource`], [`CanonicalArticle`], [`StoredArticle`], [`UserPreference`])
//! - Query types ([`ArticleQuery`], [`Page`], [`ArticleView`])
//! - Configuration ([`AppConfig`], [`SourceEntry`], config loading)

pub mod config;
pub mod error;
pub mod query;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, HttpConfig, IngestConfig, SourceEntry, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{NewsdeskError, Result};
pub use query::{
    ArticleQuery, ArticleView, DEFAULT_PER_PAGE, MAX_PER_PAGE, MAX_PREFERENCE_VALUE_LEN, Page,
    check_len,
};
pub use types::{
    CanonicalArticle, ItemError, NewsSource, PreferenceItem, SourceSummary, StoredArticle,
    UserPreference, dedup_tags, format_timestamp, parse_timestamp,
};
