//! SQL migration definitions for the Newsdesk database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: news_sources, articles",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Upstream providers, written by `sources seed`
CREATE TABLE IF NOT EXISTS news_sources (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    api_url     TEXT NOT NULL,
    api_key     TEXT NOT NULL DEFAULT '',
    config_json TEXT NOT NULL DEFAULT '{}',
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Reconciled articles; one row per (source, external id)
CREATE TABLE IF NOT EXISTS articles (
    id           TEXT PRIMARY KEY,
    source_id    INTEGER NOT NULL REFERENCES news_sources(id) ON DELETE CASCADE,
    external_id  TEXT NOT NULL,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    content      TEXT NOT NULL DEFAULT '',
    url          TEXT,
    image_url    TEXT,
    author       TEXT,
    category     TEXT,
    tags_json    TEXT NOT NULL DEFAULT '[]',
    published_at TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE(source_id, external_id)
);

CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at);
CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category);
CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "User preferences",
            sql: r#"
CREATE TABLE IF NOT EXISTS user_preferences (
    user_id                  TEXT PRIMARY KEY,
    selected_sources_json    TEXT NOT NULL DEFAULT '[]',
    excluded_sources_json    TEXT NOT NULL DEFAULT '[]',
    selected_categories_json TEXT NOT NULL DEFAULT '[]',
    excluded_categories_json TEXT NOT NULL DEFAULT '[]',
    selected_authors_json    TEXT NOT NULL DEFAULT '[]',
    excluded_authors_json    TEXT NOT NULL DEFAULT '[]',
    updated_at               TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
