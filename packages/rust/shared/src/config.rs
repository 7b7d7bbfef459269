//! Application configuration for Newsdesk.
//!
//! User config lives at `~/.newsdesk/newsdesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NewsdeskError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "newsdesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".newsdesk";

// ---------------------------------------------------------------------------
// Config structs (matching newsdesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Upstream providers, written to the store by `sources seed`.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            http: HttpConfig::default(),
            ingest: IngestConfig::default(),
            sources: default_sources(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// libSQL database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.newsdesk/newsdesk.db".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for upstream calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent to providers.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("Newsdesk/", env!("CARGO_PKG_VERSION")).into()
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// How many sources are fetched and reconciled at once. 1 = sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> u32 {
    1
}

/// `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Human-readable name.
    pub name: String,
    /// Adapter routing key.
    pub slug: String,
    /// Upstream API base URL.
    pub api_url: String,
    /// Name of the env var holding the API key (never store the key itself).
    pub api_key_env: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Provider options passed to the adapter.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl SourceEntry {
    /// Read the API key from the configured environment variable.
    /// Returns an empty string (and logs a warning) when unset.
    pub fn resolve_api_key(&self) -> String {
        match std::env::var(&self.api_key_env) {
            Ok(val) if !val.is_empty() => val,
            _ => {
                tracing::warn!(
                    slug = %self.slug,
                    env = %self.api_key_env,
                    "API key env var not set; requests to this source will likely fail"
                );
                String::new()
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceEntry> {
    fn options(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
            .collect()
    }

    vec![
        SourceEntry {
            name: "NewsAPI.org".into(),
            slug: "newsapi".into(),
            api_url: "https://newsapi.org/v2".into(),
            api_key_env: "NEWSAPI_API_KEY".into(),
            is_active: true,
            config: options(&[("country", "us"), ("category", "technology")]),
        },
        SourceEntry {
            name: "The Guardian".into(),
            slug: "guardian".into(),
            api_url: "https://content.guardianapis.com".into(),
            api_key_env: "GUARDIAN_API_KEY".into(),
            is_active: true,
            config: options(&[("section", "news")]),
        },
        SourceEntry {
            name: "The New York Times".into(),
            slug: "nytimes".into(),
            api_url: "https://api.nytimes.com/svc".into(),
            api_key_env: "NYTIMES_API_KEY".into(),
            is_active: true,
            config: options(&[("query", "news")]),
        },
    ]
}

impl AppConfig {
    /// Resolve the database path, expanding a leading `~/`.
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.defaults.database_path)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| NewsdeskError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.newsdesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NewsdeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.newsdesk/newsdesk.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NewsdeskError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NewsdeskError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| NewsdeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| NewsdeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| NewsdeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("GUARDIAN_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.http.timeout_secs, 30);
        assert_eq!(parsed.ingest.concurrency, 1);
        assert_eq!(parsed.sources.len(), 3);
        assert_eq!(parsed.sources[1].config["section"], "news");
    }

    #[test]
    fn config_with_custom_sources() {
        let toml_str = r#"
[defaults]
database_path = "/tmp/newsdesk.db"

[ingest]
concurrency = 3

[[sources]]
name = "NewsAPI.org"
slug = "newsapi"
api_url = "http://localhost:9000"
api_key_env = "ND_TEST_NEWSAPI"

[sources.config]
country = "gb"
page_size = 10
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.sources.len(), 1);
        assert!(config.sources[0].is_active);
        assert_eq!(config.sources[0].config["page_size"], 10);
        assert_eq!(config.ingest.concurrency, 3);
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/newsdesk.db")
        );
    }

    #[test]
    fn missing_api_key_resolves_empty() {
        let entry = SourceEntry {
            name: "Test".into(),
            slug: "test".into(),
            api_url: "http://localhost".into(),
            // Use a unique env var name to avoid interfering with other tests
            api_key_env: "ND_TEST_NONEXISTENT_KEY_12345".into(),
            is_active: true,
            config: Default::default(),
        };
        assert_eq!(entry.resolve_api_key(), "");
    }

    #[test]
    fn http_timeout_never_zero() {
        let http = HttpConfig {
            timeout_secs: 0,
            user_agent: "x".into(),
        };
        assert_eq!(http.timeout(), Duration::from_secs(1));
    }
}
