//! Slug-keyed adapter lookup.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use newsdesk_shared::{HttpConfig, NewsSource, NewsdeskError, Result};
use newsdesk_storage::SourceCatalog;
use reqwest::Client;
use tracing::{debug, warn};

use crate::adapters::{GuardianAdapter, NewsApiAdapter, NyTimesAdapter, SourceAdapter};

/// Builds an adapter for one source record.
pub type AdapterConstructor = fn(NewsSource, Client) -> Box<dyn SourceAdapter>;

/// Maps source slugs to adapter constructors.
pub struct AdapterRegistry {
    constructors: BTreeMap<String, AdapterConstructor>,
}

impl AdapterRegistry {
    /// A registry with no adapters.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry with the built-in providers: `newsapi`, `guardian`, `nytimes`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register("newsapi", |source, client| -> Box<dyn SourceAdapter> {
                Box::new(NewsApiAdapter::new(source, client))
            })
            .register("guardian", |source, client| -> Box<dyn SourceAdapter> {
                Box::new(GuardianAdapter::new(source, client))
            })
            .register("nytimes", |source, client| -> Box<dyn SourceAdapter> {
                Box::new(NyTimesAdapter::new(source, client))
            });
        registry
    }

    /// Process-wide built-in registry, immutable once initialized.
    pub fn global() -> &'static AdapterRegistry {
        static GLOBAL: OnceLock<AdapterRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::builtin)
    }

    /// Register (or replace) the constructor for `slug`.
    pub fn register(&mut self, slug: impl Into<String>, ctor: AdapterConstructor) -> &mut Self {
        self.constructors.insert(slug.into(), ctor);
        self
    }

    /// Whether an adapter exists for `slug`.
    pub fn supports(&self, slug: &str) -> bool {
        self.constructors.contains_key(slug)
    }

    /// Registered slugs, sorted.
    pub fn slugs(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Build the adapter for `source`. Unknown slugs construct nothing.
    pub fn create(&self, source: NewsSource, client: &Client) -> Result<Box<dyn SourceAdapter>> {
        match self.constructors.get(&source.slug) {
            Some(ctor) => {
                debug!(slug = %source.slug, "creating source adapter");
                Ok(ctor(source, client.clone()))
            }
            None => Err(NewsdeskError::UnknownSourceImplementation { slug: source.slug }),
        }
    }

    /// Build adapters for every active source in `catalog`, in catalog order.
    /// Sources without an implementation are skipped with a warning.
    pub async fn create_all_active(
        &self,
        catalog: &dyn SourceCatalog,
        client: &Client,
    ) -> Result<Vec<Box<dyn SourceAdapter>>> {
        let sources = catalog.active_sources().await?;

        let mut adapters = Vec::with_capacity(sources.len());
        for source in sources {
            let slug = source.slug.clone();
            match self.create(source, client) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => warn!(%slug, error = %e, "skipping source without an implementation"),
            }
        }
        Ok(adapters)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Build the shared HTTP client used by every adapter.
pub fn build_http_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .build()
        .map_err(|e| NewsdeskError::Network(format!("failed to build HTTP client: {e}")))
}
