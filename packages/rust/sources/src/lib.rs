//! Upstream news provider adapters.
//!
//! This crate provides:
//! - [`adapters`]: the [`NewsProvider`] / [`SourceAdapter`] contracts and the
//!   NewsAPI, Guardian and New York Times adapters
//! - [`AdapterRegistry`]: slug-keyed lookup that turns source records into adapters

pub mod adapters;
pub mod registry;

pub use adapters::{
    GuardianAdapter, GuardianItem, NewsApiAdapter, NewsApiItem, NewsProvider, NyTimesAdapter,
    NyTimesItem, SourceAdapter,
};
pub use registry::{AdapterConstructor, AdapterRegistry, build_http_client};
