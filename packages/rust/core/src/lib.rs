//! Ingestion orchestration and domain logic for Newsdesk.
//!
//! This crate ties the source adapters and the article store together:
//! fetching and reconciling articles ([`Ingestor`]), read-side queries
//! ([`query`]) and user preference management ([`preferences`]).

pub mod cancel;
pub mod ingest;
pub mod preferences;
pub mod query;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use cancel::CancellationToken;
pub use ingest::{
    IngestOptions, Ingestor, ProgressReporter, RunSummary, SERVICE_ERROR_TITLE, SilentProgress,
    SourceReport,
};
pub use query::StatusReport;
pub use reconcile::{ReconcileOutcome, Reconciler};
