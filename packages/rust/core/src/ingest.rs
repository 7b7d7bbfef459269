//! Ingestion orchestrator.
//!
//! Runs one source or every active source through fetch → reconcile and
//! aggregates per-source reports into a [`RunSummary`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use newsdesk_shared::{CanonicalArticle, ItemError, NewsSource, NewsdeskError, Result};
use newsdesk_sources::{AdapterRegistry, SourceAdapter};
use newsdesk_storage::{ArticleCollection, SourceCatalog};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::reconcile::Reconciler;

/// Title recorded for a source whose processing failed as a whole.
pub const SERVICE_ERROR_TITLE: &str = "Service Error";

/// Knobs for a single ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Fetch normally but never write to storage.
    pub dry_run: bool,
    /// Sources processed at once in `run_all`. 1 means strictly sequential.
    pub concurrency: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of ingesting one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: i64,
    pub source_name: String,
    pub source_slug: String,
    pub articles_fetched: usize,
    pub articles_created: usize,
    pub articles_updated: usize,
    pub errors: Vec<ItemError>,
    pub elapsed: Duration,
}

impl SourceReport {
    fn empty(source: &NewsSource) -> Self {
        Self {
            source_id: source.id,
            source_name: source.name.clone(),
            source_slug: source.slug.clone(),
            articles_fetched: 0,
            articles_created: 0,
            articles_updated: 0,
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Zero-stat report carrying a single service error.
    pub fn failed(source: &NewsSource, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            errors: vec![ItemError {
                title: SERVICE_ERROR_TITLE.to_string(),
                error: error.into(),
            }],
            elapsed,
            ..Self::empty(source)
        }
    }
}

/// Aggregate over every source processed in a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub cancelled: bool,
    pub sources_processed: usize,
    pub total_articles_fetched: usize,
    pub total_articles_created: usize,
    pub total_articles_updated: usize,
    pub total_errors: usize,
    pub reports: Vec<SourceReport>,
}

impl RunSummary {
    /// A summary with nothing processed.
    pub fn empty(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    fn from_reports(dry_run: bool, cancelled: bool, reports: Vec<SourceReport>) -> Self {
        let mut summary = Self {
            dry_run,
            cancelled,
            sources_processed: reports.len(),
            ..Self::default()
        };
        for report in &reports {
            summary.total_articles_fetched += report.articles_fetched;
            summary.total_articles_created += report.articles_created;
            summary.total_articles_updated += report.articles_updated;
            summary.total_errors += report.errors.len();
        }
        summary.reports = reports;
        summary
    }

    /// True when no source recorded an error.
    pub fn is_clean(&self) -> bool {
        self.total_errors == 0
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting ingestion status.
pub trait ProgressReporter: Send + Sync {
    /// Called once before any source is processed.
    fn run_started(&self, sources: usize, dry_run: bool);
    /// Called before a source is fetched.
    fn source_started(&self, source: &NewsSource);
    /// Called with the normalized batch, before reconciling.
    fn articles_fetched(&self, source: &NewsSource, articles: &[CanonicalArticle]);
    /// Called when a source is done, successfully or not.
    fn source_finished(&self, report: &SourceReport);
    /// Called once with the final summary.
    fn run_finished(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn run_started(&self, _sources: usize, _dry_run: bool) {}
    fn source_started(&self, _source: &NewsSource) {}
    fn articles_fetched(&self, _source: &NewsSource, _articles: &[CanonicalArticle]) {}
    fn source_finished(&self, _report: &SourceReport) {}
    fn run_finished(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Drives adapters and the reconciler for one or all sources.
///
/// One [`Reconciler`] is shared by every run on this ingestor, so overlapping
/// runs serialize their writes per article key.
pub struct Ingestor<'r> {
    catalog: Arc<dyn SourceCatalog>,
    collection: Arc<dyn ArticleCollection>,
    reconciler: Arc<Reconciler>,
    registry: &'r AdapterRegistry,
    client: Client,
    options: IngestOptions,
    cancel: CancellationToken,
}

impl<'r> Ingestor<'r> {
    pub fn new(
        catalog: Arc<dyn SourceCatalog>,
        collection: Arc<dyn ArticleCollection>,
        registry: &'r AdapterRegistry,
        client: Client,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            reconciler: shared_reconciler(&collection, &cancel),
            catalog,
            collection,
            registry,
            client,
            options: IngestOptions::default(),
            cancel,
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop between sources and between articles once `cancel` is tripped.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.reconciler = shared_reconciler(&self.collection, &cancel);
        self.cancel = cancel;
        self
    }

    /// Ingest a single source by slug.
    ///
    /// Fails before any fetch when the slug is unknown, inactive or has no
    /// adapter.
    #[instrument(skip_all, fields(slug = %slug, dry_run = self.options.dry_run))]
    pub async fn run_source(
        &self,
        slug: &str,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<RunSummary> {
        let source = self
            .catalog
            .source_by_slug(slug)
            .await?
            .ok_or_else(|| NewsdeskError::SourceNotFound {
                slug: slug.to_string(),
            })?;
        if !source.is_active {
            return Err(NewsdeskError::SourceInactive {
                slug: source.slug,
            });
        }
        let adapter = self.registry.create(source, &self.client)?;

        reporter.run_started(1, self.options.dry_run);
        let started = Instant::now();
        let report = match process_source(
            adapter.as_ref(),
            &self.reconciler,
            reporter.as_ref(),
            self.options.dry_run,
        )
        .await
        {
            Ok(report) => report,
            Err(e) => {
                error!(slug = %adapter.source().slug, error = %e, "source failed");
                let report = SourceReport::failed(adapter.source(), e.to_string(), started.elapsed());
                reporter.source_finished(&report);
                report
            }
        };

        let summary =
            RunSummary::from_reports(self.options.dry_run, self.cancel.is_cancelled(), vec![report]);
        log_summary(&summary);
        reporter.run_finished(&summary);
        Ok(summary)
    }

    /// Ingest every active source with an adapter.
    ///
    /// Sources run on a bounded pool; reports are merged in source order.
    /// A failing or panicking source is recorded as a service error and the
    /// run continues.
    #[instrument(skip_all, fields(dry_run = self.options.dry_run, concurrency = self.options.concurrency))]
    pub async fn run_all(&self, reporter: Arc<dyn ProgressReporter>) -> Result<RunSummary> {
        let adapters = self
            .registry
            .create_all_active(self.catalog.as_ref(), &self.client)
            .await?;

        info!(sources = adapters.len(), "starting ingestion run");
        reporter.run_started(adapters.len(), self.options.dry_run);

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let dry_run = self.options.dry_run;

        let mut handles: Vec<(NewsSource, Instant, JoinHandle<Result<SourceReport>>)> =
            Vec::with_capacity(adapters.len());

        for adapter in adapters {
            if self.cancel.is_cancelled() {
                warn!(slug = %adapter.source().slug, "run cancelled, skipping remaining sources");
                break;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            // The previous source may have been cancelled while we waited.
            if self.cancel.is_cancelled() {
                warn!(slug = %adapter.source().slug, "run cancelled, skipping remaining sources");
                break;
            }

            let source = adapter.source().clone();
            let reconciler = self.reconciler.clone();
            let reporter = reporter.clone();

            handles.push((
                source,
                Instant::now(),
                tokio::spawn(async move {
                    let _permit = permit;
                    process_source(adapter.as_ref(), &reconciler, reporter.as_ref(), dry_run).await
                }),
            ));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (source, started, handle) in handles {
            let report = match handle.await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!(slug = %source.slug, error = %e, "source failed");
                    let report = SourceReport::failed(&source, e.to_string(), started.elapsed());
                    reporter.source_finished(&report);
                    report
                }
                Err(e) => {
                    error!(slug = %source.slug, error = %e, "source task aborted");
                    let report = SourceReport::failed(&source, e.to_string(), started.elapsed());
                    reporter.source_finished(&report);
                    report
                }
            };
            reports.push(report);
        }

        let summary = RunSummary::from_reports(dry_run, self.cancel.is_cancelled(), reports);
        log_summary(&summary);
        reporter.run_finished(&summary);
        Ok(summary)
    }
}

fn shared_reconciler(
    collection: &Arc<dyn ArticleCollection>,
    cancel: &CancellationToken,
) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(collection.clone()).with_cancellation(cancel.clone()))
}

/// Fetch and reconcile one source.
async fn process_source(
    adapter: &dyn SourceAdapter,
    reconciler: &Reconciler,
    reporter: &dyn ProgressReporter,
    dry_run: bool,
) -> Result<SourceReport> {
    let started = Instant::now();
    let source = adapter.source();
    reporter.source_started(source);

    info!(source = adapter.name(), "fetching articles");
    let articles = adapter.fetch_articles().await;
    info!(source = adapter.name(), count = articles.len(), "fetched articles");
    reporter.articles_fetched(source, &articles);

    let mut report = SourceReport::empty(source);
    report.articles_fetched = articles.len();

    if dry_run {
        report.articles_created = articles.len();
    } else if !articles.is_empty() {
        let outcome = reconciler.reconcile(source.id, &articles).await?;
        report.articles_created = outcome.created;
        report.articles_updated = outcome.updated;
        report.errors = outcome.errors;
    }

    report.elapsed = started.elapsed();
    info!(
        source = adapter.name(),
        created = report.articles_created,
        updated = report.articles_updated,
        errors = report.errors.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "source complete"
    );
    reporter.source_finished(&report);
    Ok(report)
}

fn log_summary(summary: &RunSummary) {
    info!(
        sources = summary.sources_processed,
        fetched = summary.total_articles_fetched,
        created = summary.total_articles_created,
        updated = summary.total_articles_updated,
        errors = summary.total_errors,
        cancelled = summary.cancelled,
        dry_run = summary.dry_run,
        "ingestion run complete"
    );
}
