//! Merge canonical articles into the persistent collection.
//!
//! Articles are keyed by `(source_id, external_id)`: first sighting inserts,
//! every later sighting overwrites all mutable fields. A failing article is
//! recorded and skipped; it never aborts the batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use newsdesk_shared::{CanonicalArticle, ItemError, NewsdeskError, Result};
use newsdesk_storage::{ArticleCollection, UpsertAction};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument};

use crate::cancel::CancellationToken;

/// Per-batch counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<ItemError>,
}

type ArticleKey = (i64, String);

/// Async mutex per article key. Entries are pruned once no writer holds them.
#[derive(Default)]
struct KeyedLocks {
    locks: StdMutex<HashMap<ArticleKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: ArticleKey) -> KeyGuard<'_> {
        let lock = self.map().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<ArticleKey, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

/// Holds one key's lock. Releasing it, by completion or by the write future
/// being dropped, prunes the entry when no other writer is waiting.
struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: ArticleKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.map();
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Writes canonical articles for a source, one record at a time.
pub struct Reconciler {
    collection: Arc<dyn ArticleCollection>,
    locks: KeyedLocks,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(collection: Arc<dyn ArticleCollection>) -> Self {
        Self {
            collection,
            locks: KeyedLocks::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between articles once `cancel` is tripped.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reconcile `articles` for `source_id`, in input order.
    ///
    /// Only batch-level faults detected before the first write (such as a
    /// read-only store) are returned as `Err`. Per-article failures are
    /// collected in [`ReconcileOutcome::errors`].
    #[instrument(skip_all, fields(source_id = source_id, count = articles.len()))]
    pub async fn reconcile(
        &self,
        source_id: i64,
        articles: &[CanonicalArticle],
    ) -> Result<ReconcileOutcome> {
        self.collection.ensure_writable()?;

        let mut outcome = ReconcileOutcome::default();
        for article in articles {
            if self.cancel.is_cancelled() {
                info!(
                    processed = outcome.created + outcome.updated + outcome.errors.len(),
                    "reconcile cancelled"
                );
                break;
            }

            match self.reconcile_one(source_id, article).await {
                Ok(UpsertAction::Created) => outcome.created += 1,
                Ok(UpsertAction::Updated) => outcome.updated += 1,
                Err(e) => {
                    error!(
                        source_id,
                        article = article.display_title(),
                        error = %e,
                        "failed to store article"
                    );
                    outcome.errors.push(ItemError {
                        title: article.display_title().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(
            created = outcome.created,
            updated = outcome.updated,
            errors = outcome.errors.len(),
            "reconcile finished"
        );
        Ok(outcome)
    }

    async fn reconcile_one(
        &self,
        source_id: i64,
        article: &CanonicalArticle,
    ) -> Result<UpsertAction> {
        let external_id = article
            .external_key()
            .ok_or_else(|| NewsdeskError::Reconcile("article has no external id".into()))?;

        let _guard = self.locks.acquire((source_id, external_id.to_string())).await;
        self.collection.upsert_article(source_id, article).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryCollection, canonical};

    fn batch(n: usize) -> Vec<CanonicalArticle> {
        (1..=n)
            .map(|i| canonical(&format!("ext-{i}"), &format!("Story {i}")))
            .collect()
    }

    #[tokio::test]
    async fn second_pass_updates_instead_of_duplicating() {
        let store = Arc::new(MemoryCollection::default());
        let reconciler = Reconciler::new(store.clone());
        let articles = batch(3);

        let first = reconciler.reconcile(7, &articles).await.unwrap();
        assert_eq!((first.created, first.updated), (3, 0));

        let second = reconciler.reconcile(7, &articles).await.unwrap();
        assert_eq!((second.created, second.updated), (0, 3));
        assert!(second.errors.is_empty());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn same_external_id_under_other_source_is_distinct() {
        let store = Arc::new(MemoryCollection::default());
        let reconciler = Reconciler::new(store.clone());
        let articles = batch(2);

        reconciler.reconcile(1, &articles).await.unwrap();
        let other = reconciler.reconcile(2, &articles).await.unwrap();
        assert_eq!(other.created, 2);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn later_sighting_overwrites_every_field() {
        let store = Arc::new(MemoryCollection::default());
        let reconciler = Reconciler::new(store.clone());

        let original = canonical("ext-1", "Original");
        reconciler.reconcile(1, &[original.clone()]).await.unwrap();

        let revised = CanonicalArticle {
            title: "Revised".into(),
            description: "New description".into(),
            image_url: None,
            author: None,
            category: Some("Politics".into()),
            tags: vec![],
            ..original
        };
        let outcome = reconciler.reconcile(1, &[revised]).await.unwrap();
        assert_eq!(outcome.updated, 1);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.title, "Revised");
        assert_eq!(row.description, "New description");
        assert_eq!(row.image_url, None);
        assert_eq!(row.author, None);
        assert_eq!(row.category.as_deref(), Some("Politics"));
        assert!(row.tags.is_empty());
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_the_batch() {
        let store = Arc::new(MemoryCollection::failing_on(&["Story 3"]));
        let reconciler = Reconciler::new(store.clone());

        let outcome = reconciler.reconcile(1, &batch(5)).await.unwrap();
        assert_eq!(outcome.created, 4);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].title, "Story 3");
        assert!(outcome.errors[0].error.contains("disk I/O error"));

        let stored: Vec<String> = store.rows().into_iter().map(|r| r.title).collect();
        assert_eq!(stored, vec!["Story 1", "Story 2", "Story 4", "Story 5"]);
    }

    #[tokio::test]
    async fn missing_external_id_is_an_item_error() {
        let store = Arc::new(MemoryCollection::default());
        let reconciler = Reconciler::new(store.clone());

        let mut untitled = canonical("x", "");
        untitled.external_id = None;
        let outcome = reconciler
            .reconcile(1, &[untitled, canonical("ext-2", "Kept")])
            .await
            .unwrap();

        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].title, "Unknown");
        assert!(outcome.errors[0].error.contains("external id"));
    }

    #[tokio::test]
    async fn readonly_collection_fails_the_batch() {
        let store = Arc::new(MemoryCollection::readonly());
        let reconciler = Reconciler::new(store);
        let err = reconciler.reconcile(1, &batch(2)).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_next_article() {
        let store = Arc::new(MemoryCollection::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let reconciler = Reconciler::new(store.clone()).with_cancellation(cancel);

        let outcome = reconciler.reconcile(1, &batch(3)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::default());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn dropped_write_releases_its_key() {
        let store = Arc::new(MemoryCollection::stalling_on(&["Story 1"]));
        let reconciler = Reconciler::new(store.clone());

        let articles = batch(1);
        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            reconciler.reconcile(1, &articles),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(reconciler.locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_one_key_never_duplicate() {
        let store = Arc::new(MemoryCollection::default());
        let reconciler = Arc::new(Reconciler::new(store.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                let article = canonical("shared", &format!("Writer {i}"));
                reconciler.reconcile(1, &[article]).await
            }));
        }

        let mut created = 0;
        let mut updated = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(outcome.errors.is_empty());
            created += outcome.created;
            updated += outcome.updated;
        }
        assert_eq!(created, 1);
        assert_eq!(updated, 7);
        assert_eq!(store.len(), 1);
        assert_eq!(reconciler.locks.len(), 0);
    }
}
