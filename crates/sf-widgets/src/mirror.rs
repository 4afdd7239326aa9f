//! # Live Collection Mirror
//!
//! Maintains an in-memory ordered snapshot of one remote collection,
//! replaced wholesale on every delivery. A subscription failure marks the
//! mirror stale but keeps the previous snapshot visible; a missing filter
//! key (signed-out state) means an empty snapshot, not an error.

use std::sync::Arc;

use sf_core::{
    AppError, CollectionQuery, Document, DocumentStore, FieldFilter, Result, SnapshotHandler,
    Subscription,
};

pub struct CollectionMirror {
    store: Arc<dyn DocumentStore>,
    collection: String,
    order_by: Option<String>,
    subscription: Option<Subscription>,
    snapshot: Vec<Document>,
    stale_message: Option<String>,
}

impl CollectionMirror {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        order_by: Option<&str>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            order_by: order_by.map(str::to_string),
            subscription: None,
            snapshot: Vec::new(),
            stale_message: None,
        }
    }

    /// Starts (or restarts) the live subscription. Any previous listener is
    /// cancelled first; deliveries arrive through `handler`.
    pub fn activate(&mut self, filter: Option<FieldFilter>, handler: SnapshotHandler) {
        self.subscription = None; // drop cancels the old listener

        let mut query = CollectionQuery::new(self.collection.clone());
        if let Some(filter) = filter {
            query = query.with_filter(filter);
        }
        if let Some(field) = &self.order_by {
            query = query.ordered_by(field.clone());
        }
        self.subscription = Some(self.store.subscribe(query, handler));
    }

    /// Tears down the subscription and empties the snapshot. Used when the
    /// filter key disappears (sign-out) or the component goes away.
    pub fn clear(&mut self) {
        self.subscription = None;
        self.snapshot.clear();
        self.stale_message = None;
    }

    /// Folds a delivery into the mirror. Returns the error message when the
    /// delivery failed; the snapshot then stays as-is, marked stale.
    pub fn apply(&mut self, outcome: Result<Vec<Document>>) -> Option<String> {
        match outcome {
            Ok(records) => {
                self.snapshot = records;
                self.stale_message = None;
                None
            }
            Err(err) => {
                let message = match err {
                    AppError::Snapshot(message) => message,
                    other => other.to_string(),
                };
                self.stale_message = Some(message.clone());
                Some(message)
            }
        }
    }

    pub fn records(&self) -> &[Document] {
        &self.snapshot
    }

    pub fn is_stale(&self) -> bool {
        self.stale_message.is_some()
    }

    pub fn stale_message(&self) -> Option<&str> {
        self.stale_message.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sf_store_memory::MemoryStore;
    use std::sync::Mutex;

    fn harness() -> (Arc<MemoryStore>, CollectionMirror, SnapshotHandler, Arc<Mutex<Vec<Result<Vec<Document>>>>>) {
        let store = Arc::new(MemoryStore::new());
        let mirror = CollectionMirror::new(store.clone(), "banners", Some("order"));
        let seen: Arc<Mutex<Vec<Result<Vec<Document>>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: SnapshotHandler = Arc::new(move |outcome| sink.lock().unwrap().push(outcome));
        (store, mirror, handler, seen)
    }

    #[tokio::test]
    async fn snapshot_is_replaced_wholesale() {
        let (store, mut mirror, handler, seen) = harness();
        mirror.activate(None, handler);

        store.set_record("banners", "a", json!({ "order": 0 })).await.unwrap();
        store.delete_record("banners", "a").await.unwrap();

        for outcome in seen.lock().unwrap().drain(..) {
            mirror.apply(outcome);
        }
        assert!(mirror.records().is_empty());
        assert!(!mirror.is_stale());
    }

    #[tokio::test]
    async fn failed_delivery_keeps_stale_snapshot() {
        let (store, mut mirror, handler, seen) = harness();
        mirror.activate(None, handler);
        store.set_record("banners", "a", json!({ "order": 0 })).await.unwrap();

        for outcome in seen.lock().unwrap().drain(..) {
            mirror.apply(outcome);
        }
        assert_eq!(mirror.records().len(), 1);

        let message = mirror.apply(Err(AppError::Snapshot("backend unavailable".into())));
        assert_eq!(message.as_deref(), Some("backend unavailable"));
        assert!(mirror.is_stale());
        assert_eq!(mirror.records().len(), 1); // retained, not cleared

        // A later good delivery restores freshness.
        mirror.apply(Ok(Vec::new()));
        assert!(!mirror.is_stale());
    }

    #[tokio::test]
    async fn clear_cancels_the_listener() {
        let (store, mut mirror, handler, seen) = harness();
        mirror.activate(None, handler);
        mirror.clear();
        assert!(!mirror.is_active());

        store.set_record("banners", "a", json!({ "order": 0 })).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1); // only the initial delivery
    }
}
