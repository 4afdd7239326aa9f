//! # sf-store-memory
//!
//! In-process implementation of `DocumentStore` with live snapshot fan-out.
//! Mirrors the remote store's contract: every change redelivers the
//! complete filtered set to each matching subscriber, never a diff.
//! Backs the demo binary and the scenario tests.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use sf_core::{
    AppError, CollectionQuery, Document, DocumentStore, Result, SnapshotHandler, Subscription,
};

struct StoredDoc {
    id: String,
    /// Arrival index, used as the ordering tiebreak.
    seq: u64,
    fields: Value,
}

struct Subscriber {
    id: u64,
    query: CollectionQuery,
    handler: SnapshotHandler,
}

pub struct MemoryStore {
    collections: DashMap<String, Vec<StoredDoc>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_seq: AtomicU64,
    next_subscriber: AtomicU64,
    /// Test hook simulating backend security rules that refuse a keyed
    /// overwrite of an existing document.
    deny_keyed_overwrite: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_seq: AtomicU64::new(0),
            next_subscriber: AtomicU64::new(0),
            deny_keyed_overwrite: AtomicBool::new(false),
        }
    }

    /// When enabled, `set_record` on an existing document fails with
    /// `PermissionDenied`, the way restrictive backend rules do.
    pub fn deny_keyed_overwrites(&self, deny: bool) {
        self.deny_keyed_overwrite.store(deny, AtomicOrdering::SeqCst);
    }

    /// Delivers a subscription error to every listener on `collection`.
    /// Consumers are expected to keep their stale snapshot.
    pub fn fail_subscribers(&self, collection: &str, message: &str) {
        for (handler, _) in self.handlers_for(collection) {
            handler(Err(AppError::Snapshot(message.to_string())));
        }
    }

    fn snapshot_for(&self, query: &CollectionQuery) -> Vec<Document> {
        let Some(docs) = self.collections.get(&query.collection) else {
            return Vec::new();
        };

        let mut matched: Vec<(u64, Document)> = docs
            .iter()
            .filter(|doc| match &query.filter {
                Some(filter) => doc.fields.get(&filter.field) == Some(&filter.value),
                None => true,
            })
            .map(|doc| (doc.seq, Document::new(doc.id.clone(), doc.fields.clone())))
            .collect();

        if let Some(field) = &query.order_by {
            // Stable sort: equal keys keep arrival order.
            matched.sort_by(|(_, a), (_, b)| {
                compare_optional(a.fields.get(field), b.fields.get(field))
            });
        }

        matched.into_iter().map(|(_, doc)| doc).collect()
    }

    fn handlers_for(&self, collection: &str) -> Vec<(SnapshotHandler, CollectionQuery)> {
        let subscribers = self.subscribers.lock().expect("subscriber lock");
        subscribers
            .iter()
            .filter(|sub| sub.query.collection == collection)
            .map(|sub| (sub.handler.clone(), sub.query.clone()))
            .collect()
    }

    /// Redelivers the full matching set to every subscriber of `collection`.
    /// Handlers run outside the registry lock so they may subscribe freely.
    fn notify(&self, collection: &str) {
        for (handler, query) in self.handlers_for(collection) {
            handler(Ok(self.snapshot_for(&query)));
        }
    }

    fn bump_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, AtomicOrdering::SeqCst)
    }
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_once(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| doc.id == id)
                .map(|doc| Document::new(doc.id.clone(), doc.fields.clone()))
        }))
    }

    async fn set_record(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        {
            let mut docs = self.collections.entry(collection.to_string()).or_default();
            if let Some(existing) = docs.iter_mut().find(|doc| doc.id == id) {
                if self.deny_keyed_overwrite.load(AtomicOrdering::SeqCst) {
                    return Err(AppError::PermissionDenied(
                        "missing or insufficient permissions".to_string(),
                    ));
                }
                existing.fields = fields;
            } else {
                let seq = self.bump_seq();
                docs.push(StoredDoc { id: id.to_string(), seq, fields });
            }
        }
        tracing::debug!(collection, id, "set_record");
        self.notify(collection);
        Ok(())
    }

    async fn add_record(&self, collection: &str, fields: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        {
            let mut docs = self.collections.entry(collection.to_string()).or_default();
            let seq = self.bump_seq();
            docs.push(StoredDoc { id: id.clone(), seq, fields });
        }
        tracing::debug!(collection, %id, "add_record");
        self.notify(collection);
        Ok(id)
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        {
            let mut docs = self
                .collections
                .get_mut(collection)
                .ok_or_else(|| AppError::NotFound(collection.to_string(), id.to_string()))?;
            let existing = docs
                .iter_mut()
                .find(|doc| doc.id == id)
                .ok_or_else(|| AppError::NotFound(collection.to_string(), id.to_string()))?;

            match (existing.fields.as_object_mut(), fields.as_object()) {
                (Some(target), Some(patch)) => {
                    for (key, value) in patch {
                        target.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    return Err(AppError::WriteFailure(
                        "update_fields requires object documents".to_string(),
                    ))
                }
            }
        }
        tracing::debug!(collection, id, "update_fields");
        self.notify(collection);
        Ok(())
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(mut docs) = self.collections.get_mut(collection) {
            docs.retain(|doc| doc.id != id);
        }
        tracing::debug!(collection, id, "delete_record");
        self.notify(collection);
        Ok(())
    }

    fn subscribe(&self, query: CollectionQuery, handler: SnapshotHandler) -> Subscription {
        // Initial delivery before registration, matching the remote store.
        handler(Ok(self.snapshot_for(&query)));

        let id = self.next_subscriber.fetch_add(1, AtomicOrdering::SeqCst);
        {
            let mut subscribers = self.subscribers.lock().expect("subscriber lock");
            subscribers.push(Subscriber { id, query, handler });
        }

        let registry = Arc::clone(&self.subscribers);
        Subscription::new(move || {
            let mut subscribers = registry.lock().expect("subscriber lock");
            subscribers.retain(|sub| sub.id != id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sf_core::FieldFilter;

    fn collect() -> (SnapshotHandler, Arc<Mutex<Vec<Result<Vec<Document>>>>>) {
        let seen: Arc<Mutex<Vec<Result<Vec<Document>>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: SnapshotHandler =
            Arc::new(move |outcome| sink.lock().unwrap().push(outcome));
        (handler, seen)
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_and_subsequent_full_sets() {
        let store = MemoryStore::new();
        let (handler, seen) = collect();

        let _sub = store.subscribe(CollectionQuery::new("banners"), handler);
        store
            .set_record("banners", "a", json!({ "label": "A", "order": 1 }))
            .await
            .unwrap();
        store
            .set_record("banners", "b", json!({ "label": "B", "order": 0 }))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].as_ref().unwrap().len(), 0);
        // Full set each time, not a diff.
        assert_eq!(seen[2].as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filter_and_ordering_apply_with_arrival_tiebreak() {
        let store = MemoryStore::new();
        store
            .set_record("votes", "v1", json!({ "slug": "arisu", "order": 2 }))
            .await
            .unwrap();
        store
            .set_record("votes", "v2", json!({ "slug": "other", "order": 0 }))
            .await
            .unwrap();
        store
            .set_record("votes", "v3", json!({ "slug": "arisu", "order": 2 }))
            .await
            .unwrap();
        store
            .set_record("votes", "v4", json!({ "slug": "arisu", "order": 1 }))
            .await
            .unwrap();

        let (handler, seen) = collect();
        let query = CollectionQuery::new("votes")
            .with_filter(FieldFilter::eq("slug", "arisu"))
            .ordered_by("order");
        let _sub = store.subscribe(query, handler);

        let seen = seen.lock().unwrap();
        let ids: Vec<_> = seen[0]
            .as_ref()
            .unwrap()
            .iter()
            .map(|doc| doc.id.clone())
            .collect();
        assert_eq!(ids, vec!["v4", "v1", "v3"]);
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_receiving() {
        let store = MemoryStore::new();
        let (handler, seen) = collect();
        let sub = store.subscribe(CollectionQuery::new("banners"), handler);
        sub.cancel();

        store.set_record("banners", "a", json!({})).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1); // initial delivery only
    }

    #[tokio::test]
    async fn denied_keyed_overwrite_reports_permission_error() {
        let store = MemoryStore::new();
        store.set_record("votes", "k", json!({ "n": 1 })).await.unwrap();
        store.deny_keyed_overwrites(true);

        let err = store.set_record("votes", "k", json!({ "n": 2 })).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        // Fresh ids are still writable.
        store.set_record("votes", "k2", json!({ "n": 2 })).await.unwrap();
    }

    #[tokio::test]
    async fn update_fields_merges_and_missing_target_errors() {
        let store = MemoryStore::new();
        store
            .set_record("comments", "c1", json!({ "body": "hi", "isDeleted": false }))
            .await
            .unwrap();
        store
            .update_fields("comments", "c1", json!({ "isDeleted": true, "body": "" }))
            .await
            .unwrap();

        let doc = store.get_once("comments", "c1").await.unwrap().unwrap();
        assert_eq!(doc.bool_field("isDeleted"), Some(true));
        assert_eq!(doc.str_field("body"), Some(""));

        let err = store
            .update_fields("comments", "nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }
}
