//! # Core Traits (Ports)
//!
//! The two external collaborators (the document store and the identity
//! source) are consumed through these contracts. Any plugin crate must
//! implement them to be wired into the binary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Document, Principal};

/// Equality filter applied server-side to a subscription (`field == value`).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

/// Target of a live subscription: a collection, an optional equality
/// filter, and an optional ordering field (ascending; arrival order breaks
/// ties).
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    pub collection: String,
    pub filter: Option<FieldFilter>,
    pub order_by: Option<String>,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), filter: None, order_by: None }
    }

    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ordered_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }
}

/// Called with the complete matching set on every remote change, never a
/// diff. A failed delivery carries the error instead; the consumer keeps
/// its stale snapshot.
pub type SnapshotHandler = Arc<dyn Fn(Result<Vec<Document>>) + Send + Sync>;

/// Called with the new principal on every sign-in/sign-out transition.
pub type IdentityHandler = Arc<dyn Fn(Option<Principal>) + Send + Sync>;

/// Handle for an active listener. Cancelling (or dropping) detaches the
/// listener; in-flight deliveries already queued are simply ignored by the
/// departed consumer.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// A subscription that never fires and needs no teardown.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Document persistence contract (cloud document database).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot point read.
    async fn get_once(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Keyed upsert: creates or fully replaces the document at `id`.
    async fn set_record(&self, collection: &str, id: &str, fields: Value) -> Result<()>;

    /// Unkeyed insert with a generated id; returns the new id.
    async fn add_record(&self, collection: &str, fields: Value) -> Result<String>;

    /// Partial update merging `fields` into an existing document.
    async fn update_fields(&self, collection: &str, id: &str, fields: Value) -> Result<()>;

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()>;

    /// Registers a live listener. The handler receives the full matching
    /// set immediately and again after every change.
    fn subscribe(&self, query: CollectionQuery, handler: SnapshotHandler) -> Subscription;
}

/// Identity and session contract (OAuth provider).
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Interactive sign-in. `provider_hint` selects the account/provider
    /// (the live site always used the Google popup flow).
    async fn sign_in(&self, provider_hint: &str) -> Result<Principal>;

    async fn sign_out(&self) -> Result<()>;

    /// Currently signed-in principal, if any.
    fn current(&self) -> Option<Principal>;

    /// Registers a listener fired with the current principal immediately
    /// and on every subsequent transition.
    fn subscribe(&self, handler: IdentityHandler) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn dropping_a_subscription_cancels_it() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        {
            let _sub = Subscription::new(move || flag.store(true, Ordering::SeqCst));
        }
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn detached_subscription_is_inert() {
        Subscription::detached().cancel();
    }
}
