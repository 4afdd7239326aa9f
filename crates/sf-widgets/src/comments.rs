//! # Comment Threader
//!
//! Rebuilds the two-level thread shape (top-level comments plus their
//! direct replies) from each snapshot and enforces the write-side rules:
//! no replies to replies, no replies to deleted comments, soft deletes
//! that keep the thread shape, and the admin block action.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use sf_core::{
    AccessPolicy, AppError, CommentRecord, Document, DocumentStore, Principal, Result,
    BLOCK_COLLECTION, COMMENTS_COLLECTION, DEFAULT_BLOCK_REASON,
};

/// Placeholder shown where a soft-deleted body used to be.
pub const DELETED_PLACEHOLDER: &str = "(comment deleted)";

/// A top-level comment with its direct replies, both in snapshot order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentThread {
    pub comment: CommentRecord,
    pub replies: Vec<CommentRecord>,
}

/// Pure thread reconstruction. Replies whose parent is missing from the
/// snapshot are dropped; nothing deeper than one reply level can appear
/// because the write path refuses to create it.
pub fn build_threads(records: &[CommentRecord]) -> Vec<CommentThread> {
    records
        .iter()
        .filter(|record| record.parent_id.is_none())
        .map(|top| CommentThread {
            comment: top.clone(),
            replies: records
                .iter()
                .filter(|reply| reply.parent_id.as_deref() == Some(top.id.as_str()))
                .cloned()
                .collect(),
        })
        .collect()
}

/// Body text as rendered: the placeholder for deleted records.
pub fn display_body(record: &CommentRecord) -> &str {
    if record.is_deleted {
        DELETED_PLACEHOLDER
    } else {
        &record.body
    }
}

pub struct CommentPanel {
    store: Arc<dyn DocumentStore>,
    slug: String,
    policy: AccessPolicy,
    user: Option<Principal>,
    records: Vec<CommentRecord>,
    error: Option<String>,
}

impl CommentPanel {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        slug: impl Into<String>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            store,
            slug: slug.into(),
            policy,
            user: None,
            records: Vec::new(),
            error: None,
        }
    }

    pub fn set_user(&mut self, user: Option<Principal>) {
        if user.is_none() {
            // Comments are only mirrored for signed-in users.
            self.records.clear();
        }
        self.user = user;
    }

    pub fn apply_records(&mut self, docs: &[Document]) {
        self.records = docs.iter().map(CommentRecord::from_document).collect();
    }

    pub fn note_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn threads(&self) -> Vec<CommentThread> {
        build_threads(&self.records)
    }

    /// Total record count, replies and deleted entries included.
    pub fn comment_count(&self) -> usize {
        self.records.len()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.user
            .as_ref()
            .map(|user| self.policy.is_admin(user.email.as_deref()))
            .unwrap_or(false)
    }

    /// Posts a top-level comment or a reply. Every rejection here is local:
    /// no write is attempted.
    pub async fn post_comment(&mut self, body: &str, parent_id: Option<&str>) -> Result<()> {
        let Some(user) = self.user.clone() else {
            return self.reject("Sign in to write a comment.");
        };

        let trimmed = body.trim();
        if trimmed.is_empty() {
            return self.reject("Comment body is empty.");
        }

        if let Some(parent_id) = parent_id {
            let parent = self.records.iter().find(|record| record.id == parent_id);
            match parent {
                None | Some(CommentRecord { parent_id: Some(_), .. }) => {
                    return self.reject("Replies can only be added to top-level comments.");
                }
                Some(parent) if parent.is_deleted => {
                    return self.reject("You cannot reply to a deleted comment.");
                }
                Some(_) => {}
            }
        }

        let payload = json!({
            "slug": self.slug,
            "userId": user.id,
            "displayName": user.public_name(),
            "email": user.email,
            "body": trimmed,
            "parentId": parent_id,
            "createdAt": Utc::now().to_rfc3339(),
            "isDeleted": false,
        });

        match self.store.add_record(COMMENTS_COLLECTION, payload).await {
            Ok(_) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, slug = %self.slug, "comment write failed");
                self.error = Some(
                    "Something went wrong while posting your comment. Please try again shortly."
                        .to_string(),
                );
                Err(err)
            }
        }
    }

    /// Soft delete: body cleared, flag set, replies untouched. Only the
    /// author or an admin may delete, and only once; anything else is a
    /// silent no-op, matching the visible controls.
    pub async fn delete_comment(&mut self, comment_id: &str) -> Result<()> {
        let Some(user) = self.user.clone() else {
            return Ok(());
        };
        let Some(record) = self.records.iter().find(|r| r.id == comment_id).cloned() else {
            return Ok(());
        };

        let permitted = self.is_admin() || record.user_id == user.id;
        if !permitted || record.is_deleted {
            return Ok(());
        }

        let patch = json!({
            "isDeleted": true,
            "body": "",
            "deletedAt": Utc::now().to_rfc3339(),
        });

        match self
            .store
            .update_fields(COMMENTS_COLLECTION, comment_id, patch)
            .await
        {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, %comment_id, "comment delete failed");
                self.error = Some(
                    "Something went wrong while deleting the comment. Please try again shortly."
                        .to_string(),
                );
                Err(err)
            }
        }
    }

    /// Admin-only: writes (or overwrites) the author's block record. Never
    /// allowed against the admin's own records. A blank reason falls back
    /// to the fixed default.
    pub async fn block_author(&mut self, comment_id: &str, reason: Option<&str>) -> Result<()> {
        let Some(admin) = self.user.clone() else {
            return Ok(());
        };
        if !self.is_admin() {
            return Ok(());
        }
        let Some(record) = self.records.iter().find(|r| r.id == comment_id).cloned() else {
            return Ok(());
        };
        if record.user_id.is_empty() || record.user_id == admin.id {
            return Ok(());
        }

        let reason = reason
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BLOCK_REASON);

        let payload = json!({
            "userId": record.user_id,
            "displayName": record.display_name,
            "email": record.email,
            "reason": reason,
            "blockedBy": admin.id,
            "blockedByEmail": admin.email,
            "createdAt": Utc::now().to_rfc3339(),
        });

        match self
            .store
            .set_record(BLOCK_COLLECTION, &record.user_id, payload)
            .await
        {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, author = %record.user_id, "block write failed");
                self.error = Some(
                    "Something went wrong while blocking the account. Please try again shortly."
                        .to_string(),
                );
                Err(err)
            }
        }
    }

    fn reject(&mut self, message: &str) -> Result<()> {
        self.error = Some(message.to_string());
        Err(AppError::Validation(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_store_memory::MemoryStore;

    fn comment(id: &str, user: &str, parent: Option<&str>, deleted: bool) -> CommentRecord {
        CommentRecord {
            id: id.to_string(),
            user_id: user.to_string(),
            display_name: user.to_string(),
            email: None,
            body: format!("body of {id}"),
            parent_id: parent.map(str::to_string),
            created_at: None,
            is_deleted: deleted,
        }
    }

    fn signed_in_panel(store: Arc<MemoryStore>, admin: bool) -> CommentPanel {
        let policy = AccessPolicy::new(None, ["admin@festival.example"]);
        let mut panel = CommentPanel::new(store, "arisu", policy);
        let email = if admin { "admin@festival.example" } else { "guest@festival.example" };
        panel.set_user(Some(Principal {
            id: if admin { "u-admin" } else { "u-guest" }.to_string(),
            email: Some(email.to_string()),
            display_name: None,
        }));
        panel
    }

    #[test]
    fn threads_keep_snapshot_order_and_attach_direct_replies() {
        let records = vec![
            comment("t1", "u1", None, false),
            comment("r1", "u2", Some("t1"), false),
            comment("t2", "u3", None, false),
            comment("r2", "u1", Some("t1"), false),
        ];
        let threads = build_threads(&records);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.id, "t1");
        let reply_ids: Vec<_> = threads[0].replies.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["r1", "r2"]);
        assert!(threads[1].replies.is_empty());
    }

    #[test]
    fn deleted_top_level_keeps_its_replies() {
        let records = vec![
            comment("t1", "u1", None, true),
            comment("r1", "u2", Some("t1"), false),
        ];
        let threads = build_threads(&records);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies.len(), 1);
        assert_eq!(display_body(&threads[0].comment), DELETED_PLACEHOLDER);
        assert_eq!(threads[0].replies[0].parent_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn reply_to_reply_is_rejected_without_a_write() {
        let store = Arc::new(MemoryStore::new());
        let mut panel = signed_in_panel(store.clone(), false);
        panel.records = vec![
            comment("t1", "u1", None, false),
            comment("r1", "u2", Some("t1"), false),
        ];

        let err = panel.post_comment("nested", Some("r1")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(panel.error().is_some());
        // No document reached the store.
        let seen: Arc<std::sync::Mutex<Vec<_>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.subscribe(
            sf_core::CollectionQuery::new(COMMENTS_COLLECTION),
            Arc::new(move |outcome| sink.lock().unwrap().push(outcome)),
        );
        assert!(seen.lock().unwrap()[0].as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_to_deleted_parent_and_blank_body_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut panel = signed_in_panel(store, false);
        panel.records = vec![comment("t1", "u1", None, true)];

        assert!(panel.post_comment("hello", Some("t1")).await.is_err());
        assert!(panel.post_comment("   \n", None).await.is_err());
    }

    #[tokio::test]
    async fn soft_delete_clears_body_and_stamps_deletion() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_record(
                COMMENTS_COLLECTION,
                "t1",
                json!({ "slug": "arisu", "userId": "u-guest", "body": "hi", "isDeleted": false }),
            )
            .await
            .unwrap();

        let mut panel = signed_in_panel(store.clone(), false);
        panel.apply_records(&[store
            .get_once(COMMENTS_COLLECTION, "t1")
            .await
            .unwrap()
            .unwrap()]);

        panel.delete_comment("t1").await.unwrap();

        let doc = store.get_once(COMMENTS_COLLECTION, "t1").await.unwrap().unwrap();
        assert_eq!(doc.bool_field("isDeleted"), Some(true));
        assert_eq!(doc.str_field("body"), Some(""));
        assert!(doc.time_field("deletedAt").is_some());
    }

    #[tokio::test]
    async fn non_author_delete_and_double_delete_are_no_ops() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_record(
                COMMENTS_COLLECTION,
                "t1",
                json!({ "slug": "arisu", "userId": "someone-else", "body": "hi", "isDeleted": false }),
            )
            .await
            .unwrap();

        let mut panel = signed_in_panel(store.clone(), false);
        panel.apply_records(&[store
            .get_once(COMMENTS_COLLECTION, "t1")
            .await
            .unwrap()
            .unwrap()]);
        panel.delete_comment("t1").await.unwrap();

        let doc = store.get_once(COMMENTS_COLLECTION, "t1").await.unwrap().unwrap();
        assert_eq!(doc.bool_field("isDeleted"), Some(false));
    }

    #[tokio::test]
    async fn admin_block_writes_record_with_default_reason_but_never_self() {
        let store = Arc::new(MemoryStore::new());
        let mut panel = signed_in_panel(store.clone(), true);
        panel.records = vec![
            comment("t1", "u-guest", None, false),
            comment("t2", "u-admin", None, false),
        ];

        panel.block_author("t1", Some("  ")).await.unwrap();
        let doc = store.get_once(BLOCK_COLLECTION, "u-guest").await.unwrap().unwrap();
        assert_eq!(doc.str_field("reason"), Some(DEFAULT_BLOCK_REASON));
        assert_eq!(doc.str_field("blockedBy"), Some("u-admin"));

        panel.block_author("t2", None).await.unwrap();
        assert!(store.get_once(BLOCK_COLLECTION, "u-admin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_admin_block_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let mut panel = signed_in_panel(store.clone(), false);
        panel.records = vec![comment("t1", "u-other", None, false)];
        panel.block_author("t1", Some("spam")).await.unwrap();
        assert!(store.get_once(BLOCK_COLLECTION, "u-other").await.unwrap().is_none());
    }
}
