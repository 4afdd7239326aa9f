//! # Domain Models
//!
//! These structs represent the read-side projections of the showcase site.
//! All of them live in the external document store; nothing here is
//! persisted locally; every record is rebuilt from the latest snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection holding one document per cast vote (possibly several per voter).
pub const VOTES_COLLECTION: &str = "logoVotes";
/// Collection holding top-level comments and their single-level replies.
pub const COMMENTS_COLLECTION: &str = "logoComments";
/// Collection holding the rotating announcement banners, ordered by `order`.
pub const BANNERS_COLLECTION: &str = "banners";
/// Collection keyed by user id; presence of a document means "blocked".
pub const BLOCK_COLLECTION: &str = "blockedUsers";

/// Fallback display name when a record carries none.
pub const ANONYMOUS_NAME: &str = "anonymous";

/// A raw document as delivered by the store: an id plus a JSON field bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self { id: id.into(), fields }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// Timestamps travel as RFC 3339 strings in the field bag.
    pub fn time_field(&self, name: &str) -> Option<DateTime<Utc>> {
        self.str_field(name)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }
}

/// An authenticated identity as reported by the identity source.
/// Created on sign-in, destroyed on sign-out, never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Principal {
    /// Name shown next to votes and comments.
    pub fn public_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChoice {
    Up,
    Down,
}

impl VoteChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::Up => "up",
            VoteChoice::Down => "down",
        }
    }

    /// Stored values other than `"down"` count as `Up`, matching how the
    /// live site tolerated legacy documents with a missing choice field.
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw {
            Some("down") => VoteChoice::Down,
            _ => VoteChoice::Up,
        }
    }
}

/// One stored vote. Several may exist per (slug, user) pair because the
/// keyed upsert can fall back to an unkeyed insert; the aggregator picks a
/// single winner per voter at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteRecord {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub choice: VoteChoice,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VoteRecord {
    /// Decodes a vote document. When the explicit `userId` field is absent
    /// the voter id is recovered from a composite `slug_userId` document id.
    /// Returns `None` if no voter id can be established either way.
    pub fn from_document(doc: &Document) -> Option<Self> {
        let user_id = match doc.str_field("userId") {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => {
                let tail = doc.id.rsplit('_').next().filter(|_| doc.id.contains('_'));
                match tail {
                    Some(value) if !value.is_empty() => value.to_string(),
                    _ => return None,
                }
            }
        };

        Some(Self {
            id: doc.id.clone(),
            user_id,
            display_name: doc
                .str_field("displayName")
                .unwrap_or(ANONYMOUS_NAME)
                .to_string(),
            choice: VoteChoice::from_stored(doc.str_field("choice")),
            updated_at: doc.time_field("updatedAt"),
        })
    }
}

/// A comment or a single-level reply; soft-deleted in place so the thread
/// shape survives moderation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub body: String,
    pub parent_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl CommentRecord {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            user_id: doc.str_field("userId").unwrap_or_default().to_string(),
            display_name: doc
                .str_field("displayName")
                .unwrap_or(ANONYMOUS_NAME)
                .to_string(),
            email: doc.str_field("email").map(str::to_string),
            body: doc.str_field("body").unwrap_or_default().to_string(),
            parent_id: doc
                .str_field("parentId")
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            created_at: doc.time_field("createdAt"),
            is_deleted: doc.bool_field("isDeleted").unwrap_or(false),
        }
    }
}

/// One rotating announcement. Admin-managed; ordered by `order` ascending
/// with arrival index breaking ties.
#[derive(Debug, Clone, PartialEq)]
pub struct BannerRecord {
    pub id: String,
    pub label: String,
    pub message: String,
    pub slug: String,
    pub order: i64,
}

impl BannerRecord {
    /// `index` is the arrival position within the snapshot; it doubles as
    /// the default order for legacy documents without an `order` field.
    pub fn from_document(doc: &Document, index: usize) -> Self {
        Self {
            id: doc.id.clone(),
            label: doc.str_field("label").unwrap_or(&doc.id).to_string(),
            message: doc.str_field("message").unwrap_or_default().to_string(),
            slug: doc.str_field("slug").unwrap_or(&doc.id).to_string(),
            order: doc.i64_field("order").unwrap_or(index as i64),
        }
    }
}

/// Moderation record. Its mere presence under a user's id denies access.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub reason: String,
    pub blocked_by: String,
    pub blocked_by_email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl BlockRecord {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            user_id: doc.str_field("userId").unwrap_or(&doc.id).to_string(),
            display_name: doc
                .str_field("displayName")
                .unwrap_or(ANONYMOUS_NAME)
                .to_string(),
            email: doc.str_field("email").map(str::to_string),
            reason: doc.str_field("reason").unwrap_or_default().to_string(),
            blocked_by: doc.str_field("blockedBy").unwrap_or_default().to_string(),
            blocked_by_email: doc.str_field("blockedByEmail").map(str::to_string),
            created_at: doc.time_field("createdAt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vote_user_id_falls_back_to_composite_document_id() {
        let doc = Document::new("arisu_u42", json!({ "choice": "down" }));
        let vote = VoteRecord::from_document(&doc).expect("decodable");
        assert_eq!(vote.user_id, "u42");
        assert_eq!(vote.choice, VoteChoice::Down);
        assert_eq!(vote.display_name, ANONYMOUS_NAME);
    }

    #[test]
    fn vote_without_any_user_id_is_dropped() {
        let doc = Document::new("plain-id", json!({ "choice": "up" }));
        assert!(VoteRecord::from_document(&doc).is_none());
    }

    #[test]
    fn unknown_choice_decodes_as_up() {
        assert_eq!(VoteChoice::from_stored(Some("sideways")), VoteChoice::Up);
        assert_eq!(VoteChoice::from_stored(None), VoteChoice::Up);
    }

    #[test]
    fn banner_defaults_come_from_document_id_and_arrival_index() {
        let doc = Document::new("spring-fair", json!({ "message": "doors at 10" }));
        let banner = BannerRecord::from_document(&doc, 3);
        assert_eq!(banner.label, "spring-fair");
        assert_eq!(banner.slug, "spring-fair");
        assert_eq!(banner.order, 3);
    }

    #[test]
    fn empty_parent_id_reads_as_top_level() {
        let doc = Document::new("c1", json!({ "userId": "u1", "body": "hi", "parentId": "" }));
        assert_eq!(CommentRecord::from_document(&doc).parent_id, None);
    }
}
