//! # Vote Aggregator
//!
//! Turns the raw vote snapshot into one effective vote per voter: the
//! record with the newest timestamp wins (later arrival wins exact ties),
//! winners split into up/down rosters, and the approval percentage derives
//! from the two counts. `aggregate` is pure; `VotePanel` adds the write
//! paths on top of it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use sf_core::{
    AppError, Document, DocumentStore, Principal, Result, VoteChoice, VoteRecord,
    VOTES_COLLECTION,
};

/// Derived read-side state of one studio's votes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteTally {
    pub up_roster: Vec<VoteRecord>,
    pub down_roster: Vec<VoteRecord>,
    pub my_choice: Option<VoteChoice>,
    pub my_record_id: Option<String>,
}

impl VoteTally {
    pub fn up_count(&self) -> usize {
        self.up_roster.len()
    }

    pub fn down_count(&self) -> usize {
        self.down_roster.len()
    }

    pub fn total(&self) -> usize {
        self.up_roster.len() + self.down_roster.len()
    }

    /// Integer percentage in [0, 100]; 0 when nobody voted.
    pub fn approval(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        ((self.up_count() as f64 / total as f64) * 100.0).round() as u32
    }
}

fn millis(record: &VoteRecord) -> i64 {
    // Records without a timestamp rank as time zero.
    record.updated_at.map(|at| at.timestamp_millis()).unwrap_or(0)
}

/// Reduces duplicate records per voter to the newest one and splits the
/// winners into the two buckets, each sorted newest-first (missing
/// timestamps last).
pub fn aggregate(records: &[VoteRecord], current_user: Option<&str>) -> VoteTally {
    // Winners keep first-seen voter order so the reduction stays stable.
    let mut order: Vec<String> = Vec::new();
    let mut winners: HashMap<String, VoteRecord> = HashMap::new();

    for record in records {
        match winners.get(&record.user_id) {
            Some(previous) if millis(record) < millis(previous) => {}
            Some(_) => {
                winners.insert(record.user_id.clone(), record.clone());
            }
            None => {
                order.push(record.user_id.clone());
                winners.insert(record.user_id.clone(), record.clone());
            }
        }
    }

    let mut tally = VoteTally::default();
    for user_id in &order {
        let winner = &winners[user_id];
        if current_user == Some(winner.user_id.as_str()) {
            tally.my_choice = Some(winner.choice);
            tally.my_record_id = Some(winner.id.clone());
        }
        match winner.choice {
            VoteChoice::Up => tally.up_roster.push(winner.clone()),
            VoteChoice::Down => tally.down_roster.push(winner.clone()),
        }
    }

    tally.up_roster.sort_by_key(|record| std::cmp::Reverse(millis(record)));
    tally.down_roster.sort_by_key(|record| std::cmp::Reverse(millis(record)));
    tally
}

/// Per-studio voting widget state: the derived tally, the caller's roster
/// toggle, and the last inline error.
pub struct VotePanel {
    store: Arc<dyn DocumentStore>,
    slug: String,
    user: Option<Principal>,
    tally: VoteTally,
    visible_roster: Option<VoteChoice>,
    error: Option<String>,
}

impl VotePanel {
    pub fn new(store: Arc<dyn DocumentStore>, slug: impl Into<String>) -> Self {
        Self {
            store,
            slug: slug.into(),
            user: None,
            tally: VoteTally::default(),
            visible_roster: None,
            error: None,
        }
    }

    /// Identity transitions reset everything derived from the old identity.
    pub fn set_user(&mut self, user: Option<Principal>) {
        if user.is_none() {
            self.tally = VoteTally::default();
            self.visible_roster = None;
        }
        self.user = user;
    }

    pub fn apply_records(&mut self, docs: &[Document]) {
        let records: Vec<VoteRecord> =
            docs.iter().filter_map(VoteRecord::from_document).collect();
        let current = self.user.as_ref().map(|user| user.id.as_str());
        self.tally = aggregate(&records, current);
    }

    pub fn note_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Casts, flips, or retracts the caller's vote. Re-voting the same
    /// choice withdraws it. Unauthenticated callers are a no-op. The tally
    /// is never mutated optimistically; the live mirror reports the
    /// outcome.
    pub async fn cast_vote(&mut self, choice: VoteChoice) -> Result<()> {
        let Some(user) = self.user.clone() else {
            return Ok(());
        };

        if self.tally.my_choice == Some(choice) {
            return self.retract(&user).await;
        }

        let payload = json!({
            "slug": self.slug,
            "userId": user.id,
            "displayName": user.public_name(),
            "choice": choice.as_str(),
            "updatedAt": Utc::now().to_rfc3339(),
        });

        let keyed_id = format!("{}_{}", self.slug, user.id);
        let written = match self
            .store
            .set_record(VOTES_COLLECTION, &keyed_id, payload.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(AppError::PermissionDenied(_)) => {
                // Backend rules may forbid overwriting the keyed document;
                // fall back to an unkeyed insert and let the aggregator
                // resolve the duplicate at read time.
                self.store
                    .add_record(VOTES_COLLECTION, payload)
                    .await
                    .map(|_| ())
            }
            Err(other) => Err(other),
        };

        match written {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, slug = %self.slug, "vote write failed");
                self.error = Some(
                    "Something went wrong while saving your vote. Please try again shortly."
                        .to_string(),
                );
                Err(err)
            }
        }
    }

    async fn retract(&mut self, _user: &Principal) -> Result<()> {
        let Some(record_id) = self.tally.my_record_id.clone() else {
            self.error = Some("Could not find a vote to withdraw.".to_string());
            return Err(AppError::NotFound(
                VOTES_COLLECTION.to_string(),
                "my vote".to_string(),
            ));
        };

        match self.store.delete_record(VOTES_COLLECTION, &record_id).await {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, slug = %self.slug, "vote retraction failed");
                self.error =
                    Some("Something went wrong while withdrawing your vote.".to_string());
                Err(err)
            }
        }
    }

    /// Shows one bucket's member list; selecting it again hides it.
    pub fn toggle_roster(&mut self, choice: VoteChoice) {
        self.visible_roster = if self.visible_roster == Some(choice) {
            None
        } else {
            Some(choice)
        };
    }

    pub fn visible_roster(&self) -> Option<&[VoteRecord]> {
        match self.visible_roster {
            Some(VoteChoice::Up) => Some(&self.tally.up_roster),
            Some(VoteChoice::Down) => Some(&self.tally.down_roster),
            None => None,
        }
    }

    pub fn tally(&self) -> &VoteTally {
        &self.tally
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// One-line summary under the buttons.
    pub fn status_line(&self) -> String {
        let approval = self.tally.approval();
        if self.tally.total() == 0 {
            "No reactions yet".to_string()
        } else if approval >= 50 {
            format!("{approval}% recommend this experience")
        } else {
            format!("{}% suggested improvements", 100 - approval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vote(id: &str, user: &str, choice: VoteChoice, at: Option<i64>) -> VoteRecord {
        VoteRecord {
            id: id.to_string(),
            user_id: user.to_string(),
            display_name: user.to_string(),
            choice,
            updated_at: at.map(|secs| Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    #[test]
    fn one_effective_vote_per_voter() {
        let records = vec![
            vote("a", "u1", VoteChoice::Up, Some(10)),
            vote("b", "u1", VoteChoice::Down, Some(20)),
            vote("c", "u2", VoteChoice::Up, Some(5)),
            vote("d", "u2", VoteChoice::Up, Some(1)),
        ];
        let tally = aggregate(&records, None);
        assert_eq!(tally.total(), 2);
        assert_eq!(tally.up_count(), 1);
        assert_eq!(tally.down_count(), 1);
    }

    #[test]
    fn newest_record_wins_and_later_arrival_breaks_ties() {
        let records = vec![
            vote("a", "u1", VoteChoice::Up, Some(10)),
            vote("b", "u1", VoteChoice::Down, Some(10)),
        ];
        let tally = aggregate(&records, Some("u1"));
        assert_eq!(tally.my_choice, Some(VoteChoice::Down));
        assert_eq!(tally.my_record_id.as_deref(), Some("b"));
    }

    #[test]
    fn missing_timestamp_ranks_as_time_zero() {
        let records = vec![
            vote("a", "u1", VoteChoice::Down, None),
            vote("b", "u1", VoteChoice::Up, Some(1)),
        ];
        let tally = aggregate(&records, Some("u1"));
        assert_eq!(tally.my_choice, Some(VoteChoice::Up));
    }

    #[test]
    fn rosters_sort_newest_first_with_missing_last() {
        let records = vec![
            vote("a", "u1", VoteChoice::Up, None),
            vote("b", "u2", VoteChoice::Up, Some(30)),
            vote("c", "u3", VoteChoice::Up, Some(10)),
        ];
        let tally = aggregate(&records, None);
        let ids: Vec<_> = tally.up_roster.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn approval_is_an_integer_percentage_with_zero_default() {
        assert_eq!(aggregate(&[], None).approval(), 0);

        let records = vec![
            vote("a", "u1", VoteChoice::Up, Some(1)),
            vote("b", "u2", VoteChoice::Up, Some(2)),
            vote("c", "u3", VoteChoice::Down, Some(3)),
        ];
        let tally = aggregate(&records, None);
        assert_eq!(tally.approval(), 67);
    }

    #[test]
    fn roster_toggle_flips_and_hides() {
        let store = Arc::new(NullStore);
        let mut panel = VotePanel::new(store, "arisu");
        panel.toggle_roster(VoteChoice::Up);
        assert!(panel.visible_roster().is_some());
        panel.toggle_roster(VoteChoice::Up);
        assert!(panel.visible_roster().is_none());
    }

    #[tokio::test]
    async fn unauthenticated_cast_is_a_no_op() {
        let store = Arc::new(NullStore);
        let mut panel = VotePanel::new(store, "arisu");
        panel.cast_vote(VoteChoice::Up).await.unwrap();
        assert_eq!(panel.tally().total(), 0);
        assert!(panel.error().is_none());
    }

    /// Store stub that refuses every write; reaching it fails the test for
    /// paths that must not touch the network.
    struct NullStore;

    #[async_trait::async_trait]
    impl DocumentStore for NullStore {
        async fn get_once(&self, _: &str, _: &str) -> Result<Option<Document>> {
            Ok(None)
        }
        async fn set_record(&self, _: &str, _: &str, _: serde_json::Value) -> Result<()> {
            panic!("unexpected write");
        }
        async fn add_record(&self, _: &str, _: serde_json::Value) -> Result<String> {
            panic!("unexpected write");
        }
        async fn update_fields(&self, _: &str, _: &str, _: serde_json::Value) -> Result<()> {
            panic!("unexpected write");
        }
        async fn delete_record(&self, _: &str, _: &str) -> Result<()> {
            panic!("unexpected write");
        }
        fn subscribe(
            &self,
            _: sf_core::CollectionQuery,
            _: sf_core::SnapshotHandler,
        ) -> sf_core::Subscription {
            sf_core::Subscription::detached()
        }
    }
}
