//! # Studio Session
//!
//! Wires every widget for one studio page to a single event loop. All
//! subscription callbacks only enqueue; `pump` drains the queue on the
//! owning task and dispatches each event to completion, so widget state is
//! never touched from two places at once.

use std::sync::Arc;

use tokio::sync::mpsc;

use sf_core::{
    format_block_message, AccessPolicy, BlockRecord, Document, DocumentStore, FieldFilter,
    IdentitySource, Principal, Result, Role, Subscription, BANNERS_COLLECTION,
    COMMENTS_COLLECTION, VOTES_COLLECTION,
};

use crate::banner::BannerRotator;
use crate::comments::CommentPanel;
use crate::gate::{Admission, IdentityGate};
use crate::mirror::CollectionMirror;
use crate::votes::VotePanel;

/// Everything the loop reacts to. User input calls the panels directly on
/// the owning task, so it needs no variant here.
pub enum SessionEvent {
    Identity(Option<Principal>),
    Votes(Result<Vec<Document>>),
    Comments(Result<Vec<Document>>),
    Banners(Result<Vec<Document>>),
    Block(Result<Vec<Document>>),
}

pub struct StudioSession {
    identity: Arc<dyn IdentitySource>,
    gate: IdentityGate,
    slug: String,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    _identity_sub: Subscription,
    votes_mirror: CollectionMirror,
    comments_mirror: CollectionMirror,
    banners_mirror: CollectionMirror,
    block_watch: Option<Subscription>,
    votes: VotePanel,
    comments: CommentPanel,
    banner: BannerRotator,
    notice: Option<String>,
}

impl StudioSession {
    /// The banner stream is public and starts immediately; votes and
    /// comments wait for an admitted identity.
    pub fn new(
        slug: impl Into<String>,
        policy: AccessPolicy,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        let slug = slug.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let identity_tx = tx.clone();
        let identity_sub = identity.subscribe(Arc::new(move |principal| {
            let _ = identity_tx.send(SessionEvent::Identity(principal));
        }));

        let mut banners_mirror =
            CollectionMirror::new(store.clone(), BANNERS_COLLECTION, Some("order"));
        let banner_tx = tx.clone();
        banners_mirror.activate(
            None,
            Arc::new(move |outcome| {
                let _ = banner_tx.send(SessionEvent::Banners(outcome));
            }),
        );

        let gate = IdentityGate::new(policy.clone(), store.clone(), identity.clone());

        Self {
            identity,
            gate,
            slug: slug.clone(),
            tx,
            rx,
            _identity_sub: identity_sub,
            votes_mirror: CollectionMirror::new(store.clone(), VOTES_COLLECTION, None),
            comments_mirror: CollectionMirror::new(
                store.clone(),
                COMMENTS_COLLECTION,
                Some("createdAt"),
            ),
            banners_mirror,
            block_watch: None,
            votes: VotePanel::new(store.clone(), slug.clone()),
            comments: CommentPanel::new(store.clone(), slug, policy),
            banner: BannerRotator::new(store),
            notice: None,
        }
    }

    /// Drains every queued event. Call after any await point that could
    /// have produced deliveries; each event is handled to completion
    /// before the next one is looked at.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Identity(Some(principal)) => self.on_sign_in(principal).await,
            SessionEvent::Identity(None) => self.on_sign_out(),
            SessionEvent::Votes(outcome) => {
                match self.votes_mirror.apply(outcome) {
                    Some(message) => self.votes.note_error(message),
                    None => self.votes.apply_records(self.votes_mirror.records()),
                }
            }
            SessionEvent::Comments(outcome) => {
                match self.comments_mirror.apply(outcome) {
                    Some(message) => self.comments.note_error(message),
                    None => self.comments.apply_records(self.comments_mirror.records()),
                }
            }
            SessionEvent::Banners(outcome) => {
                match self.banners_mirror.apply(outcome) {
                    Some(message) => self.banner.note_error(message),
                    None => self.banner.apply_records(self.banners_mirror.records()),
                }
            }
            SessionEvent::Block(outcome) => self.on_block_delivery(outcome).await,
        }
    }

    async fn on_sign_in(&mut self, principal: Principal) {
        let admission = match self.gate.admit(&principal).await {
            Ok(admission) => admission,
            Err(err) => {
                tracing::warn!(error = %err, "admission check failed");
                self.notice = Some(err.to_string());
                return;
            }
        };

        match admission {
            Admission::Admitted { role } => {
                self.notice = None;
                let is_admin = role == Role::Admin;
                self.votes.set_user(Some(principal.clone()));
                self.comments.set_user(Some(principal.clone()));
                self.banner.set_admin(is_admin);

                let votes_tx = self.tx.clone();
                self.votes_mirror.activate(
                    Some(FieldFilter::eq("slug", self.slug.as_str())),
                    Arc::new(move |outcome| {
                        let _ = votes_tx.send(SessionEvent::Votes(outcome));
                    }),
                );

                let comments_tx = self.tx.clone();
                self.comments_mirror.activate(
                    Some(FieldFilter::eq("slug", self.slug.as_str())),
                    Arc::new(move |outcome| {
                        let _ = comments_tx.send(SessionEvent::Comments(outcome));
                    }),
                );

                let block_tx = self.tx.clone();
                self.block_watch = Some(self.gate.watch_block(
                    &principal.id,
                    Arc::new(move |outcome| {
                        let _ = block_tx.send(SessionEvent::Block(outcome));
                    }),
                ));
            }
            denied => {
                // The gate already forced the sign-out; the resulting
                // Identity(None) event clears the widgets.
                self.notice = denied.deny_message(self.gate.policy());
            }
        }
    }

    fn on_sign_out(&mut self) {
        self.votes.set_user(None);
        self.comments.set_user(None);
        self.banner.set_admin(false);
        self.votes_mirror.clear();
        self.comments_mirror.clear();
        self.block_watch = None;
    }

    /// A non-empty delivery on the caller's own block watch means an admin
    /// blocked them mid-session: surface the reason and end the session.
    async fn on_block_delivery(&mut self, outcome: Result<Vec<Document>>) {
        let records = match outcome {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "block watch delivery failed");
                return;
            }
        };
        let Some(doc) = records.first() else {
            return;
        };

        let record = BlockRecord::from_document(doc);
        self.notice = Some(format_block_message(Some(&record.reason)));
        self.on_sign_out();
        if let Err(err) = self.identity.sign_out().await {
            tracing::warn!(error = %err, "sign-out after block failed");
        }
    }

    /// Interactive sign-in, then a pump so the admission result is applied
    /// before the caller looks at widget state.
    pub async fn sign_in(&mut self, provider_hint: &str) -> Result<()> {
        let result = self.gate.sign_in(provider_hint).await.map(|_| ());
        if let Err(err) = &result {
            self.notice = Some(err.to_string());
        }
        self.pump().await;
        result
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        let result = self.identity.sign_out().await;
        self.pump().await;
        result
    }

    pub fn votes(&self) -> &VotePanel {
        &self.votes
    }

    pub fn votes_mut(&mut self) -> &mut VotePanel {
        &mut self.votes
    }

    pub fn comments(&self) -> &CommentPanel {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut CommentPanel {
        &mut self.comments
    }

    pub fn banner(&self) -> &BannerRotator {
        &self.banner
    }

    pub fn banner_mut(&mut self) -> &mut BannerRotator {
        &mut self.banner
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}
