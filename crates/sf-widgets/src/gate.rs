//! # Identity Gate
//!
//! Maps a raw signed-in principal to an allow/deny decision: the domain
//! allow-list, the block-list lookup, and the admin/member role. A rejected
//! principal is actively signed out so no denied session lingers at the
//! identity source; the sign-out itself is best-effort (a failure leaves
//! the principal rejected in UI state only, a known gap).

use std::sync::Arc;

use sf_core::{
    format_block_message, AccessPolicy, AppError, BlockRecord, DocumentStore, FieldFilter,
    IdentitySource, Principal, Result, Role, SnapshotHandler, Subscription, BLOCK_COLLECTION,
};

/// Outcome of gating one principal.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted { role: Role },
    RejectedDomain,
    RejectedBlocked { reason: String },
}

impl Admission {
    /// User-facing wording for a denial; `None` when admitted.
    pub fn deny_message(&self, policy: &AccessPolicy) -> Option<String> {
        match self {
            Admission::Admitted { .. } => None,
            Admission::RejectedDomain => Some(policy.domain_reject_message()),
            Admission::RejectedBlocked { reason } => {
                Some(format_block_message(Some(reason)))
            }
        }
    }
}

pub struct IdentityGate {
    policy: AccessPolicy,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentitySource>,
}

impl IdentityGate {
    pub fn new(
        policy: AccessPolicy,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        Self { policy, store, identity }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Runs the full check for one principal: domain, then block-list. Both
    /// rejection paths force a sign-out before returning.
    pub async fn admit(&self, principal: &Principal) -> Result<Admission> {
        if !self.policy.email_allowed(principal.email.as_deref()) {
            self.force_sign_out().await;
            return Ok(Admission::RejectedDomain);
        }

        let block = self.store.get_once(BLOCK_COLLECTION, &principal.id).await?;
        if let Some(doc) = block {
            let record = BlockRecord::from_document(&doc);
            self.force_sign_out().await;
            return Ok(Admission::RejectedBlocked { reason: record.reason });
        }

        Ok(Admission::Admitted {
            role: self.policy.role_for(principal.email.as_deref()),
        })
    }

    /// Live watch on the principal's own block record, so a block issued
    /// mid-session can sign the user out immediately.
    pub fn watch_block(&self, user_id: &str, handler: SnapshotHandler) -> Subscription {
        let query = sf_core::CollectionQuery::new(BLOCK_COLLECTION)
            .with_filter(FieldFilter::eq("userId", user_id));
        self.store.subscribe(query, handler)
    }

    /// Interactive sign-in followed by the admission check. Denials come
    /// back as `AuthRejection` with the user-facing wording.
    pub async fn sign_in(&self, provider_hint: &str) -> Result<(Principal, Role)> {
        let principal = self.identity.sign_in(provider_hint).await?;
        match self.admit(&principal).await? {
            Admission::Admitted { role } => Ok((principal, role)),
            denied => Err(AppError::AuthRejection(
                denied
                    .deny_message(&self.policy)
                    .unwrap_or_else(|| sf_core::GENERIC_REJECT_MESSAGE.to_string()),
            )),
        }
    }

    /// Admin console sign-in: additionally requires membership in the admin
    /// set, signing out anyone else.
    pub async fn sign_in_admin(&self, provider_hint: &str) -> Result<Principal> {
        let (principal, role) = self.sign_in(provider_hint).await?;
        if role != Role::Admin {
            self.force_sign_out().await;
            return Err(AppError::AuthRejection(
                "Please sign in with a registered administrator e-mail.".to_string(),
            ));
        }
        Ok(principal)
    }

    async fn force_sign_out(&self) {
        if let Err(err) = self.identity.sign_out().await {
            tracing::warn!(error = %err, "forced sign-out failed; session lingers at the source");
        }
    }
}
