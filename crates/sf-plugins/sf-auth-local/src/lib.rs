//! # sf-auth-local
//!
//! In-process implementation of `IdentitySource` backed by a static account
//! directory. Sign-in resolves a provider hint to a known principal and
//! notifies every listener; sign-out clears the session the same way. Used
//! by the demo binary and as the identity fixture in scenario tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sf_core::{
    AppError, IdentityHandler, IdentitySource, Principal, Result, Subscription,
};

struct Listener {
    id: u64,
    handler: IdentityHandler,
}

struct SessionState {
    current: Option<Principal>,
    listeners: Vec<Listener>,
    next_listener: u64,
}

pub struct LocalIdentitySource {
    accounts: HashMap<String, Principal>,
    state: Arc<Mutex<SessionState>>,
}

impl LocalIdentitySource {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            state: Arc::new(Mutex::new(SessionState {
                current: None,
                listeners: Vec::new(),
                next_listener: 0,
            })),
        }
    }

    /// Registers an account reachable through `sign_in(hint)`.
    pub fn with_account(mut self, hint: impl Into<String>, principal: Principal) -> Self {
        self.accounts.insert(hint.into(), principal);
        self
    }

    fn broadcast(&self, principal: Option<Principal>) {
        let handlers: Vec<IdentityHandler> = {
            let state = self.state.lock().expect("session lock");
            state.listeners.iter().map(|l| l.handler.clone()).collect()
        };
        for handler in handlers {
            handler(principal.clone());
        }
    }
}

impl Default for LocalIdentitySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentitySource for LocalIdentitySource {
    async fn sign_in(&self, provider_hint: &str) -> Result<Principal> {
        let principal = self
            .accounts
            .get(provider_hint)
            .cloned()
            .ok_or_else(|| {
                AppError::AuthRejection(format!("unknown account: {provider_hint}"))
            })?;

        {
            let mut state = self.state.lock().expect("session lock");
            state.current = Some(principal.clone());
        }
        tracing::debug!(hint = provider_hint, "sign_in");
        self.broadcast(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<()> {
        let was_signed_in = {
            let mut state = self.state.lock().expect("session lock");
            state.current.take().is_some()
        };
        if was_signed_in {
            tracing::debug!("sign_out");
            self.broadcast(None);
        }
        Ok(())
    }

    fn current(&self) -> Option<Principal> {
        self.state.lock().expect("session lock").current.clone()
    }

    fn subscribe(&self, handler: IdentityHandler) -> Subscription {
        // Immediate delivery of the current state, then transitions.
        let (id, current) = {
            let mut state = self.state.lock().expect("session lock");
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push(Listener { id, handler: handler.clone() });
            (id, state.current.clone())
        };
        handler(current);

        let registry = Arc::clone(&self.state);
        Subscription::new(move || {
            let mut state = registry.lock().expect("session lock");
            state.listeners.retain(|l| l.id != id);
        })
    }
}
