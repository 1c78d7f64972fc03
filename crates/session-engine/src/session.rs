//! Session lifecycle on top of the active provider.
//!
//! `SessionManager` owns the sequencing rules: concurrent session fetches are
//! coalesced into one request, results are applied through the ticketed
//! state store, and every mutating verb detaches the in-flight fetch so the
//! next `get_session` observes its effect.

use crate::coalesce::InFlight;
use crate::provider::{
    ProviderStrategy, SessionOutcome, SignInOutcome, SignInRequest, SignOutOutcome,
    SignOutRequest,
};
use crate::state::{SessionData, SessionStateStore};
use crate::{AuthError, AuthResult};
use futures_util::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SessionManager {
    provider: Arc<dyn ProviderStrategy>,
    state: Arc<SessionStateStore>,
    in_flight: InFlight<AuthResult<SessionData>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn ProviderStrategy>, state: Arc<SessionStateStore>) -> Self {
        Self {
            provider,
            state,
            in_flight: InFlight::new(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn ProviderStrategy> {
        &self.provider
    }

    pub fn state(&self) -> &Arc<SessionStateStore> {
        &self.state
    }

    /// Fetch the session, or join the fetch already in flight.
    ///
    /// Auth rejections resolve to `SessionData::SignedOut`; other failures
    /// leave the state untouched and are returned.
    pub async fn get_session(&self, force: bool) -> AuthResult<SessionData> {
        if !self.provider.should_fetch(force)? {
            if let Some(pending) = self.in_flight.pending() {
                return pending.await;
            }
            let ticket = self.state.issue();
            self.state.apply(ticket, SessionOutcome::SignedOut);
            debug!(provider = %self.provider.kind(), "No token stored, skipping session fetch");
            return Ok(self.state.data());
        }

        let (request, started) = self.in_flight.join_or_start(|| {
            let guard = self.state.begin_fetch();
            let provider = Arc::clone(&self.provider);
            let state = Arc::clone(&self.state);
            // Runs to completion even when every caller has gone away, so the
            // guard always ends the fetch.
            let fetch = tokio::spawn(async move {
                match provider.fetch_session().await {
                    Ok(outcome) => {
                        guard.complete(outcome);
                        Ok(state.data())
                    }
                    Err(e) => {
                        drop(guard);
                        warn!(error = %e, transient = e.is_transient(), "Session fetch failed");
                        Err(e)
                    }
                }
            });
            async move {
                fetch.await.unwrap_or_else(|e| {
                    Err(AuthError::Network(format!("session fetch task failed: {}", e)))
                })
            }
            .boxed()
        });

        if !started {
            debug!("Joining in-flight session fetch");
        }
        request.await
    }

    /// Sign in, then refetch the session unless told otherwise.
    pub async fn sign_in(
        &self,
        request: SignInRequest,
        call_get_session: bool,
    ) -> AuthResult<SignInOutcome> {
        let outcome = self.provider.sign_in(request).await?;
        if let SignInOutcome::Completed(result) = &outcome {
            if result.ok {
                self.in_flight.invalidate();
                if call_get_session {
                    self.get_session(true).await?;
                }
            }
        }
        Ok(outcome)
    }

    pub async fn sign_up(&self, credentials: &Value) -> AuthResult<Value> {
        self.provider.sign_up(credentials).await
    }

    /// Sign out and mark the session signed out.
    pub async fn sign_out(&self, request: SignOutRequest) -> AuthResult<SignOutOutcome> {
        let outcome = self.provider.sign_out(request).await?;
        self.in_flight.invalidate();
        let ticket = self.state.issue();
        self.state.apply(ticket, SessionOutcome::SignedOut);
        Ok(outcome)
    }

    /// Rotate the access token. Status and data are left as they are.
    pub async fn refresh(&self) -> AuthResult<()> {
        self.provider.refresh().await?;
        self.in_flight.invalidate();
        self.state.mark_refreshed();
        Ok(())
    }

    /// Store a token. The session is not refetched.
    pub fn set_token(&self, raw: &str) -> AuthResult<()> {
        self.provider.set_token(raw)?;
        self.in_flight.invalidate();
        Ok(())
    }

    /// Drop stored tokens. The session is not refetched.
    pub fn clear_token(&self) -> AuthResult<()> {
        self.provider.clear_token()?;
        self.in_flight.invalidate();
        Ok(())
    }
}
