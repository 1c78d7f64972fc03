//! Process-wide reactive session state.
//!
//! Every fetch and every state mutation takes a ticket from a monotonically
//! increasing counter. A result is applied only when its ticket is newer than
//! the last applied one, so a slow fetch issued early can never overwrite the
//! outcome of something issued after it.

use crate::provider::SessionOutcome;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Session status as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unauthenticated,
    Loading,
    Authenticated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Loading => "loading",
            SessionStatus::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session payload. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionData {
    /// Never fetched.
    #[default]
    Unfetched,
    /// Confirmed signed out.
    SignedOut,
    /// Provider-shaped session record.
    Session(Value),
}

impl SessionData {
    pub fn is_present(&self) -> bool {
        matches!(self, SessionData::Session(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            SessionData::Session(value) => Some(value),
            _ => None,
        }
    }

    /// Deserialize the session record into a caller-defined shape.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.as_value()
            .map(|value| T::deserialize(value))
            .transpose()
    }
}

impl From<SessionOutcome> for SessionData {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Session(value) => SessionData::Session(value),
            SessionOutcome::SignedOut => SessionData::SignedOut,
        }
    }
}

/// Point-in-time view of the session state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub data: SessionData,
    pub loading: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn status(&self) -> SessionStatus {
        if self.loading {
            SessionStatus::Loading
        } else if self.data.is_present() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        }
    }
}

struct StateInner {
    next_ticket: u64,
    applied: u64,
    in_flight: usize,
    snapshot: SessionSnapshot,
    refreshed_instant: Option<Instant>,
}

/// Owned session state, shared by the facade, the provider paths and the
/// scheduler.
pub struct SessionStateStore {
    inner: Mutex<StateInner>,
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateStore {
    pub fn new() -> Self {
        let snapshot = SessionSnapshot::default();
        let (tx, _) = watch::channel(snapshot.clone());
        Self {
            inner: Mutex::new(StateInner {
                next_ticket: 0,
                applied: 0,
                in_flight: 0,
                snapshot,
                refreshed_instant: None,
            }),
            tx,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().unwrap().snapshot.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().snapshot.status()
    }

    pub fn data(&self) -> SessionData {
        self.inner.lock().unwrap().snapshot.data.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.lock().unwrap().snapshot.loading
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap().snapshot.last_refreshed_at
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Monotonic twin of `last_refreshed_at`.
    pub(crate) fn last_refreshed_instant(&self) -> Option<Instant> {
        self.inner.lock().unwrap().refreshed_instant
    }

    /// Take a ticket for a mutation that does not go through `begin_fetch`.
    pub(crate) fn issue(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_ticket += 1;
        inner.next_ticket
    }

    /// Apply a result without touching the refresh timestamp.
    ///
    /// Returns false when the ticket is stale.
    pub(crate) fn apply(&self, ticket: u64, outcome: SessionOutcome) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let applied = Self::apply_locked(&mut inner, ticket, outcome, false);
        if applied {
            self.tx.send_replace(inner.snapshot.clone());
        }
        applied
    }

    /// Record a successful token refresh.
    pub(crate) fn mark_refreshed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshot.last_refreshed_at = Some(Utc::now());
        inner.refreshed_instant = Some(Instant::now());
        self.tx.send_replace(inner.snapshot.clone());
    }

    /// Start a network fetch. `loading` stays true until every guard is gone.
    pub(crate) fn begin_fetch(self: &Arc<Self>) -> FetchGuard {
        let mut inner = self.inner.lock().unwrap();
        inner.next_ticket += 1;
        inner.in_flight += 1;
        let ticket = inner.next_ticket;
        if !inner.snapshot.loading {
            inner.snapshot.loading = true;
            self.tx.send_replace(inner.snapshot.clone());
        }
        drop(inner);

        FetchGuard {
            store: Arc::clone(self),
            ticket,
            finished: false,
        }
    }

    fn apply_locked(
        inner: &mut StateInner,
        ticket: u64,
        outcome: SessionOutcome,
        fetched: bool,
    ) -> bool {
        if ticket <= inner.applied {
            debug!(
                ticket,
                applied = inner.applied,
                "Discarding stale session result"
            );
            return false;
        }
        inner.applied = ticket;
        inner.snapshot.data = outcome.into();
        if fetched {
            inner.snapshot.last_refreshed_at = Some(Utc::now());
            inner.refreshed_instant = Some(Instant::now());
        }
        true
    }

    fn finish_fetch(&self, completion: Option<(u64, SessionOutcome)>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let applied = match completion {
            Some((ticket, outcome)) => Self::apply_locked(&mut inner, ticket, outcome, true),
            None => false,
        };
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.snapshot.loading = inner.in_flight > 0;
        self.tx.send_replace(inner.snapshot.clone());
        applied
    }
}

/// Brackets one in-flight fetch. Dropping it without `complete` counts as a
/// failed fetch: state is left as it was.
pub(crate) struct FetchGuard {
    store: Arc<SessionStateStore>,
    ticket: u64,
    finished: bool,
}

impl FetchGuard {
    /// Apply the fetch result and end the fetch in one update.
    pub(crate) fn complete(mut self, outcome: SessionOutcome) -> bool {
        self.finished = true;
        self.store.finish_fetch(Some((self.ticket, outcome)))
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.store.finish_fetch(None);
        }
    }
}
