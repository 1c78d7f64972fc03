//! A single named raw token with change notification.

use crate::{StorageError, StorageResult, TokenStorage};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Persisted representation of a token.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Raw token persisted under a configurable key.
///
/// `set` and `clear` are synchronous and are observed by subscribers right
/// away. Neither one triggers a session refetch; callers decide when to
/// revalidate.
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    key: String,
    max_age: Option<TimeDelta>,
    tx: watch::Sender<Option<String>>,
}

impl TokenStore {
    /// Open the token stored under `key`.
    ///
    /// With `max_age_secs`, every `set` records an expiry and `get` treats an
    /// expired entry as absent (and deletes it).
    pub fn new(
        storage: Arc<dyn TokenStorage>,
        key: impl Into<String>,
        max_age_secs: Option<u64>,
    ) -> StorageResult<Self> {
        let key = key.into();
        let max_age = max_age_secs.map(checked_max_age).transpose()?;
        let initial = read_live(storage.as_ref(), &key)?;
        let (tx, _) = watch::channel(initial);

        Ok(Self {
            storage,
            key,
            max_age,
            tx,
        })
    }

    /// Storage key of this token.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the token from storage, honoring its expiry.
    ///
    /// Subscribers are notified if the persisted value differs from the last
    /// observed one (expired, or written by another process).
    pub fn get(&self) -> StorageResult<Option<String>> {
        let value = read_live(self.storage.as_ref(), &self.key)?;
        self.tx.send_if_modified(|current| {
            if *current != value {
                *current = value.clone();
                true
            } else {
                false
            }
        });
        Ok(value)
    }

    /// Last observed value, without touching storage.
    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Persist a new raw token.
    pub fn set(&self, value: &str) -> StorageResult<()> {
        let expires_at = match self.max_age {
            Some(max_age) => Some(Utc::now().checked_add_signed(max_age).ok_or_else(|| {
                StorageError::InvalidMaxAge(max_age.num_seconds().unsigned_abs())
            })?),
            None => None,
        };
        let stored = StoredToken {
            value: value.to_string(),
            expires_at,
        };
        let encoded =
            serde_json::to_string(&stored).map_err(|e| StorageError::Encoding(e.to_string()))?;

        self.storage.set(&self.key, &encoded)?;
        self.tx.send_replace(Some(value.to_string()));
        debug!(key = %self.key, "Token stored");
        Ok(())
    }

    /// Remove the token.
    pub fn clear(&self) -> StorageResult<()> {
        self.storage.delete(&self.key)?;
        self.tx.send_replace(None);
        debug!(key = %self.key, "Token cleared");
        Ok(())
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

fn checked_max_age(secs: u64) -> StorageResult<TimeDelta> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(StorageError::InvalidMaxAge(secs))
}

/// Read an entry, deleting it when expired.
///
/// Entries that are not in the JSON envelope are taken verbatim as a token
/// without expiry, so values written by other tools are still usable.
fn read_live(storage: &dyn TokenStorage, key: &str) -> StorageResult<Option<String>> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };

    let stored = match serde_json::from_str::<StoredToken>(&raw) {
        Ok(stored) => stored,
        Err(_) => {
            return Ok(Some(raw));
        }
    };

    if let Some(expires_at) = stored.expires_at {
        if expires_at <= Utc::now() {
            debug!(key = %key, expires_at = %expires_at, "Stored token expired, removing");
            storage.delete(key)?;
            return Ok(None);
        }
    }

    Ok(Some(stored.value))
}
