//! Scripted collaborators for tests.

use crate::navigation::{NavigationError, NavigationTarget, Navigator};
use crate::transport::{AuthRequest, AuthResponse, AuthTransport};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted reply for one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond {
        status: u16,
        body: Value,
        delay: Option<Duration>,
    },
    Fail {
        error: AuthError,
        delay: Option<Duration>,
    },
}

/// Transport answering from per-path queues.
///
/// The last queued reply for a path is sticky; unscripted paths answer 404.
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    received: Mutex<Vec<AuthRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, path: &str, reply: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.script(
            path,
            Scripted::Respond {
                status,
                body,
                delay: None,
            },
        );
    }

    pub fn respond_after(&self, path: &str, delay: Duration, status: u16, body: Value) {
        self.script(
            path,
            Scripted::Respond {
                status,
                body,
                delay: Some(delay),
            },
        );
    }

    pub fn fail(&self, path: &str, error: AuthError) {
        self.script(path, Scripted::Fail { error, delay: None });
    }

    /// Requests received for `path`, in order.
    pub fn requests(&self, path: &str) -> Vec<AuthRequest> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests(path).len()
    }

    pub fn total_calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    fn next_reply(&self, path: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl AuthTransport for MockTransport {
    async fn send(&self, request: AuthRequest) -> AuthResult<AuthResponse> {
        let path = request.path.clone();
        self.received.lock().unwrap().push(request);

        match self.next_reply(&path) {
            Some(Scripted::Respond {
                status,
                body,
                delay,
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(AuthResponse::new(status, body))
            }
            Some(Scripted::Fail { error, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Err(error)
            }
            None => Ok(AuthResponse::new(404, Value::Null)),
        }
    }
}

/// Navigator recording every target; optionally refuses them all.
#[derive(Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<NavigationTarget>>,
    refuse: AtomicBool,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn targets(&self) -> Vec<NavigationTarget> {
        self.targets.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &NavigationTarget) -> Result<(), NavigationError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(NavigationError::Rejected("refused by test".to_string()));
        }
        self.targets.lock().unwrap().push(target.clone());
        Ok(())
    }
}

/// Let spawned tasks run until they block again.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
