//! Window-focus equivalent: the host calls `notify` whenever the app regains
//! the user's attention.

use tokio::sync::broadcast;

const FOCUS_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct FocusSignal {
    tx: broadcast::Sender<()>,
}

impl Default for FocusSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Report a focus event. Returns the number of listeners reached.
    pub fn notify(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let focus = FocusSignal::new();
        assert_eq!(focus.notify(), 0);

        let mut rx = focus.subscribe();
        assert_eq!(focus.notify(), 1);
        rx.recv().await.unwrap();
    }
}
