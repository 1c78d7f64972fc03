//! De-duplication of concurrent identical requests.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Mutex;

/// Shared handle to a coalesced request.
pub(crate) type Joined<T> = Shared<BoxFuture<'static, T>>;

/// Single in-flight slot. Callers arriving while a request is pending join it
/// instead of starting their own.
pub(crate) struct InFlight<T: Clone> {
    slot: Mutex<Option<Joined<T>>>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Join the pending request, or start a new one with `start`.
    ///
    /// Returns the handle and whether this call started it.
    pub(crate) fn join_or_start<F>(&self, start: F) -> (Joined<T>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let mut slot = self.slot.lock().unwrap();
        if let Some(pending) = slot.as_ref() {
            if pending.peek().is_none() {
                return (pending.clone(), false);
            }
        }

        let request = start().shared();
        *slot = Some(request.clone());
        (request, true)
    }

    /// The pending request, if one has not completed yet.
    pub(crate) fn pending(&self) -> Option<Joined<T>> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .filter(|pending| pending.peek().is_none())
            .cloned()
    }

    /// Detach the pending request so the next caller starts a fresh one.
    /// Callers already joined still receive its result.
    pub(crate) fn invalidate(&self) {
        self.slot.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_start(
        counter: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, u32> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                value
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_request() {
        let in_flight = InFlight::new();
        let started = Arc::new(AtomicUsize::new(0));

        let (first, first_started) = in_flight.join_or_start(counting_start(&started, 1));
        let (second, second_started) = in_flight.join_or_start(counting_start(&started, 2));

        assert!(first_started);
        assert!(!second_started);
        let (a, b) = tokio::join!(first, second);
        assert_eq!((a, b), (1, 1));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_request_is_not_reused() {
        let in_flight = InFlight::new();
        let started = Arc::new(AtomicUsize::new(0));

        let (first, _) = in_flight.join_or_start(counting_start(&started, 1));
        assert_eq!(first.await, 1);

        let (second, second_started) = in_flight.join_or_start(counting_start(&started, 2));
        assert!(second_started);
        assert_eq!(second.await, 2);
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_starts_fresh_request() {
        let in_flight = InFlight::new();
        let started = Arc::new(AtomicUsize::new(0));

        let (first, _) = in_flight.join_or_start(counting_start(&started, 1));
        in_flight.invalidate();
        let (second, second_started) = in_flight.join_or_start(counting_start(&started, 2));

        assert!(second_started);
        let (a, b) = tokio::join!(first, second);
        assert_eq!((a, b), (1, 2));
    }
}
