use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

/// Delay applied to the search box before the view re-derives.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Holds back rapidly changing input until it has been stable for `delay`.
/// Scheduling a new value cancels the pending one: the latest value wins.
pub struct Debouncer<T> {
    delay: Duration,
    settled: Arc<watch::Sender<T>>,
    pending: Option<JoinHandle<()>>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T, delay: Duration) -> Self {
        let (settled, _) = watch::channel(initial);
        Self {
            delay,
            settled: Arc::new(settled),
            pending: None,
        }
    }

    /// Must be called inside a tokio runtime.
    pub fn schedule(&mut self, value: T) {
        self.cancel();
        let settled = Arc::clone(&self.settled);
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            settled.send_replace(value);
        }));
    }

    /// Applies `value` now, dropping anything pending.
    pub fn flush(&mut self, value: T) {
        self.cancel();
        self.settled.send_replace(value);
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn current(&self) -> T {
        self.settled.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.settled.subscribe()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
