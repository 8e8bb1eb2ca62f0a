//! Explicit subscription handles
//!
//! Every signal watch the observer sets up is represented by a
//! [`Subscription`] stored in the record of the entity it belongs to. Dropping
//! the record drops the handle, which stops the watch. Nothing outlives the
//! entity that asked for it.

use std::fmt;
use tokio::task::JoinHandle;
use tracing::trace;

/// Handle to a live signal watch; cancels the watch when dropped
pub struct Subscription {
    label: String,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an arbitrary cancellation action
    pub fn new(label: impl Into<String>, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Tie the subscription to a forwarding task, aborting it on release
    pub fn from_task(label: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self::new(label, move || task.abort())
    }

    /// What is being watched, for diagnostics
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Release the subscription now
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            trace!("Releasing subscription {}", self.label);
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_drop_runs_cancel_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let subscription = Subscription::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(subscription.label(), "test");

        drop(subscription);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_cancel_does_not_run_twice() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let subscription = Subscription::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.cancel();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_task_subscription_aborts_task() {
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });

        drop(Subscription::from_task("sleeper", task));

        // The aborted task drops its sender without sending
        assert!(alive_rx.await.is_err());
    }
}
