use std::time::Duration;

use tokio::runtime::Handle;

use super::{Action, Scheduler};
use crate::subscribe::Subscription;

/// Runs actions as tasks on a Tokio runtime.
///
/// Delays use `tokio::time::sleep`, and unsubscribing aborts the task. An aborted
/// task that has not been polled yet never runs its action.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        TokioScheduler { handle }
    }

    /// Scheduler bound to the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Like [`current`](Self::current), but returns `None` outside of a runtime.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, action: Action, delay: Duration) -> Subscription {
        let task = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            action();
        });
        Subscription::from_fn(move || task.abort())
    }
}
