//! Schedulers decide *when* and *where* an action runs.
//!
//! Operators such as `delay` and `observe_on` only need the [`Scheduler`] trait:
//! submit an action, optionally after a delay, and get back a [`Subscription`] that
//! prevents the action from running if it has not started yet.
//!
//! A process-wide default scheduler is used by operators that are not given one
//! explicitly. It starts out as a lazily created [`EventLoopScheduler`] and can be
//! replaced by host code with [`set_default_scheduler`].

mod runtime;
mod thread;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use tracing::debug;

pub use self::runtime::TokioScheduler;
pub use self::thread::{EventLoopScheduler, NewThreadScheduler};
use crate::subscribe::Subscription;

/// Unit of work submitted to a scheduler.
pub type Action = Box<dyn FnOnce() + Send>;

/// Executes actions now or after a delay.
///
/// Unsubscribing the returned subscription before the action starts prevents it
/// from running. Unsubscribing after it started has no effect on that execution.
pub trait Scheduler: Send + Sync {
    /// Schedules `action` to run as soon as possible.
    fn schedule(&self, action: Action) -> Subscription {
        self.schedule_after(action, Duration::ZERO)
    }

    /// Schedules `action` to run once `delay` has elapsed.
    fn schedule_after(&self, action: Action, delay: Duration) -> Subscription;
}

/// Runs actions on the calling thread, blocking for the delay first.
///
/// The action has always finished by the time `schedule` returns, so the returned
/// subscription is already closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule_after(&self, action: Action, delay: Duration) -> Subscription {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        action();
        Subscription::empty()
    }
}

/// Instant at which `delay` from now elapses, or `None` when it lies beyond what
/// `Instant` can represent.
pub(crate) fn deadline_after(delay: Duration) -> Option<Instant> {
    Instant::now().checked_add(delay)
}

static DEFAULT_SCHEDULER: RwLock<Option<Arc<dyn Scheduler>>> = parking_lot::const_rwlock(None);

/// Returns the process-wide default scheduler, creating an [`EventLoopScheduler`]
/// on first use if none was installed.
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    if let Some(scheduler) = DEFAULT_SCHEDULER.read().as_ref() {
        return Arc::clone(scheduler);
    }
    let mut slot = DEFAULT_SCHEDULER.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(EventLoopScheduler::new()) as Arc<dyn Scheduler>))
}

/// Installs `scheduler` as the process-wide default.
///
/// Operators capture the default when they are built, so observables created
/// before this call keep the scheduler that was current back then.
pub fn set_default_scheduler(scheduler: Arc<dyn Scheduler>) {
    *DEFAULT_SCHEDULER.write() = Some(scheduler);
    debug!("default scheduler replaced");
}

/// Drops the installed default; the next [`default_scheduler`] call creates a
/// fresh [`EventLoopScheduler`].
pub fn reset_default_scheduler() {
    DEFAULT_SCHEDULER.write().take();
    debug!("default scheduler reset");
}
