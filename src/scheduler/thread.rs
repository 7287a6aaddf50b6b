use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{self, AtomicBool},
        Arc, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, trace};

use super::{deadline_after, Action, Scheduler};
use crate::{errors::panic_message, subscribe::Subscription};

/// Runs every action on its own OS thread.
///
/// The thread waits out the delay on a signal that unsubscribing trips, so a
/// cancelled action releases its thread right away instead of sleeping to the end.
/// Actions scheduled separately are not ordered relative to each other.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewThreadScheduler;

#[derive(Default)]
struct CancelSignal {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelSignal {
    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.condvar.notify_all();
    }

    /// Blocks until `delay` elapses or the signal is cancelled. Returns `true` if
    /// cancelled.
    fn wait_cancelled(&self, delay: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        match deadline_after(delay) {
            Some(deadline) => {
                while !*cancelled {
                    if self.condvar.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
            }
            // Too far out to represent: only cancellation ends the wait.
            None => {
                while !*cancelled {
                    self.condvar.wait(&mut cancelled);
                }
            }
        }
        *cancelled
    }
}

impl Scheduler for NewThreadScheduler {
    fn schedule_after(&self, action: Action, delay: Duration) -> Subscription {
        let signal = Arc::new(CancelSignal::default());
        let signal_c = Arc::clone(&signal);

        thread::spawn(move || {
            if signal_c.wait_cancelled(delay) {
                debug!("scheduled action cancelled before it started");
                return;
            }
            action();
        });

        Subscription::from_fn(move || signal.cancel())
    }
}

/// Runs actions one at a time on a single dedicated worker thread.
///
/// Actions run in order of their due time; actions due at the same instant run in
/// the order they were scheduled. Routing notifications through this scheduler
/// therefore serializes them and keeps their order.
///
/// Dropping the scheduler does not discard work: the worker keeps running the
/// queued actions that were not cancelled and exits once the queue is empty.
pub struct EventLoopScheduler {
    shared: Arc<LoopShared>,
}

struct LoopShared {
    queue: Mutex<LoopQueue>,
    wakeup: Condvar,
}

#[derive(Default)]
struct LoopQueue {
    entries: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    /// Cancellations since the worker last pruned the queue.
    cancelled: usize,
    shutdown: bool,
}

struct Entry {
    /// `None` for a delay too large for `Instant`; such an entry never falls due.
    due: Option<Instant>,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    action: Action,
}

impl Entry {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        let due = match (self.due, other.due) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        due.then_with(|| self.seq.cmp(&other.seq))
    }
}

impl EventLoopScheduler {
    /// Starts the worker thread.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(LoopShared {
            queue: Mutex::new(LoopQueue::default()),
            wakeup: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        if let Err(e) = thread::Builder::new()
            .name("rxpush-event-loop".to_string())
            .spawn(move || run_loop(&worker))
        {
            error!(error = %e, "failed to start event loop worker");
        }
        EventLoopScheduler { shared }
    }

    /// Number of actions waiting to run.
    ///
    /// A cancelled action is counted until the worker wakes up to prune it, which
    /// unsubscribing triggers right away.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().entries.len()
    }
}

impl Default for EventLoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoopScheduler {
    fn drop(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.wakeup.notify_all();
    }
}

impl Scheduler for EventLoopScheduler {
    fn schedule_after(&self, action: Action, delay: Duration) -> Subscription {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut queue = self.shared.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.entries.push(Reverse(Entry {
                due: deadline_after(delay),
                seq,
                cancelled: Arc::clone(&cancelled),
                action,
            }));
        }
        self.shared.wakeup.notify_one();

        let shared: Weak<LoopShared> = Arc::downgrade(&self.shared);
        Subscription::from_fn(move || {
            cancelled.store(true, atomic::Ordering::Release);
            if let Some(shared) = shared.upgrade() {
                shared.queue.lock().cancelled += 1;
                shared.wakeup.notify_one();
            }
        })
    }
}

fn run_loop(shared: &LoopShared) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.cancelled > 0 {
            queue.cancelled = 0;
            let before = queue.entries.len();
            queue.entries.retain(|Reverse(entry)| !entry.is_cancelled());
            trace!(pruned = before - queue.entries.len(), "pruned cancelled actions");
        }
        if queue.shutdown && queue.entries.is_empty() {
            trace!("event loop stopped");
            return;
        }
        match queue.entries.peek().map(|Reverse(entry)| entry.due) {
            None | Some(None) => shared.wakeup.wait(&mut queue),
            Some(Some(due)) if due > Instant::now() => {
                shared.wakeup.wait_until(&mut queue, due);
            }
            Some(Some(_)) => {
                let Some(Reverse(entry)) = queue.entries.pop() else {
                    continue;
                };
                if entry.is_cancelled() {
                    debug!("scheduled action cancelled before it started");
                    continue;
                }
                MutexGuard::unlocked(&mut queue, || run_action(entry.action));
            }
        }
    }
}

fn run_action(action: Action) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
        let message = panic_message(payload.as_ref());
        error!(%message, "scheduled action panicked");
    }
}
