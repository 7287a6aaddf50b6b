//! Joint teardown of many subscriptions.
//!
//! A [`SubscriptionGroup`] owns the subscriptions added to it until it is
//! unsubscribed or they are explicitly removed. Once unsubscribed, anything added
//! later is released immediately instead of being stored, so a late registration
//! racing with teardown is never left running.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::subscription::subscribe::{Subscription, Unsubscribeable};

/// Identifies a subscription stored in a [`SubscriptionGroup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey(u64);

/// Aggregates subscriptions so they can be released together.
///
/// Clones share the same group. `add`, `remove` and `unsubscribe` may be called
/// concurrently from different threads; every subscription ends up released
/// exactly once, either by the group or by whoever removed it.
#[derive(Clone, Default)]
pub struct SubscriptionGroup {
    inner: Arc<Mutex<GroupState>>,
}

#[derive(Default)]
struct GroupState {
    closed: bool,
    next_key: u64,
    subscriptions: HashMap<GroupKey, Subscription>,
}

impl SubscriptionGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `subscription` in the group.
    ///
    /// Returns `None` when the group is already unsubscribed; the subscription has
    /// then been released on the spot.
    pub fn add(&self, subscription: Subscription) -> Option<GroupKey> {
        let mut state = self.inner.lock();
        if state.closed {
            drop(state);
            trace!("subscription added to a released group, releasing it immediately");
            subscription.unsubscribe();
            return None;
        }
        let key = GroupKey(state.next_key);
        state.next_key += 1;
        state.subscriptions.insert(key, subscription);
        Some(key)
    }

    /// Takes a subscription back out of the group without releasing it.
    pub fn remove(&self, key: GroupKey) -> Option<Subscription> {
        self.inner.lock().subscriptions.remove(&key)
    }

    /// Number of subscriptions currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a slot for a subscription whose work may finish before the
    /// subscription itself is known.
    pub(crate) fn track(&self) -> Tracked {
        Tracked {
            group: self.clone(),
            state: Arc::new(Mutex::new(TrackedState::Pending)),
        }
    }
}

impl Unsubscribeable for SubscriptionGroup {
    fn unsubscribe(&self) {
        let released: Vec<Subscription> = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.subscriptions.drain().map(|(_, s)| s).collect()
        };
        trace!(count = released.len(), "releasing subscription group");
        // Released outside the lock: teardown may re-enter this group.
        for subscription in released {
            subscription.unsubscribe();
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

enum TrackedState {
    Pending,
    Registered(GroupKey),
    Finished,
}

/// Group entry that removes itself once its work has finished.
///
/// `register` and `finish` may happen in either order: a scheduled action can run
/// to completion on another thread before `schedule` has even returned its token.
#[derive(Clone)]
pub(crate) struct Tracked {
    group: SubscriptionGroup,
    state: Arc<Mutex<TrackedState>>,
}

impl Tracked {
    pub(crate) fn register(&self, subscription: Subscription) {
        let Some(key) = self.group.add(subscription) else {
            return;
        };
        let mut state = self.state.lock();
        match *state {
            TrackedState::Finished => {
                drop(state);
                self.group.remove(key);
            }
            _ => *state = TrackedState::Registered(key),
        }
    }

    pub(crate) fn finish(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), TrackedState::Finished);
        if let TrackedState::Registered(key) = previous {
            self.group.remove(key);
        }
    }
}
