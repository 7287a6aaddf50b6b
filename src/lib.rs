//! Push-based reactive streams.
//!
//! `rxpush` describes asynchronous or time-varying sequences of values as
//! [`Observable`]s and composes them with operators (filter, transform, combine,
//! delay, aggregate) without hand-written callback bookkeeping.
//!
//! The crate is built on four small contracts:
//!
//! - [`Observable`] / [`Subscribeable`]: something that can be subscribed to and
//!   pushes notifications to a subscriber.
//! - [`Observer`] / [`subscribe::Subscriber`]: a sink for `next`, `error` and
//!   `complete` notifications. At most one terminal notification is ever delivered.
//! - [`subscribe::Subscription`] / [`Unsubscribeable`]: an idempotent handle that
//!   releases what a subscription holds; [`group::SubscriptionGroup`] releases many
//!   of them together and stays safe under concurrent registration and teardown.
//! - [`scheduler::Scheduler`]: runs an action now or after a delay and returns a
//!   subscription that prevents it from running.
//!
//! Notifications may arrive synchronously while `subscribe` runs, or later from
//! another thread. The contracts do not serialize concurrent notifications to the
//! same subscriber; sources must not push overlapping notifications into one
//! subscription, and consumers that need a single delivery thread route through
//! [`ObservableExt::observe_on`].
//!
//! Callbacks run while the operator chain holds the lock of the downstream
//! subscriber, so a callback must not synchronously push into the same chain.

mod errors;
pub mod observable;
pub mod observer;
pub mod scheduler;
mod subscription;

pub use errors::{RxError, SharedError};
pub use observable::{Observable, ObservableExt};
pub use observer::Observer;
pub use subscription::subscribe::{Subscribeable, Unsubscribeable};
pub use subscription::{group, subscribe};
