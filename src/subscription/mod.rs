//! Provides structures and traits related to subscription management.
//!
//! This module includes types such as `Subscriber` for handling observed values,
//! errors, and completions, `Subscription` for releasing what a subscription holds,
//! and `SubscriptionGroup` for releasing many subscriptions together.
pub mod group;
pub mod subscribe;
