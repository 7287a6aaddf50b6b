use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::runtime;
use tracing::{trace, warn};

use crate::{observer::Observer, subscription::group::SubscriptionGroup, SharedError};

/// A trait for types that can be subscribed to, allowing consumers to receive
/// values emitted by an observable stream.
pub trait Subscribeable {
    /// The type of items emitted by the observable stream.
    type ObsType;

    /// Subscribes to the observable stream and specifies how to handle emitted values.
    ///
    /// Every call starts an independent execution with its own state. The
    /// implementation may deliver notifications to `s` before returning, or later
    /// from another thread.
    ///
    /// The returned `Subscription` releases whatever the execution holds when it is
    /// unsubscribed.
    fn subscribe(&self, s: Subscriber<Self::ObsType>) -> Subscription;
}

/// A trait for types that can be unsubscribed, allowing the clean release of resources
/// associated with a subscription.
pub trait Unsubscribeable {
    /// Releases the resources held by this handle.
    ///
    /// Calling it more than once has the same effect as calling it once. It never
    /// panics and may be called from inside a notification callback.
    fn unsubscribe(&self);

    /// Returns `true` once `unsubscribe` has been called.
    fn is_closed(&self) -> bool;
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(SharedError) + Send>;

/// A type that acts as an observer, allowing users to handle emitted values, errors,
/// and completion when subscribing to an `Observable`.
///
/// Users can create a `Subscriber` instance using the `new` method and provide
/// custom functions to handle the `next`, `error`, and `complete` events, or start
/// from `on_next` and attach the optional handlers afterwards.
///
/// A `Subscriber` enforces the notification grammar on its own: once `error` or
/// `complete` has been delivered, every further notification is dropped.
pub struct Subscriber<NextFnType> {
    next_fn: NextFn<NextFnType>,
    complete_fn: Option<CompleteFn>,
    error_fn: Option<ErrorFn>,
    completed: bool,
    errored: bool,
}

impl<NextFnType> Subscriber<NextFnType> {
    /// Creates a new `Subscriber` instance with custom handling functions for emitted
    /// values, errors, and completion.
    pub fn new(
        next_fn: impl FnMut(NextFnType) + 'static + Send,
        error_fn: impl FnMut(SharedError) + 'static + Send,
        complete_fn: impl FnMut() + 'static + Send,
    ) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: Some(Box::new(complete_fn)),
            error_fn: Some(Box::new(error_fn)),
            completed: false,
            errored: false,
        }
    }

    /// Create a new Subscriber with the provided `next` function.
    ///
    /// Errors and completion are ignored unless handlers are attached with
    /// `on_error` and `on_complete`.
    pub fn on_next(next_fn: impl FnMut(NextFnType) + 'static + Send) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: None,
            error_fn: None,
            completed: false,
            errored: false,
        }
    }

    /// Subscriber that ignores every notification.
    #[must_use]
    pub fn noop() -> Self {
        Self::on_next(|_| {})
    }

    /// Set the completion function for the Subscriber.
    pub fn on_complete(&mut self, complete_fn: impl FnMut() + 'static + Send) {
        self.complete_fn = Some(Box::new(complete_fn));
    }

    /// Set the error-handling function for the Subscriber.
    pub fn on_error(&mut self, error_fn: impl FnMut(SharedError) + 'static + Send) {
        self.error_fn = Some(Box::new(error_fn));
    }

    /// Returns `true` once a terminal notification has been delivered.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.completed || self.errored
    }
}

impl<T> Observer for Subscriber<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if self.is_stopped() {
            trace!("dropping next notification delivered after a terminal notification");
            return;
        }
        (self.next_fn)(v);
    }

    fn complete(&mut self) {
        if self.is_stopped() {
            trace!("dropping complete notification delivered after a terminal notification");
            return;
        }
        // Flag first so a panicking handler cannot be followed by another terminal call.
        self.completed = true;
        if let Some(cfn) = &mut self.complete_fn {
            (cfn)();
        }
    }

    fn error(&mut self, observable_error: SharedError) {
        if self.is_stopped() {
            trace!("dropping error notification delivered after a terminal notification");
            return;
        }
        self.errored = true;
        if let Some(efn) = &mut self.error_fn {
            (efn)(observable_error);
        }
    }
}

/// Represents a subscription to an observable, allowing control over the
/// subscription.
///
/// Cloning a `Subscription` yields another handle to the same underlying resource;
/// the unsubscribe logic runs once no matter how many handles call `unsubscribe`.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    closed: AtomicBool,
    unsubscribe_logic: Mutex<UnsubscribeLogic>,
    runtime_handle: Option<runtime::Handle>,
}

impl Subscription {
    /// Creates a new Subscription instance with the specified unsubscribe logic.
    ///
    /// See [`UnsubscribeLogic`] for the available unsubscribe strategies. When the
    /// logic is a future, the Tokio runtime current at this call is captured and the
    /// future is spawned on it upon unsubscribing.
    ///
    /// [`UnsubscribeLogic`]: enum.UnsubscribeLogic.html
    #[must_use]
    pub fn new(unsubscribe_logic: UnsubscribeLogic) -> Self {
        let runtime_handle = match unsubscribe_logic {
            UnsubscribeLogic::Future(_) => runtime::Handle::try_current().ok(),
            _ => None,
        };
        Subscription {
            inner: Arc::new(SubscriptionInner {
                closed: AtomicBool::new(false),
                unsubscribe_logic: Mutex::new(unsubscribe_logic),
                runtime_handle,
            }),
        }
    }

    /// Subscription with nothing to release. It reports itself as closed.
    #[must_use]
    pub fn empty() -> Self {
        let s = Self::new(UnsubscribeLogic::Nil);
        s.inner.closed.store(true, Ordering::Release);
        s
    }

    /// Subscription whose unsubscribe logic is the given function.
    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Self::new(UnsubscribeLogic::Logic(Box::new(f)))
    }
}

impl Unsubscribeable for Subscription {
    fn unsubscribe(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let logic = std::mem::replace(&mut *self.inner.unsubscribe_logic.lock(), UnsubscribeLogic::Nil);
        logic.unsubscribe(self.inner.runtime_handle.as_ref());
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl From<SubscriptionGroup> for Subscription {
    fn from(group: SubscriptionGroup) -> Self {
        Subscription::new(UnsubscribeLogic::Group(group))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Enumerates various unsubscribe logic options for a subscription.
pub enum UnsubscribeLogic {
    /// No specific unsubscribe logic.
    Nil,

    /// If one subscription depends on another. Wrapped subscription's unsubscribe
    /// will be called upon unsubscribing.
    Wrapped(Subscription),

    /// Every subscription held by the group is released upon unsubscribing.
    Group(SubscriptionGroup),

    /// Unsubscribe logic defined by a function.
    Logic(Box<dyn FnOnce() + Send>),

    /// Asynchronous unsubscribe logic represented by a future. Use if you need to
    /// spawn `Tokio` tasks or `.await` as a part of the unsubscribe logic.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl UnsubscribeLogic {
    fn unsubscribe(self, runtime_handle: Option<&runtime::Handle>) {
        match self {
            UnsubscribeLogic::Nil => (),
            UnsubscribeLogic::Logic(fnc) => fnc(),
            UnsubscribeLogic::Wrapped(subscription) => subscription.unsubscribe(),
            UnsubscribeLogic::Group(group) => group.unsubscribe(),
            UnsubscribeLogic::Future(future) => match runtime_handle {
                Some(handle) => {
                    handle.spawn(future);
                }
                None => {
                    warn!("asynchronous unsubscribe logic created outside of a Tokio runtime was dropped");
                }
            },
        }
    }
}
