//! The `observable` module provides the building blocks for creating and manipulating
//! observables.
//!
//! An [`Observable`] is a description of how to push a sequence of values. It holds
//! no state of its own: every `subscribe` call runs the description again with
//! fresh per-subscription state, so the same observable can be subscribed any
//! number of times, from any thread.
//!
//! Operators in [`ObservableExt`] build a new `Observable` whose subscribe logic
//! subscribes to the wrapped one with an intermediate [`Subscriber`]. Values flow
//! through that chain of subscribers; unsubscribing the outermost `Subscription`
//! releases every upstream subscription and every pending scheduled action.
//!
//! # Failures in user functions
//!
//! `map`, `filter`, `scan` and the projection of `merge_map` do not shield user
//! code: a panicking function unwinds out of the `next` call that triggered it.
//! `distinct_until_changed*` and the final emission of `to_vec` catch the panic and
//! turn it into an `error` notification carrying [`RxError::SelectorFailure`].
//!
//! # Example
//!
//! ```no_run
//! use rxpush::subscribe::Subscriber;
//! use rxpush::{Observable, ObservableExt, Subscribeable};
//!
//! let observable = Observable::of(vec![1, 2, 2, 3, 3, 3, 1])
//!     .distinct_until_changed()
//!     .scan(|total, n| total + n)
//!     .filter(|total| total % 2 == 0);
//!
//! let mut observer = Subscriber::on_next(|v| println!("Emitted {v}"));
//! observer.on_complete(|| println!("Completed"));
//!
//! observable.subscribe(observer);
//! ```

mod blocking;

use std::{
    error::Error,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::scheduler::{default_scheduler, Scheduler};
use crate::subscription::group::SubscriptionGroup;
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, UnsubscribeLogic, Unsubscribeable,
};
use crate::{observer::Observer, RxError, SharedError};

type SubscribeFn<T> = dyn Fn(Subscriber<T>) -> Subscription + Send + Sync;

/// Downstream subscriber shared by the closures of one operator subscription.
type Shared<T> = Arc<Mutex<Subscriber<T>>>;

/// The `Observable` struct represents a source of values that can be observed
/// and transformed.
///
/// Cloning is cheap and yields the same description; subscriptions to clones are
/// as independent as subscriptions to the original.
pub struct Observable<T> {
    subscribe_fn: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            subscribe_fn: Arc::clone(&self.subscribe_fn),
        }
    }
}

impl<T: 'static> Observable<T> {
    /// Creates a new `Observable` with the provided subscribe function.
    ///
    /// The subscribe function runs once per `subscribe` call. It may push
    /// notifications to the `Subscriber` before returning, or hand the subscriber to
    /// a thread or task that pushes later. It must return promptly with a
    /// `Subscription` that stops the work it started.
    ///
    /// Operators deliver to their subscriber while holding its lock. A callback that
    /// synchronously pushes back into the same chain blocks forever; hand such
    /// feedback to a scheduler instead, for example with
    /// [`observe_on`](ObservableExt::observe_on).
    ///
    /// Every operator in this crate is built on this constructor.
    pub fn new(sf: impl Fn(Subscriber<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Observable {
            subscribe_fn: Arc::new(sf),
        }
    }

    /// Emits every item of `items` in order, then completes.
    pub fn of(items: impl IntoIterator<Item = T>) -> Self
    where
        T: Clone + Send + Sync,
    {
        let items: Vec<T> = items.into_iter().collect();
        Observable::new(move |mut o| {
            for item in &items {
                o.next(item.clone());
            }
            o.complete();
            Subscription::empty()
        })
    }

    /// Emits `value`, then completes.
    pub fn just(value: T) -> Self
    where
        T: Clone + Send + Sync,
    {
        Observable::of([value])
    }

    /// Completes immediately without emitting.
    #[must_use]
    pub fn empty() -> Self {
        Observable::new(|mut o| {
            o.complete();
            Subscription::empty()
        })
    }

    /// Never emits and never terminates.
    #[must_use]
    pub fn never() -> Self {
        Observable::new(|_| Subscription::empty())
    }

    /// Emits `err` as an error notification immediately.
    pub fn throw(err: impl Error + Send + Sync + 'static) -> Self {
        let err: SharedError = Arc::new(err);
        Observable::new(move |mut o| {
            o.error(Arc::clone(&err));
            Subscription::empty()
        })
    }

    /// Subscribes with only a `next` handler.
    pub fn subscribe_next(&self, next_fn: impl FnMut(T) + Send + 'static) -> Subscription {
        self.subscribe(Subscriber::on_next(next_fn))
    }
}

impl<T: Send + 'static> Observable<Observable<T>> {
    /// Flattens an observable of observables by subscribing to every inner
    /// observable as soon as it arrives and forwarding all of their values.
    ///
    /// Values of one inner observable keep their order; values of different inner
    /// observables interleave as they arrive. An error from the outer observable or
    /// from any inner one is forwarded at once and releases every subscription.
    /// Unsubscribing releases the outer subscription and all live inner ones.
    ///
    /// Completes as soon as the outer observable completes, without waiting for
    /// inner observables that are still running; anything they emit afterwards is
    /// dropped.
    #[must_use]
    pub fn merge_all(self) -> Observable<T> {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let group = SubscriptionGroup::new();
            let group_inner = group.clone();
            let group_e = group.clone();

            let u = Subscriber::new(
                move |inner: Observable<T>| {
                    let tracked = group_inner.track();
                    let inner_subscriber = inner_relay(&o_shared, &group_inner, tracked.clone());
                    tracked.register(inner.subscribe(inner_subscriber));
                },
                move |observable_error| {
                    o_cloned_e.lock().error(observable_error);
                    group_e.unsubscribe();
                },
                move || {
                    o_cloned_c.lock().complete();
                },
            );
            group.add(self.subscribe(u));
            Subscription::new(UnsubscribeLogic::Group(group))
        })
    }
}

impl<T: 'static> Subscribeable for Observable<T> {
    type ObsType = T;

    fn subscribe(&self, v: Subscriber<Self::ObsType>) -> Subscription {
        (self.subscribe_fn)(v)
    }
}

/// Builds the upstream subscriber of an operator: `next_fn` is operator specific,
/// terminal notifications go straight to the shared downstream subscriber.
fn relay<T: 'static, U: 'static>(
    o_shared: &Shared<U>,
    next_fn: impl FnMut(T) + Send + 'static,
) -> Subscriber<T> {
    let o_cloned_e = Arc::clone(o_shared);
    let o_cloned_c = Arc::clone(o_shared);

    Subscriber::new(
        next_fn,
        move |observable_error| {
            o_cloned_e.lock().error(observable_error);
        },
        move || {
            o_cloned_c.lock().complete();
        },
    )
}

/// Subscriber for one inner observable of `merge_all`.
fn inner_relay<T: 'static>(
    o_shared: &Shared<T>,
    group: &SubscriptionGroup,
    tracked: crate::subscription::group::Tracked,
) -> Subscriber<T> {
    let o_next = Arc::clone(o_shared);
    let o_error = Arc::clone(o_shared);
    let group = group.clone();

    Subscriber::new(
        move |v| {
            o_next.lock().next(v);
        },
        move |observable_error| {
            o_error.lock().error(observable_error);
            group.unsubscribe();
        },
        move || {
            // Inner completion is not forwarded; only its slot is freed.
            tracked.finish();
        },
    )
}

/// Moves every `next` notification of `source` onto `scheduler`, optionally after
/// `delay`. Terminal notifications are forwarded right away.
fn reschedule_values<T, O>(
    source: O,
    scheduler: Arc<dyn Scheduler>,
    delay: Option<Duration>,
) -> Observable<T>
where
    T: Send + 'static,
    O: Subscribeable<ObsType = T> + Send + Sync + 'static,
{
    Observable::new(move |o| {
        let o_shared = Arc::new(Mutex::new(o));
        let o_next = Arc::clone(&o_shared);
        let scheduler = Arc::clone(&scheduler);

        let pending = SubscriptionGroup::new();
        let pending_c = pending.clone();

        let u = relay(&o_shared, move |v: T| {
            let o_next = Arc::clone(&o_next);
            let tracked = pending_c.track();
            let tracked_c = tracked.clone();
            let action = Box::new(move || {
                o_next.lock().next(v);
                tracked_c.finish();
            });
            let token = match delay {
                Some(delay) => scheduler.schedule_after(action, delay),
                None => scheduler.schedule(action),
            };
            tracked.register(token);
        });
        pending.add(source.subscribe(u));
        Subscription::new(UnsubscribeLogic::Group(pending))
    })
}

/// Running accumulator of one `scan` subscription.
struct ScanState<A> {
    accumulator: Option<A>,
}

/// Key memory of one `distinct_until_changed` subscription.
struct DistinctState<K> {
    previous_key: Option<K>,
    failed: bool,
}

/// The `ObservableExt` trait provides a set of extension methods that can be applied
/// to observables to transform and manipulate their behavior.
///
/// This trait enhances the capabilities of the `Observable` struct by allowing users
/// to chain operators together, creating reactive pipelines.
pub trait ObservableExt<T: 'static>: Subscribeable<ObsType = T> {
    /// Transforms the items emitted by the observable using a transformation
    /// function.
    ///
    /// Emits exactly one `f(x)` per upstream `x`, in order. A panic in `f` is not
    /// caught and unwinds out of the upstream `next` call.
    fn map<U, F>(self, f: F) -> Observable<U>
    where
        Self: Sized + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        let f = Arc::new(f);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_next = Arc::clone(&o_shared);
            let f = Arc::clone(&f);

            let u = relay(&o_shared, move |v| {
                let t = f(v);
                o_next.lock().next(t);
            });
            self.subscribe(u)
        })
    }

    /// Filters the items emitted by the observable based on a predicate function.
    ///
    /// Only items for which the predicate function returns `true` will be emitted
    /// by the resulting observable. A panic in the predicate is not caught.
    fn filter<P>(self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_next = Arc::clone(&o_shared);
            let predicate = Arc::clone(&predicate);

            let u = relay(&o_shared, move |v| {
                if predicate(&v) {
                    o_next.lock().next(v);
                }
            });
            self.subscribe(u)
        })
    }

    /// Skips the first `n` items emitted by the observable and then emits the rest.
    fn skip(self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_next = Arc::clone(&o_shared);

            let mut n = n;
            let u = relay(&o_shared, move |v| {
                if n > 0 {
                    n -= 1;
                    return;
                }
                o_next.lock().next(v);
            });
            self.subscribe(u)
        })
    }

    /// Emits at most the first `n` items emitted by the observable, then completes
    /// and unsubscribes from the source.
    ///
    /// `take(0)` completes on subscription without subscribing to the source.
    fn take(self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            if n == 0 {
                o_shared.lock().complete();
                return Subscription::empty();
            }
            let o_next = Arc::clone(&o_shared);

            // The source may emit before `subscribe` returns its subscription, so the
            // subscription is parked in a group that can be released first.
            let upstream = SubscriptionGroup::new();
            let upstream_c = upstream.clone();

            let mut taken = 0;
            let u = relay(&o_shared, move |v| {
                if taken == n {
                    return;
                }
                taken += 1;
                let mut o = o_next.lock();
                o.next(v);
                if taken == n {
                    o.complete();
                    drop(o);
                    upstream_c.unsubscribe();
                }
            });
            upstream.add(self.subscribe(u));
            Subscription::new(UnsubscribeLogic::Group(upstream))
        })
    }

    /// Emits a running accumulation of the source values.
    ///
    /// The first value is emitted as it is and becomes the accumulator; every
    /// following value `x` emits and stores `accumulator(previous, x)`. Each
    /// subscription keeps its own accumulator. A panic in `accumulator` is not
    /// caught.
    fn scan<F>(self, accumulator: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send,
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        let accumulator = Arc::new(accumulator);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_next = Arc::clone(&o_shared);
            let accumulator = Arc::clone(&accumulator);

            let mut state = ScanState { accumulator: None };
            let u = relay(&o_shared, move |v: T| {
                let next = match state.accumulator.take() {
                    Some(previous) => accumulator(previous, v),
                    None => v,
                };
                state.accumulator = Some(next.clone());
                o_next.lock().next(next);
            });
            self.subscribe(u)
        })
    }

    /// Emits `seed` as soon as it is subscribed, then folds every source value into
    /// the running accumulator and emits each result.
    fn scan_with_seed<A, F>(self, seed: A, accumulator: F) -> Observable<A>
    where
        Self: Sized + Send + Sync + 'static,
        A: Clone + Send + Sync + 'static,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        let accumulator = Arc::new(accumulator);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_next = Arc::clone(&o_shared);
            let accumulator = Arc::clone(&accumulator);

            o_shared.lock().next(seed.clone());

            let mut state = ScanState {
                accumulator: Some(seed.clone()),
            };
            let u = relay(&o_shared, move |v: T| {
                let Some(previous) = state.accumulator.take() else {
                    return;
                };
                let next = accumulator(previous, v);
                state.accumulator = Some(next.clone());
                o_next.lock().next(next);
            });
            self.subscribe(u)
        })
    }

    /// Drops values equal to the value emitted just before them.
    fn distinct_until_changed(self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: PartialEq + Clone + Send,
    {
        self.distinct_until_changed_by(T::clone, |a: &T, b: &T| a == b)
    }

    /// Drops values whose key equals the key of the value emitted just before them.
    fn distinct_until_changed_by_key<K, S>(self, key_selector: S) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        K: PartialEq + Send + 'static,
        S: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.distinct_until_changed_by(key_selector, |a: &K, b: &K| a == b)
    }

    /// Drops values whose key `comparer` considers equal to the key of the value
    /// emitted just before them. The first value is always emitted.
    ///
    /// A panic in `key_selector` or `comparer` is caught and delivered as
    /// [`RxError::SelectorFailure`]; the subscription to the source is then released.
    fn distinct_until_changed_by<K, S, C>(self, key_selector: S, comparer: C) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        K: Send + 'static,
        S: Fn(&T) -> K + Send + Sync + 'static,
        C: Fn(&K, &K) -> bool + Send + Sync + 'static,
    {
        let key_selector = Arc::new(key_selector);
        let comparer = Arc::new(comparer);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_next = Arc::clone(&o_shared);
            let key_selector = Arc::clone(&key_selector);
            let comparer = Arc::clone(&comparer);

            let upstream = SubscriptionGroup::new();
            let upstream_c = upstream.clone();

            let mut state = DistinctState {
                previous_key: None,
                failed: false,
            };
            let u = relay(&o_shared, move |v: T| {
                if state.failed {
                    return;
                }
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let key = key_selector(&v);
                    let changed = match &state.previous_key {
                        Some(previous) => !comparer(previous, &key),
                        None => true,
                    };
                    (key, changed)
                }));
                match outcome {
                    Ok((key, true)) => {
                        state.previous_key = Some(key);
                        o_next.lock().next(v);
                    }
                    Ok((_, false)) => {}
                    Err(payload) => {
                        state.failed = true;
                        let err = RxError::from_panic(payload);
                        debug!(error = %err, "distinct_until_changed key comparison failed");
                        o_next.lock().error(err.shared());
                        upstream_c.unsubscribe();
                    }
                }
            });
            upstream.add(self.subscribe(u));
            Subscription::new(UnsubscribeLogic::Group(upstream))
        })
    }

    /// Collects every value and emits them as one `Vec` when the source completes.
    ///
    /// An empty source emits an empty `Vec`. If delivering the collected values
    /// panics, the panic is caught and delivered as an error instead.
    fn to_vec(self) -> Observable<Vec<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let items = Arc::new(Mutex::new(Vec::new()));
            let items_c = Arc::clone(&items);

            let u = Subscriber::new(
                move |v| {
                    items.lock().push(v);
                },
                move |observable_error| {
                    o_cloned_e.lock().error(observable_error);
                },
                move || {
                    let collected = std::mem::take(&mut *items_c.lock());
                    let delivered = catch_unwind(AssertUnwindSafe(|| {
                        let mut o = o_cloned_c.lock();
                        o.next(collected);
                        o.complete();
                    }));
                    if let Err(payload) = delivered {
                        let err = RxError::from_panic(payload);
                        debug!(error = %err, "to_vec failed to deliver collected values");
                        o_cloned_c.lock().error(err.shared());
                    }
                },
            );
            self.subscribe(u)
        })
    }

    /// Delays every value by `duration` on the process-wide default scheduler.
    ///
    /// See [`delay_on`](ObservableExt::delay_on).
    fn delay(self, duration: Duration) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        self.delay_on(duration, default_scheduler())
    }

    /// Delays every value by `duration` on `scheduler`.
    ///
    /// Only values are delayed: `error` and `complete` are forwarded as soon as the
    /// source delivers them, so completion can overtake values still in flight.
    /// Unsubscribing releases the source and cancels every pending delivery.
    fn delay_on(self, duration: Duration, scheduler: Arc<dyn Scheduler>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        reschedule_values(self, scheduler, Some(duration))
    }

    /// Delivers every value on `scheduler` instead of the thread the source emits
    /// on. Terminal notifications are forwarded right away, like in `delay_on`.
    ///
    /// Use a scheduler that runs one action at a time, such as
    /// [`EventLoopScheduler`](crate::scheduler::EventLoopScheduler), to get values
    /// serialized and in order.
    fn observe_on(self, scheduler: Arc<dyn Scheduler>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        reschedule_values(self, scheduler, None)
    }

    /// Merges the current observable with a vector of observables, emitting items
    /// from all of them concurrently.
    ///
    /// Completion follows [`Observable::merge_all`]: the result completes once every
    /// source has been subscribed.
    fn merge(self, sources: Vec<Observable<T>>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        let mut all = Vec::with_capacity(sources.len() + 1);
        all.push(self.into_observable());
        all.extend(sources);
        Observable::of(all).merge_all()
    }

    /// Maps every value to an observable and merges their emissions into one
    /// observable stream. A panic in `project` is not caught.
    ///
    /// Same as `map(project)` followed by [`Observable::merge_all`].
    fn merge_map<R, F>(self, project: F) -> Observable<R>
    where
        Self: Sized + Send + Sync + 'static,
        R: Send + 'static,
        F: Fn(T) -> Observable<R> + Send + Sync + 'static,
    {
        self.map(project).merge_all()
    }

    /// Maps every value `x` to the observable `collection_selector(x)`, maps each of
    /// its values `y` to `result_selector(x, y)`, and merges the results.
    fn merge_map_with<C, R, F, G>(self, collection_selector: F, result_selector: G) -> Observable<R>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync,
        C: 'static,
        R: Send + 'static,
        F: Fn(T) -> Observable<C> + Send + Sync + 'static,
        G: Fn(T, C) -> R + Send + Sync + 'static,
    {
        let result_selector = Arc::new(result_selector);
        self.merge_map(move |x: T| {
            let result_selector = Arc::clone(&result_selector);
            let source_value = x.clone();
            collection_selector(x).map(move |y| result_selector(source_value.clone(), y))
        })
    }

    /// Wraps any subscribeable source in an `Observable`.
    fn into_observable(self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| self.subscribe(o))
    }

    /// Blocks the calling thread until the observable terminates and returns the
    /// last value it emitted.
    ///
    /// # Errors
    ///
    /// - [`RxError::Timeout`] when `timeout` elapses before a terminal notification.
    /// - [`RxError::Upstream`] when the observable emits an error.
    /// - [`RxError::EmptySequence`] when it completes without emitting.
    ///
    /// The subscription is released before returning in every case.
    fn wait(&self, timeout: Option<Duration>) -> Result<T, RxError>
    where
        Self: Sized,
        T: Send,
    {
        blocking::wait_last(self, timeout)?.ok_or(RxError::EmptySequence)
    }

    /// Like [`wait`](ObservableExt::wait), but an empty sequence yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`RxError::Timeout`] or [`RxError::Upstream`], as for `wait`.
    fn wait_optional(&self, timeout: Option<Duration>) -> Result<Option<T>, RxError>
    where
        Self: Sized,
        T: Send,
    {
        blocking::wait_last(self, timeout)
    }
}

impl<O, T: 'static> ObservableExt<T> for O where O: Subscribeable<ObsType = T> {}
