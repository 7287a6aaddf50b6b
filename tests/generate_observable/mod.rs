#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rxpush::{
    subscribe::{Subscriber, Subscription},
    Observable, Observer,
};

/// Emits `0..=end` from its own OS thread, one value per millisecond, and stops
/// early once unsubscribed. `last_emit_assert` receives the last value emitted.
pub fn generate_u32_observable(
    end: u32,
    last_emit_assert: impl Fn(u32) + Send + Sync + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(last_emit_assert);

    Observable::new(move |mut o: Subscriber<_>| {
        let done = Arc::new(AtomicBool::new(false));
        let done_c = Arc::clone(&done);

        let last_emit_assert = Arc::clone(&last_emit_assert);
        std::thread::spawn(move || {
            let mut last_emit = 0;

            for i in 0..=end {
                if done.load(Ordering::SeqCst) {
                    break;
                }
                last_emit = i;
                o.next(i);
                std::thread::sleep(Duration::from_millis(1));
            }
            o.complete();
            last_emit_assert(last_emit);
        });

        Subscription::from_fn(move || done_c.store(true, Ordering::SeqCst))
    })
}

/// Observable that never emits on its own; it records whether it was unsubscribed.
pub fn live_observable<T: 'static>() -> (Observable<T>, Arc<AtomicBool>) {
    let unsubscribed = Arc::new(AtomicBool::new(false));
    let unsubscribed_c = Arc::clone(&unsubscribed);
    let observable = Observable::new(move |_o: Subscriber<T>| {
        let unsubscribed = Arc::clone(&unsubscribed_c);
        Subscription::from_fn(move || unsubscribed.store(true, Ordering::SeqCst))
    });
    (observable, unsubscribed)
}

pub type Subscribers<T> = Arc<Mutex<Vec<Subscriber<T>>>>;

/// Observable that parks each subscriber so the test can push into every
/// subscription by hand.
pub fn manual_observable<T: 'static>() -> (Observable<T>, Subscribers<T>) {
    let subscribers: Subscribers<T> = Arc::new(Mutex::new(Vec::new()));
    let subscribers_c = Arc::clone(&subscribers);
    let observable = Observable::new(move |o| {
        subscribers_c.lock().unwrap().push(o);
        Subscription::empty()
    });
    (observable, subscribers)
}
