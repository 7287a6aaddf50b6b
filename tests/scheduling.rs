mod custom_error;
mod generate_observable;
mod register_emissions;

use std::{
    sync::{mpsc, Arc},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use custom_error::CustomError;
use generate_observable::manual_observable;
use register_emissions::{register_emissions_subscriber, Emission};
use rxpush::{
    scheduler::{
        reset_default_scheduler, set_default_scheduler, EventLoopScheduler, ImmediateScheduler,
        NewThreadScheduler, Scheduler, TokioScheduler,
    },
    subscribe::Subscriber,
    Observable, ObservableExt, Observer, Subscribeable, Unsubscribeable,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn event_loop() -> Arc<dyn Scheduler> {
    Arc::new(EventLoopScheduler::new())
}

/// Subscriber that forwards every value, with its arrival time and thread, to a channel.
fn channel_subscriber<T: Send + 'static>() -> (Subscriber<T>, mpsc::Receiver<(T, Instant, ThreadId)>) {
    let (tx, rx) = mpsc::channel();
    let subscriber = Subscriber::on_next(move |v| {
        let _ = tx.send((v, Instant::now(), thread::current().id()));
    });
    (subscriber, rx)
}

#[test]
fn delay_on_event_loop_delays_each_value() {
    init_tracing();
    let (source, subscribers) = manual_observable::<i32>();
    let (o, rx) = channel_subscriber();
    let _subscription = source
        .delay_on(Duration::from_millis(40), event_loop())
        .subscribe(o);

    let pushed_at = Instant::now();
    subscribers.lock().unwrap()[0].next(1);
    assert!(rx.try_recv().is_err());

    let (v, arrived_at, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(v, 1);
    assert!(arrived_at.duration_since(pushed_at) >= Duration::from_millis(40));
}

#[test]
fn delay_on_event_loop_keeps_order() {
    let (source, subscribers) = manual_observable::<i32>();
    let (o, rx) = channel_subscriber();
    let _subscription = source
        .delay_on(Duration::from_millis(10), event_loop())
        .subscribe(o);

    {
        let mut subscribers = subscribers.lock().unwrap();
        (0..20).for_each(|v| subscribers[0].next(v));
    }

    let received: Vec<i32> = (0..20)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().0)
        .collect();
    assert_eq!(received, (0..20).collect::<Vec<_>>());
}

#[test]
fn delay_on_new_thread() {
    let (source, subscribers) = manual_observable::<&'static str>();
    let (o, rx) = channel_subscriber();
    let _subscription = source
        .delay_on(Duration::from_millis(20), Arc::new(NewThreadScheduler))
        .subscribe(o);

    let pushed_at = Instant::now();
    subscribers.lock().unwrap()[0].next("late");

    let (v, arrived_at, thread_id) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(v, "late");
    assert!(arrived_at.duration_since(pushed_at) >= Duration::from_millis(20));
    assert_ne!(thread_id, thread::current().id());
}

// Terminal notifications are not delayed, so a source that completes right away
// finishes before any of its values were delivered.
#[test]
fn delay_completion_overtakes_pending_values() {
    let (o, emissions) = register_emissions_subscriber();
    Observable::of(vec![1, 2, 3])
        .delay_on(Duration::from_millis(20), event_loop())
        .subscribe(o);

    assert_eq!(*emissions.lock().unwrap(), vec![Emission::Complete]);
    thread::sleep(Duration::from_millis(80));
    assert_eq!(*emissions.lock().unwrap(), vec![Emission::Complete]);
}

#[test]
fn delay_forwards_error_immediately() {
    let (source, subscribers) = manual_observable::<i32>();
    let (o, emissions) = register_emissions_subscriber();
    let _subscription = source
        .delay_on(Duration::from_millis(20), event_loop())
        .subscribe(o);

    {
        let mut subscribers = subscribers.lock().unwrap();
        subscribers[0].next(1);
        subscribers[0].error(Arc::new(CustomError("boom")));
    }
    let expected = vec![Emission::Error("custom error: boom".to_string())];
    assert_eq!(*emissions.lock().unwrap(), expected);

    thread::sleep(Duration::from_millis(80));
    assert_eq!(*emissions.lock().unwrap(), expected);
}

#[test]
fn unsubscribe_cancels_pending_deliveries() {
    let scheduler = Arc::new(EventLoopScheduler::new());
    let (source, subscribers) = manual_observable::<i32>();
    let (o, rx) = channel_subscriber();
    let subscription = source
        .delay_on(Duration::from_millis(30), Arc::clone(&scheduler) as Arc<dyn Scheduler>)
        .subscribe(o);

    {
        let mut subscribers = subscribers.lock().unwrap();
        (0..5).for_each(|v| subscribers[0].next(v));
    }
    assert_eq!(scheduler.pending(), 5);
    subscription.unsubscribe();

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn observe_on_event_loop_switches_thread_and_keeps_order() {
    let (source, subscribers) = manual_observable::<u32>();
    let (o, rx) = channel_subscriber();
    let _subscription = source.observe_on(event_loop()).subscribe(o);

    let producer = thread::spawn(move || {
        let mut subscriber = subscribers.lock().unwrap().pop().unwrap();
        (0..100).for_each(|v| subscriber.next(v));
        thread::current().id()
    });
    let producer_id = producer.join().unwrap();

    let received: Vec<(u32, ThreadId)> = (0..100)
        .map(|_| {
            let (v, _, id) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            (v, id)
        })
        .collect();

    let values: Vec<u32> = received.iter().map(|(v, _)| *v).collect();
    assert_eq!(values, (0..100).collect::<Vec<_>>());

    let delivery_thread = received[0].1;
    assert!(received.iter().all(|(_, id)| *id == delivery_thread));
    assert_ne!(delivery_thread, producer_id);
    assert_ne!(delivery_thread, thread::current().id());
}

#[test]
fn observe_on_immediate_delivers_synchronously() {
    let (o, emissions) = register_emissions_subscriber();
    Observable::of(vec![1, 2])
        .observe_on(Arc::new(ImmediateScheduler))
        .subscribe(o);

    assert_eq!(
        *emissions.lock().unwrap(),
        vec![Emission::Next(1), Emission::Next(2), Emission::Complete]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observe_on_tokio_runtime() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let (source, subscribers) = manual_observable::<i32>();
    let _subscription = source
        .observe_on(Arc::new(TokioScheduler::current()))
        .subscribe(Subscriber::on_next(move |v| {
            let _ = tx.send(v);
        }));

    {
        let mut subscribers = subscribers.lock().unwrap();
        (1..=3).for_each(|v| subscribers[0].next(v));
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        let v = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(v);
    }
    received.sort_unstable();
    assert_eq!(received, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delay_on_tokio_unsubscribe_cancels() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let (source, subscribers) = manual_observable::<i32>();
    let subscription = source
        .delay_on(Duration::from_millis(30), Arc::new(TokioScheduler::current()))
        .subscribe(Subscriber::on_next(move |v| {
            let _ = tx.send(v);
        }));

    subscribers.lock().unwrap()[0].next(1);
    subscription.unsubscribe();

    let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(!matches!(outcome, Ok(Some(_))));
}

// The only test that touches the process-wide default, so parallel tests are not
// affected by it.
#[test]
fn delay_uses_default_scheduler_captured_at_build_time() {
    init_tracing();
    set_default_scheduler(Arc::new(ImmediateScheduler));
    let (source, subscribers) = manual_observable::<i32>();
    let immediate = source.clone().delay(Duration::from_millis(5));
    reset_default_scheduler();
    let on_event_loop = source.delay(Duration::from_millis(50));

    let (o, emissions) = register_emissions_subscriber();
    immediate.subscribe(o);
    subscribers.lock().unwrap()[0].next(1);
    assert_eq!(*emissions.lock().unwrap(), vec![Emission::Next(1)]);

    let (o, rx) = channel_subscriber();
    let _subscription = on_event_loop.subscribe(o);
    subscribers.lock().unwrap()[1].next(2);
    assert!(rx.try_recv().is_err());
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().0, 2);
}

#[test]
fn queued_values_survive_dropping_source_and_scheduler() {
    let (source, subscribers) = manual_observable::<i32>();
    let (o, rx) = channel_subscriber();
    // The built observable is a temporary, so the relay holds the only scheduler.
    let _subscription = source
        .delay_on(Duration::from_millis(30), Arc::new(EventLoopScheduler::new()))
        .subscribe(o);

    let relay = subscribers.lock().unwrap().pop();
    if let Some(mut relay) = relay {
        (1..=3).for_each(|v| relay.next(v));
    }

    let received: Vec<i32> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().0)
        .collect();
    assert_eq!(received, vec![1, 2, 3]);
}

#[test]
fn delay_beyond_representable_time_is_cancellable() {
    let scheduler = Arc::new(EventLoopScheduler::new());
    let (source, subscribers) = manual_observable::<i32>();
    let (o, rx) = channel_subscriber();
    let subscription = source
        .delay_on(Duration::MAX, Arc::clone(&scheduler) as Arc<dyn Scheduler>)
        .subscribe(o);

    subscribers.lock().unwrap()[0].next(1);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(scheduler.pending(), 1);

    subscription.unsubscribe();
    let start = Instant::now();
    while scheduler.pending() > 0 && start.elapsed() < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn observe_on_allows_feedback_into_the_source() {
    let (source, subscribers) = manual_observable::<u32>();
    let (tx, rx) = mpsc::channel();
    let feedback = Arc::clone(&subscribers);
    let _subscription = source
        .observe_on(event_loop())
        .subscribe(Subscriber::on_next(move |v: u32| {
            let _ = tx.send(v);
            if v < 5 {
                feedback.lock().unwrap()[0].next(v + 1);
            }
        }));

    subscribers.lock().unwrap()[0].next(0);

    let received: Vec<u32> = (0..6)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    assert_eq!(received, vec![0, 1, 2, 3, 4, 5]);
}
