#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use rxpush::subscribe::Subscriber;

/// One notification as seen by a recording subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission<T> {
    Next(T),
    Error(String),
    Complete,
}

pub type Emissions<T> = Arc<Mutex<Vec<Emission<T>>>>;

/// Subscriber that records every notification it receives, in order.
pub fn register_emissions_subscriber<T: Send + 'static>() -> (Subscriber<T>, Emissions<T>) {
    let emissions: Emissions<T> = Arc::new(Mutex::new(Vec::with_capacity(8)));
    let nexts_c = Arc::clone(&emissions);
    let errors_c = Arc::clone(&emissions);
    let completes_c = Arc::clone(&emissions);

    let subscriber = Subscriber::new(
        move |n| {
            // Track next() calls.
            nexts_c.lock().unwrap().push(Emission::Next(n));
        },
        move |e| {
            // Track error() calls.
            errors_c.lock().unwrap().push(Emission::Error(e.to_string()));
        },
        move || {
            // Track complete() calls.
            completes_c.lock().unwrap().push(Emission::Complete);
        },
    );
    (subscriber, emissions)
}

pub fn nexts<T: Clone>(emissions: &Emissions<T>) -> Vec<T> {
    emissions
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Emission::Next(v) => Some(v.clone()),
            _ => None,
        })
        .collect()
}

/// Checks that at most one terminal notification was recorded and that it came last.
pub fn assert_grammar<T: std::fmt::Debug>(emissions: &Emissions<T>) {
    let emissions = emissions.lock().unwrap();
    let terminal_positions: Vec<usize> = emissions
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Emission::Next(_)))
        .map(|(i, _)| i)
        .collect();
    assert!(
        terminal_positions.len() <= 1,
        "more than one terminal notification: {:?}",
        emissions
    );
    if let Some(&pos) = terminal_positions.first() {
        assert_eq!(
            pos,
            emissions.len() - 1,
            "notification delivered after a terminal one: {:?}",
            emissions
        );
    }
}
