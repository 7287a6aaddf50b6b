//! Bridge from push-based observables to a blocking call site.

use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::scheduler::deadline_after;
use crate::subscription::subscribe::{Subscribeable, Subscriber, Unsubscribeable};
use crate::{RxError, SharedError};

struct WaitState<T> {
    last: Option<T>,
    error: Option<SharedError>,
    terminated: bool,
}

/// Single-shot signal raised by the first terminal notification.
struct Completion<T> {
    state: Mutex<WaitState<T>>,
    signal: Condvar,
}

impl<T> Completion<T> {
    fn new() -> Self {
        Completion {
            state: Mutex::new(WaitState {
                last: None,
                error: None,
                terminated: false,
            }),
            signal: Condvar::new(),
        }
    }

    fn record(&self, v: T) {
        let mut state = self.state.lock();
        if !state.terminated {
            state.last = Some(v);
        }
    }

    fn terminate(&self, error: Option<SharedError>) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        state.error = error;
        state.terminated = true;
        self.signal.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<Option<T>, RxError> {
        let mut state = self.state.lock();
        // A timeout too large for `Instant` is as good as none.
        match timeout.and_then(|t| deadline_after(t).map(|deadline| (t, deadline))) {
            None => {
                while !state.terminated {
                    self.signal.wait(&mut state);
                }
            }
            Some((timeout, deadline)) => {
                while !state.terminated {
                    if self.signal.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                if !state.terminated {
                    debug!(?timeout, "gave up waiting for observable to terminate");
                    return Err(RxError::Timeout(timeout));
                }
            }
        }
        if let Some(err) = state.error.take() {
            return Err(RxError::Upstream(err));
        }
        Ok(state.last.take())
    }
}

/// Subscribes to `source` and blocks until it terminates or `timeout` elapses.
///
/// Returns the last value seen, `None` if the source completed without values.
pub(super) fn wait_last<T, O>(source: &O, timeout: Option<Duration>) -> Result<Option<T>, RxError>
where
    T: Send + 'static,
    O: Subscribeable<ObsType = T> + ?Sized,
{
    let completion = Arc::new(Completion::new());
    let c_next = Arc::clone(&completion);
    let c_error = Arc::clone(&completion);
    let c_complete = Arc::clone(&completion);

    let subscriber = Subscriber::new(
        move |v| c_next.record(v),
        move |observable_error| c_error.terminate(Some(observable_error)),
        move || c_complete.terminate(None),
    );

    let subscription = source.subscribe(subscriber);
    let outcome = completion.wait(timeout);
    subscription.unsubscribe();
    outcome
}
