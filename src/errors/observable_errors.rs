use std::{any::Any, error::Error, sync::Arc, time::Duration};

/// Payload of every `error` notification.
///
/// Operators forward the same `Arc` they received from upstream, so a consumer can
/// downcast it back to the concrete error type the source emitted.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Errors raised by the operators themselves rather than by user sources.
#[derive(Debug, thiserror::Error)]
pub enum RxError {
    /// A user function panicked inside an operator that shields user code.
    #[error("selector failed: {0}")]
    SelectorFailure(String),

    /// A terminal error observed by the blocking adapter.
    #[error("observable emitted an error: {0}")]
    Upstream(#[source] SharedError),

    /// The blocking adapter gave up waiting for a terminal notification.
    #[error("timed out after {0:?} waiting for the observable to terminate")]
    Timeout(Duration),

    /// The blocking adapter required a value but the sequence completed empty.
    #[error("sequence completed without emitting a value")]
    EmptySequence,
}

impl RxError {
    pub(crate) fn shared(self) -> SharedError {
        Arc::new(self)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::SelectorFailure(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "user function panicked".to_string()
    }
}
