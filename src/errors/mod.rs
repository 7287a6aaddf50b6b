//! Error types delivered through the `error` channel and returned by the blocking
//! adapter.
mod observable_errors;

pub(crate) use observable_errors::panic_message;
pub use observable_errors::{RxError, SharedError};
