//! Panic containment for attempt futures.
//!
//! A panic while proxying must not take down the connection task with it;
//! it is converted into an error so the resumption controller can treat
//! it like any other aborted attempt. Nothing beyond already-flushed
//! bytes reaches the client either way.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

/// A panic captured from an attempt future.
#[derive(Debug)]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

impl std::fmt::Display for HandlerPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler panicked: {}", self.message)
    }
}

impl std::error::Error for HandlerPanic {}

/// Run a future and convert an unwind into an error outcome.
pub async fn catch_panic<F>(fut: F) -> Result<F::Output, HandlerPanic>
where
    F: Future,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(HandlerPanic::from_payload)
}
