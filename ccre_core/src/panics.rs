//! Containment for panics raised by user callbacks.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Runs `f`, logging and swallowing any panic. Returns false if it panicked.
///
/// `kind` and `name` only label the log line, e.g. ("Scheduled job", tag).
pub(crate) fn run_guarded(kind: &str, name: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!("{} '{}' panicked: {}", kind, name, panic_message(payload.as_ref()));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
