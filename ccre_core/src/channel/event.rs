//! Event channels - payload-less occurrences.

use super::listeners::Emitter;
use super::{EventInput, EventOutput, Listener, SharedEventInput, SharedEventOutput, Subscription, Updating};
use std::fmt;
use std::sync::Arc;

/// An event that is both fireable and subscribable.
///
/// Every `event()` reaches every listener; there is no de-duplication.
#[derive(Clone)]
pub struct EventCell {
    emitter: Arc<Emitter<()>>,
}

impl EventCell {
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new("event"),
        }
    }

    pub fn as_input(&self) -> SharedEventInput {
        Arc::new(self.clone())
    }

    pub fn as_output(&self) -> SharedEventOutput {
        Arc::new(self.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.len()
    }
}

impl Default for EventCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCell")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventOutput for EventCell {
    fn event(&self) {
        self.emitter.fire(&());
    }
}

impl Updating for EventCell {
    fn on_update(&self, listener: Listener) -> Subscription {
        self.emitter.subscribe(Arc::new(move |()| listener()))
    }
}

impl EventInput for EventCell {}

/// Event output backed by a closure.
pub struct FnEventOutput<F>(F);

impl<F: Fn() + Send + Sync> EventOutput for FnEventOutput<F> {
    fn event(&self) {
        (self.0)()
    }
}

/// Wraps a closure as a shared event output.
pub fn event_output<F>(f: F) -> SharedEventOutput
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(FnEventOutput(f))
}
