//! The CHANNEL layer - push-based reactive links between producers and consumers.
//!
//! Channels are described by capability traits rather than a type tree:
//!
//! | Trait            | Capability                                      |
//! |------------------|-------------------------------------------------|
//! | `Updating`       | payload-less change notification                |
//! | `Input<T>`       | readable value + change subscription + `send`   |
//! | `Output<T>`      | writable value                                  |
//! | `EventInput`     | subscribable occurrence                         |
//! | `EventOutput`    | fireable occurrence                             |
//!
//! A small closed set of concrete variants implements them: `Cell`,
//! `EventCell`, `Derived`, `Constant`, and the arbitrated channels in
//! `behaviors`. Consumers cannot tell which variant they are attached to.
//!
//! # Propagation
//!
//! Changing a value or firing an event walks every registered listener, in
//! registration order, synchronously on the calling thread. Nothing is
//! queued. A panicking listener is logged and skipped; the rest still run.
//!
//! Dataflow cycles are not detected: a listener that transitively re-sets
//! its own upstream recurses until the values settle or the stack runs out.

mod cell;
mod constant;
mod derived;
mod event;
pub(crate) mod listeners;
pub mod ops;

pub use cell::{BooleanCell, Cell, DiscreteCell, FloatCell};
pub use constant::{constant, Constant};
pub use derived::Derived;
pub use event::{event_output, EventCell, FnEventOutput};

use crate::panics::run_guarded;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Payload-less change listener.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Listener receiving the new value.
pub type ValueListener<T> = Arc<dyn Fn(T) + Send + Sync>;

pub type BooleanInput = Arc<dyn Input<bool>>;
pub type FloatInput = Arc<dyn Input<f32>>;
pub type DiscreteInput<E> = Arc<dyn Input<E>>;
pub type BooleanOutput = Arc<dyn Output<bool>>;
pub type FloatOutput = Arc<dyn Output<f32>>;
pub type DiscreteOutput<E> = Arc<dyn Output<E>>;
pub type SharedEventInput = Arc<dyn EventInput>;
pub type SharedEventOutput = Arc<dyn EventOutput>;

/// A value a channel can carry.
///
/// `same_as` decides whether a `set` is a change worth propagating.
pub trait ChannelValue: Clone + fmt::Debug + Send + Sync + 'static {
    fn same_as(&self, other: &Self) -> bool;
}

impl ChannelValue for bool {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

/// Floats compare bit-for-bit: `+0.0` differs from `-0.0`, and two NaNs
/// with the same bit pattern are equal.
impl ChannelValue for f32 {
    fn same_as(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

/// A closed enumeration carried by discrete channels.
pub trait Discrete: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Every value of the enumeration, in declaration order.
    fn variants() -> &'static [Self];
}

impl<E: Discrete> ChannelValue for E {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

/// Handle that detaches a listener.
///
/// Cancelling is idempotent. Dropping a subscription does NOT cancel it:
/// wiring made at setup time normally lives for the whole process.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn cancel(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_none()
    }

    /// One subscription that cancels both.
    pub fn combine(self, other: Subscription) -> Subscription {
        Subscription::new(move || {
            self.cancel();
            other.cancel();
        })
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Anything that announces changes.
pub trait Updating: Send + Sync {
    fn on_update(&self, listener: Listener) -> Subscription;
}

/// A fireable occurrence.
pub trait EventOutput: Send + Sync {
    fn event(&self);

    /// Fires, logging instead of propagating any listener panic.
    fn safe_event(&self) {
        run_guarded("Event output", "safe_event", || self.event());
    }
}

/// A subscribable occurrence.
pub trait EventInput: Updating {
    /// Forwards every occurrence to `target`.
    fn send(&self, target: SharedEventOutput) -> Subscription {
        self.on_update(Arc::new(move || target.event()))
    }
}

/// A writable value.
pub trait Output<T: ChannelValue>: Send + Sync {
    fn set(&self, value: T);

    /// Sets, logging instead of propagating any listener panic.
    fn safe_set(&self, value: T) {
        run_guarded("Output", "safe_set", || self.set(value));
    }
}

/// A readable, subscribable value.
pub trait Input<T: ChannelValue>: Updating {
    fn get(&self) -> T;

    /// Registers a listener called with each new value.
    fn on_change(&self, listener: ValueListener<T>) -> Subscription;

    /// Delivers the current value to `target` now, then on every change.
    fn send(&self, target: Arc<dyn Output<T>>) -> Subscription {
        target.set(self.get());
        self.on_change(Arc::new(move |value| target.set(value)))
    }
}

impl<U: Updating + ?Sized> Updating for Arc<U> {
    fn on_update(&self, listener: Listener) -> Subscription {
        (**self).on_update(listener)
    }
}

impl<U: EventOutput + ?Sized> EventOutput for Arc<U> {
    fn event(&self) {
        (**self).event()
    }
}

impl<U: EventInput + ?Sized> EventInput for Arc<U> {
    fn send(&self, target: SharedEventOutput) -> Subscription {
        (**self).send(target)
    }
}

impl<T: ChannelValue, U: Output<T> + ?Sized> Output<T> for Arc<U> {
    fn set(&self, value: T) {
        (**self).set(value)
    }
}

impl<T: ChannelValue, U: Input<T> + ?Sized> Input<T> for Arc<U> {
    fn get(&self) -> T {
        (**self).get()
    }

    fn on_change(&self, listener: ValueListener<T>) -> Subscription {
        (**self).on_change(listener)
    }

    fn send(&self, target: Arc<dyn Output<T>>) -> Subscription {
        (**self).send(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_float_identity_is_bitwise() {
        assert!(1.5f32.same_as(&1.5));
        assert!(!0.0f32.same_as(&-0.0));
        assert!(f32::NAN.same_as(&f32::NAN));
        assert!(!f32::NAN.same_as(&f32::from_bits(f32::NAN.to_bits() + 1)));
    }

    #[test]
    fn test_subscription_cancels_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let sub = Subscription::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!sub.is_cancelled());
        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_combined_subscription_cancels_both() {
        let count = Arc::new(AtomicUsize::new(0));
        let (a, b) = (count.clone(), count.clone());
        let combined = Subscription::new(move || {
            a.fetch_add(1, Ordering::SeqCst);
        })
        .combine(Subscription::new(move || {
            b.fetch_add(1, Ordering::SeqCst);
        }));

        combined.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
