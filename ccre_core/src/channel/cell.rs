//! Cells - the only channels with externally settable state.

use super::listeners::Emitter;
use super::{
    event_output, ChannelValue, Input, Listener, Output, SharedEventOutput, Subscription, Updating,
    ValueListener,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub type BooleanCell = Cell<bool>;
pub type FloatCell = Cell<f32>;
pub type DiscreteCell<E> = Cell<E>;

struct CellInner<T> {
    value: Mutex<T>,
    emitter: Arc<Emitter<T>>,
}

/// A settable value that notifies listeners only on actual change.
///
/// Cloning yields another handle to the same cell. Any thread may `set`;
/// listeners run on that thread before `set` returns.
pub struct Cell<T: ChannelValue> {
    inner: Arc<CellInner<T>>,
}

impl<T: ChannelValue> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChannelValue> Cell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: Mutex::new(initial),
                emitter: Emitter::new("cell"),
            }),
        }
    }

    /// Read-side view as a shared trait object.
    pub fn as_input(&self) -> Arc<dyn Input<T>> {
        Arc::new(self.clone())
    }

    /// Write-side view as a shared trait object.
    pub fn as_output(&self) -> Arc<dyn Output<T>> {
        Arc::new(self.clone())
    }

    /// An event output that sets this cell to `value` when fired.
    pub fn set_event(&self, value: T) -> SharedEventOutput {
        let cell = self.clone();
        event_output(move || cell.set(value.clone()))
    }

    pub fn listener_count(&self) -> usize {
        self.inner.emitter.len()
    }

    /// Replaces the value with `f(current)` atomically, then notifies.
    fn update(&self, f: impl FnOnce(&T) -> T) {
        let changed = {
            let mut current = self.inner.value.lock();
            let next = f(&current);
            if current.same_as(&next) {
                None
            } else {
                *current = next.clone();
                Some(next)
            }
        };
        if let Some(value) = changed {
            self.inner.emitter.fire(&value);
        }
    }
}

impl Cell<bool> {
    /// Flips the stored boolean.
    pub fn toggle(&self) {
        self.update(|current| !current);
    }

    /// An event output that flips this cell when fired.
    pub fn toggle_event(&self) -> SharedEventOutput {
        let cell = self.clone();
        event_output(move || cell.toggle())
    }
}

impl<T: ChannelValue + Default> Default for Cell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ChannelValue> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("value", &*self.inner.value.lock())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T: ChannelValue> Output<T> for Cell<T> {
    fn set(&self, value: T) {
        self.update(move |_| value);
    }
}

impl<T: ChannelValue> Updating for Cell<T> {
    fn on_update(&self, listener: Listener) -> Subscription {
        self.inner.emitter.subscribe(Arc::new(move |_| listener()))
    }
}

impl<T: ChannelValue> Input<T> for Cell<T> {
    fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    fn on_change(&self, listener: ValueListener<T>) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Discrete, EventOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Gear {
        Low,
        High,
    }

    impl Discrete for Gear {
        fn variants() -> &'static [Self] {
            &[Gear::Low, Gear::High]
        }
    }

    fn counter(input: &impl Updating) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        input.on_update(Arc::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[test]
    fn test_set_notifies_only_on_change() {
        let cell = BooleanCell::new(false);
        let count = counter(&cell);

        cell.set(false);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        cell.set(true);
        cell.set(true);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(cell.get());
    }

    #[test]
    fn test_float_cell_distinguishes_signed_zero() {
        let cell = FloatCell::new(0.0);
        let count = counter(&cell);

        cell.set(-0.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cell.set(f32::NAN);
        cell.set(f32::NAN);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_send_delivers_current_then_changes() {
        let source = FloatCell::new(1.0);
        let sink = FloatCell::new(0.0);

        let sub = source.send(sink.as_output());
        assert_eq!(sink.get(), 1.0);

        source.set(2.5);
        assert_eq!(sink.get(), 2.5);

        sub.cancel();
        source.set(9.0);
        assert_eq!(sink.get(), 2.5);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn test_toggle_and_event_outputs() {
        let cell = BooleanCell::new(false);
        cell.toggle();
        assert!(cell.get());

        cell.toggle_event().event();
        assert!(!cell.get());

        cell.set_event(true).event();
        assert!(cell.get());
    }

    #[test]
    fn test_discrete_cell() {
        let gear = DiscreteCell::new(Gear::Low);
        let count = counter(&gear);

        gear.set(Gear::Low);
        gear.set(Gear::High);
        assert_eq!(gear.get(), Gear::High);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(Gear::variants().len(), 2);
    }

    #[test]
    fn test_safe_set_contains_listener_panic() {
        let cell = BooleanCell::new(false);
        cell.on_update(Arc::new(|| panic!("bad consumer")));
        let count = counter(&cell);

        cell.safe_set(true);
        cell.set(false);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_set_other_cells() {
        let a = BooleanCell::new(false);
        let b = BooleanCell::new(false);
        let b2 = b.clone();
        a.on_change(Arc::new(move |v: bool| b2.set(!v)));

        a.set(true);
        assert!(!b.get());
        a.set(false);
        assert!(b.get());
    }
}
