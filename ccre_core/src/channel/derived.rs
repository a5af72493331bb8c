//! Derived values - cached, change-suppressing computed channels.

use super::listeners::Emitter;
use super::{ChannelValue, Input, Listener, Subscription, Updating, ValueListener};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct DerivedInner<T> {
    value: Mutex<T>,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    emitter: Arc<Emitter<T>>,
    upstream: Mutex<Vec<Subscription>>,
}

impl<T: ChannelValue> DerivedInner<T> {
    /// Recomputes and notifies downstream only if the result changed.
    fn recompute(&self) {
        // Computed outside the lock; `compute` reads other channels.
        let fresh = (self.compute)();
        let changed = {
            let mut cached = self.value.lock();
            if cached.same_as(&fresh) {
                false
            } else {
                *cached = fresh.clone();
                true
            }
        };
        if changed {
            self.emitter.fire(&fresh);
        }
    }
}

/// A read-only value computed from upstream channels.
///
/// The closure runs once at construction and again whenever any dependency
/// announces an update. Downstream listeners only hear about results that
/// differ from the cached value.
pub struct Derived<T: ChannelValue> {
    inner: Arc<DerivedInner<T>>,
}

impl<T: ChannelValue> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChannelValue> Derived<T> {
    /// Creates a derived value over `dependencies`.
    ///
    /// The upstream listeners hold the derived value strongly, so it lives
    /// as long as its dependencies unless `detach` is called.
    pub fn new<F>(dependencies: &[&dyn Updating], compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(DerivedInner {
            value: Mutex::new(compute()),
            compute: Box::new(compute),
            emitter: Emitter::new("derived"),
            upstream: Mutex::new(Vec::new()),
        });
        let upstream: Vec<Subscription> = dependencies
            .iter()
            .map(|dependency| {
                let inner = Arc::clone(&inner);
                dependency.on_update(Arc::new(move || inner.recompute()))
            })
            .collect();
        *inner.upstream.lock() = upstream;
        Self { inner }
    }

    /// Stops tracking upstream; the value freezes at its last result.
    pub fn detach(&self) {
        let upstream = std::mem::take(&mut *self.inner.upstream.lock());
        for subscription in upstream {
            subscription.cancel();
        }
    }

    pub fn as_input(&self) -> Arc<dyn Input<T>> {
        Arc::new(self.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.emitter.len()
    }
}

impl<T: ChannelValue> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("value", &*self.inner.value.lock())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T: ChannelValue> Updating for Derived<T> {
    fn on_update(&self, listener: Listener) -> Subscription {
        self.inner.emitter.subscribe(Arc::new(move |_| listener()))
    }
}

impl<T: ChannelValue> Input<T> for Derived<T> {
    fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    fn on_change(&self, listener: ValueListener<T>) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }
}
