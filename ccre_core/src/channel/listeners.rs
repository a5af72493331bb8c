//! Ordered listener registry shared by every channel variant.

use super::{Subscription, ValueListener};
use crate::panics::run_guarded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Entry<T> {
    id: u64,
    alive: Arc<AtomicBool>,
    listener: ValueListener<T>,
}

struct Table<T> {
    next_id: u64,
    listeners: Vec<Entry<T>>,
}

/// Fans a value out to listeners in registration order.
///
/// The table is snapshotted before each walk, so listeners may subscribe,
/// cancel, or fire re-entrantly. A listener cancelled mid-walk is skipped
/// even though the snapshot still holds it. Each call is guarded: a
/// panicking listener is logged and the walk continues.
pub(crate) struct Emitter<T> {
    kind: &'static str,
    table: Mutex<Table<T>>,
}

impl<T: Clone + Send + 'static> Emitter<T> {
    pub(crate) fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            table: Mutex::new(Table {
                next_id: 0,
                listeners: Vec::new(),
            }),
        })
    }

    /// Adds a listener; the subscription holds the emitter weakly.
    pub(crate) fn subscribe(self: &Arc<Self>, listener: ValueListener<T>) -> Subscription {
        let id = {
            let mut table = self.table.lock();
            table.next_id += 1;
            let id = table.next_id;
            table.listeners.push(Entry {
                id,
                alive: Arc::new(AtomicBool::new(true)),
                listener,
            });
            id
        };
        let emitter = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(emitter) = emitter.upgrade() {
                emitter.remove(id);
            }
        })
    }

    fn remove(&self, id: u64) {
        self.table.lock().listeners.retain(|entry| {
            if entry.id == id {
                entry.alive.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn fire(&self, value: &T) {
        self.fire_while(value, || true);
    }

    /// Like `fire`, but abandons the walk once `current` returns false.
    pub(crate) fn fire_while(&self, value: &T, current: impl Fn() -> bool) {
        let snapshot: Vec<(Arc<AtomicBool>, ValueListener<T>)> = self
            .table
            .lock()
            .listeners
            .iter()
            .map(|entry| (Arc::clone(&entry.alive), Arc::clone(&entry.listener)))
            .collect();
        for (alive, listener) in snapshot {
            if !current() {
                break;
            }
            if alive.load(Ordering::SeqCst) {
                run_guarded("Listener", self.kind, || listener(value.clone()));
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_registration_order() {
        let emitter = Emitter::<u32>::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = log.clone();
            emitter.subscribe(Arc::new(move |v| log.lock().push((tag, v))));
        }
        emitter.fire(&7);

        assert_eq!(*log.lock(), vec![("first", 7), ("second", 7), ("third", 7)]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let emitter = Emitter::<u32>::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        emitter.subscribe(Arc::new(|_| panic!("broken consumer")));
        let log2 = log.clone();
        emitter.subscribe(Arc::new(move |v| log2.lock().push(v)));

        emitter.fire(&1);
        emitter.fire(&2);
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn test_cancelled_listener_is_removed() {
        let emitter = Emitter::<()>::new("test");
        let sub = emitter.subscribe(Arc::new(|_| {}));
        assert_eq!(emitter.len(), 1);

        sub.cancel();
        assert_eq!(emitter.len(), 0);
    }

    #[test]
    fn test_listener_may_subscribe_reentrantly() {
        let emitter = Emitter::<()>::new("test");
        let inner = emitter.clone();
        emitter.subscribe(Arc::new(move |_| {
            inner.subscribe(Arc::new(|_| {}));
        }));

        emitter.fire(&());
        assert_eq!(emitter.len(), 2);
    }

    #[test]
    fn test_listener_cancelled_mid_walk_is_skipped() {
        let emitter = Emitter::<u32>::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let victim = later.clone();
        emitter.subscribe(Arc::new(move |_| {
            if let Some(sub) = victim.lock().take() {
                sub.cancel();
            }
        }));
        let log2 = log.clone();
        *later.lock() = Some(emitter.subscribe(Arc::new(move |v| log2.lock().push(v))));

        emitter.fire(&1);
        emitter.fire(&2);
        assert!(log.lock().is_empty());
        assert_eq!(emitter.len(), 1);
    }

    #[test]
    fn test_fire_while_stops_when_stale() {
        let emitter = Emitter::<u32>::new("test");
        let calls = Arc::new(Mutex::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            emitter.subscribe(Arc::new(move |_| *calls.lock() += 1));
        }

        let counter = calls.clone();
        emitter.fire_while(&0, || *counter.lock() < 2);
        assert_eq!(*calls.lock(), 2);
    }
}
