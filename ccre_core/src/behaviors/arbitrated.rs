//! Channels whose upstream source follows the active behavior.

use super::{ArbInner, Behavior};
use crate::channel::{
    constant, event_output, Cell, ChannelValue, EventCell, EventInput, EventOutput, Input,
    Listener, Output, SharedEventInput, Subscription, Updating, ValueListener,
};
use crate::error::ArbitrationError;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

pub type ArbitratedBoolean = Arbitrated<bool>;
pub type ArbitratedFloat = Arbitrated<f32>;
pub type ArbitratedDiscrete<E> = Arbitrated<E>;

type Connect<S> = Box<dyn Fn(&S, Gate) -> Subscription + Send + Sync>;

/// Open only while the wiring it was issued for is still current.
#[derive(Clone)]
struct Gate {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl Gate {
    fn is_open(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

struct Wiring<S> {
    overrides: HashMap<Behavior, S>,
    live: Subscription,
}

/// Keeps exactly one source connected to a terminal.
///
/// `S` is the source handle; `connect` subscribes a source into the
/// terminal and returns the subscription to cancel on the next rewire.
/// Lock order is always arbitrator, then wiring.
struct Switchboard<S> {
    arbitrator: Weak<ArbInner>,
    owner: u64,
    arbitrator_name: Arc<str>,
    general: S,
    connect: Connect<S>,
    generation: Arc<AtomicU64>,
    wiring: ReentrantMutex<RefCell<Wiring<S>>>,
}

impl<S: Clone + Send + Sync + 'static> Switchboard<S> {
    /// Creates the board, follows the arbitrator, and connects once.
    fn install(arbitrator: &Arc<ArbInner>, general: S, connect: Connect<S>) -> Arc<Self> {
        let board = Arc::new(Self {
            arbitrator: Arc::downgrade(arbitrator),
            owner: arbitrator.id(),
            arbitrator_name: Arc::clone(arbitrator.name()),
            general,
            connect,
            generation: Arc::new(AtomicU64::new(0)),
            wiring: ReentrantMutex::new(RefCell::new(Wiring {
                overrides: HashMap::new(),
                live: Subscription::noop(),
            })),
        });
        // Subscribed before the first rewire so no transition is missed.
        let follower = Arc::clone(&board);
        arbitrator
            .changed()
            .subscribe(Arc::new(move |_| follower.rewire()));
        board.rewire();
        board
    }

    /// Runs `f` under the arbitrator lock so no transition interleaves.
    fn locked<R>(&self, f: impl FnOnce(Option<Behavior>) -> R) -> R {
        match self.arbitrator.upgrade() {
            Some(inner) => inner.with_active(f),
            None => f(None),
        }
    }

    /// Swaps the live subscription for the source of the active behavior.
    fn rewire(&self) {
        self.locked(|active| self.rewire_to(active.as_ref()));
    }

    /// A nested rewire on the same thread bumps the generation; the outer
    /// call then discards its own subscription instead of installing it,
    /// and its gate stops any delivery already in flight.
    fn rewire_to(&self, active: Option<&Behavior>) {
        let guard = self.wiring.lock();
        let (source, gate, stale) = {
            let mut wiring = guard.borrow_mut();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let stale = std::mem::take(&mut wiring.live);
            let source = active
                .and_then(|behavior| wiring.overrides.get(behavior))
                .cloned()
                .unwrap_or_else(|| self.general.clone());
            let gate = Gate {
                current: Arc::clone(&self.generation),
                generation,
            };
            (source, gate, stale)
        };
        stale.cancel();

        let subscription = (self.connect)(&source, gate.clone());

        let mut wiring = guard.borrow_mut();
        if gate.is_open() {
            wiring.live = subscription;
        } else {
            drop(wiring);
            subscription.cancel();
        }
    }

    fn attach(&self, behavior: &Behavior, source: S) -> Result<(), ArbitrationError> {
        if behavior.owner != self.owner {
            return Err(ArbitrationError::ForeignBehavior {
                behavior: behavior.name().to_string(),
                owner: behavior.arbitrator_name().to_string(),
                arbitrator: self.arbitrator_name.to_string(),
            });
        }
        self.locked(|active| {
            {
                let guard = self.wiring.lock();
                let mut wiring = guard.borrow_mut();
                if wiring.overrides.contains_key(behavior) {
                    return Err(ArbitrationError::DuplicateOverride(
                        behavior.name().to_string(),
                    ));
                }
                wiring.overrides.insert(behavior.clone(), source);
            }
            debug!(
                "Override attached for behavior '{}' on arbitrator '{}'",
                behavior.name(),
                self.arbitrator_name
            );
            self.rewire_to(active.as_ref());
            Ok(())
        })
    }

    fn override_count(&self) -> usize {
        self.wiring.lock().borrow().overrides.len()
    }
}

/// Terminal writer that drops values once its wiring is superseded.
struct GatedOutput<T: ChannelValue> {
    gate: Gate,
    sink: Cell<T>,
}

impl<T: ChannelValue> Output<T> for GatedOutput<T> {
    fn set(&self, value: T) {
        if self.gate.is_open() {
            self.sink.set(value);
        }
    }
}

/// A value channel fed by the active behavior's override.
///
/// Reads always reflect the source currently authoritative: the override of
/// the active behavior if it has one, else the default.
pub struct Arbitrated<T: ChannelValue> {
    board: Arc<Switchboard<Arc<dyn Input<T>>>>,
    terminal: Cell<T>,
}

impl<T: ChannelValue> Clone for Arbitrated<T> {
    fn clone(&self) -> Self {
        Self {
            board: Arc::clone(&self.board),
            terminal: self.terminal.clone(),
        }
    }
}

impl<T: ChannelValue> Arbitrated<T> {
    pub(crate) fn new(arbitrator: &Arc<ArbInner>, default: Arc<dyn Input<T>>) -> Self {
        let terminal = Cell::new(default.get());
        let sink = terminal.clone();
        let board = Switchboard::install(
            arbitrator,
            default,
            Box::new(move |source: &Arc<dyn Input<T>>, gate: Gate| {
                let target = GatedOutput {
                    gate,
                    sink: sink.clone(),
                };
                Input::send(&**source, Arc::new(target))
            }),
        );
        Self { board, terminal }
    }

    /// Routes `source` to this channel while `behavior` is active.
    pub fn attach(
        &self,
        behavior: &Behavior,
        source: Arc<dyn Input<T>>,
    ) -> Result<(), ArbitrationError> {
        self.board.attach(behavior, source)
    }

    /// Pins this channel to `value` while `behavior` is active.
    pub fn attach_value(&self, behavior: &Behavior, value: T) -> Result<(), ArbitrationError> {
        self.attach(behavior, constant(value))
    }

    pub fn override_count(&self) -> usize {
        self.board.override_count()
    }

    pub fn as_input(&self) -> Arc<dyn Input<T>> {
        Arc::new(self.clone())
    }
}

impl<T: ChannelValue> fmt::Debug for Arbitrated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arbitrated")
            .field("arbitrator", &self.board.arbitrator_name)
            .field("value", &self.terminal.get())
            .field("overrides", &self.override_count())
            .finish()
    }
}

impl<T: ChannelValue> Updating for Arbitrated<T> {
    fn on_update(&self, listener: Listener) -> Subscription {
        self.terminal.on_update(listener)
    }
}

impl<T: ChannelValue> Input<T> for Arbitrated<T> {
    fn get(&self) -> T {
        self.terminal.get()
    }

    fn on_change(&self, listener: ValueListener<T>) -> Subscription {
        self.terminal.on_change(listener)
    }
}

/// An event channel forwarding only the active behavior's override.
#[derive(Clone)]
pub struct ArbitratedEvent {
    board: Arc<Switchboard<SharedEventInput>>,
    terminal: EventCell,
}

impl ArbitratedEvent {
    pub(crate) fn new(arbitrator: &Arc<ArbInner>, default: SharedEventInput) -> Self {
        let terminal = EventCell::new();
        let sink = terminal.clone();
        let board = Switchboard::install(
            arbitrator,
            default,
            Box::new(move |source: &SharedEventInput, gate: Gate| {
                let sink = sink.clone();
                let target = event_output(move || {
                    if gate.is_open() {
                        sink.event();
                    }
                });
                EventInput::send(&**source, target)
            }),
        );
        Self { board, terminal }
    }

    pub fn attach(
        &self,
        behavior: &Behavior,
        source: SharedEventInput,
    ) -> Result<(), ArbitrationError> {
        self.board.attach(behavior, source)
    }

    pub fn override_count(&self) -> usize {
        self.board.override_count()
    }

    pub fn as_input(&self) -> SharedEventInput {
        Arc::new(self.clone())
    }
}

impl fmt::Debug for ArbitratedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArbitratedEvent")
            .field("arbitrator", &self.board.arbitrator_name)
            .field("overrides", &self.override_count())
            .finish()
    }
}

impl Updating for ArbitratedEvent {
    fn on_update(&self, listener: Listener) -> Subscription {
        self.terminal.on_update(listener)
    }
}

impl EventInput for ArbitratedEvent {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::BehaviorArbitrator;
    use crate::channel::{BooleanCell, EventOutput, FloatCell, Output};
    use approx::assert_relative_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_boolean_tracks_default_then_override() {
        let arb = BehaviorArbitrator::new("Test").unwrap();
        let request = BooleanCell::new(false);
        let behavior = arb.add_behavior("B", request.as_input()).unwrap();

        let general = BooleanCell::new(false);
        let channel = arb.arbitrate(general.as_input());
        let source = BooleanCell::new(true);
        channel.attach(&behavior, source.as_input()).unwrap();
        assert!(!channel.get());
        general.set(true);
        assert!(channel.get());
        general.set(false);

        request.set(true);
        assert!(channel.get());

        // The default has no say while B is active.
        general.set(true);
        general.set(false);
        assert!(channel.get());

        source.set(false);
        assert!(!channel.get());
        source.set(true);

        request.set(false);
        assert!(!channel.get());

        // Inactive override no longer leaks through.
        source.set(false);
        source.set(true);
        assert!(!channel.get());
    }

    #[test]
    fn test_override_wins_when_request_also_feeds_default() {
        let arb = BehaviorArbitrator::new("Drive").unwrap();
        let enable = BooleanCell::new(false);
        let behavior = arb.add_behavior("B", enable.as_input()).unwrap();
        let channel = arb.arbitrate(enable.as_input());
        channel.attach_value(&behavior, false).unwrap();

        enable.set(true);
        assert_eq!(arb.active(), Some(behavior));
        assert!(!channel.get());
        // Only the arbitrator's own rescan listener remains on `enable`.
        assert_eq!(enable.listener_count(), 1);

        enable.set(false);
        assert_eq!(arb.active(), None);
        assert!(!channel.get());
        enable.set(true);
        assert!(!channel.get());
    }

    #[test]
    fn test_concurrent_attach_and_request_settle_on_override() {
        for _ in 0..200 {
            let arb = BehaviorArbitrator::new("Race").unwrap();
            let request = BooleanCell::new(false);
            let behavior = arb.add_behavior("B", request.as_input()).unwrap();
            let general = FloatCell::new(0.0);
            let channel = arb.arbitrate(general.as_input());
            let barrier = Arc::new(Barrier::new(2));

            let attacher = {
                let (channel, behavior, barrier) =
                    (channel.clone(), behavior.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    channel.attach_value(&behavior, 1.0).unwrap();
                })
            };
            barrier.wait();
            request.set(true);
            attacher.join().unwrap();

            assert_eq!(arb.active(), Some(behavior));
            assert_relative_eq!(channel.get(), 1.0);
            assert_eq!(general.listener_count(), 0);
        }
    }

    #[test]
    fn test_drive_auto_teleop() {
        let arb = BehaviorArbitrator::new("Drive").unwrap();
        let auto_request = BooleanCell::new(false);
        let teleop_request = BooleanCell::new(false);
        let auto = arb.add_behavior("Auto", auto_request.as_input()).unwrap();
        let teleop = arb.add_behavior("Teleop", teleop_request.as_input()).unwrap();

        let speed = arb.add_float(0.0);
        let auto_speed = FloatCell::new(0.3);
        let joystick = FloatCell::new(0.8);
        speed.attach(&auto, auto_speed.as_input()).unwrap();
        speed.attach(&teleop, joystick.as_input()).unwrap();

        auto_request.set(true);
        assert_relative_eq!(speed.get(), 0.3);

        teleop_request.set(true);
        assert_relative_eq!(speed.get(), 0.8);

        joystick.set(-0.5);
        assert_relative_eq!(speed.get(), -0.5);

        teleop_request.set(false);
        assert_relative_eq!(speed.get(), 0.3);

        auto_request.set(false);
        assert_relative_eq!(speed.get(), 0.0);
    }

    #[test]
    fn test_attach_to_active_behavior_switches_immediately() {
        let arb = BehaviorArbitrator::new("Test").unwrap();
        let behavior = arb
            .add_behavior("on", BooleanCell::new(true).as_input())
            .unwrap();
        let channel = arb.add_float(1.0);

        channel.attach_value(&behavior, 2.0).unwrap();
        assert_relative_eq!(channel.get(), 2.0);
    }

    #[test]
    fn test_attach_rejects_foreign_and_duplicate() {
        let arb = BehaviorArbitrator::new("Mine").unwrap();
        let other = BehaviorArbitrator::new("Theirs").unwrap();
        let mine = arb.add_behavior("a", BooleanCell::new(false).as_input()).unwrap();
        let theirs = other.add_behavior("b", BooleanCell::new(false).as_input()).unwrap();
        let channel = arb.add_boolean(false);

        let err = channel.attach_value(&theirs, true).unwrap_err();
        assert_eq!(
            err,
            ArbitrationError::ForeignBehavior {
                behavior: "b".to_string(),
                owner: "Theirs".to_string(),
                arbitrator: "Mine".to_string(),
            }
        );

        channel.attach_value(&mine, true).unwrap();
        assert_eq!(
            channel.attach_value(&mine, false).unwrap_err(),
            ArbitrationError::DuplicateOverride("a".to_string())
        );
        assert_eq!(channel.override_count(), 1);
    }

    #[test]
    fn test_only_one_source_stays_connected() {
        let arb = BehaviorArbitrator::new("Test").unwrap();
        let requests: Vec<BooleanCell> = (0..3).map(|_| BooleanCell::new(false)).collect();
        let behaviors: Vec<Behavior> = requests
            .iter()
            .enumerate()
            .map(|(i, r)| arb.add_behavior(&format!("b{i}"), r.as_input()).unwrap())
            .collect();

        let default = FloatCell::new(0.0);
        let sources: Vec<FloatCell> = (0..3).map(|_| FloatCell::new(0.0)).collect();
        let channel = arb.arbitrate(default.as_input());
        for (behavior, source) in behaviors.iter().zip(&sources) {
            channel.attach(behavior, source.as_input()).unwrap();
        }

        for request in &requests {
            request.set(true);
        }
        requests[2].set(false);

        let connected: usize = sources.iter().map(|s| s.listener_count()).sum::<usize>()
            + default.listener_count();
        assert_eq!(connected, 1);
        assert_eq!(sources[1].listener_count(), 1);
    }

    #[test]
    fn test_event_forwards_only_authoritative_source() {
        let arb = BehaviorArbitrator::new("Test").unwrap();
        let request = BooleanCell::new(false);
        let behavior = arb.add_behavior("B", request.as_input()).unwrap();

        let default = EventCell::new();
        let special = EventCell::new();
        let channel = arb.add_event(default.as_input());
        channel.attach(&behavior, special.as_input()).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        channel.on_update(Arc::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));

        default.event();
        special.event();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        request.set(true);
        default.event();
        special.event();
        special.event();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
