//! The BEHAVIOR layer - priority arbitration between competing modes.
//!
//! A `BehaviorArbitrator` owns an ordered list of behaviors, each gated by a
//! boolean request input. Later behaviors outrank earlier ones. Whenever any
//! request changes, the arbitrator rescans the whole list and makes the last
//! requesting behavior active (or none).
//!
//! Arbitrated channels (`Arbitrated`, `ArbitratedEvent`) route a per-behavior
//! override source to a single terminal, falling back to a default when no
//! behavior is active or the active one has no override.
//!
//! ```text
//!   request_0 ─┐
//!   request_1 ─┼─► rescan ─► active ─► Switchboard ─► terminal cell
//!   request_2 ─┘                        ▲   ▲
//!                                       │   └── default source
//!                                       └────── override per behavior
//! ```

mod arbitrated;

pub use arbitrated::{
    Arbitrated, ArbitratedBoolean, ArbitratedDiscrete, ArbitratedEvent, ArbitratedFloat,
};

use crate::channel::listeners::Emitter;
use crate::channel::{
    constant, BooleanInput, ChannelValue, Derived, Discrete, Input, Listener, SharedEventInput,
    Subscription, Updating, ValueListener,
};
use crate::error::ArbitrationError;
use crate::introspect::{Introspect, IntrospectionTable};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_ARBITRATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Refresh hint for the behavior table, in milliseconds.
pub const TABLE_REFRESH_MILLIS: u64 = 1000;

/// A named operating mode registered with one arbitrator.
///
/// Identity is the (arbitrator, position) pair; the name is a label only.
#[derive(Clone)]
pub struct Behavior {
    owner: u64,
    owner_name: Arc<str>,
    index: usize,
    name: Arc<str>,
}

impl Behavior {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Priority position; higher outranks lower.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn arbitrator_name(&self) -> &str {
        &self.owner_name
    }
}

impl PartialEq for Behavior {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.index == other.index
    }
}

impl Eq for Behavior {}

impl Hash for Behavior {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Behavior({}/{}#{})", self.owner_name, self.name, self.index)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Where a behavior stands in the current arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorStatus {
    /// Requesting and highest priority among requesters
    Active,
    /// Requesting but outranked
    Standby,
    /// Not requesting
    Inactive,
}

impl BehaviorStatus {
    /// Eight-column, right-aligned label used in tables.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Active => "  Active",
            Self::Standby => " Standby",
            Self::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for BehaviorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

struct ArbState {
    behaviors: Vec<(Behavior, BooleanInput)>,
    active: Option<Behavior>,
    /// Bumped on every change of the active identity.
    transitions: u64,
}

pub(crate) struct ArbInner {
    id: u64,
    name: Arc<str>,
    state: ReentrantMutex<RefCell<ArbState>>,
    changed: Arc<Emitter<Option<Behavior>>>,
}

impl ArbInner {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn active(&self) -> Option<Behavior> {
        self.state.lock().borrow().active.clone()
    }

    /// Runs `f` with the arbitration lock held and the active behavior.
    ///
    /// No transition can land while `f` runs, except one that `f` itself
    /// triggers on this thread.
    pub(crate) fn with_active<R>(&self, f: impl FnOnce(Option<Behavior>) -> R) -> R {
        let guard = self.state.lock();
        let active = guard.borrow().active.clone();
        f(active)
    }

    pub(crate) fn changed(&self) -> &Arc<Emitter<Option<Behavior>>> {
        &self.changed
    }

    /// Picks the last requester and announces a change of identity.
    ///
    /// The lock is held through the announcement so transitions are
    /// observed in order. It is re-entrant: listeners may query the
    /// arbitrator or trigger a nested rescan on the same thread. Once a
    /// nested rescan has announced a newer transition, the outer walk stops
    /// so no listener hears the superseded value last.
    fn rescan(&self) {
        let guard = self.state.lock();
        let requesters: Vec<(Behavior, BooleanInput)> = guard.borrow().behaviors.clone();
        let next = requesters
            .iter()
            .rev()
            .find(|(_, request)| request.get())
            .map(|(behavior, _)| behavior.clone());

        let epoch = {
            let mut state = guard.borrow_mut();
            if state.active == next {
                None
            } else {
                state.active = next.clone();
                state.transitions += 1;
                Some(state.transitions)
            }
        };
        if let Some(epoch) = epoch {
            debug!(
                "Arbitrator '{}' active behavior -> {}",
                self.name,
                next.as_ref().map_or("<none>", |b| b.name())
            );
            self.changed.fire_while(&next, || guard.borrow().transitions == epoch);
        }
    }

    fn check_owner(&self, behavior: &Behavior) -> Result<(), ArbitrationError> {
        if behavior.owner == self.id {
            Ok(())
        } else {
            Err(ArbitrationError::ForeignBehavior {
                behavior: behavior.name.to_string(),
                owner: behavior.owner_name.to_string(),
                arbitrator: self.name.to_string(),
            })
        }
    }
}

/// Picks the active behavior from prioritized requests.
///
/// Cloning yields another handle to the same arbitrator.
#[derive(Clone)]
pub struct BehaviorArbitrator {
    inner: Arc<ArbInner>,
}

impl BehaviorArbitrator {
    /// Creates an arbitrator with no behaviors. Blank names are rejected.
    pub fn new(name: &str) -> Result<Self, ArbitrationError> {
        if name.trim().is_empty() {
            return Err(ArbitrationError::InvalidName(name.to_string()));
        }
        Ok(Self {
            inner: Arc::new(ArbInner {
                id: NEXT_ARBITRATOR_ID.fetch_add(1, Ordering::Relaxed),
                name: Arc::from(name),
                state: ReentrantMutex::new(RefCell::new(ArbState {
                    behaviors: Vec::new(),
                    active: None,
                    transitions: 0,
                })),
                changed: Emitter::new("arbitrator"),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Registers a behavior above every existing one and rescans.
    pub fn add_behavior(
        &self,
        name: &str,
        request: BooleanInput,
    ) -> Result<Behavior, ArbitrationError> {
        if name.trim().is_empty() {
            return Err(ArbitrationError::InvalidName(name.to_string()));
        }
        let behavior = {
            let guard = self.inner.state.lock();
            let mut state = guard.borrow_mut();
            let behavior = Behavior {
                owner: self.inner.id,
                owner_name: Arc::clone(&self.inner.name),
                index: state.behaviors.len(),
                name: Arc::from(name),
            };
            state.behaviors.push((behavior.clone(), Arc::clone(&request)));
            behavior
        };
        debug!(
            "Arbitrator '{}' added behavior '{}' at priority {}",
            self.inner.name, behavior.name, behavior.index
        );

        let weak = Arc::downgrade(&self.inner);
        request.on_update(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.rescan();
            }
        }));
        self.inner.rescan();
        Ok(behavior)
    }

    /// Recomputes the active behavior from the current requests.
    pub fn rescan(&self) {
        self.inner.rescan();
    }

    pub fn active(&self) -> Option<Behavior> {
        self.inner.active()
    }

    pub fn active_name(&self) -> Option<String> {
        self.active().map(|b| b.name().to_string())
    }

    /// All behaviors in ascending priority.
    pub fn behaviors(&self) -> Vec<Behavior> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state.behaviors.iter().map(|(b, _)| b.clone()).collect()
    }

    pub fn status(&self, behavior: &Behavior) -> Result<BehaviorStatus, ArbitrationError> {
        self.inner.check_owner(behavior)?;
        let guard = self.inner.state.lock();
        let (request, active) = {
            let state = guard.borrow();
            let request = state
                .behaviors
                .get(behavior.index)
                .map(|(_, request)| Arc::clone(request));
            (request, state.active.clone())
        };
        if active.as_ref() == Some(behavior) {
            Ok(BehaviorStatus::Active)
        } else if request.map_or(false, |r| r.get()) {
            Ok(BehaviorStatus::Standby)
        } else {
            Ok(BehaviorStatus::Inactive)
        }
    }

    /// Boolean input that tracks whether `behavior` is the active one.
    pub fn is_active(&self, behavior: &Behavior) -> Result<Derived<bool>, ArbitrationError> {
        self.inner.check_owner(behavior)?;
        let weak = Arc::downgrade(&self.inner);
        let target = behavior.clone();
        Ok(Derived::new(&[self], move || {
            weak.upgrade()
                .and_then(|inner| inner.active())
                .map_or(false, |active| active == target)
        }))
    }

    /// Listens for changes of the active behavior.
    pub fn on_active_changed(&self, listener: ValueListener<Option<Behavior>>) -> Subscription {
        self.inner.changed.subscribe(listener)
    }

    /// Arbitrated channel over any value kind.
    pub fn arbitrate<T: ChannelValue>(&self, default: Arc<dyn Input<T>>) -> Arbitrated<T> {
        Arbitrated::new(&self.inner, default)
    }

    pub fn add_boolean(&self, default: bool) -> ArbitratedBoolean {
        self.arbitrate(constant(default))
    }

    pub fn add_float(&self, default: f32) -> ArbitratedFloat {
        self.arbitrate(constant(default))
    }

    pub fn add_discrete<E: Discrete>(&self, default: E) -> ArbitratedDiscrete<E> {
        self.arbitrate(constant(default))
    }

    /// Arbitrated event that forwards `default` when no override applies.
    pub fn add_event(&self, default: SharedEventInput) -> ArbitratedEvent {
        ArbitratedEvent::new(&self.inner, default)
    }

    /// Rows: one per behavior, `"{status}: {name}"`.
    pub fn table(&self) -> IntrospectionTable {
        let active = self.active();
        let rows = self
            .behaviors()
            .iter()
            .map(|behavior| {
                let status = self.status(behavior).unwrap_or(BehaviorStatus::Inactive);
                format!("{}: {}", status.prefix(), behavior.name())
            })
            .collect();
        IntrospectionTable {
            title: format!("Behaviors for {}", self.inner.name),
            rows,
            summary: if active.is_some() {
                "Active behavior".to_string()
            } else {
                "No active behavior".to_string()
            },
            refresh_millis: TABLE_REFRESH_MILLIS,
        }
    }
}

impl fmt::Debug for BehaviorArbitrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorArbitrator")
            .field("name", &self.inner.name)
            .field("active", &self.active())
            .finish()
    }
}

/// Updates whenever the active behavior changes.
impl Updating for BehaviorArbitrator {
    fn on_update(&self, listener: Listener) -> Subscription {
        self.inner.changed.subscribe(Arc::new(move |_| listener()))
    }
}

impl Introspect for BehaviorArbitrator {
    fn introspect(&self) -> IntrospectionTable {
        self.table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BooleanCell, Output};
    use parking_lot::Mutex;

    fn ladder(names: &[&str]) -> (BehaviorArbitrator, Vec<BooleanCell>, Vec<Behavior>) {
        let arbitrator = BehaviorArbitrator::new("Test").unwrap();
        let mut cells = Vec::new();
        let mut behaviors = Vec::new();
        for name in names {
            let cell = BooleanCell::new(false);
            behaviors.push(arbitrator.add_behavior(name, cell.as_input()).unwrap());
            cells.push(cell);
        }
        (arbitrator, cells, behaviors)
    }

    #[test]
    fn test_highest_requester_wins() {
        let (arb, cells, behaviors) = ladder(&["low", "mid", "high"]);
        assert_eq!(arb.active(), None);

        cells[0].set(true);
        assert_eq!(arb.active(), Some(behaviors[0].clone()));

        cells[2].set(true);
        assert_eq!(arb.active(), Some(behaviors[2].clone()));

        // Lower requests do not displace a higher one.
        cells[1].set(true);
        assert_eq!(arb.active_name().as_deref(), Some("high"));

        cells[2].set(false);
        assert_eq!(arb.active_name().as_deref(), Some("mid"));

        cells[1].set(false);
        cells[0].set(false);
        assert_eq!(arb.active(), None);
    }

    #[test]
    fn test_add_behavior_rescans_immediately() {
        let arb = BehaviorArbitrator::new("Test").unwrap();
        let already_on = BooleanCell::new(true);
        let behavior = arb.add_behavior("eager", already_on.as_input()).unwrap();

        assert_eq!(arb.active(), Some(behavior));
    }

    #[test]
    fn test_one_notification_per_identity_change() {
        let (arb, cells, _) = ladder(&["a", "b"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        arb.on_active_changed(Arc::new(move |active: Option<Behavior>| {
            seen2.lock().push(active.map(|b| b.name().to_string()));
        }));

        cells[1].set(true);
        // Outranked request: identity unchanged, no notification.
        cells[0].set(true);
        cells[1].set(false);
        cells[0].set(false);

        assert_eq!(
            *seen.lock(),
            vec![Some("b".to_string()), Some("a".to_string()), None]
        );
    }

    #[test]
    fn test_status_and_is_active() {
        let (arb, cells, behaviors) = ladder(&["a", "b", "c"]);
        let b_active = arb.is_active(&behaviors[1]).unwrap();

        cells[0].set(true);
        cells[1].set(true);
        assert!(b_active.get());
        assert_eq!(arb.status(&behaviors[0]).unwrap(), BehaviorStatus::Standby);
        assert_eq!(arb.status(&behaviors[1]).unwrap(), BehaviorStatus::Active);
        assert_eq!(arb.status(&behaviors[2]).unwrap(), BehaviorStatus::Inactive);

        cells[2].set(true);
        assert!(!b_active.get());
    }

    #[test]
    fn test_rejects_blank_names_and_foreign_behaviors() {
        assert_eq!(
            BehaviorArbitrator::new("").unwrap_err(),
            ArbitrationError::InvalidName(String::new())
        );

        let (arb, _, _) = ladder(&["a"]);
        assert!(matches!(
            arb.add_behavior("  ", BooleanCell::new(false).as_input()),
            Err(ArbitrationError::InvalidName(_))
        ));

        let (other, _, foreign) = ladder(&["x"]);
        let err = arb.status(&foreign[0]).unwrap_err();
        assert!(matches!(err, ArbitrationError::ForeignBehavior { .. }));
        assert!(other.status(&foreign[0]).is_ok());
    }

    #[test]
    fn test_table_layout() {
        let (arb, cells, _) = ladder(&["Autonomous", "Teleop", "Test"]);
        cells[0].set(true);
        cells[1].set(true);

        let table = arb.table();
        assert_eq!(table.title, "Behaviors for Test");
        assert_eq!(
            table.rows,
            vec![
                " Standby: Autonomous".to_string(),
                "  Active: Teleop".to_string(),
                "Inactive: Test".to_string(),
            ]
        );
        assert_eq!(table.summary, "Active behavior");
        assert_eq!(table.refresh_millis, 1000);

        cells[0].set(false);
        cells[1].set(false);
        assert_eq!(arb.introspect().summary, "No active behavior");
    }

    #[test]
    fn test_listener_may_query_arbitrator() {
        let (arb, cells, _) = ladder(&["a"]);
        let observed = Arc::new(Mutex::new(None));
        let (arb2, observed2) = (arb.clone(), observed.clone());
        arb.on_update(Arc::new(move || {
            *observed2.lock() = arb2.active_name();
        }));

        cells[0].set(true);
        assert_eq!(observed.lock().as_deref(), Some("a"));
    }

    #[test]
    fn test_nested_transition_supersedes_outer_announcement() {
        let (arb, cells, behaviors) = ladder(&["lo", "hi"]);
        let lo = behaviors[0].clone();
        let escalate = cells[1].clone();
        arb.on_active_changed(Arc::new(move |active: Option<Behavior>| {
            if active.as_ref() == Some(&lo) {
                escalate.set(true);
            }
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        arb.on_active_changed(Arc::new(move |active: Option<Behavior>| {
            log.lock().push(active.map(|b| b.name().to_string()));
        }));

        cells[0].set(true);
        assert_eq!(arb.active_name().as_deref(), Some("hi"));
        assert_eq!(*seen.lock(), vec![Some("hi".to_string())]);
    }
}
