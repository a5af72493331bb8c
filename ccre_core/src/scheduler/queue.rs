//! Deadline-ordered job queue with pooled entries and lazy cancellation.
//!
//! Entries live in a slab of reusable slots; the binary heap only holds
//! small `(deadline, seq, slot)` keys. A popped entry frees its slot for the
//! next registration, so a periodic job re-enqueues itself without touching
//! the allocator. Cancelled entries stay in the heap until they surface.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

pub(crate) type OnceJob = Box<dyn FnOnce() + Send>;
pub(crate) type RepeatJob = Arc<dyn Fn() + Send + Sync>;

/// What to do when an entry's deadline arrives.
pub(crate) enum Task {
    Once(OnceJob),
    Cancellable {
        job: OnceJob,
        cancelled: Arc<AtomicBool>,
    },
    FixedRate {
        job: RepeatJob,
        period: u64,
        skippable: bool,
        cancelled: Arc<AtomicBool>,
    },
    VariableRate {
        job: RepeatJob,
        period: u64,
        cancelled: Arc<AtomicBool>,
    },
}

impl Task {
    pub(crate) fn is_cancelled(&self) -> bool {
        match self {
            Task::Once(_) => false,
            Task::Cancellable { cancelled, .. }
            | Task::FixedRate { cancelled, .. }
            | Task::VariableRate { cancelled, .. } => cancelled.load(AtomicOrdering::SeqCst),
        }
    }
}

/// A registered job waiting for its deadline.
pub(crate) struct ScheduleEntry {
    pub tag: Arc<str>,
    pub deadline: u64,
    pub task: Task,
}

/// Heap key. Uses (deadline, seq) for deterministic ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Key {
    deadline: u64,
    seq: u64,
    slot: usize,
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so we reverse the ordering for min-heap behavior.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
            .reverse()
    }
}

/// Min-queue of schedule entries keyed by deadline, FIFO among equal deadlines.
#[derive(Default)]
pub(crate) struct JobQueue {
    heap: BinaryHeap<Key>,
    slots: Vec<Option<ScheduleEntry>>,
    free: Vec<usize>,
    seq: u64,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, reusing a free slot when one exists.
    pub(crate) fn push(&mut self, entry: ScheduleEntry) {
        let deadline = entry.deadline;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.seq += 1;
        self.heap.push(Key {
            deadline,
            seq: self.seq,
            slot,
        });
    }

    /// Earliest deadline, cancelled entries included.
    pub(crate) fn peek_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|key| key.deadline)
    }

    /// Removes the earliest entry and recycles its slot.
    pub(crate) fn pop(&mut self) -> Option<ScheduleEntry> {
        let key = self.heap.pop()?;
        let entry = self.slots[key.slot].take();
        self.free.push(key.slot);
        entry
    }

    /// Number of queued entries that have not been cancelled.
    pub(crate) fn live(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|entry| !entry.task.is_cancelled())
            .count()
    }

    /// Number of allocated slots, occupied or free.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// (tag, deadline) of live entries in firing order.
    pub(crate) fn snapshot(&self) -> Vec<(Arc<str>, u64)> {
        let mut keys: Vec<Key> = self.heap.iter().copied().collect();
        // Reversed Ord: sorting descending by it yields ascending deadlines.
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.into_iter()
            .filter_map(|key| self.slots[key.slot].as_ref())
            .filter(|entry| !entry.task.is_cancelled())
            .map(|entry| (entry.tag.clone(), entry.deadline))
            .collect()
    }

    /// Drops every queued entry.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.slots.clear();
        self.free.clear();
    }
}
