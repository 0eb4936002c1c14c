//! Deadline-ordered timer heap backing the event loop (§4.7).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Ack,
    Retransmit,
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    deadline: Instant,
    id: TimerId,
    kind: TimerKind,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the *earliest* deadline.
        other.deadline.cmp(&self.deadline).then(other.id.cmp(&self.id))
    }
}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A binary min-heap of pending timers, keyed by deadline. Cancellation is
/// lazy: a cancelled id is recorded and skipped when it reaches the head,
/// which keeps `cancel_timer` O(log n) without a heap rebuild.
#[derive(Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    cancelled: std::collections::HashSet<TimerId>,
    next_id: TimerId,
}

impl TimerHeap {
    pub fn new() -> Self {
        TimerHeap::default()
    }

    pub fn schedule(&mut self, deadline: Instant, kind: TimerKind) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(TimerEntry { deadline, id, kind });
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
    }

    /// The deadline of the next live timer, if any. Used to bound the
    /// event loop's poll wait.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_cancelled();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops and returns every timer whose deadline has passed, in deadline
    /// order.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<(TimerId, TimerKind)> {
        let mut fired = Vec::new();
        loop {
            self.drop_cancelled();
            match self.heap.peek() {
                Some(entry) if entry.deadline <= now => {
                    let entry = self.heap.pop().unwrap();
                    fired.push((entry.id, entry.kind));
                }
                _ => break,
            }
        }
        fired
    }

    fn drop_cancelled(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.remove(&entry.id) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
