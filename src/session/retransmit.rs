//! Retransmit buffer and RTO backoff (C5/C6, §4.5 "Retransmit").

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 1024;
const INITIAL_RTO: Duration = Duration::from_millis(200);
const MAX_RTO: Duration = Duration::from_secs(2);
const MAX_RETRANSMITS: u32 = 5;

struct Entry {
    datagram: Vec<u8>,
    sent_at: Instant,
    retransmits: u32,
}

/// Ordered mapping from send-sequence to the encrypted datagram bytes plus
/// send timestamp, bounded by `capacity`. Oldest entry is dropped (with a
/// counter) when the bound is exceeded rather than blocking send.
pub struct RetransmitBuffer {
    entries: BTreeMap<u64, Entry>,
    capacity: usize,
    rto: Duration,
    pub dropped_for_capacity: u64,
}

/// Outcome of a retransmit sweep: sequences whose datagrams should be
/// resent verbatim, plus sequences that exceeded `MAX_RETRANSMITS` and
/// should drive the session into `Reconnecting`.
pub struct RetransmitSweep {
    pub to_resend: Vec<(u64, Vec<u8>)>,
    pub exhausted: Vec<u64>,
}

impl RetransmitBuffer {
    pub fn new(capacity: usize) -> Self {
        RetransmitBuffer {
            entries: BTreeMap::new(),
            capacity,
            rto: INITIAL_RTO,
            dropped_for_capacity: 0,
        }
    }

    /// Stores a freshly sent datagram. If the buffer is over capacity, the
    /// oldest (lowest sequence) entry is evicted.
    pub fn insert(&mut self, seq: u64, datagram: Vec<u8>, now: Instant) {
        self.entries.insert(
            seq,
            Entry {
                datagram,
                sent_at: now,
                retransmits: 0,
            },
        );
        while self.entries.len() > self.capacity {
            if let Some((&oldest, _)) = self.entries.iter().next() {
                self.entries.remove(&oldest);
                self.dropped_for_capacity += 1;
            }
        }
    }

    /// Removes an entry once its ACK has been applied. Never leaves an
    /// acked sequence in the buffer.
    pub fn remove(&mut self, seq: u64) {
        self.entries.remove(&seq);
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    /// Walks the buffer for entries older than the current RTO. Each
    /// returned entry's `retransmits` counter is bumped; sequences that
    /// exceed [`MAX_RETRANSMITS`] are reported in `exhausted` instead of
    /// `to_resend` (the caller should then remove them and/or reconnect).
    pub fn sweep(&mut self, now: Instant) -> RetransmitSweep {
        let mut to_resend = Vec::new();
        let mut exhausted = Vec::new();
        let mut any_loss = false;

        for (&seq, entry) in self.entries.iter_mut() {
            if now.duration_since(entry.sent_at) >= self.rto {
                entry.retransmits += 1;
                any_loss = true;
                if entry.retransmits > MAX_RETRANSMITS {
                    exhausted.push(seq);
                } else {
                    entry.sent_at = now;
                    to_resend.push((seq, entry.datagram.clone()));
                }
            }
        }

        if any_loss {
            self.rto = (self.rto * 2).min(MAX_RTO);
        }

        RetransmitSweep { to_resend, exhausted }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut buf = RetransmitBuffer::new(2);
        let now = Instant::now();
        buf.insert(1, vec![1], now);
        buf.insert(2, vec![2], now);
        buf.insert(3, vec![3], now);
        assert_eq!(buf.len(), 2);
        assert!(!buf.contains(1));
        assert_eq!(buf.dropped_for_capacity, 1);
    }

    #[test]
    fn remove_drops_acked_entry() {
        let mut buf = RetransmitBuffer::new(16);
        buf.insert(1, vec![1], Instant::now());
        buf.remove(1);
        assert!(!buf.contains(1));
    }

    #[test]
    fn sweep_resends_same_bytes_after_rto() {
        let mut buf = RetransmitBuffer::new(16);
        let t0 = Instant::now();
        buf.insert(1, vec![9, 9, 9], t0);
        let later = t0 + Duration::from_millis(250);
        let sweep = buf.sweep(later);
        assert_eq!(sweep.to_resend, vec![(1, vec![9, 9, 9])]);
    }
}
