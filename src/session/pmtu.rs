//! PMTU discovery (C7, §4.6).

const DEFAULT_MTU: u16 = 1400;
const CEILING_MTU: u16 = 1500;
const STEP: u16 = 64;
const SUCCESS_THRESHOLD: u32 = 8;

/// Callback invoked when the discovered MTU changes, so the orchestrator can
/// update the virtual interface (§4.6 "MTU changes invoke a registered
/// callback").
pub trait MtuChangeListener: Send {
    fn on_mtu_changed(&mut self, new_mtu: u16);
}

pub struct PmtuDiscovery {
    mtu: u16,
    step: u16,
    consecutive_successes: u32,
    largest_seen: u16,
}

impl Default for PmtuDiscovery {
    fn default() -> Self {
        PmtuDiscovery {
            mtu: DEFAULT_MTU,
            step: STEP,
            consecutive_successes: 0,
            largest_seen: 0,
        }
    }
}

impl PmtuDiscovery {
    pub fn current_mtu(&self) -> u16 {
        self.mtu
    }

    /// Records a successful decrypt of a datagram of `size` bytes. If a
    /// size at least `current_mtu + step` succeeds `SUCCESS_THRESHOLD` times
    /// in a row, the MTU is raised by `step`, capped at `CEILING_MTU`.
    pub fn record_success(&mut self, size: u16, listener: &mut dyn MtuChangeListener) {
        self.largest_seen = self.largest_seen.max(size);

        if size >= self.mtu.saturating_add(self.step) {
            self.consecutive_successes += 1;
        } else {
            self.consecutive_successes = 0;
        }

        if self.consecutive_successes >= SUCCESS_THRESHOLD {
            self.consecutive_successes = 0;
            let new_mtu = (self.mtu + self.step).min(CEILING_MTU);
            if new_mtu != self.mtu {
                self.mtu = new_mtu;
                listener.on_mtu_changed(self.mtu);
            }
        }
    }

    /// Records a path-failure indication (EMSGSIZE, or N consecutive
    /// retransmit timeouts): halves the step and resets the success streak.
    pub fn record_failure(&mut self) {
        self.consecutive_successes = 0;
        self.step = (self.step / 2).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<u16>);
    impl MtuChangeListener for Recorder {
        fn on_mtu_changed(&mut self, new_mtu: u16) {
            self.0.push(new_mtu);
        }
    }

    #[test]
    fn raises_mtu_after_consecutive_successes() {
        let mut pmtu = PmtuDiscovery::default();
        let mut rec = Recorder(Vec::new());
        for _ in 0..SUCCESS_THRESHOLD {
            pmtu.record_success(DEFAULT_MTU + STEP, &mut rec);
        }
        assert_eq!(pmtu.current_mtu(), DEFAULT_MTU + STEP);
        assert_eq!(rec.0, vec![DEFAULT_MTU + STEP]);
    }

    #[test]
    fn failure_halves_step() {
        let mut pmtu = PmtuDiscovery::default();
        pmtu.record_failure();
        assert_eq!(pmtu.step, STEP / 2);
    }

    #[test]
    fn mtu_capped_at_ceiling() {
        let mut pmtu = PmtuDiscovery::default();
        let mut rec = Recorder(Vec::new());
        pmtu.mtu = CEILING_MTU;
        for _ in 0..SUCCESS_THRESHOLD {
            pmtu.record_success(CEILING_MTU + STEP, &mut rec);
        }
        assert_eq!(pmtu.current_mtu(), CEILING_MTU);
    }
}
