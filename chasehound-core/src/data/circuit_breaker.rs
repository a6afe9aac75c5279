//! Back-off gate shared by every fetch worker.
//!
//! A 403 from Yahoo means the address is banned for a while; a run of 429s
//! means we are being throttled. Either opens the gate and every worker stops
//! sending until the cooldown deadline passes.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Closed { strikes: u32 },
    Open { until: Instant },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    gate: Mutex<Gate>,
    cooldown: Duration,
    max_strikes: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, max_strikes: u32) -> Self {
        Self {
            gate: Mutex::new(Gate::Closed { strikes: 0 }),
            cooldown,
            max_strikes: max_strikes.max(1),
        }
    }

    /// Thirty minutes off after three strikes.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }

    // Workers can panic inside a fetch; a poisoned gate is still a valid gate.
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_allowed(&self) -> bool {
        let mut gate = self.gate();
        match *gate {
            Gate::Closed { .. } => true,
            Gate::Open { until } if Instant::now() >= until => {
                info!("provider cooldown over, requests resume");
                *gate = Gate::Closed { strikes: 0 };
                true
            }
            Gate::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut gate = self.gate();
        if let Gate::Closed { strikes } = &mut *gate {
            *strikes = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut gate = self.gate();
        if let Gate::Closed { strikes } = *gate {
            let strikes = strikes + 1;
            if strikes >= self.max_strikes {
                warn!(strikes, cooldown_secs = self.cooldown.as_secs(), "provider gate opened");
                *gate = Gate::Open {
                    until: Instant::now() + self.cooldown,
                };
            } else {
                *gate = Gate::Closed { strikes };
            }
        }
    }

    /// Open at once, as on a ban.
    pub fn trip(&self) {
        *self.gate() = Gate::Open {
            until: Instant::now() + self.cooldown,
        };
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match *self.gate() {
            Gate::Closed { .. } => Duration::ZERO,
            Gate::Open { until } => until.saturating_duration_since(Instant::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_strike_opens_the_gate() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        assert!(cb.is_allowed());
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
        cb.record_failure();
        assert!(!cb.is_allowed());
        assert!(cb.remaining_cooldown() > Duration::from_secs(50));
    }

    #[test]
    fn a_success_clears_strikes() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 2);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn ban_opens_without_strikes_and_cooldown_reopens() {
        let cb = CircuitBreaker::new(Duration::from_millis(20), 5);
        cb.trip();
        assert!(!cb.is_allowed());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
    }
}
