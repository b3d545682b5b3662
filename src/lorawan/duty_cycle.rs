//! Duty cycle cooldown timer
//!
//! A transmission of airtime `T` registered at `now` under duty cycle `d`
//! blocks the budget until `now + T * (1/d - 1)`. The timer only ever moves
//! forward, so a short transmission cannot shorten a restriction left by a
//! long one.

use core::time::Duration;

/// Whether `duty_cycle` is a usable fraction in (0, 1]
pub fn is_valid_duty_cycle(duty_cycle: f64) -> bool {
    duty_cycle > 0.0 && duty_cycle <= 1.0
}

/// Off time mandated after a transmission of `airtime` under `duty_cycle`
pub fn off_time(airtime: Duration, duty_cycle: f64) -> Duration {
    if duty_cycle >= 1.0 {
        return Duration::ZERO;
    }
    let secs = airtime.as_secs_f64() * (1.0 / duty_cycle - 1.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Monotonic "next allowed transmission" clock for one duty cycle budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCycleTimer {
    duty_cycle: f64,
    next_transmit_time: Duration,
}

impl DutyCycleTimer {
    /// Unrestricted timer
    pub const UNRESTRICTED: Self = Self {
        duty_cycle: 1.0,
        next_transmit_time: Duration::ZERO,
    };

    /// Create a timer; `None` if `duty_cycle` is outside (0, 1]
    pub fn new(duty_cycle: f64) -> Option<Self> {
        if !is_valid_duty_cycle(duty_cycle) {
            return None;
        }
        Some(Self {
            duty_cycle,
            next_transmit_time: Duration::ZERO,
        })
    }

    /// Duty cycle fraction
    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    /// Change the duty cycle fraction for future transmissions
    ///
    /// A pending cooldown is kept as is. Returns `false` and leaves the timer
    /// unchanged if `duty_cycle` is outside (0, 1].
    pub fn set_duty_cycle(&mut self, duty_cycle: f64) -> bool {
        if !is_valid_duty_cycle(duty_cycle) {
            return false;
        }
        self.duty_cycle = duty_cycle;
        true
    }

    /// Instant from which a new transmission is allowed
    pub fn next_transmit_time(&self) -> Duration {
        self.next_transmit_time
    }

    /// Time left until a new transmission is allowed, zero if allowed now
    pub fn waiting_time(&self, now: Duration) -> Duration {
        self.next_transmit_time.saturating_sub(now)
    }

    /// Account for a transmission of `airtime` starting at `now`
    pub fn register(&mut self, airtime: Duration, now: Duration) {
        let candidate = now.saturating_add(off_time(airtime, self.duty_cycle));
        self.next_transmit_time = self.next_transmit_time.max(candidate);
    }
}

impl Default for DutyCycleTimer {
    fn default() -> Self {
        Self::UNRESTRICTED
    }
}
