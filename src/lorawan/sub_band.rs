//! Regulatory sub-bands

use core::time::Duration;

use super::channel_manager::ChannelError;
use super::duty_cycle::DutyCycleTimer;

/// A frequency range sharing one duty cycle budget and power limit
#[derive(Debug, Clone, PartialEq)]
pub struct SubBand {
    first_frequency: u32,
    last_frequency: u32,
    max_tx_power_dbm: i8,
    timer: DutyCycleTimer,
}

impl SubBand {
    /// Create a sub-band covering `first_frequency..=last_frequency` (Hz)
    ///
    /// Fails with [`ChannelError::InvalidSubBand`] if the range is inverted
    /// and [`ChannelError::InvalidDutyCycle`] if `duty_cycle` is outside (0, 1].
    pub fn new(
        first_frequency: u32,
        last_frequency: u32,
        duty_cycle: f64,
        max_tx_power_dbm: i8,
    ) -> Result<Self, ChannelError> {
        if first_frequency > last_frequency {
            return Err(ChannelError::InvalidSubBand);
        }
        let timer = DutyCycleTimer::new(duty_cycle).ok_or(ChannelError::InvalidDutyCycle)?;
        Ok(Self {
            first_frequency,
            last_frequency,
            max_tx_power_dbm,
            timer,
        })
    }

    /// Lowest frequency of the band in Hz
    pub fn first_frequency(&self) -> u32 {
        self.first_frequency
    }

    /// Highest frequency of the band in Hz
    pub fn last_frequency(&self) -> u32 {
        self.last_frequency
    }

    /// Whether `frequency` lies inside the band, bounds included
    pub fn contains(&self, frequency: u32) -> bool {
        (self.first_frequency..=self.last_frequency).contains(&frequency)
    }

    /// Duty cycle fraction, 1 meaning unrestricted
    pub fn duty_cycle(&self) -> f64 {
        self.timer.duty_cycle()
    }

    /// Change the duty cycle fraction; a pending cooldown is kept
    pub fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<(), ChannelError> {
        if self.timer.set_duty_cycle(duty_cycle) {
            Ok(())
        } else {
            Err(ChannelError::InvalidDutyCycle)
        }
    }

    /// Maximum transmission power allowed in the band
    pub fn max_tx_power_dbm(&self) -> i8 {
        self.max_tx_power_dbm
    }

    /// Instant from which the band may be used again
    pub fn next_transmit_time(&self) -> Duration {
        self.timer.next_transmit_time()
    }

    /// Time left before the band may be used again
    pub fn waiting_time(&self, now: Duration) -> Duration {
        self.timer.waiting_time(now)
    }

    pub(crate) fn register_transmission(&mut self, airtime: Duration, now: Duration) {
        self.timer.register(airtime, now);
    }
}
