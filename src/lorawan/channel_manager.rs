//! Logical channel and duty cycle manager
//!
//! The manager owns the device's channel mask and the regulatory sub-bands.
//! It answers "may I transmit on this channel now, and if not, how long must
//! I wait", and records the transmissions the MAC layer commits to. It never
//! blocks: waiting times are advisory and rescheduling is up to the caller.
//!
//! Sub-bands are matched by a linear scan in registration order. Overlapping
//! sub-bands are not rejected; the first registered band containing a
//! frequency wins, so overlapping ranges are a configuration hazard.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use super::channel::LogicalChannel;
use super::commands::CHANNEL_MASK_BITS;
use super::duty_cycle::DutyCycleTimer;
use super::sub_band::SubBand;

/// Maximum number of logical channels, one per channel mask bit
pub const MAX_CHANNELS: usize = CHANNEL_MASK_BITS;

/// Maximum number of sub-bands
pub const MAX_SUB_BANDS: usize = 8;

/// Channel manager error
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// No registered sub-band contains the frequency (Hz)
    NoSubBand(u32),
    /// Channel index beyond the current channel list
    IndexOutOfRange(usize),
    /// Channel is not in the list
    ChannelNotFound,
    /// Channel at this index is a protected default channel
    ReservedChannel(usize),
    /// Fixed-capacity storage is full
    CapacityExceeded,
    /// Sub-band range is inverted
    InvalidSubBand,
    /// Duty cycle outside (0, 1]
    InvalidDutyCycle,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::NoSubBand(freq) => write!(f, "no sub-band contains {} Hz", freq),
            ChannelError::IndexOutOfRange(index) => {
                write!(f, "channel index {} out of range", index)
            }
            ChannelError::ChannelNotFound => write!(f, "channel not found"),
            ChannelError::ReservedChannel(index) => {
                write!(f, "channel {} is a protected default channel", index)
            }
            ChannelError::CapacityExceeded => write!(f, "capacity exceeded"),
            ChannelError::InvalidSubBand => write!(f, "sub-band range is inverted"),
            ChannelError::InvalidDutyCycle => write!(f, "duty cycle must be in (0, 1]"),
        }
    }
}

/// Channel list, sub-bands and duty cycle clocks of one device
#[derive(Debug, Clone)]
pub struct ChannelManager {
    /// Channel mask; the first `default_channel_count` entries are protected
    channels: Vec<LogicalChannel, MAX_CHANNELS>,
    /// Sub-bands in registration order
    sub_bands: Vec<SubBand, MAX_SUB_BANDS>,
    /// Device-wide duty cycle budget across all sub-bands
    aggregate: DutyCycleTimer,
    /// Number of leading channels that cannot be removed
    default_channel_count: usize,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    /// Create an empty manager with an unrestricted aggregate duty cycle
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            sub_bands: Vec::new(),
            aggregate: DutyCycleTimer::UNRESTRICTED,
            default_channel_count: 0,
        }
    }

    /// Append a channel with default data rates, returning its index
    pub fn add_channel_frequency(&mut self, frequency: u32) -> Result<usize, ChannelError> {
        self.add_channel(LogicalChannel::new(frequency))
    }

    /// Append a channel, returning its index
    pub fn add_channel(&mut self, channel: LogicalChannel) -> Result<usize, ChannelError> {
        let index = self.channels.len();
        self.channels
            .push(channel)
            .map_err(|_| ChannelError::CapacityExceeded)?;
        debug!("Channel {} added at {} Hz", index, channel.frequency);
        Ok(index)
    }

    /// Replace the channel at `index`
    ///
    /// The list only grows by appending, so `index` must already exist.
    pub fn set_channel(&mut self, index: usize, channel: LogicalChannel) -> Result<(), ChannelError> {
        let slot = self
            .channels
            .get_mut(index)
            .ok_or(ChannelError::IndexOutOfRange(index))?;
        *slot = channel;
        debug!("Channel {} set to {} Hz", index, channel.frequency);
        Ok(())
    }

    /// Set the channel at `index`, padding the list with disabled slots if
    /// `index` lies past its end
    pub fn define_channel(&mut self, index: usize, channel: LogicalChannel) -> Result<(), ChannelError> {
        if index < self.channels.len() {
            return self.set_channel(index, channel);
        }
        if index >= MAX_CHANNELS {
            return Err(ChannelError::CapacityExceeded);
        }
        while self.channels.len() < index {
            self.add_channel(LogicalChannel::placeholder())?;
        }
        self.add_channel(channel).map(|_| ())
    }

    /// Remove the first unprotected channel equal to `channel`
    ///
    /// Later channels shift down by one index. Protected default channels
    /// cannot be removed, only disabled; a match among them is only reported
    /// when no unprotected channel matches.
    pub fn remove_channel(&mut self, channel: &LogicalChannel) -> Result<(), ChannelError> {
        let protected = self.default_channel_count;
        let Some(index) = self.channels[protected..]
            .iter()
            .position(|c| c == channel)
            .map(|offset| protected + offset)
        else {
            return match self.channels[..protected].iter().position(|c| c == channel) {
                Some(index) => {
                    warn!("Refusing to remove default channel {}", index);
                    Err(ChannelError::ReservedChannel(index))
                }
                None => Err(ChannelError::ChannelNotFound),
            };
        };
        self.channels.remove(index);
        debug!("Channel {} removed", index);
        Ok(())
    }

    /// Disable the channel at `index` without removing it
    pub fn disable_channel(&mut self, index: usize) -> Result<(), ChannelError> {
        self.set_enabled(index, false)
    }

    /// Re-enable the channel at `index`
    pub fn enable_channel(&mut self, index: usize) -> Result<(), ChannelError> {
        self.set_enabled(index, true)
    }

    fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get_mut(index)
            .ok_or(ChannelError::IndexOutOfRange(index))?;
        channel.enabled = enabled;
        trace!("Channel {} enabled: {}", index, enabled);
        Ok(())
    }

    /// Channel at `index`
    pub fn channel(&self, index: usize) -> Option<&LogicalChannel> {
        self.channels.get(index)
    }

    /// All channels, in channel mask order
    pub fn channels(&self) -> &[LogicalChannel] {
        &self.channels
    }

    /// Channels currently enabled for uplink
    pub fn enabled_channels(&self) -> impl Iterator<Item = &LogicalChannel> {
        self.channels.iter().filter(|c| c.enabled)
    }

    /// Number of leading channels protected from removal
    pub fn default_channel_count(&self) -> usize {
        self.default_channel_count
    }

    /// Protect the first `count` channels from removal
    pub fn set_default_channel_count(&mut self, count: usize) -> Result<(), ChannelError> {
        if count > self.channels.len() {
            return Err(ChannelError::IndexOutOfRange(count));
        }
        self.default_channel_count = count;
        Ok(())
    }

    /// Register a sub-band covering `first_frequency..=last_frequency` (Hz)
    ///
    /// Overlap with existing sub-bands is not checked.
    pub fn add_sub_band(
        &mut self,
        first_frequency: u32,
        last_frequency: u32,
        duty_cycle: f64,
        max_tx_power_dbm: i8,
    ) -> Result<(), ChannelError> {
        let sub_band = SubBand::new(first_frequency, last_frequency, duty_cycle, max_tx_power_dbm)?;
        self.insert_sub_band(sub_band)
    }

    /// Register an already constructed sub-band
    pub fn insert_sub_band(&mut self, sub_band: SubBand) -> Result<(), ChannelError> {
        trace!(
            "Sub-band {}-{} Hz registered",
            sub_band.first_frequency(),
            sub_band.last_frequency()
        );
        self.sub_bands
            .push(sub_band)
            .map_err(|_| ChannelError::CapacityExceeded)
    }

    /// Registered sub-bands, in registration order
    pub fn sub_bands(&self) -> &[SubBand] {
        &self.sub_bands
    }

    /// First registered sub-band containing `frequency`
    pub fn sub_band_for_frequency(&self, frequency: u32) -> Result<&SubBand, ChannelError> {
        self.sub_bands
            .iter()
            .find(|band| band.contains(frequency))
            .ok_or(ChannelError::NoSubBand(frequency))
    }

    /// Mutable access to the first registered sub-band containing `frequency`
    pub fn sub_band_for_frequency_mut(
        &mut self,
        frequency: u32,
    ) -> Result<&mut SubBand, ChannelError> {
        self.sub_bands
            .iter_mut()
            .find(|band| band.contains(frequency))
            .ok_or(ChannelError::NoSubBand(frequency))
    }

    /// Sub-band the channel's frequency falls in
    pub fn sub_band_for_channel(&self, channel: &LogicalChannel) -> Result<&SubBand, ChannelError> {
        self.sub_band_for_frequency(channel.frequency)
    }

    /// Maximum transmission power allowed on `channel`
    pub fn tx_power_for_channel(&self, channel: &LogicalChannel) -> Result<i8, ChannelError> {
        Ok(self.sub_band_for_channel(channel)?.max_tx_power_dbm())
    }

    /// Time to wait before `channel`'s sub-band allows a transmission
    ///
    /// The aggregate budget is not considered; see
    /// [`ChannelManager::aggregated_waiting_time`] and
    /// [`ChannelManager::transmission_delay`].
    pub fn waiting_time(&self, channel: &LogicalChannel, now: Duration) -> Result<Duration, ChannelError> {
        Ok(self.sub_band_for_channel(channel)?.waiting_time(now))
    }

    /// Time to wait before the aggregate budget allows a transmission
    pub fn aggregated_waiting_time(&self, now: Duration) -> Duration {
        self.aggregate.waiting_time(now)
    }

    /// Larger of the sub-band and aggregate waiting times for `channel`
    pub fn transmission_delay(&self, channel: &LogicalChannel, now: Duration) -> Result<Duration, ChannelError> {
        let band_wait = self.waiting_time(channel, now)?;
        Ok(band_wait.max(self.aggregated_waiting_time(now)))
    }

    /// Enabled channels on which a transmission is allowed at `now`
    pub fn available_channels(&self, now: Duration) -> impl Iterator<Item = (usize, &LogicalChannel)> {
        let aggregate_ready = self.aggregated_waiting_time(now).is_zero();
        self.channels
            .iter()
            .enumerate()
            .filter(move |(_, channel)| {
                aggregate_ready
                    && channel.enabled
                    && matches!(self.waiting_time(channel, now), Ok(wait) if wait.is_zero())
            })
    }

    /// Record a transmission of `airtime` on `channel` starting at `now`
    ///
    /// Advances the channel's sub-band clock and the aggregate clock. If the
    /// channel has no sub-band nothing is recorded.
    pub fn add_event(
        &mut self,
        airtime: Duration,
        channel: &LogicalChannel,
        now: Duration,
    ) -> Result<(), ChannelError> {
        self.sub_band_for_frequency_mut(channel.frequency)?
            .register_transmission(airtime, now);
        self.aggregate.register(airtime, now);
        debug!(
            "Transmission of {} ms at {} Hz, aggregate budget free at {} ms",
            airtime.as_millis() as u64,
            channel.frequency,
            self.aggregate.next_transmit_time().as_millis() as u64
        );
        Ok(())
    }

    /// Aggregate duty cycle fraction
    pub fn aggregated_duty_cycle(&self) -> f64 {
        self.aggregate.duty_cycle()
    }

    /// Change the aggregate duty cycle fraction, e.g. after a DutyCycleReq
    ///
    /// A pending aggregate cooldown is kept.
    pub fn set_aggregated_duty_cycle(&mut self, duty_cycle: f64) -> Result<(), ChannelError> {
        if !self.aggregate.set_duty_cycle(duty_cycle) {
            return Err(ChannelError::InvalidDutyCycle);
        }
        info!("Aggregated duty cycle set to {}", duty_cycle);
        Ok(())
    }

    /// Instant from which the aggregate budget allows a transmission
    pub fn aggregated_next_transmit_time(&self) -> Duration {
        self.aggregate.next_transmit_time()
    }

    /// Check that every enabled channel lies in a registered sub-band
    pub fn validate(&self) -> Result<(), ChannelError> {
        for channel in self.enabled_channels() {
            self.sub_band_for_channel(channel)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn manager_with_band(duty_cycle: f64) -> ChannelManager {
        let mut manager = ChannelManager::new();
        manager
            .add_sub_band(868_000_000, 868_600_000, duty_cycle, 14)
            .unwrap();
        manager.add_channel_frequency(868_100_000).unwrap();
        manager.add_channel_frequency(868_300_000).unwrap();
        manager.add_channel_frequency(868_500_000).unwrap();
        manager
    }

    #[test]
    fn test_waiting_time_after_event() {
        let mut manager = manager_with_band(0.01);
        let channel = *manager.channel(0).unwrap();
        let now = Duration::from_secs(5);

        assert_eq!(manager.waiting_time(&channel, now), Ok(Duration::ZERO));
        manager.add_event(SECOND, &channel, now).unwrap();
        assert_eq!(manager.waiting_time(&channel, now), Ok(Duration::from_secs(99)));

        // channels share the sub-band budget
        let sibling = *manager.channel(2).unwrap();
        assert_eq!(manager.waiting_time(&sibling, now), Ok(Duration::from_secs(99)));
        assert_eq!(
            manager.waiting_time(&channel, now + Duration::from_secs(40)),
            Ok(Duration::from_secs(59))
        );
    }

    #[test]
    fn test_shorter_event_keeps_pending_restriction() {
        let mut manager = manager_with_band(0.01);
        let channel = *manager.channel(0).unwrap();

        manager.add_event(SECOND, &channel, Duration::ZERO).unwrap();
        let later = Duration::from_secs(10);
        manager
            .add_event(Duration::from_millis(10), &channel, later)
            .unwrap();
        assert_eq!(manager.waiting_time(&channel, later), Ok(Duration::from_secs(89)));
    }

    #[test]
    fn test_unrestricted_band_never_waits() {
        let mut manager = manager_with_band(1.0);
        let channel = *manager.channel(1).unwrap();
        for step in 0..5 {
            let now = Duration::from_secs(step);
            manager.add_event(Duration::from_secs(3), &channel, now).unwrap();
            assert_eq!(manager.waiting_time(&channel, now), Ok(Duration::ZERO));
        }
    }

    #[test]
    fn test_sub_band_lookup() {
        let manager = manager_with_band(0.01);
        let channel = LogicalChannel::new(868_100_000);
        let band = manager.sub_band_for_channel(&channel).unwrap();
        assert_eq!(band.first_frequency(), 868_000_000);
        assert_eq!(band.last_frequency(), 868_600_000);
        assert_eq!(manager.tx_power_for_channel(&channel), Ok(14));

        assert_eq!(
            manager.sub_band_for_frequency(800_000_000).err(),
            Some(ChannelError::NoSubBand(800_000_000))
        );
    }

    #[test]
    fn test_overlapping_sub_bands_first_match_wins() {
        let mut manager = ChannelManager::new();
        manager.add_sub_band(868_000_000, 868_600_000, 0.01, 14).unwrap();
        manager.add_sub_band(868_000_000, 869_000_000, 0.1, 20).unwrap();
        let band = manager.sub_band_for_frequency(868_300_000).unwrap();
        assert_eq!(band.duty_cycle(), 0.01);
        let band = manager.sub_band_for_frequency(868_800_000).unwrap();
        assert_eq!(band.duty_cycle(), 0.1);
    }

    #[test]
    fn test_add_event_without_sub_band_changes_nothing() {
        let mut manager = manager_with_band(0.01);
        manager.set_aggregated_duty_cycle(0.5).unwrap();
        let stray = LogicalChannel::new(800_000_000);

        assert_eq!(
            manager.add_event(SECOND, &stray, Duration::ZERO),
            Err(ChannelError::NoSubBand(800_000_000))
        );
        assert_eq!(manager.aggregated_waiting_time(Duration::ZERO), Duration::ZERO);
        assert_eq!(manager.sub_bands()[0].next_transmit_time(), Duration::ZERO);
    }

    #[test]
    fn test_aggregate_clock() {
        let mut manager = manager_with_band(1.0);
        manager.set_aggregated_duty_cycle(0.1).unwrap();
        let channel = *manager.channel(0).unwrap();

        manager.add_event(SECOND, &channel, Duration::ZERO).unwrap();
        assert_eq!(manager.waiting_time(&channel, Duration::ZERO), Ok(Duration::ZERO));
        assert_eq!(manager.aggregated_waiting_time(Duration::ZERO), Duration::from_secs(9));
        assert_eq!(
            manager.transmission_delay(&channel, Duration::from_secs(4)),
            Ok(Duration::from_secs(5))
        );
        assert_eq!(manager.available_channels(Duration::from_secs(4)).count(), 0);
        assert_eq!(manager.available_channels(Duration::from_secs(9)).count(), 3);

        assert_eq!(
            manager.set_aggregated_duty_cycle(0.0),
            Err(ChannelError::InvalidDutyCycle)
        );
        assert_eq!(manager.aggregated_duty_cycle(), 0.1);
    }

    #[test]
    fn test_disable_is_idempotent() {
        let mut manager = manager_with_band(0.01);
        manager.disable_channel(1).unwrap();
        manager.disable_channel(1).unwrap();

        let enabled: [bool; 3] = [
            manager.channels()[0].enabled,
            manager.channels()[1].enabled,
            manager.channels()[2].enabled,
        ];
        assert_eq!(enabled, [true, false, true]);
        assert_eq!(manager.enabled_channels().count(), 2);
        assert_eq!(manager.disable_channel(3), Err(ChannelError::IndexOutOfRange(3)));

        manager.enable_channel(1).unwrap();
        assert_eq!(manager.enabled_channels().count(), 3);
    }

    #[test]
    fn test_set_channel_bounds() {
        let mut manager = manager_with_band(0.01);
        let replacement = LogicalChannel::with_data_rates(868_200_000, 0, 7);

        manager.set_channel(2, replacement).unwrap();
        assert_eq!(manager.channel(2), Some(&replacement));
        assert_eq!(
            manager.set_channel(3, replacement),
            Err(ChannelError::IndexOutOfRange(3))
        );
        assert_eq!(manager.channels().len(), 3);
    }

    #[test]
    fn test_define_channel_pads_with_disabled_slots() {
        let mut manager = manager_with_band(0.01);
        manager
            .define_channel(5, LogicalChannel::new(868_400_000))
            .unwrap();
        assert_eq!(manager.channels().len(), 6);
        assert!(!manager.channels()[3].enabled);
        assert!(!manager.channels()[4].enabled);
        assert_eq!(manager.channels()[5].frequency, 868_400_000);
        manager.validate().unwrap();

        assert_eq!(
            manager.define_channel(MAX_CHANNELS, LogicalChannel::new(868_400_000)),
            Err(ChannelError::CapacityExceeded)
        );
        assert_eq!(manager.channels().len(), 6);
    }

    #[test]
    fn test_default_channels_cannot_be_removed() {
        let mut manager = manager_with_band(0.01);
        manager.set_default_channel_count(2).unwrap();
        let protected = *manager.channel(1).unwrap();
        let extra = *manager.channel(2).unwrap();

        assert_eq!(
            manager.remove_channel(&protected),
            Err(ChannelError::ReservedChannel(1))
        );
        manager.remove_channel(&extra).unwrap();
        assert_eq!(manager.channels().len(), 2);
        assert_eq!(manager.remove_channel(&extra), Err(ChannelError::ChannelNotFound));
        assert_eq!(
            manager.set_default_channel_count(3),
            Err(ChannelError::IndexOutOfRange(3))
        );
    }

    #[test]
    fn test_remove_duplicate_of_default_channel() {
        let mut manager = manager_with_band(0.01);
        manager.set_default_channel_count(1).unwrap();
        let duplicate = LogicalChannel::new(868_100_000);
        assert_eq!(manager.add_channel(duplicate), Ok(3));

        manager.remove_channel(&duplicate).unwrap();
        assert_eq!(manager.channels().len(), 3);
        assert_eq!(manager.channel(0), Some(&duplicate));

        // only the protected copy is left
        assert_eq!(
            manager.remove_channel(&duplicate),
            Err(ChannelError::ReservedChannel(0))
        );
        assert_eq!(manager.channels().len(), 3);
    }

    #[test]
    fn test_capacity() {
        let mut manager = ChannelManager::new();
        for i in 0..MAX_CHANNELS as u32 {
            manager.add_channel_frequency(868_000_000 + i * 100_000).unwrap();
        }
        assert_eq!(
            manager.add_channel_frequency(869_000_000),
            Err(ChannelError::CapacityExceeded)
        );
    }

    #[test]
    fn test_validate_reports_uncovered_channel() {
        let mut manager = manager_with_band(0.01);
        manager.validate().unwrap();
        let index = manager.add_channel_frequency(915_000_000).unwrap();
        assert_eq!(manager.validate(), Err(ChannelError::NoSubBand(915_000_000)));
        manager.disable_channel(index).unwrap();
        manager.validate().unwrap();
    }
}
