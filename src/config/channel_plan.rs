use crate::lorawan::channel::LogicalChannel;
use crate::lorawan::channel_manager::{ChannelError, ChannelManager};

/// Sub-band entry of a regional channel plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubBandPlan {
    /// First frequency of the band in Hz
    pub first_frequency: u32,
    /// Last frequency of the band in Hz
    pub last_frequency: u32,
    /// Duty cycle fraction in (0, 1]
    pub duty_cycle: f64,
    /// Maximum transmission power in dBm
    pub max_tx_power_dbm: i8,
}

/// Channel configuration applied once at device setup
#[derive(Debug, Clone, Copy)]
pub struct ChannelPlan<'a> {
    /// Default channel frequencies in Hz; these channels are protected
    pub default_channels: &'a [u32],
    /// Data rate range of the default channels
    pub default_dr_range: (u8, u8),
    /// Sub-bands, in lookup order
    pub sub_bands: &'a [SubBandPlan],
    /// Device-wide duty cycle fraction
    pub aggregated_duty_cycle: f64,
}

impl ChannelPlan<'_> {
    /// Build a channel manager holding this plan
    ///
    /// Fails if a parameter is invalid, if storage is exceeded or if a
    /// default channel lies outside every sub-band.
    pub fn build(&self) -> Result<ChannelManager, ChannelError> {
        let mut manager = ChannelManager::new();
        for band in self.sub_bands {
            manager.add_sub_band(
                band.first_frequency,
                band.last_frequency,
                band.duty_cycle,
                band.max_tx_power_dbm,
            )?;
        }

        let (min_dr, max_dr) = self.default_dr_range;
        for &frequency in self.default_channels {
            manager.add_channel(LogicalChannel::with_data_rates(frequency, min_dr, max_dr))?;
        }
        manager.set_default_channel_count(self.default_channels.len())?;
        manager.set_aggregated_duty_cycle(self.aggregated_duty_cycle)?;
        manager.validate()?;

        info!(
            "Channel plan loaded: {} channels, {} sub-bands",
            self.default_channels.len(),
            self.sub_bands.len()
        );
        Ok(manager)
    }
}
