//! Logical uplink channels

/// A logical channel: one uplink frequency slot of the device's channel mask
///
/// Channels are identified by their position in the
/// [`ChannelManager`](super::channel_manager::ChannelManager) list, which is
/// the bit index the network uses to address them.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalChannel {
    /// Channel frequency in Hz
    pub frequency: u32,
    /// Minimum data rate index
    pub min_dr: u8,
    /// Maximum data rate index
    pub max_dr: u8,
    /// Whether the channel is enabled for uplink
    pub enabled: bool,
    /// RX1 frequency set by DlChannelReq, when it differs from `frequency`
    pub downlink_frequency: Option<u32>,
}

impl LogicalChannel {
    /// Default data rate range of a new channel (DR0 to DR5)
    pub const DEFAULT_DR_RANGE: (u8, u8) = (0, 5);

    /// Create an enabled channel with the default data rate range
    pub fn new(frequency: u32) -> Self {
        let (min_dr, max_dr) = Self::DEFAULT_DR_RANGE;
        Self::with_data_rates(frequency, min_dr, max_dr)
    }

    /// Create an enabled channel with an explicit data rate range
    pub fn with_data_rates(frequency: u32, min_dr: u8, max_dr: u8) -> Self {
        Self {
            frequency,
            min_dr,
            max_dr,
            enabled: true,
            downlink_frequency: None,
        }
    }

    /// Disabled, frequency-less slot used to pad the channel list
    pub(crate) fn placeholder() -> Self {
        Self {
            frequency: 0,
            min_dr: 0,
            max_dr: 0,
            enabled: false,
            downlink_frequency: None,
        }
    }

    /// Whether `data_rate` is inside this channel's range
    pub fn supports_data_rate(&self, data_rate: u8) -> bool {
        (self.min_dr..=self.max_dr).contains(&data_rate)
    }

    /// Frequency the device listens on in RX1 after using this channel
    pub fn rx1_frequency(&self) -> u32 {
        self.downlink_frequency.unwrap_or(self.frequency)
    }
}
