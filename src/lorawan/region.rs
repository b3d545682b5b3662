use crate::config::{ChannelPlan, SubBandPlan};

use super::channel_manager::{ChannelError, ChannelManager};

/// Data rate identifier
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    /// DR0
    SF12BW125,
    /// DR1
    SF11BW125,
    /// DR2
    SF10BW125,
    /// DR3
    SF9BW125,
    /// DR4
    SF8BW125,
    /// DR5
    SF7BW125,
    /// DR6
    SF7BW250,
    /// DR7, 50 kbps FSK
    FSK50,
}

impl DataRate {
    /// Look up a data rate by its EU868 index
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(DataRate::SF12BW125),
            1 => Some(DataRate::SF11BW125),
            2 => Some(DataRate::SF10BW125),
            3 => Some(DataRate::SF9BW125),
            4 => Some(DataRate::SF8BW125),
            5 => Some(DataRate::SF7BW125),
            6 => Some(DataRate::SF7BW250),
            7 => Some(DataRate::FSK50),
            _ => None,
        }
    }

    /// EU868 index of this data rate
    pub fn index(&self) -> u8 {
        *self as u8
    }

    /// Get spreading factor, `None` for FSK
    pub fn spreading_factor(&self) -> Option<u8> {
        match self {
            DataRate::SF12BW125 => Some(12),
            DataRate::SF11BW125 => Some(11),
            DataRate::SF10BW125 => Some(10),
            DataRate::SF9BW125 => Some(9),
            DataRate::SF8BW125 => Some(8),
            DataRate::SF7BW125 | DataRate::SF7BW250 => Some(7),
            DataRate::FSK50 => None,
        }
    }

    /// Get bandwidth in Hz, `None` for FSK
    pub fn bandwidth(&self) -> Option<u32> {
        match self {
            DataRate::SF7BW250 => Some(250_000),
            DataRate::FSK50 => None,
            _ => Some(125_000),
        }
    }

    /// Maximum application payload size
    pub fn max_payload_size(&self) -> usize {
        match self {
            DataRate::SF12BW125 | DataRate::SF11BW125 | DataRate::SF10BW125 => 51,
            DataRate::SF9BW125 => 115,
            _ => 222,
        }
    }
}

/// Regional parameters the MAC layer validates network requests against
pub trait Region {
    /// Channels and sub-bands the device starts with
    fn channel_plan(&self) -> ChannelPlan<'static>;

    /// Data rate for `index`, `None` if the region does not define it
    fn data_rate(&self, index: u8) -> Option<DataRate>;

    /// Output power in dBm for TX power `index`, `None` if undefined
    fn tx_power_dbm(&self, index: u8) -> Option<i8>;

    /// Highest valid RX1 data rate offset
    fn max_rx1_dr_offset(&self) -> u8;

    /// Default RX2 frequency and data rate index
    fn rx2_window(&self) -> (u32, u8);

    /// Whether TxParamSetupReq is honoured in this region
    fn supports_tx_param_setup(&self) -> bool {
        false
    }

    /// Build a channel manager from the region's channel plan
    fn channel_manager(&self) -> Result<ChannelManager, ChannelError> {
        self.channel_plan().build()
    }
}

const EU868_DEFAULT_CHANNELS: [u32; 3] = [868_100_000, 868_300_000, 868_500_000];

const EU868_SUB_BANDS: [SubBandPlan; 6] = [
    SubBandPlan {
        first_frequency: 863_000_000,
        last_frequency: 865_000_000,
        duty_cycle: 0.001,
        max_tx_power_dbm: 14,
    },
    SubBandPlan {
        first_frequency: 865_000_000,
        last_frequency: 868_000_000,
        duty_cycle: 0.01,
        max_tx_power_dbm: 14,
    },
    SubBandPlan {
        first_frequency: 868_000_000,
        last_frequency: 868_600_000,
        duty_cycle: 0.01,
        max_tx_power_dbm: 14,
    },
    SubBandPlan {
        first_frequency: 868_700_000,
        last_frequency: 869_200_000,
        duty_cycle: 0.001,
        max_tx_power_dbm: 14,
    },
    SubBandPlan {
        first_frequency: 869_400_000,
        last_frequency: 869_650_000,
        duty_cycle: 0.1,
        max_tx_power_dbm: 27,
    },
    SubBandPlan {
        first_frequency: 869_700_000,
        last_frequency: 870_000_000,
        duty_cycle: 0.01,
        max_tx_power_dbm: 14,
    },
];

/// Maximum EIRP in dBm, reached with TX power index 0
const EU868_MAX_EIRP_DBM: i8 = 16;

/// EU868 region configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct EU868;

impl EU868 {
    /// Create a new EU868 region configuration
    pub fn new() -> Self {
        Self
    }
}

impl Region for EU868 {
    fn channel_plan(&self) -> ChannelPlan<'static> {
        ChannelPlan {
            default_channels: &EU868_DEFAULT_CHANNELS,
            default_dr_range: (0, 5),
            sub_bands: &EU868_SUB_BANDS,
            aggregated_duty_cycle: 1.0,
        }
    }

    fn data_rate(&self, index: u8) -> Option<DataRate> {
        DataRate::from_index(index)
    }

    fn tx_power_dbm(&self, index: u8) -> Option<i8> {
        // 2 dB steps below max EIRP
        (index <= 7).then(|| EU868_MAX_EIRP_DBM - 2 * index as i8)
    }

    fn max_rx1_dr_offset(&self) -> u8 {
        5
    }

    fn rx2_window(&self) -> (u32, u8) {
        (869_525_000, 0)
    }
}
