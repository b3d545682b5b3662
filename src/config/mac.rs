use core::time::Duration;

/// TX parameters negotiated through TxParamSetupReq
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    /// Downlink dwell time limit in force
    pub downlink_dwell_time: bool,
    /// Uplink dwell time limit in force
    pub uplink_dwell_time: bool,
    /// Maximum EIRP index
    pub max_eirp: u8,
}

/// MAC parameters the network server may change at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct MacSettings {
    /// Uplink data rate index
    pub data_rate: u8,
    /// TX power index (0 = region maximum)
    pub tx_power: u8,
    /// Number of transmissions of each unconfirmed uplink
    pub nb_trans: u8,
    /// RX1 data rate offset
    pub rx1_dr_offset: u8,
    /// RX2 data rate index
    pub rx2_data_rate: u8,
    /// RX2 frequency in Hz
    pub rx2_frequency: u32,
    /// Delay between the end of an uplink and the RX1 window
    pub rx1_delay: Duration,
    /// TX parameters, if the region supports TxParamSetupReq
    pub tx_params: Option<TxParams>,
}

impl MacSettings {
    /// Settings at activation, with the region's default RX2 window
    pub fn new(rx2_frequency: u32, rx2_data_rate: u8) -> Self {
        Self {
            data_rate: 0,
            tx_power: 0,
            nb_trans: 1,
            rx1_dr_offset: 0,
            rx2_data_rate,
            rx2_frequency,
            rx1_delay: Duration::from_secs(1),
            tx_params: None,
        }
    }

    /// Delay between the end of an uplink and the RX2 window
    pub fn rx2_delay(&self) -> Duration {
        self.rx1_delay + Duration::from_secs(1)
    }
}
