use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::config::mac::{MacSettings, TxParams};
use super::channel::LogicalChannel;
use super::channel_manager::{ChannelError, ChannelManager, MAX_CHANNELS};
use super::commands::{
    self, CommandError, CommandType, Direction, MacCommand, MacCommandIterator,
};
use super::region::{DataRate, Region};

/// Data rate and TX power value meaning "keep the current setting"
const KEEP_CURRENT: u8 = 0x0F;

/// Demodulation margin range reported in DevStatusAns
const MARGIN_RANGE: (i8, i8) = (-32, 31);

/// MAC layer error
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacError {
    /// MAC command codec error
    Command(CommandError),
    /// Channel manager error
    Channel(ChannelError),
    /// Command that a device never receives
    UnexpectedCommand(CommandType),
}

impl From<CommandError> for MacError {
    fn from(err: CommandError) -> Self {
        MacError::Command(err)
    }
}

impl From<ChannelError> for MacError {
    fn from(err: ChannelError) -> Self {
        MacError::Channel(err)
    }
}

impl fmt::Display for MacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacError::Command(err) => write!(f, "MAC command error: {}", err),
            MacError::Channel(err) => write!(f, "channel error: {}", err),
            MacError::UnexpectedCommand(command) => {
                write!(f, "{:?} is not handled by an end device", command)
            }
        }
    }
}

/// Result of the last LinkCheckReq
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCheck {
    /// Link margin in dB above the demodulation floor
    pub margin: u8,
    /// Number of gateways that received the request
    pub gateway_count: u8,
}

/// MAC layer state
///
/// Applies the MAC commands received from the network server to the
/// device's channel plan and radio parameters, and keeps the duty cycle
/// accounting of the uplinks it is told about.
pub struct MacLayer<REG: Region> {
    /// Region configuration
    region: REG,
    /// Channel plan and duty cycle budgets
    channels: ChannelManager,
    /// Negotiated radio parameters
    settings: MacSettings,
    /// Last LinkCheckAns received
    link_check: Option<LinkCheck>,
    /// Battery level reported in DevStatusAns
    battery: u8,
    /// Demodulation margin of the last downlink in dB
    last_margin: i8,
    /// Channel used by the last uplink
    last_channel: Option<usize>,
}

impl<REG: Region> MacLayer<REG> {
    /// Create a new MAC layer with the region's default channel plan
    pub fn new(region: REG) -> Result<Self, MacError> {
        let channels = region.channel_manager()?;
        let (rx2_frequency, rx2_data_rate) = region.rx2_window();
        Ok(Self {
            region,
            channels,
            settings: MacSettings::new(rx2_frequency, rx2_data_rate),
            link_check: None,
            battery: 255,
            last_margin: 0,
            last_channel: None,
        })
    }

    /// Region configuration
    pub fn region(&self) -> &REG {
        &self.region
    }

    /// Channel plan and duty cycle budgets
    pub fn channel_manager(&self) -> &ChannelManager {
        &self.channels
    }

    /// Mutable access to the channel plan, e.g. to add application channels
    pub fn channel_manager_mut(&mut self) -> &mut ChannelManager {
        &mut self.channels
    }

    /// Negotiated radio parameters
    pub fn settings(&self) -> &MacSettings {
        &self.settings
    }

    /// Current uplink data rate
    pub fn data_rate(&self) -> Option<DataRate> {
        self.region.data_rate(self.settings.data_rate)
    }

    /// Result of the last link check, if any
    pub fn link_check(&self) -> Option<LinkCheck> {
        self.link_check
    }

    /// Set the battery level reported in DevStatusAns
    pub fn set_battery_level(&mut self, battery: u8) {
        self.battery = battery;
    }

    /// Record the demodulation margin of the last received downlink
    pub fn set_last_margin(&mut self, margin: i8) {
        self.last_margin = margin;
    }

    /// Process a single MAC command received from the network
    ///
    /// Returns the answer to send back in the next uplink, if the command
    /// calls for one.
    pub fn process(&mut self, command: &MacCommand) -> Result<Option<MacCommand>, MacError> {
        trace!("Processing {}", command);
        let answer = match *command {
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                self.link_check = Some(LinkCheck {
                    margin,
                    gateway_count,
                });
                None
            }
            MacCommand::LinkADRReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => Some(self.handle_link_adr_req(data_rate, tx_power, ch_mask, ch_mask_cntl, nb_trans)?),
            MacCommand::DutyCycleReq { max_duty_cycle } => {
                self.channels
                    .set_aggregated_duty_cycle(commands::max_duty_cycle_fraction(max_duty_cycle))?;
                Some(MacCommand::DutyCycleAns)
            }
            MacCommand::RXParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                freq,
            } => Some(self.handle_rx_param_setup_req(rx1_dr_offset, rx2_data_rate, freq)),
            MacCommand::DevStatusReq => {
                let (min, max) = MARGIN_RANGE;
                Some(MacCommand::DevStatusAns {
                    battery: self.battery,
                    margin: self.last_margin.clamp(min, max),
                })
            }
            MacCommand::NewChannelReq {
                ch_index,
                freq,
                max_dr,
                min_dr,
            } => Some(self.handle_new_channel_req(ch_index, freq, min_dr, max_dr)?),
            MacCommand::RXTimingSetupReq { delay } => {
                self.settings.rx1_delay = commands::rx1_delay(delay);
                Some(MacCommand::RXTimingSetupAns)
            }
            MacCommand::TxParamSetupReq {
                downlink_dwell_time,
                uplink_dwell_time,
                max_eirp,
            } => {
                if self.region.supports_tx_param_setup() {
                    self.settings.tx_params = Some(TxParams {
                        downlink_dwell_time,
                        uplink_dwell_time,
                        max_eirp,
                    });
                    Some(MacCommand::TxParamSetupAns)
                } else {
                    debug!("TxParamSetupReq ignored in this region");
                    None
                }
            }
            MacCommand::DlChannelReq { ch_index, freq } => {
                Some(self.handle_dl_channel_req(ch_index, freq)?)
            }
            MacCommand::LinkCheckReq
            | MacCommand::LinkADRAns { .. }
            | MacCommand::DutyCycleAns
            | MacCommand::RXParamSetupAns { .. }
            | MacCommand::DevStatusAns { .. }
            | MacCommand::NewChannelAns { .. }
            | MacCommand::RXTimingSetupAns
            | MacCommand::TxParamSetupAns
            | MacCommand::DlChannelAns { .. } => {
                warn!("Unexpected uplink command {}", command);
                return Err(MacError::UnexpectedCommand(command.command_type()));
            }
        };
        Ok(answer)
    }

    /// Process every MAC command of a downlink FOpts field or port 0 payload
    ///
    /// Answers are appended to `answers`. Processing stops at the first
    /// malformed command, or at the first command whose answer would not fit
    /// in `answers`; commands before it have already been applied, the
    /// failing one has not. Returns the number of commands processed.
    pub fn handle_downlink<const N: usize>(
        &mut self,
        payload: &[u8],
        answers: &mut Vec<u8, N>,
    ) -> Result<usize, MacError> {
        let mut processed = 0;
        for command in MacCommandIterator::new(Direction::Downlink, payload) {
            let command = command.map_err(|err| {
                warn!("Malformed MAC command after {} commands: {}", processed, err);
                err
            })?;
            if answers.len() + self.answer_len(&command) > answers.capacity() {
                warn!("No room to answer {}", command);
                return Err(CommandError::BufferTooSmall.into());
            }
            if let Some(answer) = self.process(&command)? {
                answer.emit(answers)?;
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Account for an uplink of `airtime` on channel `channel_index` at `now`
    pub fn record_transmission(
        &mut self,
        airtime: Duration,
        channel_index: usize,
        now: Duration,
    ) -> Result<(), MacError> {
        let channel = *self
            .channels
            .channel(channel_index)
            .ok_or(ChannelError::IndexOutOfRange(channel_index))?;
        self.channels.add_event(airtime, &channel, now)?;
        self.last_channel = Some(channel_index);
        Ok(())
    }

    /// Pick the channel for the next uplink at `now`
    ///
    /// Channels are tried round robin starting after the last one used, so
    /// consecutive uplinks hop across the available channels. Returns `None`
    /// if no channel may be used at `now`.
    pub fn select_channel(&self, now: Duration) -> Option<usize> {
        let start = self.last_channel.map_or(0, |index| index + 1);
        let mut available = self.channels.available_channels(now).map(|(index, _)| index);
        let first = available.next()?;
        Some(
            core::iter::once(first)
                .chain(available)
                .find(|&index| index >= start)
                .unwrap_or(first),
        )
    }

    /// Shortest delay before any enabled channel may be used
    ///
    /// `None` if no enabled channel lies in a sub-band.
    pub fn time_until_transmission(&self, now: Duration) -> Option<Duration> {
        self.channels
            .enabled_channels()
            .filter_map(|channel| self.channels.transmission_delay(channel, now).ok())
            .min()
    }

    /// Output power for an uplink on `channel_index`
    ///
    /// The negotiated TX power, capped by the channel's sub-band limit.
    pub fn tx_power_dbm(&self, channel_index: usize) -> Result<i8, MacError> {
        let channel = self
            .channels
            .channel(channel_index)
            .ok_or(ChannelError::IndexOutOfRange(channel_index))?;
        let band_limit = self.channels.tx_power_for_channel(channel)?;
        Ok(self
            .region
            .tx_power_dbm(self.settings.tx_power)
            .map_or(band_limit, |power| power.min(band_limit)))
    }

    /// Encoded size of the answer `command` calls for
    fn answer_len(&self, command: &MacCommand) -> usize {
        match command.command_type() {
            CommandType::TxParamSetupReq if !self.region.supports_tx_param_setup() => 0,
            command_type => command_type
                .answer()
                .map_or(0, |answer| answer.payload_len() + 1),
        }
    }

    /// Mask of the channels that have a frequency
    fn defined_channels_mask(&self) -> u16 {
        let indices: Vec<u8, MAX_CHANNELS> = self
            .channels
            .channels()
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.frequency != 0)
            .map(|(index, _)| index as u8)
            .collect();
        commands::channel_mask_from_indices(&indices)
    }

    fn mask_supports_data_rate(&self, mask: u16, data_rate: u8) -> bool {
        self.channels
            .channels()
            .iter()
            .enumerate()
            .any(|(index, channel)| mask & (1 << index) != 0 && channel.supports_data_rate(data_rate))
    }

    /// Handle LinkADRReq
    fn handle_link_adr_req(
        &mut self,
        data_rate: u8,
        tx_power: u8,
        ch_mask: u16,
        ch_mask_cntl: u8,
        nb_trans: u8,
    ) -> Result<MacCommand, MacError> {
        let defined = self.defined_channels_mask();
        let current = self
            .channels
            .channels()
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.enabled)
            .fold(0u16, |mask, (index, _)| mask | (1 << index));

        // Resolve the requested mask against the channels we know
        let new_mask = match ch_mask_cntl {
            0 => Some(ch_mask),
            6 => Some(defined),
            _ => None,
        }
        .filter(|&mask| mask != 0 && mask & !defined == 0);
        let channel_mask_ack = new_mask.is_some();

        let data_rate_ack = data_rate == KEEP_CURRENT
            || (self.region.data_rate(data_rate).is_some()
                && self.mask_supports_data_rate(new_mask.unwrap_or(current), data_rate));
        let power_ack = tx_power == KEEP_CURRENT || self.region.tx_power_dbm(tx_power).is_some();

        if let (Some(mask), true, true) = (new_mask, data_rate_ack, power_ack) {
            for index in 0..self.channels.channels().len() {
                if mask & (1 << index) != 0 {
                    self.channels.enable_channel(index)?;
                } else {
                    self.channels.disable_channel(index)?;
                }
            }
            if data_rate != KEEP_CURRENT {
                self.settings.data_rate = data_rate;
            }
            if tx_power != KEEP_CURRENT {
                self.settings.tx_power = tx_power;
            }
            // 0 selects the default of a single transmission
            self.settings.nb_trans = nb_trans.max(1);
            info!(
                "ADR applied: mask {:x}, DR{}, TX power {}, NbTrans {}",
                mask, self.settings.data_rate, self.settings.tx_power, self.settings.nb_trans
            );
        } else {
            warn!(
                "LinkADRReq rejected: power {}, data rate {}, channel mask {}",
                power_ack, data_rate_ack, channel_mask_ack
            );
        }

        Ok(MacCommand::LinkADRAns {
            power_ack,
            data_rate_ack,
            channel_mask_ack,
        })
    }

    /// Handle RXParamSetupReq
    fn handle_rx_param_setup_req(
        &mut self,
        rx1_dr_offset: u8,
        rx2_data_rate: u8,
        freq: u32,
    ) -> MacCommand {
        let rx1_dr_offset_ack = rx1_dr_offset <= self.region.max_rx1_dr_offset();
        let rx2_data_rate_ack = self.region.data_rate(rx2_data_rate).is_some();
        let channel_ack = self.channels.sub_band_for_frequency(freq).is_ok();

        if rx1_dr_offset_ack && rx2_data_rate_ack && channel_ack {
            self.settings.rx1_dr_offset = rx1_dr_offset;
            self.settings.rx2_data_rate = rx2_data_rate;
            self.settings.rx2_frequency = freq;
            info!("RX2 set to {} Hz, DR{}", freq, rx2_data_rate);
        }

        MacCommand::RXParamSetupAns {
            rx1_dr_offset_ack,
            rx2_data_rate_ack,
            channel_ack,
        }
    }

    /// Handle NewChannelReq
    fn handle_new_channel_req(
        &mut self,
        ch_index: u8,
        freq: u32,
        min_dr: u8,
        max_dr: u8,
    ) -> Result<MacCommand, MacError> {
        let index = usize::from(ch_index);
        let protected = index < self.channels.default_channel_count() || index >= MAX_CHANNELS;

        if freq == 0 {
            // Zero frequency disables the channel
            if !protected && index < self.channels.channels().len() {
                self.channels.set_channel(index, LogicalChannel::placeholder())?;
            }
            return Ok(MacCommand::NewChannelAns {
                channel_freq_ok: !protected,
                data_rate_ok: true,
            });
        }

        let channel_freq_ok = !protected && self.channels.sub_band_for_frequency(freq).is_ok();
        let data_rate_ok = min_dr <= max_dr
            && self.region.data_rate(min_dr).is_some()
            && self.region.data_rate(max_dr).is_some();

        if channel_freq_ok && data_rate_ok {
            self.channels
                .define_channel(index, LogicalChannel::with_data_rates(freq, min_dr, max_dr))?;
        }

        Ok(MacCommand::NewChannelAns {
            channel_freq_ok,
            data_rate_ok,
        })
    }

    /// Handle DlChannelReq
    fn handle_dl_channel_req(&mut self, ch_index: u8, freq: u32) -> Result<MacCommand, MacError> {
        let index = usize::from(ch_index);
        let uplink = self
            .channels
            .channel(index)
            .copied()
            .filter(|channel| channel.frequency != 0);
        let uplink_freq_exists = uplink.is_some();
        let channel_freq_ok = self.channels.sub_band_for_frequency(freq).is_ok();

        if let (Some(mut channel), true) = (uplink, channel_freq_ok) {
            channel.downlink_frequency = Some(freq);
            self.channels.set_channel(index, channel)?;
        }

        Ok(MacCommand::DlChannelAns {
            channel_freq_ok,
            uplink_freq_exists,
        })
    }
}
