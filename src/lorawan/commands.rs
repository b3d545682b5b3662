//! MAC command codec
//!
//! Every command travels as a one byte CID followed by a fixed-size body.
//! The CID alone is ambiguous: LoRaWAN reuses it for a request and its
//! answer, which travel in opposite directions. Parsing is therefore keyed on
//! the [`Direction`] of the frame the payload was taken from.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

/// Largest encoded command: NewChannelReq, CID plus five body bytes
pub const MAX_COMMAND_LEN: usize = 6;

/// Number of channels addressed by a LinkADRReq channel mask
pub const CHANNEL_MASK_BITS: usize = 16;

/// Highest frequency the 24-bit frequency field can carry, in Hz
pub const MAX_ENCODED_FREQUENCY: u32 = 0x00FF_FFFF * 100;

/// Direction a MAC command travels in
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// End device to network server
    Uplink,
    /// Network server to end device
    Downlink,
}

/// MAC command types
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Link check request
    LinkCheckReq,
    /// Link check answer
    LinkCheckAns,
    /// Link ADR request
    LinkADRReq,
    /// Link ADR answer
    LinkADRAns,
    /// Duty cycle request
    DutyCycleReq,
    /// Duty cycle answer
    DutyCycleAns,
    /// RX parameter setup request
    RXParamSetupReq,
    /// RX parameter setup answer
    RXParamSetupAns,
    /// Device status request
    DevStatusReq,
    /// Device status answer
    DevStatusAns,
    /// New channel request
    NewChannelReq,
    /// New channel answer
    NewChannelAns,
    /// RX timing setup request
    RXTimingSetupReq,
    /// RX timing setup answer
    RXTimingSetupAns,
    /// TX parameter setup request
    TxParamSetupReq,
    /// TX parameter setup answer
    TxParamSetupAns,
    /// Downlink channel request
    DlChannelReq,
    /// Downlink channel answer
    DlChannelAns,
}

impl CommandType {
    /// Every command type, in CID order
    pub const ALL: [CommandType; 18] = [
        CommandType::LinkCheckReq,
        CommandType::LinkCheckAns,
        CommandType::LinkADRReq,
        CommandType::LinkADRAns,
        CommandType::DutyCycleReq,
        CommandType::DutyCycleAns,
        CommandType::RXParamSetupReq,
        CommandType::RXParamSetupAns,
        CommandType::DevStatusReq,
        CommandType::DevStatusAns,
        CommandType::NewChannelReq,
        CommandType::NewChannelAns,
        CommandType::RXTimingSetupReq,
        CommandType::RXTimingSetupAns,
        CommandType::TxParamSetupReq,
        CommandType::TxParamSetupAns,
        CommandType::DlChannelReq,
        CommandType::DlChannelAns,
    ];

    /// Command identifier byte
    pub const fn cid(self) -> u8 {
        match self {
            CommandType::LinkCheckReq | CommandType::LinkCheckAns => 0x02,
            CommandType::LinkADRReq | CommandType::LinkADRAns => 0x03,
            CommandType::DutyCycleReq | CommandType::DutyCycleAns => 0x04,
            CommandType::RXParamSetupReq | CommandType::RXParamSetupAns => 0x05,
            CommandType::DevStatusReq | CommandType::DevStatusAns => 0x06,
            CommandType::NewChannelReq | CommandType::NewChannelAns => 0x07,
            CommandType::RXTimingSetupReq | CommandType::RXTimingSetupAns => 0x08,
            CommandType::TxParamSetupReq | CommandType::TxParamSetupAns => 0x09,
            CommandType::DlChannelReq | CommandType::DlChannelAns => 0x0A,
        }
    }

    /// Direction this command is sent in
    pub const fn direction(self) -> Direction {
        match self {
            // LinkCheck is the only exchange initiated by the device
            CommandType::LinkCheckReq => Direction::Uplink,
            CommandType::LinkCheckAns => Direction::Downlink,
            CommandType::LinkADRReq
            | CommandType::DutyCycleReq
            | CommandType::RXParamSetupReq
            | CommandType::DevStatusReq
            | CommandType::NewChannelReq
            | CommandType::RXTimingSetupReq
            | CommandType::TxParamSetupReq
            | CommandType::DlChannelReq => Direction::Downlink,
            CommandType::LinkADRAns
            | CommandType::DutyCycleAns
            | CommandType::RXParamSetupAns
            | CommandType::DevStatusAns
            | CommandType::NewChannelAns
            | CommandType::RXTimingSetupAns
            | CommandType::TxParamSetupAns
            | CommandType::DlChannelAns => Direction::Uplink,
        }
    }

    /// Look up the command type carried by `cid` in a frame travelling in `direction`
    pub fn from_cid(cid: u8, direction: Direction) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.cid() == cid && ty.direction() == direction)
    }

    /// Answer type a device sends back for this request, if any
    pub const fn answer(self) -> Option<Self> {
        match self {
            CommandType::LinkADRReq => Some(CommandType::LinkADRAns),
            CommandType::DutyCycleReq => Some(CommandType::DutyCycleAns),
            CommandType::RXParamSetupReq => Some(CommandType::RXParamSetupAns),
            CommandType::DevStatusReq => Some(CommandType::DevStatusAns),
            CommandType::NewChannelReq => Some(CommandType::NewChannelAns),
            CommandType::RXTimingSetupReq => Some(CommandType::RXTimingSetupAns),
            CommandType::TxParamSetupReq => Some(CommandType::TxParamSetupAns),
            CommandType::DlChannelReq => Some(CommandType::DlChannelAns),
            _ => None,
        }
    }

    /// Body length in bytes, excluding the CID
    pub const fn payload_len(self) -> usize {
        match self {
            CommandType::LinkCheckReq => 0,
            CommandType::LinkCheckAns => 2,
            CommandType::LinkADRReq => 4,
            CommandType::LinkADRAns => 1,
            CommandType::DutyCycleReq => 1,
            CommandType::DutyCycleAns => 0,
            CommandType::RXParamSetupReq => 4,
            CommandType::RXParamSetupAns => 1,
            CommandType::DevStatusReq => 0,
            CommandType::DevStatusAns => 2,
            CommandType::NewChannelReq => 5,
            CommandType::NewChannelAns => 1,
            CommandType::RXTimingSetupReq => 1,
            CommandType::RXTimingSetupAns => 0,
            CommandType::TxParamSetupReq => 1,
            CommandType::TxParamSetupAns => 0,
            CommandType::DlChannelReq => 4,
            CommandType::DlChannelAns => 1,
        }
    }
}

/// MAC command codec error
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// No CID left to read
    Empty,
    /// CID not registered for the frame direction
    UnknownCid(u8),
    /// Fewer body bytes than the command requires
    Truncated {
        /// Command being parsed
        command: CommandType,
        /// Body bytes required
        expected: usize,
        /// Body bytes present
        available: usize,
    },
    /// Field outside its encodable range
    InvalidValue,
    /// Output buffer cannot hold the encoded command
    BufferTooSmall,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty MAC command payload"),
            CommandError::UnknownCid(cid) => write!(f, "unknown CID {:#04x}", cid),
            CommandError::Truncated {
                command,
                expected,
                available,
            } => write!(
                f,
                "{:?} needs {} body bytes, {} available",
                command, expected, available
            ),
            CommandError::InvalidValue => write!(f, "field value out of range"),
            CommandError::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

/// MAC command
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacCommand {
    /// Link check request
    LinkCheckReq,
    /// Link check answer
    LinkCheckAns {
        /// Link margin in dB
        margin: u8,
        /// Number of gateways that received the request
        gateway_count: u8,
    },
    /// Link ADR request
    LinkADRReq {
        /// Data rate (0-15)
        data_rate: u8,
        /// TX power (0-15)
        tx_power: u8,
        /// Channel mask
        ch_mask: u16,
        /// Channel mask control (0-7)
        ch_mask_cntl: u8,
        /// Number of transmissions (0-15)
        nb_trans: u8,
    },
    /// Link ADR answer
    LinkADRAns {
        /// Power ACK
        power_ack: bool,
        /// Data rate ACK
        data_rate_ack: bool,
        /// Channel mask ACK
        channel_mask_ack: bool,
    },
    /// Duty cycle request
    DutyCycleReq {
        /// Maximum duty cycle exponent (0-15), see [`max_duty_cycle_fraction`]
        max_duty_cycle: u8,
    },
    /// Duty cycle answer
    DutyCycleAns,
    /// RX parameter setup request
    RXParamSetupReq {
        /// RX1 data rate offset (0-7)
        rx1_dr_offset: u8,
        /// RX2 data rate (0-15)
        rx2_data_rate: u8,
        /// RX2 frequency in Hz, multiple of 100
        freq: u32,
    },
    /// RX parameter setup answer
    RXParamSetupAns {
        /// RX1 data rate offset ACK
        rx1_dr_offset_ack: bool,
        /// RX2 data rate ACK
        rx2_data_rate_ack: bool,
        /// Channel ACK
        channel_ack: bool,
    },
    /// Device status request
    DevStatusReq,
    /// Device status answer
    DevStatusAns {
        /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
        battery: u8,
        /// Demodulation margin of the last DevStatusReq in dB (-32..=31)
        margin: i8,
    },
    /// New channel request
    NewChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz, multiple of 100. Zero disables the channel.
        freq: u32,
        /// Maximum data rate (0-15)
        max_dr: u8,
        /// Minimum data rate (0-15)
        min_dr: u8,
    },
    /// New channel answer
    NewChannelAns {
        /// Channel frequency OK
        channel_freq_ok: bool,
        /// Data rate range OK
        data_rate_ok: bool,
    },
    /// RX timing setup request
    RXTimingSetupReq {
        /// Delay (0-15), see [`rx1_delay`]
        delay: u8,
    },
    /// RX timing setup answer
    RXTimingSetupAns,
    /// TX parameter setup request
    TxParamSetupReq {
        /// Downlink dwell time
        downlink_dwell_time: bool,
        /// Uplink dwell time
        uplink_dwell_time: bool,
        /// Maximum EIRP index (0-15)
        max_eirp: u8,
    },
    /// TX parameter setup answer
    TxParamSetupAns,
    /// Downlink channel request
    DlChannelReq {
        /// Channel index
        ch_index: u8,
        /// Downlink frequency in Hz, multiple of 100
        freq: u32,
    },
    /// Downlink channel answer
    DlChannelAns {
        /// Channel frequency OK
        channel_freq_ok: bool,
        /// Uplink frequency exists
        uplink_freq_exists: bool,
    },
}

fn check(condition: bool) -> Result<(), CommandError> {
    if condition {
        Ok(())
    } else {
        Err(CommandError::InvalidValue)
    }
}

fn frequency_is_encodable(freq: u32) -> bool {
    freq % 100 == 0 && freq <= MAX_ENCODED_FREQUENCY
}

/// 24-bit little-endian count of 100 Hz steps, as on the LoRaWAN wire
fn encode_frequency(freq: u32) -> [u8; 3] {
    let units = freq / 100;
    [units as u8, (units >> 8) as u8, (units >> 16) as u8]
}

fn decode_frequency(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) * 100
}

fn flag(byte: u8, bit: u8) -> bool {
    byte & (1 << bit) != 0
}

fn flags(bits: &[(bool, u8)]) -> u8 {
    bits.iter()
        .filter(|(set, _)| *set)
        .fold(0, |byte, (_, bit)| byte | (1 << bit))
}

impl MacCommand {
    /// Checked LinkADRReq constructor
    pub fn link_adr_req(
        data_rate: u8,
        tx_power: u8,
        ch_mask: u16,
        ch_mask_cntl: u8,
        nb_trans: u8,
    ) -> Result<Self, CommandError> {
        check(data_rate <= 0x0F && tx_power <= 0x0F && ch_mask_cntl <= 0x07 && nb_trans <= 0x0F)?;
        Ok(MacCommand::LinkADRReq {
            data_rate,
            tx_power,
            ch_mask,
            ch_mask_cntl,
            nb_trans,
        })
    }

    /// Checked DutyCycleReq constructor
    pub fn duty_cycle_req(max_duty_cycle: u8) -> Result<Self, CommandError> {
        check(max_duty_cycle <= 0x0F)?;
        Ok(MacCommand::DutyCycleReq { max_duty_cycle })
    }

    /// Checked RXParamSetupReq constructor
    pub fn rx_param_setup_req(
        rx1_dr_offset: u8,
        rx2_data_rate: u8,
        freq: u32,
    ) -> Result<Self, CommandError> {
        check(rx1_dr_offset <= 0x07 && rx2_data_rate <= 0x0F && frequency_is_encodable(freq))?;
        Ok(MacCommand::RXParamSetupReq {
            rx1_dr_offset,
            rx2_data_rate,
            freq,
        })
    }

    /// Checked DevStatusAns constructor
    pub fn dev_status_ans(battery: u8, margin: i8) -> Result<Self, CommandError> {
        check((-32..=31).contains(&margin))?;
        Ok(MacCommand::DevStatusAns { battery, margin })
    }

    /// Checked NewChannelReq constructor
    ///
    /// The data rate range is only checked for width here; whether
    /// `min_dr <= max_dr` is a decision for the receiving device.
    pub fn new_channel_req(
        ch_index: u8,
        freq: u32,
        min_dr: u8,
        max_dr: u8,
    ) -> Result<Self, CommandError> {
        check(frequency_is_encodable(freq) && min_dr <= 0x0F && max_dr <= 0x0F)?;
        Ok(MacCommand::NewChannelReq {
            ch_index,
            freq,
            max_dr,
            min_dr,
        })
    }

    /// Checked RXTimingSetupReq constructor
    pub fn rx_timing_setup_req(delay: u8) -> Result<Self, CommandError> {
        check(delay <= 0x0F)?;
        Ok(MacCommand::RXTimingSetupReq { delay })
    }

    /// Checked TxParamSetupReq constructor
    pub fn tx_param_setup_req(
        downlink_dwell_time: bool,
        uplink_dwell_time: bool,
        max_eirp: u8,
    ) -> Result<Self, CommandError> {
        check(max_eirp <= 0x0F)?;
        Ok(MacCommand::TxParamSetupReq {
            downlink_dwell_time,
            uplink_dwell_time,
            max_eirp,
        })
    }

    /// Checked DlChannelReq constructor
    pub fn dl_channel_req(ch_index: u8, freq: u32) -> Result<Self, CommandError> {
        check(frequency_is_encodable(freq))?;
        Ok(MacCommand::DlChannelReq { ch_index, freq })
    }

    /// Command type of this command
    pub fn command_type(&self) -> CommandType {
        match self {
            MacCommand::LinkCheckReq => CommandType::LinkCheckReq,
            MacCommand::LinkCheckAns { .. } => CommandType::LinkCheckAns,
            MacCommand::LinkADRReq { .. } => CommandType::LinkADRReq,
            MacCommand::LinkADRAns { .. } => CommandType::LinkADRAns,
            MacCommand::DutyCycleReq { .. } => CommandType::DutyCycleReq,
            MacCommand::DutyCycleAns => CommandType::DutyCycleAns,
            MacCommand::RXParamSetupReq { .. } => CommandType::RXParamSetupReq,
            MacCommand::RXParamSetupAns { .. } => CommandType::RXParamSetupAns,
            MacCommand::DevStatusReq => CommandType::DevStatusReq,
            MacCommand::DevStatusAns { .. } => CommandType::DevStatusAns,
            MacCommand::NewChannelReq { .. } => CommandType::NewChannelReq,
            MacCommand::NewChannelAns { .. } => CommandType::NewChannelAns,
            MacCommand::RXTimingSetupReq { .. } => CommandType::RXTimingSetupReq,
            MacCommand::RXTimingSetupAns => CommandType::RXTimingSetupAns,
            MacCommand::TxParamSetupReq { .. } => CommandType::TxParamSetupReq,
            MacCommand::TxParamSetupAns => CommandType::TxParamSetupAns,
            MacCommand::DlChannelReq { .. } => CommandType::DlChannelReq,
            MacCommand::DlChannelAns { .. } => CommandType::DlChannelAns,
        }
    }

    /// Command identifier byte
    pub fn cid(&self) -> u8 {
        self.command_type().cid()
    }

    /// Body length in bytes, excluding the CID
    pub fn payload_len(&self) -> usize {
        self.command_type().payload_len()
    }

    /// Encoded length in bytes, including the CID
    pub fn wire_len(&self) -> usize {
        self.payload_len() + 1
    }

    /// Channels enabled by a LinkADRReq mask, `None` for other commands
    pub fn enabled_channels(&self) -> Option<Vec<u8, CHANNEL_MASK_BITS>> {
        match *self {
            MacCommand::LinkADRReq { ch_mask, .. } => Some(enabled_channels_from_mask(ch_mask)),
            _ => None,
        }
    }

    /// Duty cycle fraction requested by a DutyCycleReq
    pub fn max_duty_cycle_fraction(&self) -> Option<f64> {
        match *self {
            MacCommand::DutyCycleReq { max_duty_cycle } => {
                Some(max_duty_cycle_fraction(max_duty_cycle))
            }
            _ => None,
        }
    }

    /// RX1 delay requested by a RXTimingSetupReq
    pub fn rx1_delay(&self) -> Option<Duration> {
        match *self {
            MacCommand::RXTimingSetupReq { delay } => Some(rx1_delay(delay)),
            _ => None,
        }
    }

    /// Parse the command at the start of `buffer`
    ///
    /// Returns the command and the number of bytes consumed, which is always
    /// [`MacCommand::wire_len`].
    pub fn from_bytes(direction: Direction, buffer: &[u8]) -> Result<(Self, usize), CommandError> {
        let (&cid, body) = buffer.split_first().ok_or(CommandError::Empty)?;
        let command_type =
            CommandType::from_cid(cid, direction).ok_or(CommandError::UnknownCid(cid))?;
        let command = Self::parse_payload(command_type, body)?;
        Ok((command, command.wire_len()))
    }

    /// Parse a command body whose CID has already been consumed
    ///
    /// Bytes past [`CommandType::payload_len`] are ignored.
    pub fn parse_payload(command_type: CommandType, payload: &[u8]) -> Result<Self, CommandError> {
        let expected = command_type.payload_len();
        if payload.len() < expected {
            return Err(CommandError::Truncated {
                command: command_type,
                expected,
                available: payload.len(),
            });
        }
        let p = &payload[..expected];

        let command = match command_type {
            CommandType::LinkCheckReq => MacCommand::LinkCheckReq,
            CommandType::LinkCheckAns => MacCommand::LinkCheckAns {
                margin: p[0],
                gateway_count: p[1],
            },
            CommandType::LinkADRReq => MacCommand::LinkADRReq {
                data_rate: p[0] >> 4,
                tx_power: p[0] & 0x0F,
                ch_mask: u16::from_le_bytes([p[1], p[2]]),
                ch_mask_cntl: (p[3] >> 4) & 0x07,
                nb_trans: p[3] & 0x0F,
            },
            CommandType::LinkADRAns => MacCommand::LinkADRAns {
                power_ack: flag(p[0], 2),
                data_rate_ack: flag(p[0], 1),
                channel_mask_ack: flag(p[0], 0),
            },
            CommandType::DutyCycleReq => MacCommand::DutyCycleReq {
                max_duty_cycle: p[0] & 0x0F,
            },
            CommandType::DutyCycleAns => MacCommand::DutyCycleAns,
            CommandType::RXParamSetupReq => MacCommand::RXParamSetupReq {
                rx1_dr_offset: (p[0] >> 4) & 0x07,
                rx2_data_rate: p[0] & 0x0F,
                freq: decode_frequency(&p[1..4]),
            },
            CommandType::RXParamSetupAns => MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack: flag(p[0], 2),
                rx2_data_rate_ack: flag(p[0], 1),
                channel_ack: flag(p[0], 0),
            },
            CommandType::DevStatusReq => MacCommand::DevStatusReq,
            CommandType::DevStatusAns => MacCommand::DevStatusAns {
                battery: p[0],
                // sign-extend the 6-bit field
                margin: ((p[1] << 2) as i8) >> 2,
            },
            CommandType::NewChannelReq => MacCommand::NewChannelReq {
                ch_index: p[0],
                freq: decode_frequency(&p[1..4]),
                max_dr: p[4] >> 4,
                min_dr: p[4] & 0x0F,
            },
            CommandType::NewChannelAns => MacCommand::NewChannelAns {
                data_rate_ok: flag(p[0], 1),
                channel_freq_ok: flag(p[0], 0),
            },
            CommandType::RXTimingSetupReq => MacCommand::RXTimingSetupReq {
                delay: p[0] & 0x0F,
            },
            CommandType::RXTimingSetupAns => MacCommand::RXTimingSetupAns,
            CommandType::TxParamSetupReq => MacCommand::TxParamSetupReq {
                downlink_dwell_time: flag(p[0], 5),
                uplink_dwell_time: flag(p[0], 4),
                max_eirp: p[0] & 0x0F,
            },
            CommandType::TxParamSetupAns => MacCommand::TxParamSetupAns,
            CommandType::DlChannelReq => MacCommand::DlChannelReq {
                ch_index: p[0],
                freq: decode_frequency(&p[1..4]),
            },
            CommandType::DlChannelAns => MacCommand::DlChannelAns {
                uplink_freq_exists: flag(p[0], 1),
                channel_freq_ok: flag(p[0], 0),
            },
        };

        Ok(command)
    }

    /// Encode CID and body
    ///
    /// Fields wider than their wire representation are truncated to it;
    /// the checked constructors keep them in range.
    pub fn to_bytes(&self) -> Vec<u8, MAX_COMMAND_LEN> {
        let mut bytes = [0u8; MAX_COMMAND_LEN];
        bytes[0] = self.cid();
        let body = &mut bytes[1..];

        match *self {
            MacCommand::LinkCheckReq
            | MacCommand::DutyCycleAns
            | MacCommand::DevStatusReq
            | MacCommand::RXTimingSetupAns
            | MacCommand::TxParamSetupAns => {}
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                body[0] = margin;
                body[1] = gateway_count;
            }
            MacCommand::LinkADRReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => {
                body[0] = (data_rate << 4) | (tx_power & 0x0F);
                body[1..3].copy_from_slice(&ch_mask.to_le_bytes());
                body[3] = ((ch_mask_cntl & 0x07) << 4) | (nb_trans & 0x0F);
            }
            MacCommand::LinkADRAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => {
                body[0] = flags(&[(power_ack, 2), (data_rate_ack, 1), (channel_mask_ack, 0)]);
            }
            MacCommand::DutyCycleReq { max_duty_cycle } => {
                body[0] = max_duty_cycle & 0x0F;
            }
            MacCommand::RXParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                freq,
            } => {
                body[0] = ((rx1_dr_offset & 0x07) << 4) | (rx2_data_rate & 0x0F);
                body[1..4].copy_from_slice(&encode_frequency(freq));
            }
            MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => {
                body[0] = flags(&[(rx1_dr_offset_ack, 2), (rx2_data_rate_ack, 1), (channel_ack, 0)]);
            }
            MacCommand::DevStatusAns { battery, margin } => {
                body[0] = battery;
                body[1] = (margin as u8) & 0x3F;
            }
            MacCommand::NewChannelReq {
                ch_index,
                freq,
                max_dr,
                min_dr,
            } => {
                body[0] = ch_index;
                body[1..4].copy_from_slice(&encode_frequency(freq));
                body[4] = (max_dr << 4) | (min_dr & 0x0F);
            }
            MacCommand::NewChannelAns {
                channel_freq_ok,
                data_rate_ok,
            } => {
                body[0] = flags(&[(data_rate_ok, 1), (channel_freq_ok, 0)]);
            }
            MacCommand::RXTimingSetupReq { delay } => {
                body[0] = delay & 0x0F;
            }
            MacCommand::TxParamSetupReq {
                downlink_dwell_time,
                uplink_dwell_time,
                max_eirp,
            } => {
                body[0] = flags(&[(downlink_dwell_time, 5), (uplink_dwell_time, 4)]) | (max_eirp & 0x0F);
            }
            MacCommand::DlChannelReq { ch_index, freq } => {
                body[0] = ch_index;
                body[1..4].copy_from_slice(&encode_frequency(freq));
            }
            MacCommand::DlChannelAns {
                channel_freq_ok,
                uplink_freq_exists,
            } => {
                body[0] = flags(&[(uplink_freq_exists, 1), (channel_freq_ok, 0)]);
            }
        }

        let mut out = Vec::new();
        // wire_len() never exceeds MAX_COMMAND_LEN
        let _ = out.extend_from_slice(&bytes[..self.wire_len()]);
        out
    }

    /// Append the encoded command to a frame payload
    ///
    /// Leaves `out` untouched when the command does not fit.
    pub fn emit<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<usize, CommandError> {
        let bytes = self.to_bytes();
        out.extend_from_slice(&bytes)
            .map_err(|_| CommandError::BufferTooSmall)?;
        Ok(bytes.len())
    }
}

impl fmt::Display for MacCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MacCommand::LinkCheckReq => write!(f, "LinkCheckReq"),
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => write!(f, "LinkCheckAns(Margin={} dB, GwCnt={})", margin, gateway_count),
            MacCommand::LinkADRReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => write!(
                f,
                "LinkADRReq(DataRate={}, TXPower={}, ChMask={:#06x}, ChMaskCntl={}, NbTrans={})",
                data_rate, tx_power, ch_mask, ch_mask_cntl, nb_trans
            ),
            MacCommand::LinkADRAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => write!(
                f,
                "LinkADRAns(PowerACK={}, DataRateACK={}, ChannelMaskACK={})",
                power_ack, data_rate_ack, channel_mask_ack
            ),
            MacCommand::DutyCycleReq { max_duty_cycle } => write!(
                f,
                "DutyCycleReq(MaxDCycle={}, fraction={})",
                max_duty_cycle,
                max_duty_cycle_fraction(max_duty_cycle)
            ),
            MacCommand::DutyCycleAns => write!(f, "DutyCycleAns"),
            MacCommand::RXParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                freq,
            } => write!(
                f,
                "RXParamSetupReq(RX1DROffset={}, RX2DataRate={}, Frequency={} Hz)",
                rx1_dr_offset, rx2_data_rate, freq
            ),
            MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => write!(
                f,
                "RXParamSetupAns(RX1DROffsetACK={}, RX2DataRateACK={}, ChannelACK={})",
                rx1_dr_offset_ack, rx2_data_rate_ack, channel_ack
            ),
            MacCommand::DevStatusReq => write!(f, "DevStatusReq"),
            MacCommand::DevStatusAns { battery, margin } => {
                write!(f, "DevStatusAns(Battery={}, Margin={} dB)", battery, margin)
            }
            MacCommand::NewChannelReq {
                ch_index,
                freq,
                max_dr,
                min_dr,
            } => write!(
                f,
                "NewChannelReq(ChIndex={}, Frequency={} Hz, MinDR={}, MaxDR={})",
                ch_index, freq, min_dr, max_dr
            ),
            MacCommand::NewChannelAns {
                channel_freq_ok,
                data_rate_ok,
            } => write!(
                f,
                "NewChannelAns(DataRateRangeOK={}, ChannelFrequencyOK={})",
                data_rate_ok, channel_freq_ok
            ),
            MacCommand::RXTimingSetupReq { delay } => {
                write!(f, "RXTimingSetupReq(Del={})", delay)
            }
            MacCommand::RXTimingSetupAns => write!(f, "RXTimingSetupAns"),
            MacCommand::TxParamSetupReq {
                downlink_dwell_time,
                uplink_dwell_time,
                max_eirp,
            } => write!(
                f,
                "TxParamSetupReq(DownlinkDwellTime={}, UplinkDwellTime={}, MaxEIRP={})",
                downlink_dwell_time, uplink_dwell_time, max_eirp
            ),
            MacCommand::TxParamSetupAns => write!(f, "TxParamSetupAns"),
            MacCommand::DlChannelReq { ch_index, freq } => {
                write!(f, "DlChannelReq(ChIndex={}, Frequency={} Hz)", ch_index, freq)
            }
            MacCommand::DlChannelAns {
                channel_freq_ok,
                uplink_freq_exists,
            } => write!(
                f,
                "DlChannelAns(UplinkFrequencyExists={}, ChannelFrequencyOK={})",
                uplink_freq_exists, channel_freq_ok
            ),
        }
    }
}

/// Channel indices enabled by a channel mask, in ascending order
pub fn enabled_channels_from_mask(mask: u16) -> Vec<u8, CHANNEL_MASK_BITS> {
    (0..CHANNEL_MASK_BITS as u8)
        .filter(|bit| mask & (1 << bit) != 0)
        .collect()
}

/// Channel mask enabling exactly `indices`; indices above 15 are ignored
pub fn channel_mask_from_indices(indices: &[u8]) -> u16 {
    indices
        .iter()
        .filter(|&&index| (index as usize) < CHANNEL_MASK_BITS)
        .fold(0, |mask, &index| mask | (1 << index))
}

/// Aggregated duty cycle fraction encoded by a DutyCycleReq
///
/// The device may use at most `1 / 2^max_duty_cycle` of the time; 0 lifts the
/// restriction.
pub fn max_duty_cycle_fraction(max_duty_cycle: u8) -> f64 {
    1.0 / f64::from(1u32 << (max_duty_cycle & 0x0F))
}

/// RX1 delay encoded by a RXTimingSetupReq; both 0 and 1 mean one second
pub fn rx1_delay(delay: u8) -> Duration {
    Duration::from_secs(u64::from((delay & 0x0F).max(1)))
}

/// Iterator over the MAC commands packed back-to-back in a payload
///
/// A malformed command ends the iteration: its error is yielded once and
/// nothing after it is read.
#[derive(Debug, Clone)]
pub struct MacCommandIterator<'a> {
    direction: Direction,
    data: &'a [u8],
    failed: bool,
}

impl<'a> MacCommandIterator<'a> {
    /// Iterate over the commands in `data`, a payload travelling in `direction`
    pub fn new(direction: Direction, data: &'a [u8]) -> Self {
        Self {
            direction,
            data,
            failed: false,
        }
    }
}

impl Iterator for MacCommandIterator<'_> {
    type Item = Result<MacCommand, CommandError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        match MacCommand::from_bytes(self.direction, self.data) {
            Ok((command, consumed)) => {
                self.data = &self.data[consumed..];
                Some(Ok(command))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Encode `commands` back-to-back into `out`
///
/// Either every command is written or, if they do not all fit, none is.
pub fn write_commands<const N: usize>(
    commands: &[MacCommand],
    out: &mut Vec<u8, N>,
) -> Result<usize, CommandError> {
    let total: usize = commands.iter().map(MacCommand::wire_len).sum();
    if out.len() + total > out.capacity() {
        return Err(CommandError::BufferTooSmall);
    }
    for command in commands {
        command.emit(out)?;
    }
    Ok(total)
}
