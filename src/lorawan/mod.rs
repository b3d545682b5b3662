//! LoRaWAN MAC layer implementation
//!
//! This module contains the device side of the LoRaWAN MAC layer, including:
//! - MAC command encoding and decoding
//! - Logical channels and regulatory sub-bands
//! - Duty cycle accounting
//! - Regional parameters
//! - Command handling

/// MAC command encoding and decoding
pub mod commands;

/// Logical uplink channels
pub mod channel;

/// Regulatory sub-bands
pub mod sub_band;

/// Duty cycle cooldown timers
pub mod duty_cycle;

/// Channel and duty cycle manager
pub mod channel_manager;

/// MAC layer implementation
pub mod mac;

/// Regional parameters and configurations
pub mod region;

pub use channel::LogicalChannel;
pub use channel_manager::{ChannelError, ChannelManager};
pub use commands::{CommandError, CommandType, Direction, MacCommand, MacCommandIterator};
pub use mac::{LinkCheck, MacError, MacLayer};
pub use region::{DataRate, Region, EU868};
pub use sub_band::SubBand;
