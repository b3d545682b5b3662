//! LoRaWAN MAC commands and duty cycle management in Rust
//!
//! This crate provides the device side of the LoRaWAN MAC layer for
//! `no_std` targets: it encodes and decodes the MAC commands exchanged with
//! the network server and keeps track of the logical channels and the
//! regulatory duty cycle budgets a device must respect.
//!
//! # Features
//! - Encoding and decoding of every LoRaWAN 1.0.x MAC command
//! - Logical channel management with a 16 bit channel mask
//! - Per sub-band and aggregated duty cycle accounting
//! - EU868 regional parameters
//! - Optional logging through `defmt` or `log`
//! - No heap allocation and no unsafe code
//!
//! Time is never read from a clock: operations take the current instant as a
//! [`Duration`](core::time::Duration) since an arbitrary epoch.
//!
//! # Example
//! ```
//! use core::time::Duration;
//! use heapless::Vec;
//! use lorawan::lorawan::{MacCommand, MacLayer, EU868};
//!
//! let mut mac = MacLayer::new(EU868::new()).unwrap();
//!
//! // Network limits the device to 1/128 of the time
//! let mut downlink: Vec<u8, 16> = Vec::new();
//! MacCommand::duty_cycle_req(7).unwrap().emit(&mut downlink).unwrap();
//!
//! let mut answers: Vec<u8, 16> = Vec::new();
//! mac.handle_downlink(&downlink, &mut answers).unwrap();
//! assert_eq!(answers.as_slice(), &[0x04]);
//!
//! // Transmit, then ask how long to wait before the next uplink
//! let now = Duration::ZERO;
//! let channel = mac.select_channel(now).unwrap();
//! mac.record_transmission(Duration::from_millis(100), channel, now).unwrap();
//! assert_eq!(mac.time_until_transmission(now), Some(Duration::from_millis(12_700)));
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod utils;

/// Channel plan and MAC parameter configuration
pub mod config;

/// LoRaWAN MAC layer implementation
pub mod lorawan;
