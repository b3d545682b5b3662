//! Device and channel plan configuration
//!
//! This module contains the configuration a device is set up with once:
//! - Regional channel plan (default channels, sub-bands, duty cycles)
//! - Negotiable MAC parameters and their initial values

/// Regional channel plans
pub mod channel_plan;

/// MAC parameters
pub mod mac;

pub use channel_plan::{ChannelPlan, SubBandPlan};
pub use mac::MacSettings;
