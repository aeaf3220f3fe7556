//! # Decoded Telemetry Records
//!
//! Payloads handed to the core by the (external) CRSF frame parser.

use serde::{Deserialize, Serialize};

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Lowest channel tick emitted by a CRSF receiver (stick fully low)
pub const CRSF_TICK_MIN: u16 = 988;

/// Highest channel tick emitted by a CRSF receiver (stick fully high)
pub const CRSF_TICK_MAX: u16 = 2012;

/// Width of the usable tick range
pub const CRSF_TICK_SPAN: u16 = CRSF_TICK_MAX - CRSF_TICK_MIN;

/// Neutral stick value used when a channel is missing
pub const CRSF_TICK_CENTER: u16 = 1500;

/// RC channels array type (16 channels)
pub type RcChannels = [u16; CRSF_NUM_CHANNELS];

/// Channel indices for semantic access (AETR order).
pub mod channels {
    /// Roll
    pub const ROLL: usize = 0;
    /// Pitch
    pub const PITCH: usize = 1;
    /// Throttle
    pub const THROTTLE: usize = 2;
    /// Yaw
    pub const YAW: usize = 3;
}

/// RC channel values from the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelsData {
    pub channels: RcChannels,
}

impl ChannelsData {
    pub fn new(channels: RcChannels) -> Self {
        Self { channels }
    }

    /// Value of channel `idx`, or 0 if the index is out of range
    pub fn channel(&self, idx: usize) -> u16 {
        self.channels.get(idx).copied().unwrap_or(0)
    }
}

impl Default for ChannelsData {
    fn default() -> Self {
        Self { channels: [CRSF_TICK_CENTER; CRSF_NUM_CHANNELS] }
    }
}

/// Flight controller mode string (e.g. "ACRO", "!ERR", "WAIT")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightModeData {
    pub mode: String,
}

/// Battery sensor telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryData {
    /// Battery voltage in volts
    pub voltage: f32,

    /// Current draw in amperes
    pub current: f32,

    /// Capacity used in mAh
    #[serde(default)]
    pub capacity_used: u32,

    /// Battery remaining percentage (0-100%)
    #[serde(default)]
    pub remaining: u8,
}

/// Link statistics telemetry data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatisticsData {
    /// Uplink RSSI (antenna 1) in -dBm
    pub uplink_rssi_1: u8,

    /// Uplink RSSI (antenna 2) in -dBm (diversity)
    pub uplink_rssi_2: u8,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power (encoded)
    pub uplink_tx_power: u8,

    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}
