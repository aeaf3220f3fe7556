//! Battery and stick samplers.

use std::time::Duration;

use super::Sampler;
use crate::sensor::types::{channels, BatteryData, ChannelsData};
use crate::store::{BatterySample, StickSample};

/// Recommended stick resample period (50 Hz)
pub const STICK_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// One battery sample per telemetry update.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatterySampler;

impl Sampler<BatteryData> for BatterySampler {
    type Sample = BatterySample;

    fn on_update(&mut self, data: &BatteryData) -> Option<BatterySample> {
        Some(BatterySample {
            voltage: data.voltage,
            amperage: data.current,
        })
    }
}

/// Averages roll/pitch/throttle/yaw over fixed windows.
///
/// Channel frames arrive at 150+Hz; each tick emits the mean of the frames
/// seen since the previous tick. A window with no frames emits nothing.
#[derive(Debug, Clone)]
pub struct StickResampler {
    interval: Duration,
    sums: [f64; 4],
    count: u32,
}

impl StickResampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            sums: [0.0; 4],
            count: 0,
        }
    }

    /// Frames accumulated in the current window.
    pub fn pending(&self) -> u32 {
        self.count
    }
}

impl Default for StickResampler {
    fn default() -> Self {
        Self::new(STICK_SAMPLE_INTERVAL)
    }
}

impl Sampler<ChannelsData> for StickResampler {
    type Sample = StickSample;

    fn on_update(&mut self, data: &ChannelsData) -> Option<StickSample> {
        let axes = [channels::ROLL, channels::PITCH, channels::THROTTLE, channels::YAW];
        for (sum, idx) in self.sums.iter_mut().zip(axes) {
            *sum += f64::from(data.channel(idx));
        }
        self.count += 1;
        None
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn on_tick(&mut self) -> Option<StickSample> {
        if self.count == 0 {
            return None;
        }
        let n = f64::from(self.count);
        let [roll, pitch, throttle, yaw] = self.sums.map(|s| s / n);
        self.reset();
        Some(StickSample { roll, pitch, throttle, yaw })
    }

    fn reset(&mut self) {
        self.sums = [0.0; 4];
        self.count = 0;
    }
}
