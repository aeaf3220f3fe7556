//! # Telemetry Module
//!
//! Routes decoded telemetry records into their sensor channels.
//!
//! This module handles:
//! - Owning the sensor channels the core consumes
//! - Dispatching each decoded [`TelemetryFrame`] to the matching channel
//! - Running the staleness sweep while the link is up
//! - Resetting every channel when the link stops

use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::runtime::{Clock, Scheduler};
use crate::sensor::types::{BatteryData, ChannelsData, FlightModeData, LinkStatisticsData};
use crate::sensor::{SensorChannel, StalenessSweep};

/// One decoded record from the receiver link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryFrame {
    Channels(ChannelsData),
    FlightMode(FlightModeData),
    Battery(BatteryData),
    LinkStatistics(LinkStatisticsData),
}

/// Sensor channels fed by the receiver link.
pub struct TelemetryHub {
    pub channels: SensorChannel<ChannelsData>,
    pub flight_mode: SensorChannel<FlightModeData>,
    pub battery: SensorChannel<BatteryData>,
    pub link_statistics: SensorChannel<LinkStatisticsData>,
    sweep: StalenessSweep,
}

impl TelemetryHub {
    /// Create the hub with all channels inactive.
    ///
    /// # Arguments
    ///
    /// * `clock` - Time source stamped onto every update
    /// * `stale_threshold_ms` - Silence after which an active channel turns stale
    pub fn new(clock: Rc<dyn Clock>, stale_threshold_ms: i64) -> Self {
        let channels = SensorChannel::new("channels", clock.clone());
        let flight_mode = SensorChannel::new("flight_mode", clock.clone());
        let battery = SensorChannel::new("battery", clock.clone());
        let link_statistics = SensorChannel::new("link_statistics", clock.clone());

        let sweep = StalenessSweep::new(stale_threshold_ms, clock);
        sweep.register(Box::new(channels.clone()));
        sweep.register(Box::new(flight_mode.clone()));
        sweep.register(Box::new(battery.clone()));
        sweep.register(Box::new(link_statistics.clone()));

        Self {
            channels,
            flight_mode,
            battery,
            link_statistics,
            sweep,
        }
    }

    /// Begin the periodic staleness sweep.
    pub fn start(&mut self, scheduler: &dyn Scheduler, sweep_interval: Duration) {
        info!("Telemetry link started (stale sweep every {:?})", sweep_interval);
        self.sweep.start(scheduler, sweep_interval);
    }

    /// Route a decoded frame to its channel.
    pub fn ingest(&self, frame: TelemetryFrame) {
        match frame {
            TelemetryFrame::Channels(data) => {
                trace!("channels update");
                self.channels.update(data);
            }
            TelemetryFrame::FlightMode(data) => {
                trace!("flight mode '{}'", data.mode);
                self.flight_mode.update(data);
            }
            TelemetryFrame::Battery(data) => self.battery.update(data),
            TelemetryFrame::LinkStatistics(data) => self.link_statistics.update(data),
        }
    }

    /// Run one staleness sweep immediately.
    pub fn sweep(&self) -> usize {
        self.sweep.sweep()
    }

    /// Stop sweeping and reset every channel. Idempotent.
    pub fn stop(&mut self) {
        if self.sweep.is_running() {
            info!("Telemetry link stopped");
        }
        self.sweep.stop();
        self.sweep.reset_all();
    }
}
