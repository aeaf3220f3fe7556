//! # Input Module
//!
//! JSON-lines input events for the binary.
//!
//! One object per line, tagged by `type`; replay files additionally carry an
//! `at_ms` timestamp:
//!
//! ```text
//! {"type":"flight_mode","mode":"ACRO"}
//! {"type":"channels","channels":[1500,1500,988,1500,1800,988,0,0,0,0,0,0,0,0,0,0]}
//! {"type":"battery","voltage":16.4,"current":12.5}
//! {"type":"timing_connect"}
//! {"type":"timing_snapshot","nodes":[]}
//! {"type":"set_level","level":-1}
//! ```

use serde::Deserialize;
use tracing::warn;

use crate::coach::SpeedLevel;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::sensor::types::{BatteryData, ChannelsData, FlightModeData, LinkStatisticsData};
use crate::telemetry::TelemetryFrame;
use crate::timing::TimingSnapshot;

/// One external event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Channels(ChannelsData),
    FlightMode(FlightModeData),
    Battery(BatteryData),
    LinkStatistics(LinkStatisticsData),
    TimingConnect,
    TimingSnapshot(TimingSnapshot),
    /// Manual coach level pick
    SetLevel { level: i8 },
}

/// An [`InputEvent`] with its optional replay timestamp
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputLine {
    #[serde(default)]
    pub at_ms: Option<i64>,
    #[serde(flatten)]
    pub event: InputEvent,
}

impl InputLine {
    /// Parse one line of JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use fpv_aid::input::{InputEvent, InputLine};
    ///
    /// let line = InputLine::parse(r#"{"at_ms":1500,"type":"timing_connect"}"#)?;
    /// assert_eq!(line.at_ms, Some(1500));
    /// assert_eq!(line.event, InputEvent::TimingConnect);
    /// # Ok::<(), fpv_aid::error::FpvAidError>(())
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

impl InputEvent {
    /// Deliver the event to `pipeline`.
    pub fn apply(self, pipeline: &Pipeline) {
        match self {
            InputEvent::Channels(data) => pipeline.ingest(TelemetryFrame::Channels(data)),
            InputEvent::FlightMode(data) => pipeline.ingest(TelemetryFrame::FlightMode(data)),
            InputEvent::Battery(data) => pipeline.ingest(TelemetryFrame::Battery(data)),
            InputEvent::LinkStatistics(data) => pipeline.ingest(TelemetryFrame::LinkStatistics(data)),
            InputEvent::TimingConnect => pipeline.timing_connect(),
            InputEvent::TimingSnapshot(snapshot) => {
                pipeline.push_snapshot(&snapshot);
            }
            InputEvent::SetLevel { level } => match SpeedLevel::new(level) {
                Some(level) => {
                    if !pipeline.coach().set_level(level) {
                        warn!("Level {} not applied (coach not active or unchanged)", level);
                    }
                }
                None => warn!("Level {} out of range", level),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channels() {
        let line = InputLine::parse(
            r#"{"type":"channels","channels":[1500,1500,988,1500,1800,988,0,0,0,0,0,0,0,0,0,0]}"#,
        )
        .unwrap();
        assert_eq!(line.at_ms, None);
        match line.event {
            InputEvent::Channels(data) => assert_eq!(data.channels[4], 1800),
            other => panic!("Expected channels, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_battery_defaults_optional_fields() {
        let line = InputLine::parse(r#"{"at_ms":10,"type":"battery","voltage":16.4,"current":12.5}"#).unwrap();
        assert_eq!(
            line.event,
            InputEvent::Battery(BatteryData { voltage: 16.4, current: 12.5, capacity_used: 0, remaining: 0 })
        );
    }

    #[test]
    fn test_parse_snapshot_and_level() {
        let line = InputLine::parse(r#"{"type":"timing_snapshot","nodes":[{"node_index":2}]}"#).unwrap();
        match line.event {
            InputEvent::TimingSnapshot(s) => assert_eq!(s.nodes[0].node_index, 2),
            other => panic!("Expected snapshot, got {:?}", other),
        }

        let line = InputLine::parse(r#"{"type":"set_level","level":-1}"#).unwrap();
        assert_eq!(line.event, InputEvent::SetLevel { level: -1 });
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(InputLine::parse(r#"{"type":"gps","lat":1.0}"#).is_err());
        assert!(InputLine::parse("not json").is_err());
    }
}
