//! # Trackers Module
//!
//! Session-scoped components that turn derived state into stored rows.
//!
//! - [`FlightTracker`]: opens a flight when the aircraft is armed and closes
//!   it when telemetry goes away; publishes the open flight id
//! - [`BatteryTracker`] / [`StickTracker`]: time-series recorders that follow
//!   the open flight
//! - [`CrashTracker`]: one crash event per transition into `crashed`
//! - [`LapTracker`]: lap and holeshot events from the timing feed
//!
//! Discrete events are attributed to the session's most recently opened
//! flight. Store failures are logged and dropped.

pub mod crash;
pub mod flight;
pub mod lap;
pub mod recording;

use tracing::warn;

use crate::store::{Repository, RowId};

pub use crash::CrashTracker;
pub use flight::FlightTracker;
pub use lap::LapTracker;
pub use recording::{BatteryTracker, RecordingTracker, StickTracker};

/// Id of the session's latest flight, logging store failures.
fn latest_flight_id(repo: &dyn Repository, session_id: RowId) -> Option<RowId> {
    match repo.latest_flight(session_id) {
        Ok(flight) => flight.map(|f| f.id),
        Err(e) => {
            warn!("Failed to look up latest flight of session {}: {}", session_id, e);
            None
        }
    }
}
