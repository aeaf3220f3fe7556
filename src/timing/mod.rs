//! # Timing Module
//!
//! Lap data from the external race-timing server.
//!
//! This module handles:
//! - Snapshot types as pushed by the server ([`TimingSnapshot`])
//! - Deduplicating snapshots into new crossings ([`LapCrossingSync`])
//! - Broadcasting crossings to the lap tracker and the coach ([`LapFeed`])

pub mod sync;

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::observable::{Observable, Subscription};
use crate::settings::SettingsSource;

pub use sync::LapCrossingSync;

/// One completed lap in the server's table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lap_number: u32,
    pub lap_time_ms: u64,
    /// Server timestamp of the crossing
    pub lap_timestamp: i64,
}

/// Laps recorded by one timing node (receiver slot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLaps {
    pub node_index: u32,
    #[serde(default)]
    pub pilot_id: u32,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub laps: Vec<LapRecord>,
}

/// Full lap table for the current heat
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingSnapshot {
    pub nodes: Vec<NodeLaps>,
}

/// A newly completed lap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapCrossing {
    pub pilot_id: u32,
    pub callsign: String,
    pub lap_number: u32,
    pub lap_time_ms: u64,
    pub lap_timestamp: i64,
}

/// Snapshot intake plus fan-out of new crossings.
///
/// Subscribers receive each crossing exactly once, in emission order.
pub struct LapFeed {
    sync: RefCell<LapCrossingSync>,
    settings: Rc<dyn SettingsSource>,
    crossings: Observable<Option<LapCrossing>>,
}

impl LapFeed {
    pub fn new(settings: Rc<dyn SettingsSource>) -> Self {
        Self {
            sync: RefCell::new(LapCrossingSync::new()),
            settings,
            crossings: Observable::new(None),
        }
    }

    /// Called on every (re)connect to the timing server.
    pub fn on_connect(&self) {
        info!("Timing server connected; next snapshot seeds lap counts");
        self.sync.borrow_mut().reset();
    }

    /// Feed one full snapshot; returns how many crossings were emitted.
    pub fn push_snapshot(&self, snapshot: &TimingSnapshot) -> usize {
        let filter = self.settings.settings().callsign.clone();
        let new_laps = self.sync.borrow_mut().process(snapshot, &filter);
        if new_laps.is_empty() {
            debug!("Timing snapshot carried no new laps");
        }

        let emitted = new_laps.len();
        for crossing in new_laps {
            info!(
                "Lap crossing: {} lap {} in {} ms",
                crossing.callsign, crossing.lap_number, crossing.lap_time_ms
            );
            self.crossings.set(Some(crossing));
        }
        emitted
    }

    /// Register a listener for new crossings.
    pub fn on_lap_crossing(&self, listener: impl Fn(&LapCrossing) + 'static) -> Subscription {
        self.crossings.subscribe(move |crossing| {
            if let Some(crossing) = crossing {
                listener(crossing);
            }
        })
    }

    /// Most recent crossing emitted, if any.
    pub fn last_crossing(&self) -> Option<LapCrossing> {
        self.crossings.get()
    }
}
