//! Lap-table snapshot deduplication.
//!
//! The timing server re-pushes its complete lap table on every change and on
//! every reconnect. [`LapCrossingSync`] remembers how many laps it has seen
//! per node and turns each snapshot into only the laps that are new.
//!
//! The first snapshot after a (re)connect only seeds the counts, so laps
//! flown before the connection are never reported as fresh crossings.

use std::collections::HashMap;

use super::{LapCrossing, TimingSnapshot};

/// Incremental lap extractor
#[derive(Debug, Default)]
pub struct LapCrossingSync {
    previous_counts: HashMap<u32, usize>,
    synced: bool,
}

impl LapCrossingSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all counts; the next snapshot seeds without emitting.
    pub fn reset(&mut self) {
        self.previous_counts.clear();
        self.synced = false;
    }

    /// Whether a seeding snapshot has been processed since the last reset.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Extract the laps completed since the previous snapshot.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Full lap table as pushed by the server
    /// * `callsign_filter` - If non-empty, only the node whose callsign matches
    ///   (case-insensitive) is considered
    ///
    /// # Returns
    ///
    /// New crossings in node order, then lap order.
    pub fn process(&mut self, snapshot: &TimingSnapshot, callsign_filter: &str) -> Vec<LapCrossing> {
        let mut crossings = Vec::new();

        for node in &snapshot.nodes {
            if !callsign_filter.is_empty() {
                let matches = node
                    .callsign
                    .as_deref()
                    .is_some_and(|cs| cs.eq_ignore_ascii_case(callsign_filter));
                if !matches {
                    continue;
                }
            }

            let new_count = node.laps.len();
            if self.synced {
                let prev = self.previous_counts.get(&node.node_index).copied().unwrap_or(0);
                for lap in node.laps.iter().skip(prev) {
                    crossings.push(LapCrossing {
                        pilot_id: node.pilot_id,
                        callsign: node.callsign.clone().unwrap_or_default(),
                        lap_number: lap.lap_number,
                        lap_time_ms: lap.lap_time_ms,
                        lap_timestamp: lap.lap_timestamp,
                    });
                }
            }
            self.previous_counts.insert(node.node_index, new_count);
        }

        self.synced = true;
        crossings
    }
}
