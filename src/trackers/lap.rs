//! Lap and holeshot events from the timing feed.
//!
//! The first crossing after a launch is the holeshot (the pilot crossing the
//! start gate), not a lap. A one-shot skip flag marks it: armed at session
//! start when the aircraft is off or crashed, and re-armed on every entry
//! into off or crashed.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, warn};

use super::latest_flight_id;
use crate::observable::{Observe, Subscription};
use crate::probes::FlightState;
use crate::runtime::Clock;
use crate::store::{HoleshotEvent, LapEvent, Repository, RowId};
use crate::timing::{LapCrossing, LapFeed};

fn arms_skip(state: FlightState) -> bool {
    matches!(state, FlightState::Off | FlightState::Crashed)
}

struct LapInner {
    repo: Rc<dyn Repository>,
    clock: Rc<dyn Clock>,
    session_id: Cell<Option<RowId>>,
    skip_next_crossing: Cell<bool>,
}

impl LapInner {
    fn on_crossing(&self, crossing: &LapCrossing) {
        let Some(session_id) = self.session_id.get() else {
            return;
        };
        let holeshot = self.skip_next_crossing.replace(false);
        let Some(flight_id) = latest_flight_id(self.repo.as_ref(), session_id) else {
            debug!("Crossing without a flight; nothing stored");
            return;
        };
        let timestamp = self.clock.now_ms();

        let result = if holeshot {
            debug!("Holeshot on flight {}", flight_id);
            self.repo.add_holeshot_event(HoleshotEvent { id: 0, flight_id, timestamp })
        } else {
            self.repo.add_lap_event(LapEvent {
                id: 0,
                flight_id,
                timestamp,
                lap_number: crossing.lap_number,
                lap_time_ms: crossing.lap_time_ms,
            })
        };
        if let Err(e) = result {
            warn!("Failed to store crossing: {}", e);
        }
    }
}

/// Lap accounting for one session.
pub struct LapTracker {
    inner: Rc<LapInner>,
    subscriptions: Vec<Subscription>,
}

impl LapTracker {
    pub fn new(repo: Rc<dyn Repository>, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(LapInner {
                repo,
                clock,
                session_id: Cell::new(None),
                skip_next_crossing: Cell::new(true),
            }),
            subscriptions: Vec::new(),
        }
    }

    pub fn start_session<F: Observe<FlightState>>(&mut self, session_id: RowId, feed: &LapFeed, flight: &F) {
        self.end_session();
        self.inner.session_id.set(Some(session_id));
        self.inner.skip_next_crossing.set(arms_skip(flight.get()));

        let on_lap = Rc::downgrade(&self.inner);
        let on_flight = Rc::downgrade(&self.inner);
        self.subscriptions = vec![
            feed.on_lap_crossing(move |crossing| {
                if let Some(inner) = on_lap.upgrade() {
                    inner.on_crossing(crossing);
                }
            }),
            flight.subscribe(move |state| {
                if let Some(inner) = on_flight.upgrade() {
                    if arms_skip(*state) {
                        inner.skip_next_crossing.set(true);
                    }
                }
            }),
        ];
    }

    /// Idempotent.
    pub fn end_session(&mut self) {
        self.subscriptions.clear();
        self.inner.session_id.set(None);
    }

    /// Whether the next crossing will be stored as a holeshot.
    pub fn skip_armed(&self) -> bool {
        self.inner.skip_next_crossing.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Observable;
    use crate::settings::{Settings, SharedSettings};
    use crate::store::{FlightRow, SqliteStore};
    use crate::timing::{LapRecord, NodeLaps, TimingSnapshot};
    use crate::trackers::test_support::{scheduler, store_with_session};

    struct Rig {
        store: Rc<SqliteStore>,
        session: RowId,
        feed: LapFeed,
        flight: Observable<FlightState>,
        tracker: LapTracker,
    }

    fn rig(initial: FlightState) -> Rig {
        let (store, session) = store_with_session();
        let feed = LapFeed::new(Rc::new(SharedSettings::new(Settings::default())));
        feed.on_connect();
        feed.push_snapshot(&TimingSnapshot::default());
        let flight = Observable::new(initial);
        let mut tracker = LapTracker::new(store.clone(), Rc::new(scheduler()));
        tracker.start_session(session, &feed, &flight);
        Rig { store, session, feed, flight, tracker }
    }

    fn snapshot(times: &[u64]) -> TimingSnapshot {
        let laps = times
            .iter()
            .enumerate()
            .map(|(i, &t)| LapRecord { lap_number: i as u32, lap_time_ms: t, lap_timestamp: 0 })
            .collect();
        TimingSnapshot {
            nodes: vec![NodeLaps { node_index: 0, pilot_id: 1, callsign: None, laps }],
        }
    }

    fn open_flight(rig: &Rig) -> RowId {
        rig.store
            .add_flight(FlightRow { id: 0, session_id: rig.session, started_at: 0, ended_at: None })
            .unwrap()
    }

    #[test]
    fn test_first_crossing_after_launch_is_holeshot() {
        let rig = rig(FlightState::Off);
        let flight = open_flight(&rig);
        rig.flight.set(FlightState::Prepare);

        rig.feed.push_snapshot(&snapshot(&[3_000, 20_000, 21_000]));

        let laps = rig.store.lap_events_for_flights(&[flight]).unwrap();
        let holeshots = rig.store.holeshot_events_for_flights(&[flight]).unwrap();
        assert_eq!(holeshots.len(), 1);
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[0].lap_number, 1);
        assert_eq!(laps[1].lap_time_ms, 21_000);
    }

    #[test]
    fn test_session_started_in_flight_counts_first_crossing() {
        let rig = rig(FlightState::Flying);
        assert!(!rig.tracker.skip_armed());
        let flight = open_flight(&rig);

        rig.feed.push_snapshot(&snapshot(&[20_000]));
        assert_eq!(rig.store.lap_events_for_flights(&[flight]).unwrap().len(), 1);
    }

    #[test]
    fn test_crash_rearms_skip() {
        let rig = rig(FlightState::Flying);
        let flight = open_flight(&rig);
        rig.feed.push_snapshot(&snapshot(&[20_000]));
        rig.flight.set(FlightState::Crashed);
        assert!(rig.tracker.skip_armed());
        rig.feed.push_snapshot(&snapshot(&[20_000, 9_000]));

        assert_eq!(rig.store.lap_events_for_flights(&[flight]).unwrap().len(), 1);
        assert_eq!(rig.store.holeshot_events_for_flights(&[flight]).unwrap().len(), 1);
    }

    #[test]
    fn test_no_flight_no_write_but_skip_consumed() {
        let rig = rig(FlightState::Off);
        rig.feed.push_snapshot(&snapshot(&[3_000]));
        assert!(!rig.tracker.skip_armed());

        let flight = open_flight(&rig);
        rig.feed.push_snapshot(&snapshot(&[3_000, 20_000]));
        assert_eq!(rig.store.lap_events_for_flights(&[flight]).unwrap().len(), 1);
        assert!(rig.store.holeshot_events_for_flights(&[flight]).unwrap().is_empty());
    }

    #[test]
    fn test_end_session_detaches() {
        let mut rig = rig(FlightState::Flying);
        let flight = open_flight(&rig);
        rig.tracker.end_session();
        rig.tracker.end_session();
        rig.feed.push_snapshot(&snapshot(&[20_000]));
        assert!(rig.store.lap_events_for_flights(&[flight]).unwrap().is_empty());
    }
}
