//! Crash events from flight-phase transitions.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{info, warn};

use super::latest_flight_id;
use crate::observable::{Observe, Subscription};
use crate::probes::FlightState;
use crate::runtime::Clock;
use crate::store::{CrashEvent, Repository, RowId};

struct CrashInner {
    repo: Rc<dyn Repository>,
    clock: Rc<dyn Clock>,
    session_id: Cell<Option<RowId>>,
    previous: Cell<FlightState>,
}

impl CrashInner {
    fn on_state(&self, next: FlightState) {
        let prev = self.previous.replace(next);
        if next != FlightState::Crashed || prev == FlightState::Crashed {
            return;
        }
        let Some(session_id) = self.session_id.get() else {
            return;
        };
        let Some(flight_id) = latest_flight_id(self.repo.as_ref(), session_id) else {
            return;
        };

        let event = CrashEvent {
            id: 0,
            flight_id,
            timestamp: self.clock.now_ms(),
        };
        match self.repo.add_crash_event(event) {
            Ok(_) => info!("Crash recorded on flight {}", flight_id),
            Err(e) => warn!("Failed to store crash event: {}", e),
        }
    }
}

/// One crash row per entry into `crashed`.
pub struct CrashTracker {
    inner: Rc<CrashInner>,
    subscription: Option<Subscription>,
}

impl CrashTracker {
    pub fn new(repo: Rc<dyn Repository>, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(CrashInner {
                repo,
                clock,
                session_id: Cell::new(None),
                previous: Cell::new(FlightState::Off),
            }),
            subscription: None,
        }
    }

    pub fn start_session<F: Observe<FlightState>>(&mut self, session_id: RowId, flight: &F) {
        self.end_session();
        self.inner.session_id.set(Some(session_id));
        self.inner.previous.set(flight.get());

        let weak = Rc::downgrade(&self.inner);
        self.subscription = Some(flight.subscribe(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state(*state);
            }
        }));
    }

    /// Idempotent.
    pub fn end_session(&mut self) {
        self.subscription = None;
        self.inner.session_id.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Observable;
    use crate::store::FlightRow;
    use crate::trackers::test_support::{scheduler, store_with_session};

    #[test]
    fn test_one_event_per_crash_entry() {
        let (store, session) = store_with_session();
        let flight = store
            .add_flight(FlightRow { id: 0, session_id: session, started_at: 0, ended_at: None })
            .unwrap();
        let state = Observable::new(FlightState::Flying);
        let mut tracker = CrashTracker::new(store.clone(), Rc::new(scheduler()));
        tracker.start_session(session, &state);

        state.set(FlightState::Crashed);
        state.set(FlightState::Crashed);
        state.set(FlightState::Flying);
        state.set(FlightState::Landed);
        state.set(FlightState::Crashed);

        let events = store.crash_events_for_flights(&[flight]).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, 50_000);
    }

    #[test]
    fn test_session_starting_crashed_needs_a_new_entry() {
        let (store, session) = store_with_session();
        let flight = store
            .add_flight(FlightRow { id: 0, session_id: session, started_at: 0, ended_at: None })
            .unwrap();
        let state = Observable::new(FlightState::Crashed);
        let mut tracker = CrashTracker::new(store.clone(), Rc::new(scheduler()));
        tracker.start_session(session, &state);

        state.set(FlightState::Crashed);
        assert!(store.crash_events_for_flights(&[flight]).unwrap().is_empty());
    }

    #[test]
    fn test_no_flight_no_write() {
        let (store, session) = store_with_session();
        let state = Observable::new(FlightState::Flying);
        let mut tracker = CrashTracker::new(store.clone(), Rc::new(scheduler()));
        tracker.start_session(session, &state);
        state.set(FlightState::Crashed);

        tracker.end_session();
        state.set(FlightState::Flying);
        state.set(FlightState::Crashed);
        assert!(store.crash_events_for_flights(&[1]).unwrap().is_empty());
    }
}
