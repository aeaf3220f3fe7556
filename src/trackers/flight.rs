//! Flight open/close on arm-state changes.
//!
//! A flight opens when the arm state enters armed or turtle while no flight
//! is open, and closes only when the arm state returns to off. Disarming
//! between packs with telemetry still live stays inside the same flight.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{info, warn};

use crate::observable::{Observable, Observe, Subscription};
use crate::probes::ArmState;
use crate::runtime::Clock;
use crate::store::{FlightRow, Repository, RowId};

struct FlightTrackerInner {
    repo: Rc<dyn Repository>,
    clock: Rc<dyn Clock>,
    session_id: Cell<Option<RowId>>,
    open_flight: Observable<Option<RowId>>,
}

impl FlightTrackerInner {
    fn evaluate(&self, arm: ArmState) {
        let Some(session_id) = self.session_id.get() else {
            return;
        };

        match (self.open_flight.get(), arm) {
            (None, ArmState::Armed | ArmState::Turtle) => self.open(session_id),
            (Some(flight_id), ArmState::Off) => self.close(flight_id),
            _ => {}
        }
    }

    fn open(&self, session_id: RowId) {
        let flight = FlightRow {
            id: 0,
            session_id,
            started_at: self.clock.now_ms(),
            ended_at: None,
        };
        match self.repo.add_flight(flight) {
            Ok(flight_id) => {
                info!("Flight {} opened in session {}", flight_id, session_id);
                self.open_flight.set(Some(flight_id));
            }
            Err(e) => warn!("Failed to open flight: {}", e),
        }
    }

    fn close(&self, flight_id: RowId) {
        if let Err(e) = self.repo.close_flight(flight_id, self.clock.now_ms()) {
            warn!("Failed to close flight {}: {}", flight_id, e);
        }
        info!("Flight {} closed", flight_id);
        self.open_flight.set(None);
    }
}

/// Flight lifecycle for one session.
pub struct FlightTracker {
    inner: Rc<FlightTrackerInner>,
    subscription: Option<Subscription>,
}

impl FlightTracker {
    pub fn new(repo: Rc<dyn Repository>, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(FlightTrackerInner {
                repo,
                clock,
                session_id: Cell::new(None),
                open_flight: Observable::new(None),
            }),
            subscription: None,
        }
    }

    /// Attach to `armed` for `session_id`. Opens a flight right away if the
    /// aircraft is already armed.
    pub fn start_session<A: Observe<ArmState>>(&mut self, session_id: RowId, armed: &A) {
        self.end_session();
        self.inner.session_id.set(Some(session_id));

        let weak = Rc::downgrade(&self.inner);
        self.subscription = Some(armed.subscribe(move |arm| {
            if let Some(inner) = weak.upgrade() {
                inner.evaluate(*arm);
            }
        }));
        self.inner.evaluate(armed.get());
    }

    /// Detach and close any open flight. Idempotent.
    pub fn end_session(&mut self) {
        self.subscription = None;
        if let Some(flight_id) = self.inner.open_flight.get() {
            self.inner.close(flight_id);
        }
        self.inner.session_id.set(None);
    }

    pub fn session_id(&self) -> Option<RowId> {
        self.inner.session_id.get()
    }

    /// Observable id of the open flight.
    pub fn open_flight(&self) -> &Observable<Option<RowId>> {
        &self.inner.open_flight
    }
}
