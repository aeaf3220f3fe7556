//! # Pipeline Module
//!
//! Wires the telemetry hub, probes, timing feed, coach and trackers into one
//! session controller.
//!
//! The probes live for the whole pipeline; the coach and the trackers attach
//! on [`Pipeline::start_session`] / [`Pipeline::resume_session`] and detach on
//! [`Pipeline::end_session`].

use std::rc::Rc;

use tracing::{info, warn};

use crate::audio::Announcer;
use crate::coach::SpeedVarianceCoach;
use crate::config::Config;
use crate::error::{FpvAidError, Result};
use crate::probes::{ArmedProbe, FlightProbe};
use crate::runtime::{Clock, Scheduler};
use crate::settings::SharedSettings;
use crate::store::{Repository, RowId, SessionRow};
use crate::telemetry::{TelemetryFrame, TelemetryHub};
use crate::timing::{LapFeed, TimingSnapshot};
use crate::trackers::{BatteryTracker, CrashTracker, FlightTracker, LapTracker, StickTracker};

/// Session controller owning every reactive component.
pub struct Pipeline {
    settings: Rc<SharedSettings>,
    repo: Rc<dyn Repository>,
    clock: Rc<dyn Clock>,
    telemetry: TelemetryHub,
    feed: LapFeed,
    armed: ArmedProbe,
    flight: FlightProbe,
    coach: SpeedVarianceCoach,
    flights: FlightTracker,
    battery: BatteryTracker,
    sticks: StickTracker,
    crashes: CrashTracker,
    laps: LapTracker,
    session_id: Option<RowId>,
    disposed: bool,
}

impl Pipeline {
    /// Build the component graph and start the telemetry sweep.
    ///
    /// # Arguments
    ///
    /// * `config` - Settings plus timer periods
    /// * `repo` - Session, flight and event sink
    /// * `announcer` - Speech output for the coach
    /// * `clock` - Time source for every timestamp
    /// * `scheduler` - Creates all periodic timers
    pub fn new(
        config: &Config,
        repo: Rc<dyn Repository>,
        announcer: Rc<dyn Announcer>,
        clock: Rc<dyn Clock>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        let settings = Rc::new(SharedSettings::new(config.settings.clone()));

        let mut telemetry = TelemetryHub::new(clock.clone(), config.telemetry.stale_threshold_ms as i64);
        telemetry.start(scheduler.as_ref(), config.telemetry.stale_check_interval());

        let feed = LapFeed::new(settings.clone());
        let armed = ArmedProbe::new(&telemetry.channels, &telemetry.flight_mode, settings.clone());
        let flight = FlightProbe::new(
            &armed,
            &telemetry.channels,
            settings.clone(),
            scheduler.as_ref(),
            config.probe.throttle_poll(),
        );

        let coach = SpeedVarianceCoach::new(settings.clone(), repo.clone(), announcer, clock.clone());
        let flights = FlightTracker::new(repo.clone(), clock.clone());
        let battery = BatteryTracker::battery(
            &telemetry.battery,
            repo.clone(),
            clock.clone(),
            scheduler.clone(),
            config.recorder.flush_interval(),
        );
        let sticks = StickTracker::stick(
            &telemetry.channels,
            repo.clone(),
            clock.clone(),
            scheduler.clone(),
            config.recorder.flush_interval(),
            config.recorder.stick_sample_interval(),
        );
        let crashes = CrashTracker::new(repo.clone(), clock.clone());
        let laps = LapTracker::new(repo.clone(), clock.clone());

        Self {
            settings,
            repo,
            clock,
            telemetry,
            feed,
            armed,
            flight,
            coach,
            flights,
            battery,
            sticks,
            crashes,
            laps,
            session_id: None,
            disposed: false,
        }
    }

    /// Insert a new session row and attach to it.
    ///
    /// A running session is ended first.
    pub fn start_session(&mut self, name: Option<String>) -> Result<RowId> {
        self.end_session();

        let row = SessionRow {
            id: 0,
            name,
            started_at: self.clock.now_ms(),
            ended_at: None,
        };
        let session_id = self.repo.add_session(row)?;
        self.attach(session_id)?;
        info!("Session {} started", session_id);
        Ok(session_id)
    }

    /// Reattach to an existing session, restoring the coach from its history.
    ///
    /// # Errors
    ///
    /// Returns a store error if the session does not exist or its history
    /// cannot be read.
    pub fn resume_session(&mut self, session_id: RowId) -> Result<()> {
        self.end_session();

        if self.repo.session(session_id)?.is_none() {
            return Err(FpvAidError::Store(format!("unknown session {}", session_id)));
        }
        self.attach(session_id)?;
        info!("Session {} resumed", session_id);
        Ok(())
    }

    fn attach(&mut self, session_id: RowId) -> Result<()> {
        // Coach first: its restore is the only fallible step.
        self.coach.start_session(session_id, &self.feed, &self.flight)?;

        self.flights.start_session(session_id, &self.armed);
        self.battery.start_session(&self.flights);
        self.sticks.start_session(&self.flights);
        self.crashes.start_session(session_id, &self.flight);
        self.laps.start_session(session_id, &self.feed, &self.flight);

        self.session_id = Some(session_id);
        Ok(())
    }

    /// Detach everything, close any open flight and stamp the session's end.
    /// Idempotent.
    pub fn end_session(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };

        self.coach.end_session();
        self.laps.end_session();
        self.crashes.end_session();
        self.battery.end_session();
        self.sticks.end_session();
        self.flights.end_session();

        if let Err(e) = self.repo.end_session(session_id, self.clock.now_ms()) {
            warn!("Failed to end session {}: {}", session_id, e);
        }
        info!("Session {} ended", session_id);
    }

    /// Route one decoded telemetry frame.
    pub fn ingest(&self, frame: TelemetryFrame) {
        self.telemetry.ingest(frame);
    }

    /// The timing server (re)connected.
    pub fn timing_connect(&self) {
        self.feed.on_connect();
    }

    /// Feed one timing snapshot; returns the number of new crossings.
    pub fn push_snapshot(&self, snapshot: &TimingSnapshot) -> usize {
        self.feed.push_snapshot(snapshot)
    }

    /// End the session, stop every timer and reset the sensors. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.end_session();
        self.flight.dispose();
        self.armed.dispose();
        self.telemetry.stop();
        self.disposed = true;
    }

    pub fn session_id(&self) -> Option<RowId> {
        self.session_id
    }

    pub fn settings(&self) -> &Rc<SharedSettings> {
        &self.settings
    }

    pub fn telemetry(&self) -> &TelemetryHub {
        &self.telemetry
    }

    pub fn armed(&self) -> &ArmedProbe {
        &self.armed
    }

    pub fn flight(&self) -> &FlightProbe {
        &self.flight
    }

    pub fn coach(&self) -> &SpeedVarianceCoach {
        &self.coach
    }

    pub fn flights(&self) -> &FlightTracker {
        &self.flights
    }
}
