//! Time-series trackers that follow the open flight.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::observable::Subscription;
use crate::recorder::{BatchRecorder, BatterySampler, Sampler, StickResampler};
use crate::runtime::{Clock, Scheduler};
use crate::sensor::types::{BatteryData, ChannelsData};
use crate::sensor::SensorChannel;
use crate::store::{Repository, RowId, SampleRow};

use super::FlightTracker;

/// Runs a [`BatchRecorder`] for whichever flight is open.
pub struct RecordingTracker<T, P: Sampler<T>> {
    recorder: Rc<RefCell<BatchRecorder<T, P>>>,
    scheduler: Rc<dyn Scheduler>,
    subscription: Option<Subscription>,
}

/// Battery voltage/current per telemetry update
pub type BatteryTracker = RecordingTracker<BatteryData, BatterySampler>;

/// Stick positions resampled to a fixed rate
pub type StickTracker = RecordingTracker<ChannelsData, StickResampler>;

impl<T, P> RecordingTracker<T, P>
where
    T: Clone + 'static,
    P: Sampler<T> + 'static,
    P::Sample: SampleRow + 'static,
{
    pub fn new(recorder: BatchRecorder<T, P>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            recorder: Rc::new(RefCell::new(recorder)),
            scheduler,
            subscription: None,
        }
    }

    /// Follow `flights`: start on every opened flight, stop when it closes.
    pub fn start_session(&mut self, flights: &FlightTracker) {
        self.end_session();

        let recorder = Rc::downgrade(&self.recorder);
        let scheduler = Rc::clone(&self.scheduler);
        self.subscription = Some(flights.open_flight().subscribe(move |flight| {
            let Some(recorder) = recorder.upgrade() else { return };
            let mut recorder = recorder.borrow_mut();
            match flight {
                Some(flight_id) => recorder.start(*flight_id, scheduler.as_ref()),
                None => recorder.stop(),
            }
        }));

        if let Some(flight_id) = flights.open_flight().get() {
            self.recorder.borrow_mut().start(flight_id, self.scheduler.as_ref());
        }
    }

    /// Detach and stop (flushing) any running recording. Idempotent.
    pub fn end_session(&mut self) {
        self.subscription = None;
        self.recorder.borrow_mut().stop();
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.borrow().is_recording()
    }

    pub fn flight_id(&self) -> Option<RowId> {
        self.recorder.borrow().flight_id()
    }
}

impl BatteryTracker {
    pub fn battery(
        source: &SensorChannel<BatteryData>,
        repo: Rc<dyn Repository>,
        clock: Rc<dyn Clock>,
        scheduler: Rc<dyn Scheduler>,
        flush_interval: Duration,
    ) -> Self {
        let recorder = BatchRecorder::new("battery", source, BatterySampler, repo, clock, flush_interval);
        Self::new(recorder, scheduler)
    }
}

impl StickTracker {
    pub fn stick(
        source: &SensorChannel<ChannelsData>,
        repo: Rc<dyn Repository>,
        clock: Rc<dyn Clock>,
        scheduler: Rc<dyn Scheduler>,
        flush_interval: Duration,
        sample_interval: Duration,
    ) -> Self {
        let recorder = BatchRecorder::new(
            "stick",
            source,
            StickResampler::new(sample_interval),
            repo,
            clock,
            flush_interval,
        );
        Self::new(recorder, scheduler)
    }
}
