//! # Recorder Module
//!
//! Periodic-flush sampler that turns a sensor channel into persisted
//! time-series batches for one flight.
//!
//! A [`Sampler`] decides what a sample is: one per sensor update
//! ([`BatterySampler`]) or an average over a fixed tick window
//! ([`StickResampler`]). Samples carry their offset from the recording
//! start; every flush period the buffer becomes one batch row.
//!
//! Every `start`/`stop` bumps a generation counter. Timer and listener
//! callbacks captured under an older generation do nothing, so no write
//! from a previous recording can land after teardown.

pub mod samplers;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::observable::{Observe, Subscription};
use crate::runtime::{Clock, Scheduler, TimerHandle};
use crate::sensor::SensorChannel;
use crate::store::{Repository, RowId, SampleBatch, SampleRow, Timed};

pub use samplers::{BatterySampler, StickResampler};

/// Recommended flush period
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(2000);

/// Turns sensor payloads into samples.
pub trait Sampler<T> {
    type Sample;

    /// Called for every active update; a returned sample is appended now.
    fn on_update(&mut self, data: &T) -> Option<Self::Sample>;

    /// Window period for samplers that emit on a tick.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    /// Called every tick; a returned sample is appended now.
    fn on_tick(&mut self) -> Option<Self::Sample> {
        None
    }

    /// Drop any partial window.
    fn reset(&mut self) {}
}

struct Recording<S> {
    flight_id: RowId,
    started_at: i64,
    buffer: Vec<Timed<S>>,
}

struct RecorderInner<T, P: Sampler<T>> {
    name: &'static str,
    source: SensorChannel<T>,
    sampler: RefCell<P>,
    repo: Rc<dyn Repository>,
    clock: Rc<dyn Clock>,
    generation: Cell<u64>,
    recording: RefCell<Option<Recording<P::Sample>>>,
}

impl<T, P> RecorderInner<T, P>
where
    T: Clone + 'static,
    P: Sampler<T> + 'static,
    P::Sample: SampleRow + 'static,
{
    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    fn append(&self, sample: P::Sample) {
        let now = self.clock.now_ms();
        if let Some(rec) = self.recording.borrow_mut().as_mut() {
            rec.buffer.push(Timed {
                t: now - rec.started_at,
                sample,
            });
        }
    }

    fn flush(&self) -> Option<RowId> {
        let batch = {
            let mut recording = self.recording.borrow_mut();
            let rec = recording.as_mut()?;
            let first_t = rec.buffer.first()?.t;
            SampleBatch {
                id: 0,
                flight_id: rec.flight_id,
                start_time: rec.started_at + first_t,
                samples: std::mem::take(&mut rec.buffer),
            }
        };

        let count = batch.samples.len();
        match P::Sample::insert(self.repo.as_ref(), batch) {
            Ok(id) => {
                trace!("{} batch {} stored ({} samples)", self.name, id, count);
                Some(id)
            }
            Err(e) => {
                warn!("Failed to store {} batch: {}", self.name, e);
                None
            }
        }
    }
}

/// Buffered recorder for one sensor channel.
pub struct BatchRecorder<T, P: Sampler<T>> {
    inner: Rc<RecorderInner<T, P>>,
    flush_interval: Duration,
    subscription: Option<Subscription>,
    timers: Vec<TimerHandle>,
}

impl<T, P> BatchRecorder<T, P>
where
    T: Clone + 'static,
    P: Sampler<T> + 'static,
    P::Sample: SampleRow + 'static,
{
    /// Create an idle recorder.
    ///
    /// # Arguments
    ///
    /// * `name` - Table name used in log lines
    /// * `source` - Sensor channel to sample
    /// * `sampler` - Turns payloads into samples
    /// * `repo` - Batch sink
    /// * `clock` - Sample offsets and batch start times
    /// * `flush_interval` - Period between batch writes
    pub fn new(
        name: &'static str,
        source: &SensorChannel<T>,
        sampler: P,
        repo: Rc<dyn Repository>,
        clock: Rc<dyn Clock>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            inner: Rc::new(RecorderInner {
                name,
                source: source.clone(),
                sampler: RefCell::new(sampler),
                repo,
                clock,
                generation: Cell::new(0),
                recording: RefCell::new(None),
            }),
            flush_interval,
            subscription: None,
            timers: Vec::new(),
        }
    }

    /// Begin recording for `flight_id`. A running recording is stopped first.
    pub fn start(&mut self, flight_id: RowId, scheduler: &dyn Scheduler) {
        if self.is_recording() {
            self.stop();
        }

        let inner = &self.inner;
        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);
        inner.sampler.borrow_mut().reset();
        *inner.recording.borrow_mut() = Some(Recording {
            flight_id,
            started_at: inner.clock.now_ms(),
            buffer: Vec::new(),
        });
        debug!("{} recorder started for flight {}", inner.name, flight_id);

        let on_update = Rc::downgrade(inner);
        self.subscription = Some(inner.source.subscribe(move |state| {
            let Some(inner) = on_update.upgrade() else { return };
            if !inner.is_current(generation) || !state.is_active() {
                return;
            }
            if let Some(data) = &state.data {
                let sample = inner.sampler.borrow_mut().on_update(data);
                if let Some(sample) = sample {
                    inner.append(sample);
                }
            }
        }));

        let on_flush = Rc::downgrade(inner);
        self.timers.push(scheduler.every(
            self.flush_interval,
            Box::new(move || {
                if let Some(inner) = on_flush.upgrade() {
                    if inner.is_current(generation) {
                        inner.flush();
                    }
                }
            }),
        ));

        let tick = inner.sampler.borrow().tick_interval();
        if let Some(tick) = tick {
            let on_tick = Rc::downgrade(inner);
            self.timers.push(scheduler.every(
                tick,
                Box::new(move || {
                    let Some(inner) = on_tick.upgrade() else { return };
                    if !inner.is_current(generation) {
                        return;
                    }
                    let sample = inner.sampler.borrow_mut().on_tick();
                    if let Some(sample) = sample {
                        inner.append(sample);
                    }
                }),
            ));
        }
    }

    /// Cancel timers, detach from the source and flush once. Idempotent.
    pub fn stop(&mut self) {
        let inner = &self.inner;
        inner.generation.set(inner.generation.get() + 1);
        for mut timer in self.timers.drain(..) {
            timer.cancel();
        }
        self.subscription = None;

        if inner.recording.borrow().is_some() {
            inner.flush();
            if let Some(rec) = inner.recording.borrow_mut().take() {
                debug!("{} recorder stopped for flight {}", inner.name, rec.flight_id);
            }
        }
    }

    /// Write buffered samples now; returns the batch id if one was written.
    pub fn flush(&self) -> Option<RowId> {
        self.inner.flush()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.borrow().is_some()
    }

    /// Flight currently being recorded.
    pub fn flight_id(&self) -> Option<RowId> {
        self.inner.recording.borrow().as_ref().map(|r| r.flight_id)
    }

    /// Samples waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.inner
            .recording
            .borrow()
            .as_ref()
            .map_or(0, |r| r.buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;
    use crate::sensor::types::BatteryData;
    use crate::store::{FlightRow, SessionRow, SqliteStore};

    struct Rig {
        sched: ManualScheduler,
        store: Rc<SqliteStore>,
        battery: SensorChannel<BatteryData>,
        recorder: BatchRecorder<BatteryData, BatterySampler>,
        flight_id: RowId,
    }

    fn rig() -> Rig {
        let sched = ManualScheduler::new(10_000);
        let clock: Rc<dyn Clock> = Rc::new(sched.clone());
        let store = Rc::new(SqliteStore::open_in_memory().unwrap());
        let session_id = store
            .add_session(SessionRow { id: 0, name: None, started_at: 0, ended_at: None })
            .unwrap();
        let flight_id = store
            .add_flight(FlightRow { id: 0, session_id, started_at: 0, ended_at: None })
            .unwrap();
        let battery = SensorChannel::new("battery", clock.clone());
        let recorder = BatchRecorder::new(
            "battery",
            &battery,
            BatterySampler,
            store.clone(),
            clock,
            FLUSH_INTERVAL,
        );
        Rig { sched, store, battery, recorder, flight_id }
    }

    fn volts(v: f32) -> BatteryData {
        BatteryData { voltage: v, current: 2.0, capacity_used: 0, remaining: 100 }
    }

    #[test]
    fn test_updates_are_buffered_with_offsets() {
        let mut rig = rig();
        rig.recorder.start(rig.flight_id, &rig.sched);

        rig.sched.advance(100);
        rig.battery.update(volts(16.8));
        rig.sched.advance(150);
        rig.battery.update(volts(16.7));
        assert_eq!(rig.recorder.buffered(), 2);

        rig.sched.advance(1_750);
        let batches = rig.store.battery_batches_for_flight(rig.flight_id).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start_time, 10_100, "Batch starts at its first sample");
        let offsets: Vec<i64> = batches[0].samples.iter().map(|s| s.t).collect();
        assert_eq!(offsets, vec![100, 250]);
        assert_eq!(batches[0].samples[1].sample.voltage, 16.7);
        assert_eq!(batches[0].samples[1].sample.amperage, 2.0);
        assert_eq!(rig.recorder.buffered(), 0);
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let mut rig = rig();
        rig.recorder.start(rig.flight_id, &rig.sched);
        rig.sched.advance(10_000);
        assert!(rig.store.battery_batches_for_flight(rig.flight_id).unwrap().is_empty());
    }

    #[test]
    fn test_inactive_updates_are_ignored() {
        let mut rig = rig();
        rig.recorder.start(rig.flight_id, &rig.sched);
        rig.battery.update(volts(16.8));
        rig.battery.mark_stale();
        rig.battery.reset();
        assert_eq!(rig.recorder.buffered(), 1);
    }

    #[test]
    fn test_stop_flushes_once_and_detaches() {
        let mut rig = rig();
        rig.recorder.start(rig.flight_id, &rig.sched);
        rig.battery.update(volts(16.8));
        rig.recorder.stop();
        rig.recorder.stop();

        assert!(!rig.recorder.is_recording());
        assert_eq!(rig.sched.active_timers(), 0);
        rig.battery.update(volts(15.0));
        rig.sched.advance(10_000);

        let batches = rig.store.battery_batches_for_flight(rig.flight_id).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].samples.len(), 1);
    }

    #[test]
    fn test_restart_switches_flight() {
        let mut rig = rig();
        let second = rig
            .store
            .add_flight(FlightRow { id: 0, session_id: 1, started_at: 0, ended_at: None })
            .unwrap();

        rig.recorder.start(rig.flight_id, &rig.sched);
        rig.battery.update(volts(16.8));
        rig.recorder.start(second, &rig.sched);
        assert_eq!(rig.recorder.flight_id(), Some(second));
        rig.battery.update(volts(16.0));
        rig.sched.advance(2_000);

        assert_eq!(rig.store.battery_batches_for_flight(rig.flight_id).unwrap().len(), 1);
        let batches = rig.store.battery_batches_for_flight(second).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].samples[0].sample.voltage, 16.0);
        assert_eq!(rig.sched.active_timers(), 1, "Only the live flush timer remains");
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let mut rig = rig();
        // Unknown flight: the store rejects the batch
        rig.recorder.start(999, &rig.sched);
        rig.battery.update(volts(16.8));
        assert_eq!(rig.recorder.flush(), None);
        assert_eq!(rig.recorder.buffered(), 0);
    }
}
