//! Periodic staleness sweep.
//!
//! Every `interval` the sweep compares `now - last_updated` against the
//! threshold for each active channel and marks the quiet ones stale.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use super::{Liveness, SensorStatus};
use crate::runtime::{Clock, Scheduler, TimerHandle};

/// Recommended sweep period
pub const STALE_CHECK_INTERVAL: Duration = Duration::from_millis(2000);

/// Recommended silence threshold
pub const STALE_THRESHOLD_MS: i64 = 3000;

struct SweepInner {
    channels: RefCell<Vec<Box<dyn Liveness>>>,
    threshold_ms: i64,
    clock: Rc<dyn Clock>,
}

impl SweepInner {
    fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let channels = self.channels.borrow();
        let mut aged = 0;
        for channel in channels.iter() {
            if channel.status() == SensorStatus::Active
                && now - channel.last_updated() > self.threshold_ms
            {
                debug!("Sensor '{}' went stale", channel.name());
                channel.mark_stale();
                aged += 1;
            }
        }
        aged
    }
}

/// Ages out channels that stopped receiving updates.
pub struct StalenessSweep {
    inner: Rc<SweepInner>,
    timer: Option<TimerHandle>,
}

impl StalenessSweep {
    pub fn new(threshold_ms: i64, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(SweepInner {
                channels: RefCell::new(Vec::new()),
                threshold_ms,
                clock,
            }),
            timer: None,
        }
    }

    /// Add a channel to the sweep.
    pub fn register(&self, channel: Box<dyn Liveness>) {
        self.inner.channels.borrow_mut().push(channel);
    }

    /// Run one sweep now. Returns how many channels were marked stale.
    ///
    /// Note: listeners of a channel run while the sweep holds its channel
    /// list, so they must not call [`StalenessSweep::register`].
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Start sweeping every `interval`. Restarting replaces the previous timer.
    pub fn start(&mut self, scheduler: &dyn Scheduler, interval: Duration) {
        let inner = Rc::downgrade(&self.inner);
        self.timer = Some(scheduler.every(
            interval,
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.sweep();
                }
            }),
        ));
    }

    /// Cancel the periodic sweep. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Reset every registered channel to inactive.
    pub fn reset_all(&self) {
        for channel in self.inner.channels.borrow().iter() {
            channel.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;
    use crate::sensor::SensorChannel;

    fn setup() -> (ManualScheduler, SensorChannel<u8>, SensorChannel<u8>, StalenessSweep) {
        let sched = ManualScheduler::new(0);
        let clock: Rc<dyn Clock> = Rc::new(sched.clone());
        let a = SensorChannel::new("a", clock.clone());
        let b = SensorChannel::new("b", clock.clone());
        let sweep = StalenessSweep::new(STALE_THRESHOLD_MS, clock);
        sweep.register(Box::new(a.clone()));
        sweep.register(Box::new(b.clone()));
        (sched, a, b, sweep)
    }

    #[test]
    fn test_sweep_marks_only_quiet_channels() {
        let (sched, a, b, sweep) = setup();
        a.update(1);
        sched.advance(2_000);
        b.update(1);
        sched.advance(1_500);

        assert_eq!(sweep.sweep(), 1);
        assert_eq!(a.status(), SensorStatus::Stale);
        assert_eq!(b.status(), SensorStatus::Active);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let (sched, a, _b, sweep) = setup();
        a.update(1);
        sched.advance(3_000);
        assert_eq!(sweep.sweep(), 0, "Exactly the threshold is not yet stale");
        sched.advance(1);
        assert_eq!(sweep.sweep(), 1);
    }

    #[test]
    fn test_inactive_channels_are_ignored() {
        let (sched, a, b, sweep) = setup();
        sched.advance(10_000);
        assert_eq!(sweep.sweep(), 0);
        assert_eq!(a.status(), SensorStatus::Inactive);
        assert_eq!(b.status(), SensorStatus::Inactive);
    }

    #[test]
    fn test_periodic_sweep_runs_on_timer() {
        let (sched, a, _b, mut sweep) = setup();
        sweep.start(&sched, STALE_CHECK_INTERVAL);
        a.update(1);

        sched.advance(2_000);
        assert_eq!(a.status(), SensorStatus::Active, "2s of silence is below threshold");
        sched.advance(2_000);
        assert_eq!(a.status(), SensorStatus::Stale);
    }

    #[test]
    fn test_stop_cancels_timer() {
        let (sched, a, _b, mut sweep) = setup();
        sweep.start(&sched, STALE_CHECK_INTERVAL);
        sweep.stop();
        sweep.stop();
        a.update(1);

        sched.advance(10_000);
        assert_eq!(a.status(), SensorStatus::Active);
        assert!(!sweep.is_running());
    }

    #[test]
    fn test_reset_all() {
        let (_sched, a, b, sweep) = setup();
        a.update(3);
        b.update(4);
        sweep.reset_all();
        assert_eq!(a.data(), None);
        assert_eq!(b.status(), SensorStatus::Inactive);
    }
}
