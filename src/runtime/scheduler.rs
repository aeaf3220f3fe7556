//! Periodic timers.
//!
//! Components never spawn work on their own; they ask a [`Scheduler`] for a
//! periodic callback and keep the returned [`TimerHandle`]. Cancelling the
//! handle (or dropping it) guarantees the callback does not run again.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::clock::Clock;

/// Callback invoked on every timer period
pub type TimerTask = Box<dyn FnMut()>;

/// Cancellation handle for a periodic timer.
///
/// `cancel()` is idempotent. Dropping the handle cancels the timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl TimerHandle {
    /// Wrap a cancellation closure.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop the timer. Subsequent calls do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether `cancel()` has not been called yet.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Factory for periodic timers.
pub trait Scheduler {
    /// Run `task` every `period`, first firing one period from now.
    fn every(&self, period: Duration, task: TimerTask) -> TimerHandle;
}

/// Scheduler running each timer as a `spawn_local` task.
///
/// Must be used from within a `tokio::task::LocalSet`; spawning panics
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, mut task: TimerTask) -> TimerHandle {
        let join = tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });
        TimerHandle::new(move || join.abort())
    }
}

struct ManualTimer {
    period_ms: i64,
    next_due: Cell<i64>,
    cancelled: Cell<bool>,
    task: RefCell<TimerTask>,
}

#[derive(Default)]
struct ManualInner {
    now: Cell<i64>,
    timers: RefCell<Vec<Rc<ManualTimer>>>,
}

/// Virtual-time scheduler and clock.
///
/// Time only moves when [`ManualScheduler::advance`] is called. Due timers
/// fire in due-time order (registration order on ties) and the clock reads
/// each timer's due time while its callback runs.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
/// use fpv_aid::runtime::{Clock, ManualScheduler, Scheduler};
///
/// let sched = ManualScheduler::new(1_000);
/// let fired = Rc::new(Cell::new(0));
/// let f = fired.clone();
/// let _timer = sched.every(Duration::from_millis(100), Box::new(move || f.set(f.get() + 1)));
///
/// sched.advance(250);
/// assert_eq!(fired.get(), 2);
/// assert_eq!(sched.now_ms(), 1_250);
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<ManualInner>,
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts at `start_ms`.
    pub fn new(start_ms: i64) -> Self {
        let sched = Self::default();
        sched.inner.now.set(start_ms);
        sched
    }

    /// Move the clock forward by `ms`, firing every timer that falls due.
    pub fn advance(&self, ms: i64) {
        let target = self.inner.now.get() + ms.max(0);
        self.advance_to(target);
    }

    /// Move the clock forward to `target_ms`. Earlier targets are ignored.
    pub fn advance_to(&self, target_ms: i64) {
        loop {
            let due = {
                let timers = self.inner.timers.borrow();
                timers
                    .iter()
                    .filter(|t| !t.cancelled.get() && t.next_due.get() <= target_ms)
                    .min_by_key(|t| t.next_due.get())
                    .cloned()
            };
            let Some(timer) = due else { break };

            let fire_at = timer.next_due.get();
            if fire_at > self.inner.now.get() {
                self.inner.now.set(fire_at);
            }
            timer.next_due.set(fire_at + timer.period_ms);
            (timer.task.borrow_mut())();
        }

        if target_ms > self.inner.now.get() {
            self.inner.now.set(target_ms);
        }
        self.inner.timers.borrow_mut().retain(|t| !t.cancelled.get());
    }

    /// Number of timers that have not been cancelled.
    pub fn active_timers(&self) -> usize {
        self.inner
            .timers
            .borrow()
            .iter()
            .filter(|t| !t.cancelled.get())
            .count()
    }
}

impl Clock for ManualScheduler {
    fn now_ms(&self) -> i64 {
        self.inner.now.get()
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, period: Duration, task: TimerTask) -> TimerHandle {
        let period_ms = (period.as_millis() as i64).max(1);
        let timer = Rc::new(ManualTimer {
            period_ms,
            next_due: Cell::new(self.inner.now.get() + period_ms),
            cancelled: Cell::new(false),
            task: RefCell::new(task),
        });
        self.inner.timers.borrow_mut().push(timer.clone());
        TimerHandle::new(move || timer.cancelled.set(true))
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.inner.now.get())
            .field("active_timers", &self.active_timers())
            .finish()
    }
}
