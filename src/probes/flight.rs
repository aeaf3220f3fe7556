//! Flight-phase state machine.
//!
//! Arm-state changes re-derive immediately. Channel updates arrive at
//! 150+Hz, so they only set a dirty flag; a poll timer (default 100 ms)
//! re-derives when the flag is set.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::info;

use super::{ArmState, FlightState};
use crate::observable::{Observable, Observe, Subscription};
use crate::runtime::{Scheduler, TimerHandle};
use crate::sensor::types::{channels, ChannelsData, CRSF_TICK_MIN, CRSF_TICK_SPAN};
use crate::sensor::SensorChannel;
use crate::settings::SettingsSource;

/// Recommended debounce poll period
pub const THROTTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Throttle tick at or above which the aircraft counts as under power.
pub fn throttle_threshold(crash_throttle_pct: f64) -> f64 {
    f64::from(CRSF_TICK_MIN) + f64::from(CRSF_TICK_SPAN) * crash_throttle_pct / 100.0
}

/// Transition function of the flight-phase machine.
///
/// `arm == Off` always yields `Off`. Re-arming while landed is a crash
/// re-entry, not a return to flying.
pub fn next_flight_state(current: FlightState, arm: ArmState, throttle_up: bool) -> FlightState {
    use ArmState as A;
    use FlightState as F;

    match (current, arm) {
        (_, A::Off) => F::Off,

        (F::Off, A::Disarmed | A::Armed | A::Turtle) => F::Prepare,

        (F::Prepare, A::Armed) if throttle_up => F::Flying,
        (F::Prepare, A::Disarmed | A::Armed | A::Turtle) => F::Prepare,

        (F::Flying, A::Disarmed) => F::Landed,
        (F::Flying, A::Armed) => F::Flying,
        (F::Flying, A::Turtle) => F::Crashed,

        (F::Landed, A::Disarmed) => F::Landed,
        (F::Landed, A::Armed | A::Turtle) => F::Crashed,

        (F::Crashed, A::Armed) if throttle_up => F::Flying,
        (F::Crashed, A::Disarmed | A::Armed | A::Turtle) => F::Crashed,
    }
}

struct FlightInner {
    state: Observable<FlightState>,
    arm: Cell<ArmState>,
    channels: SensorChannel<ChannelsData>,
    settings: Rc<dyn SettingsSource>,
    dirty: Cell<bool>,
}

impl FlightInner {
    fn throttle_up(&self) -> bool {
        let Some(data) = self.channels.data() else {
            return false;
        };
        let threshold = throttle_threshold(self.settings.settings().crash_throttle_pct);
        f64::from(data.channel(channels::THROTTLE)) >= threshold
    }

    fn recompute(&self) {
        let current = self.state.get();
        let next = next_flight_state(current, self.arm.get(), self.throttle_up());
        if next != current {
            info!("Flight state {} -> {}", current, next);
            self.state.set(next);
        }
    }

    fn poll(&self) {
        if self.dirty.replace(false) {
            self.recompute();
        }
    }
}

/// Observable flight phase.
pub struct FlightProbe {
    inner: Rc<FlightInner>,
    subscriptions: Vec<Subscription>,
    timer: Option<TimerHandle>,
}

impl FlightProbe {
    /// Attach to the arm probe and channel sensor and start the poll timer.
    ///
    /// # Arguments
    ///
    /// * `armed` - Source of arm-state changes
    /// * `channels` - Channel sensor providing the throttle value
    /// * `settings` - Read for `crash_throttle_pct` on every derivation
    /// * `scheduler` - Creates the debounce poll timer
    /// * `poll_interval` - Debounce period
    pub fn new<A: Observe<ArmState>>(
        armed: &A,
        channels: &SensorChannel<ChannelsData>,
        settings: Rc<dyn SettingsSource>,
        scheduler: &dyn Scheduler,
        poll_interval: Duration,
    ) -> Self {
        let inner = Rc::new(FlightInner {
            state: Observable::new(FlightState::Off),
            arm: Cell::new(armed.get()),
            channels: channels.clone(),
            settings,
            dirty: Cell::new(false),
        });

        let on_arm = Rc::downgrade(&inner);
        let on_channels = Rc::downgrade(&inner);
        let subscriptions = vec![
            armed.subscribe(move |arm| {
                if let Some(inner) = on_arm.upgrade() {
                    inner.arm.set(*arm);
                    inner.recompute();
                }
            }),
            channels.subscribe(move |_| {
                if let Some(inner) = on_channels.upgrade() {
                    inner.dirty.set(true);
                }
            }),
        ];

        let on_tick = Rc::downgrade(&inner);
        let timer = scheduler.every(
            poll_interval,
            Box::new(move || {
                if let Some(inner) = on_tick.upgrade() {
                    inner.poll();
                }
            }),
        );

        inner.recompute();

        Self {
            inner,
            subscriptions,
            timer: Some(timer),
        }
    }

    /// Run one debounce poll now (what the timer does each period).
    pub fn poll(&self) {
        self.inner.poll();
    }

    /// Whether a channel update is waiting for the next poll.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Detach listeners and cancel the poll timer. Idempotent.
    pub fn dispose(&mut self) {
        self.subscriptions.clear();
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl Observe<FlightState> for FlightProbe {
    fn get(&self) -> FlightState {
        self.inner.state.get()
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FlightState) + 'static,
    {
        self.inner.state.subscribe(listener)
    }
}
