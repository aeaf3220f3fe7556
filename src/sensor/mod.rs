//! # Sensor Module
//!
//! Typed telemetry channels with a three-state liveness model.
//!
//! This module handles:
//! - Holding the latest decoded payload per sensor ([`SensorChannel`])
//! - Tracking liveness: `Inactive` (never seen / reset), `Active`, `Stale`
//! - Ageing out quiet channels with a periodic sweep ([`StalenessSweep`])
//!
//! A stale channel keeps its last payload; only the status changes.

pub mod sweep;
pub mod types;

use std::rc::Rc;

use crate::observable::{Observable, Observe, Subscription};
use crate::runtime::Clock;

pub use sweep::StalenessSweep;

/// Liveness of a sensor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Inactive,
    Active,
    Stale,
}

/// Snapshot of a sensor channel
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState<T> {
    pub status: SensorStatus,
    pub data: Option<T>,
    /// Epoch ms of the last `update()` (0 when inactive)
    pub last_updated: i64,
}

impl<T> SensorState<T> {
    fn inactive() -> Self {
        Self {
            status: SensorStatus::Inactive,
            data: None,
            last_updated: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SensorStatus::Active
    }
}

/// Latest value of one telemetry sensor plus its liveness.
///
/// Cloning yields another handle to the same channel.
pub struct SensorChannel<T> {
    name: &'static str,
    state: Observable<SensorState<T>>,
    clock: Rc<dyn Clock>,
}

impl<T> Clone for SensorChannel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            state: self.state.clone(),
            clock: Rc::clone(&self.clock),
        }
    }
}

impl<T: Clone + 'static> SensorChannel<T> {
    /// Create an inactive channel.
    pub fn new(name: &'static str, clock: Rc<dyn Clock>) -> Self {
        Self {
            name,
            state: Observable::new(SensorState::inactive()),
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Store `data`, mark the channel active and stamp it with the current time.
    pub fn update(&self, data: T) {
        self.state.set(SensorState {
            status: SensorStatus::Active,
            data: Some(data),
            last_updated: self.clock.now_ms(),
        });
    }

    /// Flip an active channel to stale, keeping its data.
    ///
    /// Inactive and already-stale channels are left untouched.
    pub fn mark_stale(&self) {
        let current = self.state.get();
        if current.status != SensorStatus::Active {
            return;
        }
        self.state.set(SensorState {
            status: SensorStatus::Stale,
            ..current
        });
    }

    /// Clear to inactive with no data.
    pub fn reset(&self) {
        self.state.set(SensorState::inactive());
    }

    pub fn status(&self) -> SensorStatus {
        self.state.with(|s| s.status)
    }

    pub fn last_updated(&self) -> i64 {
        self.state.with(|s| s.last_updated)
    }

    /// Latest payload, regardless of liveness.
    pub fn data(&self) -> Option<T> {
        self.state.with(|s| s.data.clone())
    }
}

impl<T: Clone + 'static> Observe<SensorState<T>> for SensorChannel<T> {
    fn get(&self) -> SensorState<T> {
        self.state.get()
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SensorState<T>) + 'static,
    {
        self.state.subscribe(listener)
    }
}

/// Type-erased liveness controls, used by the sweep and the hub.
pub trait Liveness {
    fn name(&self) -> &'static str;
    fn status(&self) -> SensorStatus;
    fn last_updated(&self) -> i64;
    fn mark_stale(&self);
    fn reset(&self);
}

impl<T: Clone + 'static> Liveness for SensorChannel<T> {
    fn name(&self) -> &'static str {
        SensorChannel::name(self)
    }

    fn status(&self) -> SensorStatus {
        SensorChannel::status(self)
    }

    fn last_updated(&self) -> i64 {
        SensorChannel::last_updated(self)
    }

    fn mark_stale(&self) {
        SensorChannel::mark_stale(self)
    }

    fn reset(&self) {
        SensorChannel::reset(self)
    }
}
