//! # Runtime Module
//!
//! Time and timer plumbing for the single-threaded reactive pipeline.
//!
//! This module handles:
//! - Reading wall-clock time through the [`Clock`] trait
//! - Creating cancellable periodic timers through the [`Scheduler`] trait
//! - Driving timers on a tokio `LocalSet` ([`TokioScheduler`])
//! - Driving timers from a virtual clock ([`ManualScheduler`]) for replay and tests
//!
//! Every timer callback runs to completion on the calling thread; two
//! callbacks never overlap.

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use scheduler::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
