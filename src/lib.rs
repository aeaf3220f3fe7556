//! # FPV Aid Library
//!
//! Flight-state derivation, flight recording and adaptive lap-time coaching
//! for FPV drones.
//!
//! Receiver telemetry feeds sensor channels, probes derive arm and flight
//! state from them, trackers persist flights and events, and the speed
//! variance coach sets lap-time targets from the race-timing feed.

pub mod audio;
pub mod coach;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod observable;
pub mod pipeline;
pub mod probes;
pub mod recorder;
pub mod runtime;
pub mod sensor;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod timing;
pub mod trackers;
