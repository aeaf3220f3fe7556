//! # Probes Module
//!
//! Derived flight state, cascaded from raw telemetry.
//!
//! ```text
//! channels ─┬─> ArmedProbe ──> FlightProbe
//! flight mode ─┘       channels ──┘ (debounced)
//! ```
//!
//! - [`ArmedProbe`]: off / disarmed / armed / turtle, from sensor liveness
//!   and the arm and turtle switch channels
//! - [`FlightProbe`]: off / prepare / flying / landed / crashed, from the arm
//!   state and the throttle channel

pub mod armed;
pub mod flight;

use std::fmt;

pub use armed::{derive_arm_state, ArmedProbe};
pub use flight::{next_flight_state, throttle_threshold, FlightProbe};

/// Arm classification of the aircraft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmState {
    /// No live telemetry
    Off,
    Disarmed,
    Armed,
    /// Armed with the turtle (flip-over) switch engaged
    Turtle,
}

/// Flight phase of the aircraft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightState {
    Off,
    Prepare,
    Flying,
    Landed,
    Crashed,
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArmState::Off => "off",
            ArmState::Disarmed => "disarmed",
            ArmState::Armed => "armed",
            ArmState::Turtle => "turtle",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightState::Off => "off",
            FlightState::Prepare => "prepare",
            FlightState::Flying => "flying",
            FlightState::Landed => "landed",
            FlightState::Crashed => "crashed",
        };
        f.write_str(name)
    }
}
