//! # Pilot Settings
//!
//! Tunables read by the probes and the coach on every recomputation.
//!
//! Components never hold a copy of [`Settings`]; they keep a
//! [`SettingsSource`] and ask it for the latest snapshot each time they
//! derive state, so a settings change takes effect on the next input
//! without any notification.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{FpvAidError, Result};
use crate::sensor::types::CRSF_NUM_CHANNELS;

/// Pilot-facing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Channel index carrying the ARM switch
    #[serde(default = "default_arm_channel")]
    pub arm_channel: usize,

    #[serde(default = "default_range_min")]
    pub arm_range_min: u16,

    #[serde(default = "default_range_max")]
    pub arm_range_max: u16,

    /// Channel index carrying the turtle-mode switch
    #[serde(default = "default_turtle_channel")]
    pub turtle_channel: usize,

    #[serde(default = "default_range_min")]
    pub turtle_range_min: u16,

    #[serde(default = "default_range_max")]
    pub turtle_range_max: u16,

    /// Throttle percentage above which the drone counts as flying
    #[serde(default = "default_crash_throttle_pct")]
    pub crash_throttle_pct: f64,

    #[serde(default = "default_warmup_laps")]
    pub warmup_laps: u32,

    #[serde(default = "default_consecutive_laps_to_level_up")]
    pub consecutive_laps_to_level_up: u32,

    #[serde(default = "default_level_down_chance_pct")]
    pub level_down_chance_pct: f64,

    #[serde(default = "default_sv_inner_pct")]
    pub sv_inner_fast_pct: f64,

    #[serde(default = "default_sv_inner_pct")]
    pub sv_inner_slow_pct: f64,

    #[serde(default = "default_sv_outer_pct")]
    pub sv_outer_fast_pct: f64,

    #[serde(default = "default_sv_outer_pct")]
    pub sv_outer_slow_pct: f64,

    /// Share of fastest laps averaged into the baseline
    #[serde(default = "default_sv_baseline_pct")]
    pub sv_baseline_pct: f64,

    /// Voice name handed to the speech sink (empty = sink default)
    #[serde(default)]
    pub tts_voice: String,

    #[serde(default = "default_tts_rate")]
    pub tts_rate: f32,

    /// Timing-server callsign filter (empty = accept every node)
    #[serde(default)]
    pub callsign: String,
}

fn default_arm_channel() -> usize { 4 }
fn default_turtle_channel() -> usize { 5 }
fn default_range_min() -> u16 { 1500 }
fn default_range_max() -> u16 { 2012 }
fn default_crash_throttle_pct() -> f64 { 25.0 }
fn default_warmup_laps() -> u32 { 3 }
fn default_consecutive_laps_to_level_up() -> u32 { 3 }
fn default_level_down_chance_pct() -> f64 { 10.0 }
fn default_sv_inner_pct() -> f64 { 5.0 }
fn default_sv_outer_pct() -> f64 { 15.0 }
fn default_sv_baseline_pct() -> f64 { 50.0 }
fn default_tts_rate() -> f32 { 1.0 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            arm_channel: default_arm_channel(),
            arm_range_min: default_range_min(),
            arm_range_max: default_range_max(),
            turtle_channel: default_turtle_channel(),
            turtle_range_min: default_range_min(),
            turtle_range_max: default_range_max(),
            crash_throttle_pct: default_crash_throttle_pct(),
            warmup_laps: default_warmup_laps(),
            consecutive_laps_to_level_up: default_consecutive_laps_to_level_up(),
            level_down_chance_pct: default_level_down_chance_pct(),
            sv_inner_fast_pct: default_sv_inner_pct(),
            sv_inner_slow_pct: default_sv_inner_pct(),
            sv_outer_fast_pct: default_sv_outer_pct(),
            sv_outer_slow_pct: default_sv_outer_pct(),
            sv_baseline_pct: default_sv_baseline_pct(),
            tts_voice: String::new(),
            tts_rate: default_tts_rate(),
            callsign: String::new(),
        }
    }
}

impl Settings {
    /// Check ranges the core relies on for its arithmetic.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSettings` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, idx) in [
            ("arm_channel", self.arm_channel),
            ("turtle_channel", self.turtle_channel),
        ] {
            if idx >= CRSF_NUM_CHANNELS {
                return Err(invalid(format!("{} {} is out of bounds (must be 0-15)", name, idx)));
            }
        }

        for (name, min, max) in [
            ("arm_range", self.arm_range_min, self.arm_range_max),
            ("turtle_range", self.turtle_range_min, self.turtle_range_max),
        ] {
            if min > max {
                return Err(invalid(format!("{}_min must not exceed {}_max", name, name)));
            }
            if max > 2047 {
                return Err(invalid(format!("{}_max must be at most 2047", name)));
            }
        }

        for (name, value) in [
            ("crash_throttle_pct", self.crash_throttle_pct),
            ("level_down_chance_pct", self.level_down_chance_pct),
            ("sv_inner_fast_pct", self.sv_inner_fast_pct),
            ("sv_inner_slow_pct", self.sv_inner_slow_pct),
            ("sv_outer_fast_pct", self.sv_outer_fast_pct),
            ("sv_outer_slow_pct", self.sv_outer_slow_pct),
            ("sv_baseline_pct", self.sv_baseline_pct),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!("{} must be between 0 and 100", name)));
            }
        }

        if self.sv_inner_fast_pct > self.sv_outer_fast_pct {
            return Err(invalid("sv_inner_fast_pct must not exceed sv_outer_fast_pct".into()));
        }
        if self.sv_inner_slow_pct > self.sv_outer_slow_pct {
            return Err(invalid("sv_inner_slow_pct must not exceed sv_outer_slow_pct".into()));
        }
        if self.sv_baseline_pct <= 0.0 {
            return Err(invalid("sv_baseline_pct must be greater than 0".into()));
        }
        if self.warmup_laps == 0 {
            return Err(invalid("warmup_laps must be greater than 0".into()));
        }
        if self.consecutive_laps_to_level_up == 0 {
            return Err(invalid("consecutive_laps_to_level_up must be greater than 0".into()));
        }
        if self.tts_rate <= 0.0 {
            return Err(invalid("tts_rate must be greater than 0".into()));
        }

        Ok(())
    }
}

fn invalid(msg: String) -> FpvAidError {
    FpvAidError::InvalidSettings(msg)
}

/// Accessor the core reads settings through.
pub trait SettingsSource {
    /// Latest settings snapshot.
    fn settings(&self) -> Rc<Settings>;
}

/// Mutable settings cell shared between the pipeline and its owner.
#[derive(Debug, Default)]
pub struct SharedSettings {
    current: RefCell<Rc<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RefCell::new(Rc::new(settings)),
        }
    }

    /// Replace the settings seen by every subsequent read.
    pub fn replace(&self, settings: Settings) {
        *self.current.borrow_mut() = Rc::new(settings);
    }

    /// Apply an in-place edit to a copy of the current settings.
    pub fn update(&self, edit: impl FnOnce(&mut Settings)) {
        let mut next = (**self.current.borrow()).clone();
        edit(&mut next);
        self.replace(next);
    }
}

impl SettingsSource for SharedSettings {
    fn settings(&self) -> Rc<Settings> {
        Rc::clone(&self.current.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let s = Settings::default();
        assert_eq!(s.arm_channel, 4);
        assert_eq!(s.turtle_channel, 5);
        assert_eq!(s.arm_range_min, 1500);
        assert_eq!(s.arm_range_max, 2012);
        assert_eq!(s.crash_throttle_pct, 25.0);
        assert!(s.callsign.is_empty());
    }

    #[test]
    fn test_channel_out_of_bounds() {
        let s = Settings { arm_channel: 16, ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_inverted_range() {
        let s = Settings { turtle_range_min: 1900, turtle_range_max: 1200, ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_percentage_above_100() {
        let s = Settings { level_down_chance_pct: 101.0, ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_inner_band_wider_than_outer() {
        let s = Settings { sv_inner_slow_pct: 20.0, sv_outer_slow_pct: 10.0, ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_zero_warmup_laps() {
        let s = Settings { warmup_laps: 0, ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_zero_baseline_pct() {
        let s = Settings { sv_baseline_pct: 0.0, ..Settings::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_shared_settings_update_is_visible_to_next_read() {
        let shared = SharedSettings::new(Settings::default());
        let before = shared.settings();

        shared.update(|s| s.crash_throttle_pct = 40.0);

        assert_eq!(before.crash_throttle_pct, 25.0, "Earlier snapshot is unchanged");
        assert_eq!(shared.settings().crash_throttle_pct, 40.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let s: Settings = toml::from_str("warmup_laps = 5\ncallsign = \"Ace\"").unwrap();
        assert_eq!(s.warmup_laps, 5);
        assert_eq!(s.callsign, "Ace");
        assert_eq!(s.sv_baseline_pct, 50.0);
    }
}
