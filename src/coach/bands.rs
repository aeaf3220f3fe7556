//! Speed levels and their lap-time bands.
//!
//! Given a baseline average `avg` and the four band percentages, the lap-time
//! axis splits into five contiguous bands with no gaps or overlaps:
//!
//! ```text
//!   level 2  |  level 1   |     level 0     |  level -1  | level -2
//! ----------)[-----------)[---------------]](-----------](-----------
//!       outer_fast    inner_fast      inner_slow     outer_slow
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Target difficulty, -2 (slowest band) to 2 (fastest band)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub struct SpeedLevel(i8);

impl SpeedLevel {
    pub const MIN: SpeedLevel = SpeedLevel(-2);
    pub const MAX: SpeedLevel = SpeedLevel(2);
    pub const ZERO: SpeedLevel = SpeedLevel(0);

    /// `None` outside -2..=2.
    pub fn new(level: i8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0).contains(&level).then_some(Self(level))
    }

    /// Nearest valid level.
    pub fn clamped(level: i8) -> Self {
        Self(level.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn value(self) -> i8 {
        self.0
    }

    /// One level faster, saturating at [`SpeedLevel::MAX`].
    pub fn up(self) -> Self {
        Self::clamped(self.0.saturating_add(1))
    }

    /// One level slower, saturating at [`SpeedLevel::MIN`].
    pub fn down(self) -> Self {
        Self::clamped(self.0.saturating_sub(1))
    }
}

impl TryFrom<i8> for SpeedLevel {
    type Error = String;

    fn try_from(level: i8) -> Result<Self, Self::Error> {
        Self::new(level).ok_or_else(|| format!("speed level {} outside -2..=2", level))
    }
}

impl From<SpeedLevel> for i8 {
    fn from(level: SpeedLevel) -> Self {
        level.0
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

/// How a lap compares with the current level's band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapVerdict {
    OnTarget,
    TooFast,
    TooSlow,
}

impl LapVerdict {
    /// Spoken feedback for a miss.
    pub fn cue(self) -> Option<&'static str> {
        match self {
            LapVerdict::OnTarget => None,
            LapVerdict::TooFast => Some("too fast"),
            LapVerdict::TooSlow => Some("too slow"),
        }
    }
}

/// Band boundaries in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetLapTimes {
    /// Level 2 is anything faster than this
    pub outer_fast: f64,
    /// Lower (fast) edge of level 0, inclusive
    pub inner_fast: f64,
    /// Upper (slow) edge of level 0, inclusive
    pub inner_slow: f64,
    /// Level -2 is anything slower than this
    pub outer_slow: f64,
}

impl TargetLapTimes {
    /// Band boundaries around `avg` with the settings' percentages.
    pub fn around(avg: f64, settings: &Settings) -> Self {
        Self {
            outer_fast: avg * (100.0 - settings.sv_outer_fast_pct) / 100.0,
            inner_fast: avg * (100.0 - settings.sv_inner_fast_pct) / 100.0,
            inner_slow: avg * (100.0 + settings.sv_inner_slow_pct) / 100.0,
            outer_slow: avg * (100.0 + settings.sv_outer_slow_pct) / 100.0,
        }
    }

    /// Classify `lap_ms` against the band of `level`.
    pub fn classify(&self, lap_ms: f64, level: SpeedLevel) -> LapVerdict {
        use LapVerdict::*;

        match level.value() {
            2 if lap_ms < self.outer_fast => OnTarget,
            2 => TooSlow,
            1 if lap_ms < self.outer_fast => TooFast,
            1 if lap_ms >= self.inner_fast => TooSlow,
            1 => OnTarget,
            -1 if lap_ms <= self.inner_slow => TooFast,
            -1 if lap_ms > self.outer_slow => TooSlow,
            -1 => OnTarget,
            -2 if lap_ms > self.outer_slow => OnTarget,
            -2 => TooFast,
            _ if lap_ms < self.inner_fast => TooFast,
            _ if lap_ms > self.inner_slow => TooSlow,
            _ => OnTarget,
        }
    }

    /// Band of `level` in seconds, e.g. "from 19.0 to 21.0".
    pub fn describe(&self, level: SpeedLevel) -> String {
        let secs = |ms: f64| format!("{:.1}", ms / 1000.0);
        match level.value() {
            2 => format!("faster than {}", secs(self.outer_fast)),
            1 => format!("from {} to {}", secs(self.outer_fast), secs(self.inner_fast)),
            -1 => format!("from {} to {}", secs(self.inner_slow), secs(self.outer_slow)),
            -2 => format!("slower than {}", secs(self.outer_slow)),
            _ => format!("from {} to {}", secs(self.inner_fast), secs(self.inner_slow)),
        }
    }
}

/// Mean of the fastest `baseline_pct`% of `laps` (at least one lap).
///
/// Returns 0 for an empty slice.
///
/// # Examples
///
/// ```
/// use fpv_aid::coach::baseline;
///
/// assert_eq!(baseline(&[22_000, 20_000, 30_000, 21_000], 50.0), 20_500.0);
/// assert_eq!(baseline(&[22_000, 20_000], 1.0), 20_000.0);
/// assert_eq!(baseline(&[], 50.0), 0.0);
/// ```
pub fn baseline(laps: &[u64], baseline_pct: f64) -> f64 {
    if laps.is_empty() {
        return 0.0;
    }
    let mut sorted = laps.to_vec();
    sorted.sort_unstable();

    let wanted = (sorted.len() as f64 * baseline_pct / 100.0).ceil() as usize;
    let count = wanted.clamp(1, sorted.len());
    let sum: u64 = sorted[..count].iter().sum();
    sum as f64 / count as f64
}
