//! # Store Module
//!
//! Persisted session data and the [`Repository`] seam the trackers and the
//! coach write through.
//!
//! Row hierarchy (deleting a session cascades through everything below it):
//!
//! ```text
//! Session
//! └── Flight
//!     ├── BatteryBatch / StickBatch   (time series)
//!     └── CrashEvent / LapEvent / HoleshotEvent / SvLevelEvent
//! ```
//!
//! Every `add_*` method ignores the `id` of the row it is given, assigns the
//! next id of that table and returns it. Ids are strictly increasing per
//! table and never reused, so id order is insertion order.

mod schema;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use sqlite::SqliteStore;

/// Row id type shared by all tables
pub type RowId = u64;

/// Practice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: RowId,
    #[serde(default)]
    pub name: Option<String>,
    pub started_at: i64,
    /// `None` while the session is open
    #[serde(default)]
    pub ended_at: Option<i64>,
}

/// One continuous span with live telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRow {
    pub id: RowId,
    pub session_id: RowId,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
}

/// A sample with its offset from the recording start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timed<S> {
    /// Milliseconds since the recorder started
    pub t: i64,
    #[serde(flatten)]
    pub sample: S,
}

/// A flushed chunk of time-series samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch<S> {
    pub id: RowId,
    pub flight_id: RowId,
    /// Absolute time of the first sample
    pub start_time: i64,
    pub samples: Vec<Timed<S>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    pub voltage: f32,
    pub amperage: f32,
}

/// Window-averaged stick positions in channel ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StickSample {
    pub roll: f64,
    pub pitch: f64,
    pub throttle: f64,
    pub yaw: f64,
}

pub type BatteryBatch = SampleBatch<BatterySample>;
pub type StickBatch = SampleBatch<StickSample>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub id: RowId,
    pub flight_id: RowId,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapEvent {
    pub id: RowId,
    pub flight_id: RowId,
    pub timestamp: i64,
    /// 0 is the holeshot lap reported by the timer; real laps are >= 1
    pub lap_number: u32,
    pub lap_time_ms: u64,
}

/// First crossing after a launch, excluded from lap statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoleshotEvent {
    pub id: RowId,
    pub flight_id: RowId,
    pub timestamp: i64,
}

/// What caused a coach level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvTrigger {
    Lap,
    Crash,
    Manual,
}

/// Coach level change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvLevelEvent {
    pub id: RowId,
    pub flight_id: RowId,
    pub timestamp: i64,
    /// -2..=2
    pub target_level: i8,
    pub running_average: f64,
    /// `None` for crash-triggered and manual changes
    #[serde(default)]
    pub lap_time_ms: Option<u64>,
    pub trigger: SvTrigger,
}

/// Persistence seam.
///
/// Methods take `&self`; implementations use interior mutability so one
/// store can be shared by every tracker through an `Rc<dyn Repository>`.
pub trait Repository {
    fn add_session(&self, session: SessionRow) -> Result<RowId>;

    /// Set `ended_at` on an existing session.
    fn end_session(&self, session_id: RowId, ended_at: i64) -> Result<()>;

    fn session(&self, session_id: RowId) -> Result<Option<SessionRow>>;

    /// All sessions in id order.
    fn sessions(&self) -> Result<Vec<SessionRow>>;

    /// Remove a session and every row that belongs to it, atomically.
    fn delete_session(&self, session_id: RowId) -> Result<()>;

    fn add_flight(&self, flight: FlightRow) -> Result<RowId>;

    /// Set `ended_at` on an existing flight.
    fn close_flight(&self, flight_id: RowId, ended_at: i64) -> Result<()>;

    /// Most recently opened flight of the session.
    fn latest_flight(&self, session_id: RowId) -> Result<Option<FlightRow>>;

    /// Flights of the session in id order.
    fn flights_for_session(&self, session_id: RowId) -> Result<Vec<FlightRow>>;

    fn add_battery_batch(&self, batch: BatteryBatch) -> Result<RowId>;

    fn add_stick_batch(&self, batch: StickBatch) -> Result<RowId>;

    fn add_crash_event(&self, event: CrashEvent) -> Result<RowId>;

    fn add_lap_event(&self, event: LapEvent) -> Result<RowId>;

    fn add_holeshot_event(&self, event: HoleshotEvent) -> Result<RowId>;

    fn add_sv_level_event(&self, event: SvLevelEvent) -> Result<RowId>;

    fn battery_batches_for_flight(&self, flight_id: RowId) -> Result<Vec<BatteryBatch>>;

    fn stick_batches_for_flight(&self, flight_id: RowId) -> Result<Vec<StickBatch>>;

    fn crash_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<CrashEvent>>;

    /// Lap events of the given flights in id order.
    fn lap_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<LapEvent>>;

    fn holeshot_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<HoleshotEvent>>;

    /// Level events of the given flights in id order.
    fn sv_level_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<SvLevelEvent>>;
}

/// Time-series sample kinds that have their own batch table.
pub trait SampleRow: Sized {
    fn insert(repo: &dyn Repository, batch: SampleBatch<Self>) -> Result<RowId>;
}

impl SampleRow for BatterySample {
    fn insert(repo: &dyn Repository, batch: SampleBatch<Self>) -> Result<RowId> {
        repo.add_battery_batch(batch)
    }
}

impl SampleRow for StickSample {
    fn insert(repo: &dyn Repository, batch: SampleBatch<Self>) -> Result<RowId> {
        repo.add_stick_batch(batch)
    }
}
