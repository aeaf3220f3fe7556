//! SQLite-backed repository.
//!
//! One table per row kind with foreign keys down the session hierarchy, so
//! deleting a session cascades inside SQLite. Ids come from
//! `INTEGER PRIMARY KEY AUTOINCREMENT` and are never reused. Batch samples
//! are stored as a JSON array per row.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::schema::SCHEMA;
use super::{
    BatteryBatch, CrashEvent, FlightRow, HoleshotEvent, LapEvent, Repository, RowId, SampleBatch,
    SessionRow, StickBatch, SvLevelEvent, SvTrigger,
};
use crate::error::{FpvAidError, Result};

fn trigger_name(trigger: SvTrigger) -> &'static str {
    match trigger {
        SvTrigger::Lap => "lap",
        SvTrigger::Crash => "crash",
        SvTrigger::Manual => "manual",
    }
}

fn parse_trigger(name: &str) -> Option<SvTrigger> {
    match name {
        "lap" => Some(SvTrigger::Lap),
        "crash" => Some(SvTrigger::Crash),
        "manual" => Some(SvTrigger::Manual),
        _ => None,
    }
}

/// `?, ?, ...` with `n` placeholders
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
    })
}

fn map_flight(row: &Row<'_>) -> rusqlite::Result<FlightRow> {
    Ok(FlightRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
    })
}

fn map_sv_level(row: &Row<'_>) -> rusqlite::Result<SvLevelEvent> {
    let kind: String = row.get(6)?;
    let trigger = parse_trigger(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, format!("unknown trigger '{}'", kind).into())
    })?;
    Ok(SvLevelEvent {
        id: row.get(0)?,
        flight_id: row.get(1)?,
        timestamp: row.get(2)?,
        target_level: row.get(3)?,
        running_average: row.get(4)?,
        lap_time_ms: row.get(5)?,
        trigger,
    })
}

/// Repository on a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the parent directory cannot be created and a
    /// SQLite error if the file cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Store opened at {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Store that keeps nothing on disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    /// Database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn update_one(&self, sql: &str, what: &str, id: RowId, ended_at: i64) -> Result<()> {
        let changed = self.conn.execute(sql, params![ended_at, id])?;
        if changed == 0 {
            return Err(FpvAidError::Store(format!("unknown {} {}", what, id)));
        }
        Ok(())
    }

    fn insert_batch<S: Serialize>(&self, table: &str, batch: &SampleBatch<S>) -> Result<RowId> {
        let samples = serde_json::to_string(&batch.samples)?;
        self.conn.execute(
            &format!("INSERT INTO {} (flight_id, start_time, samples) VALUES (?1, ?2, ?3)", table),
            params![batch.flight_id, batch.start_time, samples],
        )?;
        Ok(self.conn.last_insert_rowid() as RowId)
    }

    fn batches_for_flight<S: DeserializeOwned>(&self, table: &str, flight_id: RowId) -> Result<Vec<SampleBatch<S>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, flight_id, start_time, samples FROM {} WHERE flight_id = ?1 ORDER BY id",
            table
        ))?;
        let rows = stmt
            .query_map(params![flight_id], |row| {
                Ok((
                    row.get::<_, RowId>(0)?,
                    row.get::<_, RowId>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, flight_id, start_time, samples)| {
                Ok(SampleBatch {
                    id,
                    flight_id,
                    start_time,
                    samples: serde_json::from_str(&samples)?,
                })
            })
            .collect()
    }

    fn events_for_flights<T>(
        &self,
        columns: &str,
        table: &str,
        flight_ids: &[RowId],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        if flight_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE flight_id IN ({}) ORDER BY id",
            columns,
            table,
            placeholders(flight_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(flight_ids.iter()), map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl Repository for SqliteStore {
    fn add_session(&self, session: SessionRow) -> Result<RowId> {
        self.conn.execute(
            "INSERT INTO sessions (name, started_at, ended_at) VALUES (?1, ?2, ?3)",
            params![session.name, session.started_at, session.ended_at],
        )?;
        let id = self.conn.last_insert_rowid() as RowId;
        debug!("Session {} added", id);
        Ok(id)
    }

    fn end_session(&self, session_id: RowId, ended_at: i64) -> Result<()> {
        self.update_one("UPDATE sessions SET ended_at = ?1 WHERE id = ?2", "session", session_id, ended_at)
    }

    fn session(&self, session_id: RowId) -> Result<Option<SessionRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, started_at, ended_at FROM sessions WHERE id = ?1",
                params![session_id],
                map_session,
            )
            .optional()?)
    }

    fn sessions(&self) -> Result<Vec<SessionRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, started_at, ended_at FROM sessions ORDER BY id")?;
        let rows = stmt.query_map([], map_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delete_session(&self, session_id: RowId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        if deleted == 0 {
            return Err(FpvAidError::Store(format!("unknown session {}", session_id)));
        }
        tx.commit()?;
        info!("Session {} deleted with all dependent rows", session_id);
        Ok(())
    }

    fn add_flight(&self, flight: FlightRow) -> Result<RowId> {
        self.conn.execute(
            "INSERT INTO flights (session_id, started_at, ended_at) VALUES (?1, ?2, ?3)",
            params![flight.session_id, flight.started_at, flight.ended_at],
        )?;
        Ok(self.conn.last_insert_rowid() as RowId)
    }

    fn close_flight(&self, flight_id: RowId, ended_at: i64) -> Result<()> {
        self.update_one("UPDATE flights SET ended_at = ?1 WHERE id = ?2", "flight", flight_id, ended_at)
    }

    fn latest_flight(&self, session_id: RowId) -> Result<Option<FlightRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, session_id, started_at, ended_at FROM flights
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                params![session_id],
                map_flight,
            )
            .optional()?)
    }

    fn flights_for_session(&self, session_id: RowId) -> Result<Vec<FlightRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, started_at, ended_at FROM flights WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![session_id], map_flight)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn add_battery_batch(&self, batch: BatteryBatch) -> Result<RowId> {
        self.insert_batch("battery_batches", &batch)
    }

    fn add_stick_batch(&self, batch: StickBatch) -> Result<RowId> {
        self.insert_batch("stick_batches", &batch)
    }

    fn add_crash_event(&self, event: CrashEvent) -> Result<RowId> {
        self.conn.execute(
            "INSERT INTO crash_events (flight_id, timestamp) VALUES (?1, ?2)",
            params![event.flight_id, event.timestamp],
        )?;
        Ok(self.conn.last_insert_rowid() as RowId)
    }

    fn add_lap_event(&self, event: LapEvent) -> Result<RowId> {
        self.conn.execute(
            "INSERT INTO lap_events (flight_id, timestamp, lap_number, lap_time_ms) VALUES (?1, ?2, ?3, ?4)",
            params![event.flight_id, event.timestamp, event.lap_number, event.lap_time_ms],
        )?;
        Ok(self.conn.last_insert_rowid() as RowId)
    }

    fn add_holeshot_event(&self, event: HoleshotEvent) -> Result<RowId> {
        self.conn.execute(
            "INSERT INTO holeshot_events (flight_id, timestamp) VALUES (?1, ?2)",
            params![event.flight_id, event.timestamp],
        )?;
        Ok(self.conn.last_insert_rowid() as RowId)
    }

    fn add_sv_level_event(&self, event: SvLevelEvent) -> Result<RowId> {
        self.conn.execute(
            "INSERT INTO sv_level_events
                (flight_id, timestamp, target_level, running_average, lap_time_ms, trigger_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.flight_id,
                event.timestamp,
                event.target_level,
                event.running_average,
                event.lap_time_ms,
                trigger_name(event.trigger),
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as RowId)
    }

    fn battery_batches_for_flight(&self, flight_id: RowId) -> Result<Vec<BatteryBatch>> {
        self.batches_for_flight("battery_batches", flight_id)
    }

    fn stick_batches_for_flight(&self, flight_id: RowId) -> Result<Vec<StickBatch>> {
        self.batches_for_flight("stick_batches", flight_id)
    }

    fn crash_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<CrashEvent>> {
        self.events_for_flights("id, flight_id, timestamp", "crash_events", flight_ids, |row| {
            Ok(CrashEvent { id: row.get(0)?, flight_id: row.get(1)?, timestamp: row.get(2)? })
        })
    }

    fn lap_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<LapEvent>> {
        self.events_for_flights(
            "id, flight_id, timestamp, lap_number, lap_time_ms",
            "lap_events",
            flight_ids,
            |row| {
                Ok(LapEvent {
                    id: row.get(0)?,
                    flight_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    lap_number: row.get(3)?,
                    lap_time_ms: row.get(4)?,
                })
            },
        )
    }

    fn holeshot_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<HoleshotEvent>> {
        self.events_for_flights("id, flight_id, timestamp", "holeshot_events", flight_ids, |row| {
            Ok(HoleshotEvent { id: row.get(0)?, flight_id: row.get(1)?, timestamp: row.get(2)? })
        })
    }

    fn sv_level_events_for_flights(&self, flight_ids: &[RowId]) -> Result<Vec<SvLevelEvent>> {
        self.events_for_flights(
            "id, flight_id, timestamp, target_level, running_average, lap_time_ms, trigger_kind",
            "sv_level_events",
            flight_ids,
            map_sv_level,
        )
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BatterySample, Timed};
    use tempfile::TempDir;

    fn session(started_at: i64) -> SessionRow {
        SessionRow { id: 0, name: None, started_at, ended_at: None }
    }

    fn flight(session_id: RowId, started_at: i64) -> FlightRow {
        FlightRow { id: 0, session_id, started_at, ended_at: None }
    }

    fn lap(flight_id: RowId, lap_number: u32, lap_time_ms: u64) -> LapEvent {
        LapEvent { id: 0, flight_id, timestamp: 0, lap_number, lap_time_ms }
    }

    fn memory() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn populate(store: &SqliteStore) -> (RowId, RowId) {
        let s = store.add_session(session(1_000)).unwrap();
        let f = store.add_flight(flight(s, 1_100)).unwrap();
        store.add_lap_event(lap(f, 1, 20_000)).unwrap();
        store.add_crash_event(CrashEvent { id: 0, flight_id: f, timestamp: 1_200 }).unwrap();
        store.add_holeshot_event(HoleshotEvent { id: 0, flight_id: f, timestamp: 1_150 }).unwrap();
        store
            .add_battery_batch(BatteryBatch {
                id: 0,
                flight_id: f,
                start_time: 1_100,
                samples: vec![Timed { t: 0, sample: BatterySample { voltage: 16.8, amperage: 1.0 } }],
            })
            .unwrap();
        (s, f)
    }

    #[test]
    fn test_ids_are_per_table_and_increasing() {
        let store = memory();
        let s1 = store.add_session(session(0)).unwrap();
        let s2 = store.add_session(session(1)).unwrap();
        let f1 = store.add_flight(flight(s2, 2)).unwrap();
        assert_eq!((s1, s2, f1), (1, 2, 1));
    }

    #[test]
    fn test_given_ids_are_ignored() {
        let store = memory();
        let id = store
            .add_session(SessionRow { id: 77, name: Some("club night".into()), started_at: 0, ended_at: None })
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.session(1).unwrap().unwrap().name.as_deref(), Some("club night"));
    }

    #[test]
    fn test_latest_flight_is_highest_id() {
        let store = memory();
        let s = store.add_session(session(0)).unwrap();
        store.add_flight(flight(s, 10)).unwrap();
        let second = store.add_flight(flight(s, 20)).unwrap();
        assert_eq!(store.latest_flight(s).unwrap().map(|f| f.id), Some(second));
        assert_eq!(store.latest_flight(99).unwrap(), None);
    }

    #[test]
    fn test_rows_for_unknown_parents_are_rejected() {
        let store = memory();
        assert!(
            matches!(store.add_lap_event(lap(7, 1, 20_000)), Err(FpvAidError::Sqlite(_))),
            "Foreign keys are enforced"
        );
        assert!(store.add_flight(flight(3, 0)).is_err());
        assert!(matches!(store.close_flight(7, 0), Err(FpvAidError::Store(_))));
        assert!(matches!(store.end_session(3, 0), Err(FpvAidError::Store(_))));
        assert!(matches!(store.delete_session(3), Err(FpvAidError::Store(_))));
    }

    #[test]
    fn test_close_flight_and_end_session_set_timestamps() {
        let store = memory();
        let (s, f) = populate(&store);
        store.close_flight(f, 5_000).unwrap();
        store.end_session(s, 6_000).unwrap();

        assert_eq!(store.flights_for_session(s).unwrap()[0].ended_at, Some(5_000));
        assert_eq!(store.session(s).unwrap().unwrap().ended_at, Some(6_000));
    }

    #[test]
    fn test_delete_session_cascades() {
        let store = memory();
        let (s, f) = populate(&store);
        let (other, other_flight) = populate(&store);

        store.delete_session(s).unwrap();

        assert!(store.session(s).unwrap().is_none());
        assert!(store.flights_for_session(s).unwrap().is_empty());
        assert!(store.lap_events_for_flights(&[f]).unwrap().is_empty());
        assert!(store.crash_events_for_flights(&[f]).unwrap().is_empty());
        assert!(store.holeshot_events_for_flights(&[f]).unwrap().is_empty());
        assert!(store.battery_batches_for_flight(f).unwrap().is_empty());

        assert!(store.session(other).unwrap().is_some(), "Other sessions are untouched");
        assert_eq!(store.lap_events_for_flights(&[other_flight]).unwrap().len(), 1);
    }

    #[test]
    fn test_event_queries_span_flights() {
        let store = memory();
        let s = store.add_session(session(0)).unwrap();
        let f1 = store.add_flight(flight(s, 0)).unwrap();
        let f2 = store.add_flight(flight(s, 10)).unwrap();
        store.add_lap_event(lap(f1, 1, 20_000)).unwrap();
        store.add_lap_event(lap(f2, 1, 21_000)).unwrap();
        store.add_lap_event(lap(f1, 2, 22_000)).unwrap();

        let times: Vec<u64> = store
            .lap_events_for_flights(&[f1, f2])
            .unwrap()
            .iter()
            .map(|e| e.lap_time_ms)
            .collect();
        assert_eq!(times, vec![20_000, 21_000, 22_000], "Insertion order across flights");
        assert!(store.lap_events_for_flights(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_level_event_fields_survive() {
        let store = memory();
        let (_, f) = populate(&store);
        for (trigger, lap_time_ms) in [(SvTrigger::Lap, Some(19_000)), (SvTrigger::Crash, None), (SvTrigger::Manual, None)] {
            store
                .add_sv_level_event(SvLevelEvent {
                    id: 0,
                    flight_id: f,
                    timestamp: 1_300,
                    target_level: -2,
                    running_average: 20_000.5,
                    lap_time_ms,
                    trigger,
                })
                .unwrap();
        }

        let events = store.sv_level_events_for_flights(&[f]).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].lap_time_ms, Some(19_000));
        assert_eq!(events[1].trigger, SvTrigger::Crash);
        assert_eq!(events[2].trigger, SvTrigger::Manual);
        assert_eq!(events[2].target_level, -2);
        assert_eq!(events[2].running_average, 20_000.5);
    }

    #[test]
    fn test_reopen_keeps_rows_and_accepts_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("fpv-aid.db");

        let (s, f) = {
            let store = SqliteStore::open(&path).unwrap();
            let ids = populate(&store);
            store.close_flight(ids.1, 2_000).unwrap();
            ids
        };

        let store = SqliteStore::open(&path).unwrap();
        let flights = store.flights_for_session(s).unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].ended_at, Some(2_000));
        assert_eq!(store.lap_events_for_flights(&[f]).unwrap()[0].lap_time_ms, 20_000);
        assert_eq!(store.battery_batches_for_flight(f).unwrap()[0].samples[0].sample.voltage, 16.8);

        let next = store.add_session(session(9_000)).unwrap();
        assert_eq!(next, s + 1, "Ids continue after reopen");
        drop(store);

        // A write after a reopen must not damage the file for the next open
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.sessions().unwrap().len(), 2);
        store.add_session(session(10_000)).unwrap();
        drop(store);
        assert_eq!(SqliteStore::open(&path).unwrap().sessions().unwrap().len(), 3);
    }

    #[test]
    fn test_deleted_ids_are_not_reused_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fpv-aid.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            let (s, _) = populate(&store);
            store.delete_session(s).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.sessions().unwrap().is_empty());
        assert_eq!(store.add_session(session(0)).unwrap(), 2);
    }

    #[test]
    fn test_garbage_file_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fpv-aid.db");
        fs::write(&path, "this is not a database at all, just some text").unwrap();

        assert!(matches!(SqliteStore::open(&path), Err(FpvAidError::Sqlite(_))));
    }

    #[test]
    fn test_in_memory_has_no_path() {
        assert!(memory().path().is_none());
    }
}
