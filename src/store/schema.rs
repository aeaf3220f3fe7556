pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    started_at INTEGER NOT NULL,
    ended_at INTEGER
);

CREATE TABLE IF NOT EXISTS flights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    started_at INTEGER NOT NULL,
    ended_at INTEGER
);

CREATE TABLE IF NOT EXISTS battery_batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    start_time INTEGER NOT NULL,
    samples JSON NOT NULL
);

CREATE TABLE IF NOT EXISTS stick_batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    start_time INTEGER NOT NULL,
    samples JSON NOT NULL
);

CREATE TABLE IF NOT EXISTS crash_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS lap_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL,
    lap_number INTEGER NOT NULL,
    lap_time_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS holeshot_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sv_level_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    timestamp INTEGER NOT NULL,
    target_level INTEGER NOT NULL CHECK (target_level BETWEEN -2 AND 2),
    running_average REAL NOT NULL,
    lap_time_ms INTEGER,
    trigger_kind TEXT NOT NULL CHECK (trigger_kind IN ('lap', 'crash', 'manual'))
);

CREATE INDEX IF NOT EXISTS idx_flights_session ON flights(session_id);
CREATE INDEX IF NOT EXISTS idx_battery_batches_flight ON battery_batches(flight_id);
CREATE INDEX IF NOT EXISTS idx_stick_batches_flight ON stick_batches(flight_id);
CREATE INDEX IF NOT EXISTS idx_crash_events_flight ON crash_events(flight_id);
CREATE INDEX IF NOT EXISTS idx_lap_events_flight ON lap_events(flight_id);
CREATE INDEX IF NOT EXISTS idx_holeshot_events_flight ON holeshot_events(flight_id);
CREATE INDEX IF NOT EXISTS idx_sv_level_events_flight ON sv_level_events(flight_id);
"#;
