//! # FPV Aid
//!
//! Flight recording and lap-time coaching for FPV drones.
//!
//! The `run` command reads JSON-lines input events (decoded receiver
//! telemetry and race-timing snapshots) from stdin, derives arm and flight
//! state, records flights into the SQLite store and coaches lap times by
//! voice cue.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration, set up logging
//!    - Open the SQLite store
//!    - Start or resume a session
//!
//! 2. **Main Loop**
//!    - Apply each stdin input event to the pipeline
//!    - Timers (staleness sweep, throttle poll, recorders) run on the local task set
//!    - Handle Ctrl+C or end of input for shutdown
//!
//! 3. **Graceful Shutdown**
//!    - End the session (flush recorders, close the flight)
//!    - Log total event count
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- --config fpv-aid.toml run --name "Tuesday practice"
//! cargo run --release -- replay recorded.jsonl
//! cargo run --release -- sessions
//! ```

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::LocalSet;
use tracing::{info, warn};

use fpv_aid::audio::LogAnnouncer;
use fpv_aid::config::Config;
use fpv_aid::input::InputLine;
use fpv_aid::logging::init_logging;
use fpv_aid::pipeline::Pipeline;
use fpv_aid::runtime::{ManualScheduler, SystemClock, TokioScheduler};
use fpv_aid::store::{Repository, RowId, SqliteStore};

#[derive(Parser)]
#[command(name = "fpv-aid", version, about = "Flight recording and lap-time coaching for FPV drones")]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a live session fed from stdin
    Run {
        /// Resume an existing session instead of starting a new one
        #[arg(long)]
        resume: Option<RowId>,

        /// Name for a new session
        #[arg(long)]
        name: Option<String>,
    },
    /// Replay a recorded input file on a virtual clock
    Replay {
        file: PathBuf,

        #[arg(long)]
        name: Option<String>,
    },
    /// List stored sessions
    Sessions,
    /// Delete a session and everything recorded in it
    DeleteSession { id: RowId },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(Config::default()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging)?;

    info!("FPV Aid v{} starting...", env!("CARGO_PKG_VERSION"));

    let store = Rc::new(
        SqliteStore::open(&config.store.path)
            .with_context(|| format!("opening store {}", config.store.path.display()))?,
    );

    match cli.command.unwrap_or(Command::Run { resume: None, name: None }) {
        Command::Run { resume, name } => {
            LocalSet::new().run_until(run_live(config, store, resume, name)).await
        }
        Command::Replay { file, name } => replay(&config, store, &file, name),
        Command::Sessions => list_sessions(store.as_ref()),
        Command::DeleteSession { id } => {
            store.delete_session(id)?;
            info!("Session {} deleted", id);
            Ok(())
        }
    }
}

fn open_session(pipeline: &mut Pipeline, resume: Option<RowId>, name: Option<String>) -> Result<RowId> {
    match resume {
        Some(id) => {
            pipeline.resume_session(id).with_context(|| format!("resuming session {}", id))?;
            Ok(id)
        }
        None => Ok(pipeline.start_session(name)?),
    }
}

async fn run_live(config: Config, store: Rc<SqliteStore>, resume: Option<RowId>, name: Option<String>) -> Result<()> {
    let mut pipeline = Pipeline::new(
        &config,
        store,
        Rc::new(LogAnnouncer),
        Rc::new(SystemClock),
        Rc::new(TokioScheduler),
    );
    let session_id = open_session(&mut pipeline, resume, name)?;

    info!("Reading input events from stdin for session {}", session_id);
    info!("Press Ctrl+C to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut event_count: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed, shutting down...");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match InputLine::parse(&line) {
                    Ok(input) => {
                        input.event.apply(&pipeline);
                        event_count += 1;
                    }
                    Err(e) => warn!("Skipping bad input line: {}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    pipeline.dispose();
    info!("Total input events: {}", event_count);
    Ok(())
}

fn replay(config: &Config, store: Rc<SqliteStore>, file: &Path, name: Option<String>) -> Result<()> {
    let contents = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let mut inputs = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let input = InputLine::parse(line).with_context(|| format!("{}:{}", file.display(), index + 1))?;
        inputs.push(input);
    }

    let start_ms = inputs.iter().find_map(|i| i.at_ms).unwrap_or(0);
    let sched = ManualScheduler::new(start_ms);
    let mut pipeline = Pipeline::new(
        config,
        store,
        Rc::new(LogAnnouncer),
        Rc::new(sched.clone()),
        Rc::new(sched.clone()),
    );
    let session_id = pipeline.start_session(name)?;

    let event_count = inputs.len();
    for input in inputs {
        if let Some(at_ms) = input.at_ms {
            sched.advance_to(at_ms);
        }
        input.event.apply(&pipeline);
    }

    pipeline.dispose();
    info!("Replayed {} input events into session {}", event_count, session_id);
    Ok(())
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn list_sessions(store: &dyn Repository) -> Result<()> {
    let sessions = store.sessions()?;
    if sessions.is_empty() {
        println!("No sessions recorded");
        return Ok(());
    }

    for session in sessions {
        let flights = store.flights_for_session(session.id)?.len();
        let ended = session.ended_at.map(format_ms).unwrap_or_else(|| "open".to_string());
        println!(
            "{:>4}  {}  {:<19}  {:>3} flights  {}",
            session.id,
            format_ms(session.started_at),
            ended,
            flights,
            session.name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
