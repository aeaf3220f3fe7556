//! # Coach Module
//!
//! Speed-variance training: the pilot flies a few warmup laps to set a
//! baseline, then is asked to hit lap-time bands faster or slower than that
//! baseline. Hitting the band `consecutive_laps_to_level_up` times in a row
//! raises the level; each lap also carries a random chance of dropping a
//! level, and a crash always drops one.
//!
//! Phases run `idle -> warmup -> active` and return to idle only when the
//! session ends. Resuming a session rebuilds the phase and level from the
//! store without announcing or persisting anything.

pub mod bands;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{level_announcement, Announcer};
use crate::error::Result;
use crate::observable::{Observable, Observe, Subscription};
use crate::probes::FlightState;
use crate::runtime::Clock;
use crate::settings::SettingsSource;
use crate::store::{Repository, RowId, SvLevelEvent, SvTrigger};
use crate::timing::{LapCrossing, LapFeed};

pub use bands::{baseline, LapVerdict, SpeedLevel, TargetLapTimes};

/// Source of uniform values in `[0, 100)` for the level-down roll
pub type RollSource = Box<dyn FnMut() -> f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    #[default]
    Idle,
    Warmup,
    Active,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainingPhase::Idle => "idle",
            TrainingPhase::Warmup => "warmup",
            TrainingPhase::Active => "active",
        };
        f.write_str(name)
    }
}

/// Observable coach state
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SpeedVarianceState {
    pub phase: TrainingPhase,
    pub warmup_laps_completed: u32,
    pub warmup_laps_required: u32,
    /// Baseline lap time in ms
    pub running_average: f64,
    pub target_level: SpeedLevel,
    /// `None` until the coach is active
    pub target_lap_times: Option<TargetLapTimes>,
    pub consecutive_on_target: u32,
    pub last_lap_time: Option<u64>,
}

fn default_roll() -> RollSource {
    Box::new(|| rand::rng().random_range(0.0..100.0))
}

/// Word spoken when the flight probe enters `state`.
fn flight_cue(state: FlightState) -> Option<&'static str> {
    match state {
        FlightState::Off => None,
        FlightState::Prepare => Some("prepare"),
        FlightState::Flying => Some("liftoff"),
        FlightState::Landed => Some("land"),
        FlightState::Crashed => Some("crash"),
    }
}

struct CoachInner {
    state: Observable<SpeedVarianceState>,
    settings: Rc<dyn SettingsSource>,
    repo: Rc<dyn Repository>,
    announcer: Rc<dyn Announcer>,
    clock: Rc<dyn Clock>,
    roll: RefCell<RollSource>,
    session_id: Cell<Option<RowId>>,
    lap_times: RefCell<Vec<u64>>,
    skip_next_crossing: Cell<bool>,
}

impl CoachInner {
    fn speak(&self, text: &str) {
        let settings = self.settings.settings();
        self.announcer.speak(text, &settings.tts_voice, settings.tts_rate);
    }

    fn announce_level(&self, level: SpeedLevel, avg: f64) {
        let targets = TargetLapTimes::around(avg, &self.settings.settings());
        let text = level_announcement(level.value(), Some(&targets.describe(level)));
        self.speak(&text);
    }

    fn record_level_event(&self, trigger: SvTrigger, level: SpeedLevel, avg: f64, lap: Option<u64>) {
        let Some(session_id) = self.session_id.get() else {
            return;
        };
        let flight = match self.repo.latest_flight(session_id) {
            Ok(Some(flight)) => flight,
            Ok(None) => {
                debug!("No flight in session {}; level event not stored", session_id);
                return;
            }
            Err(e) => {
                warn!("Failed to look up latest flight: {}", e);
                return;
            }
        };

        let event = SvLevelEvent {
            id: 0,
            flight_id: flight.id,
            timestamp: self.clock.now_ms(),
            target_level: level.value(),
            running_average: avg,
            lap_time_ms: lap,
            trigger,
        };
        if let Err(e) = self.repo.add_sv_level_event(event) {
            warn!("Failed to store level event: {}", e);
        }
    }

    fn on_lap(&self, crossing: &LapCrossing) {
        if self.session_id.get().is_none() {
            return;
        }
        if self.skip_next_crossing.replace(false) {
            debug!("Coach skipping holeshot crossing (lap {})", crossing.lap_number);
            return;
        }

        let settings = self.settings.settings();
        let lap = crossing.lap_time_ms;
        let avg = {
            let mut laps = self.lap_times.borrow_mut();
            laps.push(lap);
            baseline(&laps, settings.sv_baseline_pct)
        };
        let cur = self.state.get();

        match cur.phase {
            TrainingPhase::Idle => {}
            TrainingPhase::Warmup => {
                let completed = cur.warmup_laps_completed + 1;
                if completed >= cur.warmup_laps_required {
                    info!("Warmup complete after {} laps, baseline {:.0} ms", completed, avg);
                    self.state.set(SpeedVarianceState {
                        phase: TrainingPhase::Active,
                        warmup_laps_completed: completed,
                        running_average: avg,
                        target_level: SpeedLevel::ZERO,
                        target_lap_times: Some(TargetLapTimes::around(avg, &settings)),
                        consecutive_on_target: 0,
                        last_lap_time: Some(lap),
                        ..cur
                    });
                    self.record_level_event(SvTrigger::Lap, SpeedLevel::ZERO, avg, Some(lap));
                    self.announce_level(SpeedLevel::ZERO, avg);
                } else {
                    self.state.set(SpeedVarianceState {
                        warmup_laps_completed: completed,
                        running_average: avg,
                        last_lap_time: Some(lap),
                        ..cur
                    });
                }
            }
            TrainingPhase::Active => {
                let targets = TargetLapTimes::around(avg, &settings);
                let mut level = cur.target_level;
                let mut consecutive = cur.consecutive_on_target;

                let verdict = targets.classify(lap as f64, level);
                match verdict.cue() {
                    None => {
                        consecutive += 1;
                        self.announcer.play_confirm_tone();
                    }
                    Some(cue) => self.speak(cue),
                }

                if consecutive >= settings.consecutive_laps_to_level_up && level < SpeedLevel::MAX {
                    level = level.up();
                    consecutive = 0;
                }
                if level > SpeedLevel::MIN {
                    let roll = (self.roll.borrow_mut())();
                    if roll < settings.level_down_chance_pct {
                        level = level.down();
                        consecutive = 0;
                    }
                }

                self.state.set(SpeedVarianceState {
                    running_average: avg,
                    target_level: level,
                    target_lap_times: Some(targets),
                    consecutive_on_target: consecutive,
                    last_lap_time: Some(lap),
                    ..cur
                });

                if level != cur.target_level {
                    info!("Coach level {} -> {} after {} ms lap", cur.target_level, level, lap);
                    self.record_level_event(SvTrigger::Lap, level, avg, Some(lap));
                    self.announce_level(level, avg);
                }
            }
        }
    }

    fn on_flight_state(&self, state: FlightState) {
        if let Some(cue) = flight_cue(state) {
            self.speak(cue);
        }

        match state {
            FlightState::Off => {
                self.skip_next_crossing.set(true);
                return;
            }
            FlightState::Crashed => self.skip_next_crossing.set(true),
            FlightState::Prepare | FlightState::Flying | FlightState::Landed => return,
        }

        let cur = self.state.get();
        if cur.phase != TrainingPhase::Active || cur.target_level <= SpeedLevel::MIN {
            return;
        }

        let level = cur.target_level.down();
        let avg = cur.running_average;
        info!("Crash penalty: coach level {} -> {}", cur.target_level, level);
        self.state.set(SpeedVarianceState {
            target_level: level,
            consecutive_on_target: 0,
            ..cur
        });
        self.record_level_event(SvTrigger::Crash, level, avg, None);
        self.announce_level(level, avg);
    }

    fn restore(&self, session_id: RowId) -> Result<()> {
        let settings = self.settings.settings();
        let flight_ids: Vec<RowId> = self
            .repo
            .flights_for_session(session_id)?
            .iter()
            .map(|f| f.id)
            .collect();

        let laps: Vec<u64> = if flight_ids.is_empty() {
            Vec::new()
        } else {
            self.repo
                .lap_events_for_flights(&flight_ids)?
                .iter()
                .filter(|e| e.lap_number >= 1)
                .map(|e| e.lap_time_ms)
                .collect()
        };

        let completed = laps.len() as u32;
        let avg = baseline(&laps, settings.sv_baseline_pct);
        let last_lap_time = laps.last().copied();

        let next = if completed >= settings.warmup_laps {
            let level = if flight_ids.is_empty() {
                SpeedLevel::ZERO
            } else {
                let mut events = self.repo.sv_level_events_for_flights(&flight_ids)?;
                events.sort_by_key(|e| (e.timestamp, e.id));
                events
                    .last()
                    .map(|e| SpeedLevel::clamped(e.target_level))
                    .unwrap_or_default()
            };

            let targets = TargetLapTimes::around(avg, &settings);
            let warmup = (settings.warmup_laps as usize).min(laps.len());
            let consecutive = laps[warmup..]
                .iter()
                .rev()
                .take_while(|&&lap| targets.classify(lap as f64, level) == LapVerdict::OnTarget)
                .count() as u32;

            info!(
                "Resumed session {} active at level {} ({} laps, {} on target)",
                session_id, level, completed, consecutive
            );
            SpeedVarianceState {
                phase: TrainingPhase::Active,
                warmup_laps_completed: completed,
                warmup_laps_required: settings.warmup_laps,
                running_average: avg,
                target_level: level,
                target_lap_times: Some(targets),
                consecutive_on_target: consecutive,
                last_lap_time,
            }
        } else {
            info!(
                "Session {} in warmup ({}/{} laps)",
                session_id, completed, settings.warmup_laps
            );
            SpeedVarianceState {
                phase: TrainingPhase::Warmup,
                warmup_laps_completed: completed,
                warmup_laps_required: settings.warmup_laps,
                running_average: avg,
                last_lap_time,
                ..SpeedVarianceState::default()
            }
        };

        *self.lap_times.borrow_mut() = laps;
        self.state.set(next);
        Ok(())
    }
}

/// Adaptive lap-time coach.
pub struct SpeedVarianceCoach {
    inner: Rc<CoachInner>,
    subscriptions: Vec<Subscription>,
}

impl SpeedVarianceCoach {
    pub fn new(
        settings: Rc<dyn SettingsSource>,
        repo: Rc<dyn Repository>,
        announcer: Rc<dyn Announcer>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Rc::new(CoachInner {
                state: Observable::new(SpeedVarianceState::default()),
                settings,
                repo,
                announcer,
                clock,
                roll: RefCell::new(default_roll()),
                session_id: Cell::new(None),
                lap_times: RefCell::new(Vec::new()),
                skip_next_crossing: Cell::new(true),
            }),
            subscriptions: Vec::new(),
        }
    }

    /// Replace the level-down roll (uniform `[0, 100)` by default).
    pub fn with_roll(self, roll: RollSource) -> Self {
        *self.inner.roll.borrow_mut() = roll;
        self
    }

    /// Start (or resume) coaching for `session_id`.
    ///
    /// Rebuilds lap history from the store, then listens to lap crossings
    /// and flight-phase changes. The first crossing is always skipped.
    ///
    /// # Errors
    ///
    /// Returns the store error if the session history cannot be read; the
    /// coach is left idle in that case.
    pub fn start_session<F: Observe<FlightState>>(
        &mut self,
        session_id: RowId,
        feed: &LapFeed,
        flight: &F,
    ) -> Result<()> {
        self.end_session();

        self.inner.skip_next_crossing.set(true);
        self.inner.restore(session_id)?;
        self.inner.session_id.set(Some(session_id));

        let on_lap = Rc::downgrade(&self.inner);
        let on_flight = Rc::downgrade(&self.inner);
        self.subscriptions = vec![
            feed.on_lap_crossing(move |crossing| {
                if let Some(inner) = on_lap.upgrade() {
                    inner.on_lap(crossing);
                }
            }),
            flight.subscribe(move |state| {
                if let Some(inner) = on_flight.upgrade() {
                    inner.on_flight_state(*state);
                }
            }),
        ];
        Ok(())
    }

    /// Stop listening and return to idle. Idempotent.
    pub fn end_session(&mut self) {
        self.subscriptions.clear();
        if self.inner.session_id.take().is_some() {
            debug!("Coach session ended");
        }
        self.inner.lap_times.borrow_mut().clear();
        self.inner.state.set_if_changed(SpeedVarianceState::default());
    }

    /// Manually pick the target level while active.
    ///
    /// Returns `false` (and does nothing) when not active or when `level` is
    /// already the target.
    pub fn set_level(&self, level: SpeedLevel) -> bool {
        let cur = self.inner.state.get();
        if cur.phase != TrainingPhase::Active || cur.target_level == level {
            return false;
        }

        let avg = cur.running_average;
        info!("Manual coach level {} -> {}", cur.target_level, level);
        self.inner.state.set(SpeedVarianceState {
            target_level: level,
            consecutive_on_target: 0,
            ..cur
        });
        self.inner.record_level_event(SvTrigger::Manual, level, avg, None);
        self.inner.announce_level(level, avg);
        true
    }

    pub fn session_id(&self) -> Option<RowId> {
        self.inner.session_id.get()
    }
}

impl Observe<SpeedVarianceState> for SpeedVarianceCoach {
    fn get(&self) -> SpeedVarianceState {
        self.inner.state.get()
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SpeedVarianceState) + 'static,
    {
        self.inner.state.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mocks::RecordingAnnouncer;
    use crate::audio::MockAnnouncer;
    use crate::runtime::ManualScheduler;
    use crate::settings::{Settings, SharedSettings};
    use crate::store::{FlightRow, LapEvent, SessionRow, SqliteStore};
    use crate::timing::{LapRecord, NodeLaps, TimingSnapshot};
    use std::collections::VecDeque;

    struct Rig {
        settings: Rc<SharedSettings>,
        store: Rc<SqliteStore>,
        announcer: Rc<RecordingAnnouncer>,
        clock: ManualScheduler,
        feed: LapFeed,
        flight: Observable<FlightState>,
        session_id: RowId,
        laps_pushed: RefCell<Vec<LapRecord>>,
    }

    impl Rig {
        fn new(settings: Settings) -> Self {
            let settings = Rc::new(SharedSettings::new(settings));
            let store = Rc::new(SqliteStore::open_in_memory().unwrap());
            let session_id = store
                .add_session(SessionRow { id: 0, name: None, started_at: 0, ended_at: None })
                .unwrap();
            store
                .add_flight(FlightRow { id: 0, session_id, started_at: 0, ended_at: None })
                .unwrap();
            let feed = LapFeed::new(settings.clone());
            feed.on_connect();
            feed.push_snapshot(&TimingSnapshot::default());

            Self {
                settings,
                store,
                announcer: Rc::new(RecordingAnnouncer::default()),
                clock: ManualScheduler::new(1_000),
                feed,
                flight: Observable::new(FlightState::Off),
                session_id,
                laps_pushed: RefCell::new(Vec::new()),
            }
        }

        fn coach(&self, rolls: &[f64]) -> SpeedVarianceCoach {
            let mut queue: VecDeque<f64> = rolls.iter().copied().collect();
            SpeedVarianceCoach::new(
                self.settings.clone(),
                self.store.clone(),
                self.announcer.clone(),
                Rc::new(self.clock.clone()),
            )
            .with_roll(Box::new(move || queue.pop_front().unwrap_or(99.9)))
        }

        fn started(&self, rolls: &[f64]) -> SpeedVarianceCoach {
            let mut coach = self.coach(rolls);
            coach.start_session(self.session_id, &self.feed, &self.flight).unwrap();
            coach
        }

        fn lap(&self, lap_time_ms: u64) {
            let mut laps = self.laps_pushed.borrow_mut();
            let lap_number = laps.len() as u32;
            laps.push(LapRecord { lap_number, lap_time_ms, lap_timestamp: 0 });
            let snapshot = TimingSnapshot {
                nodes: vec![NodeLaps { node_index: 0, pilot_id: 1, callsign: None, laps: laps.clone() }],
            };
            drop(laps);
            self.feed.push_snapshot(&snapshot);
        }

        fn level_events(&self) -> Vec<SvLevelEvent> {
            self.store.sv_level_events_for_flights(&[1]).unwrap()
        }
    }

    fn warmup_settings() -> Settings {
        Settings {
            warmup_laps: 3,
            sv_baseline_pct: 100.0,
            sv_inner_fast_pct: 10.0,
            sv_inner_slow_pct: 10.0,
            sv_outer_fast_pct: 30.0,
            sv_outer_slow_pct: 30.0,
            level_down_chance_pct: 10.0,
            ..Settings::default()
        }
    }

    #[test]
    fn test_fresh_session_starts_in_warmup() {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(&[]);
        let state = coach.get();
        assert_eq!(state.phase, TrainingPhase::Warmup);
        assert_eq!(state.warmup_laps_required, 3);
        assert_eq!(state.warmup_laps_completed, 0);
    }

    #[test]
    fn test_first_crossing_is_skipped() {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(&[]);
        rig.lap(5_000);
        assert_eq!(coach.get().warmup_laps_completed, 0);
        rig.lap(20_000);
        assert_eq!(coach.get().warmup_laps_completed, 1);
        assert_eq!(coach.get().last_lap_time, Some(20_000));
    }

    #[test]
    fn test_three_warmup_laps_activate_at_level_zero() {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(&[]);
        rig.lap(5_000);
        for _ in 0..3 {
            rig.lap(20_000);
        }

        let state = coach.get();
        assert_eq!(state.phase, TrainingPhase::Active);
        assert_eq!(state.running_average, 20_000.0);
        assert_eq!(state.target_level, SpeedLevel::ZERO);
        assert_eq!(state.consecutive_on_target, 0);
        assert_eq!(
            state.target_lap_times.map(|t| t.inner_fast),
            Some(18_000.0)
        );

        let events = rig.level_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger, SvTrigger::Lap);
        assert_eq!(events[0].lap_time_ms, Some(20_000));
        assert_eq!(
            rig.announcer.spoken().last().map(String::as_str),
            Some("Level 0, from 18.0 to 22.0")
        );
    }

    fn active_rig(rolls: &[f64]) -> (Rig, SpeedVarianceCoach) {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(rolls);
        rig.lap(5_000);
        for _ in 0..3 {
            rig.lap(20_000);
        }
        rig.announcer.clear();
        (rig, coach)
    }

    #[test]
    fn test_slow_lap_is_called_out_and_keeps_counter() {
        let (rig, coach) = active_rig(&[]);
        rig.lap(20_000);
        assert_eq!(coach.get().consecutive_on_target, 1);

        // Baseline is 100% of laps, so one slow lap moves it only slightly
        rig.lap(25_000);
        let state = coach.get();
        assert_eq!(rig.announcer.spoken(), vec!["too slow".to_string()]);
        assert_eq!(state.consecutive_on_target, 1);
        assert_eq!(state.target_level, SpeedLevel::ZERO);
    }

    #[test]
    fn test_on_target_laps_play_tone_and_level_up() {
        let (rig, coach) = active_rig(&[]);
        for _ in 0..3 {
            rig.lap(20_000);
        }

        let state = coach.get();
        assert_eq!(rig.announcer.tones(), 3);
        assert_eq!(state.target_level.value(), 1);
        assert_eq!(state.consecutive_on_target, 0);
        assert_eq!(rig.level_events().last().map(|e| e.target_level), Some(1));
        assert!(rig.announcer.spoken().last().unwrap().starts_with("Level plus 1, from"));
    }

    #[test]
    fn test_level_down_roll_resets_counter() {
        // One roll per active lap; the second lap rolls under the chance
        let (rig, coach) = active_rig(&[50.0, 5.0]);
        rig.lap(20_000);
        rig.lap(20_000);

        let state = coach.get();
        assert_eq!(state.target_level.value(), -1);
        assert_eq!(state.consecutive_on_target, 0);
        assert!(rig.announcer.spoken().last().unwrap().starts_with("Level minus 1"));
    }

    #[test]
    fn test_level_up_and_down_on_same_lap_cancel_out() {
        let (rig, coach) = active_rig(&[50.0, 50.0, 1.0]);
        for _ in 0..3 {
            rig.lap(20_000);
        }

        let state = coach.get();
        assert_eq!(state.target_level, SpeedLevel::ZERO);
        assert_eq!(state.consecutive_on_target, 0);
        assert_eq!(rig.level_events().len(), 1, "No net change, nothing stored");
    }

    #[test]
    fn test_no_roll_at_minimum_level() {
        let (rig, coach) = active_rig(&[0.0]);
        rig.lap(20_000);
        assert_eq!(coach.get().target_level.value(), -1);

        for _ in 0..3 {
            rig.flight.set(FlightState::Crashed);
            rig.flight.set(FlightState::Flying);
        }
        assert_eq!(coach.get().target_level, SpeedLevel::MIN);
        // Roll queue is empty (defaults to 99.9); at MIN no roll is drawn
        rig.lap(20_000);
        rig.lap(40_000);
        assert_eq!(coach.get().target_level, SpeedLevel::MIN);
    }

    #[test]
    fn test_crash_drops_level_and_arms_skip() {
        let (rig, coach) = active_rig(&[]);
        rig.lap(20_000);
        rig.flight.set(FlightState::Crashed);

        let state = coach.get();
        assert_eq!(state.target_level.value(), -1);
        assert_eq!(state.consecutive_on_target, 0);
        let event = rig.level_events().pop().unwrap();
        assert_eq!(event.trigger, SvTrigger::Crash);
        assert_eq!(event.lap_time_ms, None);
        assert_eq!(
            rig.announcer.spoken(),
            vec!["crash".to_string(), "Level minus 1, from 22.0 to 26.0".to_string()]
        );

        let before = coach.get().last_lap_time;
        rig.lap(30_000);
        assert_eq!(coach.get().last_lap_time, before, "Crossing after crash is skipped");
    }

    #[test]
    fn test_crash_during_warmup_has_no_penalty() {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(&[]);
        rig.flight.set(FlightState::Crashed);
        assert_eq!(coach.get().target_level, SpeedLevel::ZERO);
        assert!(rig.level_events().is_empty());
    }

    #[test]
    fn test_flight_phase_cues() {
        let rig = Rig::new(warmup_settings());
        let _coach = rig.started(&[]);
        for state in [
            FlightState::Prepare,
            FlightState::Flying,
            FlightState::Landed,
            FlightState::Off,
        ] {
            rig.flight.set(state);
        }
        assert_eq!(rig.announcer.spoken(), vec!["prepare", "liftoff", "land"]);
    }

    #[test]
    fn test_off_rearms_skip() {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(&[]);
        rig.lap(5_000);
        rig.lap(20_000);
        rig.flight.set(FlightState::Prepare);
        rig.flight.set(FlightState::Off);
        rig.lap(4_000);
        assert_eq!(coach.get().warmup_laps_completed, 1);
    }

    #[test]
    fn test_manual_level() {
        let (rig, coach) = active_rig(&[]);
        assert!(coach.set_level(SpeedLevel::MAX));
        assert!(!coach.set_level(SpeedLevel::MAX));

        assert_eq!(coach.get().target_level, SpeedLevel::MAX);
        let event = rig.level_events().pop().unwrap();
        assert_eq!(event.trigger, SvTrigger::Manual);
        assert_eq!(rig.announcer.spoken(), vec!["Level plus 2, faster than 14.0"]);
    }

    #[test]
    fn test_manual_level_ignored_in_warmup() {
        let rig = Rig::new(warmup_settings());
        let coach = rig.started(&[]);
        assert!(!coach.set_level(SpeedLevel::MAX));
    }

    fn seed_laps(rig: &Rig, laps: &[(u32, u64)]) {
        for &(lap_number, lap_time_ms) in laps {
            rig.store
                .add_lap_event(LapEvent { id: 0, flight_id: 1, timestamp: 0, lap_number, lap_time_ms })
                .unwrap();
        }
    }

    #[test]
    fn test_resume_mid_warmup() {
        let rig = Rig::new(warmup_settings());
        seed_laps(&rig, &[(0, 4_000), (1, 20_000), (2, 22_000)]);
        let coach = rig.started(&[]);

        let state = coach.get();
        assert_eq!(state.phase, TrainingPhase::Warmup);
        assert_eq!(state.warmup_laps_completed, 2, "Lap 0 is not a real lap");
        assert_eq!(state.running_average, 21_000.0);
        assert_eq!(state.last_lap_time, Some(22_000));
    }

    #[test]
    fn test_resume_restores_level_and_on_target_streak() {
        let rig = Rig::new(warmup_settings());
        seed_laps(
            &rig,
            &[(1, 20_000), (2, 20_000), (3, 20_000), (4, 30_000), (5, 23_000), (6, 24_000)],
        );
        rig.store
            .add_sv_level_event(SvLevelEvent {
                id: 0,
                flight_id: 1,
                timestamp: 0,
                target_level: -1,
                running_average: 20_000.0,
                lap_time_ms: None,
                trigger: SvTrigger::Crash,
            })
            .unwrap();

        let coach = rig.started(&[]);
        let state = coach.get();
        // avg 22_833.3: level -1 band is (25_116.7, 29_683.3]
        assert_eq!(state.phase, TrainingPhase::Active);
        assert_eq!(state.target_level.value(), -1);
        assert_eq!(state.consecutive_on_target, 0, "Latest lap 24_000 is too fast for -1");
        assert!(rig.announcer.spoken().is_empty(), "Resume is silent");
        assert_eq!(rig.level_events().len(), 1, "Resume stores nothing");
    }

    #[test]
    fn test_resume_counts_streak_backwards() {
        let rig = Rig::new(warmup_settings());
        seed_laps(&rig, &[(1, 20_000), (2, 20_000), (3, 20_000), (4, 30_000), (5, 20_000), (6, 20_000)]);

        let coach = rig.started(&[]);
        let state = coach.get();
        // avg ~21_666.7: level 0 band [19_500, 23_833.3]
        assert_eq!(state.target_level, SpeedLevel::ZERO, "No level events means level 0");
        assert_eq!(state.consecutive_on_target, 2);
    }

    #[test]
    fn test_resume_takes_level_from_latest_timestamp() {
        let rig = Rig::new(warmup_settings());
        seed_laps(&rig, &[(1, 20_000), (2, 20_000), (3, 20_000)]);
        for (timestamp, target_level) in [(9_000, -2), (3_000, 1)] {
            rig.store
                .add_sv_level_event(SvLevelEvent {
                    id: 0,
                    flight_id: 1,
                    timestamp,
                    target_level,
                    running_average: 20_000.0,
                    lap_time_ms: None,
                    trigger: SvTrigger::Manual,
                })
                .unwrap();
        }

        let coach = rig.started(&[]);
        assert_eq!(
            coach.get().target_level.value(),
            -2,
            "Later insert with an earlier timestamp does not win"
        );
    }

    #[test]
    fn test_end_session_goes_idle_and_detaches() {
        let (rig, mut coach) = active_rig(&[]);
        coach.end_session();
        coach.end_session();
        assert_eq!(coach.get(), SpeedVarianceState::default());
        assert_eq!(coach.session_id(), None);

        rig.flight.set(FlightState::Prepare);
        rig.lap(20_000);
        assert!(rig.announcer.spoken().is_empty());
    }

    #[test]
    fn test_speech_uses_voice_settings() {
        let rig = Rig::new(Settings {
            tts_voice: "Daniel".into(),
            tts_rate: 1.3,
            ..warmup_settings()
        });
        let mut mock = MockAnnouncer::new();
        mock.expect_speak()
            .withf(|text, voice, rate| text == "prepare" && voice == "Daniel" && *rate == 1.3)
            .times(1)
            .return_const(());
        mock.expect_play_confirm_tone().never();

        let mut coach = SpeedVarianceCoach::new(
            rig.settings.clone(),
            rig.store.clone(),
            Rc::new(mock),
            Rc::new(rig.clock.clone()),
        );
        coach.start_session(rig.session_id, &rig.feed, &rig.flight).unwrap();
        rig.flight.set(FlightState::Prepare);
    }
}
