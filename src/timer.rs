use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, ClockState};
use crate::directory::SwimmerDirectory;
use crate::error::HeatError;
use crate::heat::HeatConfiguration;
use crate::result::{HeatEntry, HeatResult};
use crate::time_format::{format_time, SplitTime};

/// How times are captured during a heat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CaptureMode {
    /// One finish time per swimmer, first capture wins
    #[default]
    Finish,
    /// Shared laps, each assigned to any number of swimmers
    Laps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Finalized,
}

/// Where a piece of feedback is attached
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedbackKey {
    Swimmer(String),
    Lap { lap: usize, swimmer: String },
}

impl FeedbackKey {
    pub fn swimmer(name: &str) -> Self {
        FeedbackKey::Swimmer(name.to_string())
    }

    pub fn lap(lap: usize, swimmer: &str) -> Self {
        FeedbackKey::Lap {
            lap,
            swimmer: swimmer.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lap {
    pub time: SplitTime,
    pub swimmers: Vec<String>,
}

#[derive(Debug, Clone)]
enum Captures {
    Finish(HashMap<String, SplitTime>),
    Laps(Vec<Lap>),
}

impl Captures {
    fn empty(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Finish => Captures::Finish(HashMap::new()),
            CaptureMode::Laps => Captures::Laps(Vec::new()),
        }
    }
}

/// Stopwatch plus captured times for a single heat
#[derive(Debug)]
pub struct HeatTimer<C: Clock> {
    config: HeatConfiguration,
    mode: CaptureMode,
    clock: C,
    state: ClockState,
    phase: TimerPhase,
    captures: Captures,
    feedback: HashMap<FeedbackKey, String>,
}

impl<C: Clock> HeatTimer<C> {
    pub fn new(config: HeatConfiguration, mode: CaptureMode, clock: C) -> Self {
        Self {
            config,
            mode,
            clock,
            state: ClockState::new(),
            phase: TimerPhase::Idle,
            captures: Captures::empty(mode),
            feedback: HashMap::new(),
        }
    }

    pub fn config(&self) -> &HeatConfiguration {
        &self.config
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Elapsed time as of the last tick, pause or capture
    pub fn elapsed_ms(&self) -> u64 {
        self.state.elapsed_ms()
    }

    pub fn display(&self) -> String {
        format_time(self.elapsed_ms())
    }

    pub fn start(&mut self) {
        match self.phase {
            TimerPhase::Idle | TimerPhase::Paused => {
                self.state.start(self.clock.now_ms());
                self.phase = TimerPhase::Running;
                log::debug!("heat clock started at {}", self.display());
            }
            TimerPhase::Running | TimerPhase::Finalized => {}
        }
    }

    pub fn pause(&mut self) {
        if self.phase != TimerPhase::Running {
            return;
        }
        self.state.pause(self.clock.now_ms());
        self.phase = TimerPhase::Paused;
        log::debug!("heat clock paused at {}", self.display());
    }

    pub fn toggle(&mut self) {
        if self.is_running() {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Recompute elapsed time from the clock. Driven by the tick source.
    pub fn tick(&mut self) -> u64 {
        self.state.tick(self.clock.now_ms())
    }

    fn ensure_mutable(&self) -> Result<(), HeatError> {
        if self.phase == TimerPhase::Finalized {
            return Err(HeatError::Finalized);
        }
        Ok(())
    }

    fn ensure_roster(&self, swimmer: &str) -> Result<(), HeatError> {
        if !self.config.contains(swimmer) {
            return Err(HeatError::UnknownSwimmer(swimmer.to_string()));
        }
        Ok(())
    }

    fn wrong_mode(expected: CaptureMode, actual: CaptureMode) -> HeatError {
        HeatError::WrongMode { expected, actual }
    }

    /// Record the current time as `swimmer`'s finish.
    ///
    /// Returns the recorded split, or `None` when the swimmer already has one.
    /// Once every roster member has a time the clock pauses itself.
    pub fn capture_finish(&mut self, swimmer: &str) -> Result<Option<SplitTime>, HeatError> {
        self.ensure_mutable()?;
        self.ensure_roster(swimmer)?;
        let now = self.clock.now_ms();
        let elapsed = self.state.tick(now);
        let mode = self.mode;

        let finishes = match &mut self.captures {
            Captures::Finish(finishes) => finishes,
            Captures::Laps(_) => return Err(Self::wrong_mode(CaptureMode::Finish, mode)),
        };
        if finishes.contains_key(swimmer) {
            return Ok(None);
        }
        let split = SplitTime::from_millis(elapsed);
        finishes.insert(swimmer.to_string(), split);
        let complete = self.config.roster.iter().all(|name| finishes.contains_key(name));
        log::debug!("finish {} for {}", split, swimmer);

        if complete && self.phase == TimerPhase::Running {
            self.state.pause(now);
            self.phase = TimerPhase::Paused;
            log::debug!("all swimmers finished, heat clock paused at {}", self.display());
        }
        Ok(Some(split))
    }

    pub fn finish_time(&self, swimmer: &str) -> Option<String> {
        match &self.captures {
            Captures::Finish(finishes) => finishes.get(swimmer).map(SplitTime::to_string),
            Captures::Laps(_) => None,
        }
    }

    /// Append a lap at the current time. Laps are only taken while running;
    /// otherwise nothing is recorded and `None` is returned.
    pub fn capture_lap(&mut self) -> Result<Option<usize>, HeatError> {
        self.ensure_mutable()?;
        if !matches!(self.captures, Captures::Laps(_)) {
            return Err(Self::wrong_mode(CaptureMode::Laps, self.mode));
        }
        if !self.is_running() {
            log::debug!("lap ignored, heat clock is stopped");
            return Ok(None);
        }
        let elapsed = self.tick();
        let Captures::Laps(laps) = &mut self.captures else {
            return Ok(None);
        };
        laps.push(Lap {
            time: SplitTime::from_millis(elapsed),
            swimmers: Vec::new(),
        });
        Ok(Some(laps.len() - 1))
    }

    pub fn laps(&self) -> &[Lap] {
        match &self.captures {
            Captures::Laps(laps) => laps,
            Captures::Finish(_) => &[],
        }
    }

    /// Replace the set of swimmers credited with a lap. A swimmer may hold
    /// any number of laps.
    pub fn assign_swimmers_to_lap<S: AsRef<str>>(&mut self, lap: usize, swimmers: &[S]) -> Result<(), HeatError> {
        self.ensure_mutable()?;
        let mut assigned: Vec<String> = Vec::with_capacity(swimmers.len());
        for swimmer in swimmers {
            let swimmer = swimmer.as_ref();
            self.ensure_roster(swimmer)?;
            if !assigned.iter().any(|s| s == swimmer) {
                assigned.push(swimmer.to_string());
            }
        }
        let mode = self.mode;
        let laps = match &mut self.captures {
            Captures::Laps(laps) => laps,
            Captures::Finish(_) => return Err(Self::wrong_mode(CaptureMode::Laps, mode)),
        };
        let target = laps.get_mut(lap).ok_or(HeatError::UnknownLap(lap))?;
        target.swimmers = assigned;
        Ok(())
    }

    /// Store feedback, overwriting what was there. An empty text clears it.
    pub fn set_feedback(&mut self, key: FeedbackKey, text: &str) -> Result<(), HeatError> {
        self.ensure_mutable()?;
        match (&key, &self.captures) {
            (FeedbackKey::Swimmer(swimmer), Captures::Finish(_)) => self.ensure_roster(swimmer)?,
            (FeedbackKey::Lap { lap, swimmer }, Captures::Laps(laps)) => {
                if *lap >= laps.len() {
                    return Err(HeatError::UnknownLap(*lap));
                }
                self.ensure_roster(swimmer)?;
            }
            (FeedbackKey::Swimmer(_), Captures::Laps(_)) => return Err(Self::wrong_mode(CaptureMode::Finish, self.mode)),
            (FeedbackKey::Lap { .. }, Captures::Finish(_)) => return Err(Self::wrong_mode(CaptureMode::Laps, self.mode)),
        }
        if text.is_empty() {
            self.feedback.remove(&key);
        } else {
            self.feedback.insert(key, text.to_string());
        }
        Ok(())
    }

    pub fn feedback(&self, key: &FeedbackKey) -> &str {
        self.feedback.get(key).map(String::as_str).unwrap_or("")
    }

    /// Back to `Idle`: clock at zero, every capture and all feedback dropped
    pub fn reset(&mut self) {
        self.state.reset();
        self.captures = Captures::empty(self.mode);
        self.feedback.clear();
        self.phase = TimerPhase::Idle;
        log::debug!("heat timer reset");
    }

    pub fn finalize<D: SwimmerDirectory + ?Sized>(&mut self, directory: &D) -> Result<HeatResult, HeatError> {
        self.finalize_at(Utc::now(), directory)
    }

    /// Build the result record. On `NoValidEntries` nothing changes and the
    /// heat can still be captured into and finalized again.
    pub fn finalize_at<D: SwimmerDirectory + ?Sized>(
        &mut self,
        date: DateTime<Utc>,
        directory: &D,
    ) -> Result<HeatResult, HeatError> {
        self.ensure_mutable()?;
        let entries = match &self.captures {
            Captures::Finish(finishes) => self.finish_entries(finishes, directory),
            Captures::Laps(laps) => self.lap_entries(laps, directory),
        };
        if entries.is_empty() {
            log::warn!("heat over {} has no valid entries", self.config.distance);
            return Err(HeatError::NoValidEntries);
        }

        self.state.pause(self.clock.now_ms());
        self.phase = TimerPhase::Finalized;
        log::debug!("heat over {} finalized with {} entries", self.config.distance, entries.len());
        Ok(HeatResult {
            distance: self.config.distance.clone(),
            date,
            entries,
        })
    }

    fn finish_entries<D: SwimmerDirectory + ?Sized>(
        &self,
        finishes: &HashMap<String, SplitTime>,
        directory: &D,
    ) -> Vec<HeatEntry> {
        self.config
            .roster
            .iter()
            .filter_map(|name| {
                let time = finishes.get(name)?;
                Some(HeatEntry {
                    name: name.clone(),
                    email: directory.email_for(name),
                    stroke: self.config.stroke_for(name).to_string(),
                    time: time.to_string(),
                    feedback: self.feedback(&FeedbackKey::swimmer(name)).to_string(),
                })
            })
            .collect()
    }

    fn lap_entries<D: SwimmerDirectory + ?Sized>(&self, laps: &[Lap], directory: &D) -> Vec<HeatEntry> {
        let mut entries = Vec::new();
        for (index, lap) in laps.iter().enumerate() {
            for name in &lap.swimmers {
                let Some(email) = directory.email_for(name) else {
                    log::warn!("no account for {}, lap {} at {} not saved", name, index + 1, lap.time);
                    continue;
                };
                entries.push(HeatEntry {
                    name: name.clone(),
                    email: Some(email),
                    stroke: self.config.stroke_for(name).to_string(),
                    time: lap.time.to_string(),
                    feedback: self.feedback(&FeedbackKey::lap(index, name)).to_string(),
                });
            }
        }
        entries
    }
}
