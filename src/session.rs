use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::clock::Clock;
use crate::directory::SwimmerDirectory;
use crate::error::{HeatError, SaveError};
use crate::result::HeatResult;
use crate::runtime::{HeatEvent, TickHandle};
use crate::store::HeatSink;
use crate::time_format::SplitTime;
use crate::timer::{FeedbackKey, HeatTimer};

/// A heat as owned by the screen that times it.
///
/// Holds the timer together with at most one tick source. Every run-state
/// transition cancels the current tick source before deciding whether a new
/// one is needed, and dropping the session cancels it too.
#[derive(Debug)]
pub struct HeatSession<C: Clock> {
    timer: HeatTimer<C>,
    ticks: Option<TickHandle>,
    tick_tx: Sender<HeatEvent>,
    tick_interval: Duration,
    pending: Option<HeatResult>,
}

impl<C: Clock> HeatSession<C> {
    pub fn new(timer: HeatTimer<C>, tick_tx: Sender<HeatEvent>, tick_interval: Duration) -> Self {
        Self {
            timer,
            ticks: None,
            tick_tx,
            tick_interval,
            pending: None,
        }
    }

    pub fn timer(&self) -> &HeatTimer<C> {
        &self.timer
    }

    /// Swap in a fresh timer, discarding the previous heat and anything not saved
    pub fn refocus(&mut self, timer: HeatTimer<C>) {
        self.cancel_ticks();
        if self.pending.take().is_some() {
            log::warn!("discarding unsaved heat result");
        }
        self.timer = timer;
    }

    pub fn is_ticking(&self) -> bool {
        self.ticks.as_ref().is_some_and(TickHandle::is_active)
    }

    fn cancel_ticks(&mut self) {
        if let Some(mut ticks) = self.ticks.take() {
            ticks.cancel();
        }
    }

    fn sync_ticks(&mut self) {
        self.cancel_ticks();
        if self.timer.is_running() {
            self.ticks = Some(TickHandle::spawn(self.tick_interval, self.tick_tx.clone()));
        }
    }

    pub fn start(&mut self) {
        self.timer.start();
        self.sync_ticks();
    }

    pub fn pause(&mut self) {
        self.timer.pause();
        self.sync_ticks();
    }

    pub fn toggle(&mut self) {
        self.timer.toggle();
        self.sync_ticks();
    }

    pub fn tick(&mut self) -> u64 {
        self.timer.tick()
    }

    pub fn capture_finish(&mut self, swimmer: &str) -> Result<Option<SplitTime>, HeatError> {
        let split = self.timer.capture_finish(swimmer)?;
        if !self.timer.is_running() {
            self.cancel_ticks();
        }
        Ok(split)
    }

    pub fn capture_lap(&mut self) -> Result<Option<usize>, HeatError> {
        self.timer.capture_lap()
    }

    pub fn assign_swimmers_to_lap<S: AsRef<str>>(&mut self, lap: usize, swimmers: &[S]) -> Result<(), HeatError> {
        self.timer.assign_swimmers_to_lap(lap, swimmers)
    }

    pub fn set_feedback(&mut self, key: FeedbackKey, text: &str) -> Result<(), HeatError> {
        self.timer.set_feedback(key, text)
    }

    pub fn reset(&mut self) {
        self.cancel_ticks();
        self.pending = None;
        self.timer.reset();
    }

    /// A result that was finalized but could not be stored yet
    pub fn pending_result(&self) -> Option<&HeatResult> {
        self.pending.as_ref()
    }

    /// Finalize the heat (once) and hand it to `sink`.
    ///
    /// When the sink fails the finalized result is kept and the next call
    /// retries the write with the same result.
    pub fn save<D, S>(&mut self, directory: &D, sink: &mut S) -> Result<i64, SaveError>
    where
        D: SwimmerDirectory + ?Sized,
        S: HeatSink + ?Sized,
    {
        let result = match self.pending.take() {
            Some(result) => result,
            None => {
                let result = self.timer.finalize(directory)?;
                self.cancel_ticks();
                result
            }
        };

        match sink.store(&result) {
            Ok(id) => {
                log::debug!("heat over {} saved as {}", result.distance, id);
                Ok(id)
            }
            Err(e) => {
                log::error!("heat over {} not saved - {}", result.distance, e);
                self.pending = Some(result);
                Err(e.into())
            }
        }
    }
}

impl<C: Clock> Drop for HeatSession<C> {
    fn drop(&mut self) {
        self.cancel_ticks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{MemoryDirectory, NoDirectory};
    use crate::error::StoreError;
    use crate::heat::HeatConfiguration;
    use crate::store::HeatDb;
    use crate::timer::{CaptureMode, TimerPhase};
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::sync::mpsc;

    struct FlakySink {
        failures_left: usize,
        stored: Vec<HeatResult>,
    }

    impl HeatSink for FlakySink {
        fn store(&mut self, result: &HeatResult) -> Result<i64, StoreError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "offline",
                )));
            }
            self.stored.push(result.clone());
            Ok(self.stored.len() as i64)
        }
    }

    fn session(mode: CaptureMode) -> (HeatSession<ManualClock>, ManualClock, mpsc::Receiver<HeatEvent>) {
        let clock = ManualClock::new(0);
        let cfg = HeatConfiguration::new(vec!["Ana".into(), "Leo".into()], "25 m", HashMap::new());
        let (tx, rx) = mpsc::channel();
        let timer = HeatTimer::new(cfg, mode, clock.clone());
        (HeatSession::new(timer, tx, Duration::from_millis(1)), clock, rx)
    }

    #[test]
    fn test_tick_source_follows_run_state() {
        let (mut session, _, rx) = session(CaptureMode::Finish);
        assert!(!session.is_ticking());

        session.start();
        assert!(session.is_ticking());
        assert!(matches!(rx.recv_timeout(Duration::from_secs(1)), Ok(HeatEvent::Tick)));

        session.pause();
        assert!(!session.is_ticking());

        session.toggle();
        assert!(session.is_ticking());
        session.reset();
        assert!(!session.is_ticking());
    }

    #[test]
    fn test_restart_keeps_a_single_tick_source() {
        let (mut session, _, _rx) = session(CaptureMode::Finish);
        session.start();
        session.start();
        session.toggle();
        session.toggle();
        assert!(session.is_ticking());
        assert!(session.ticks.is_some());
    }

    #[test]
    fn test_last_finish_stops_ticking() {
        let (mut session, clock, _rx) = session(CaptureMode::Finish);
        session.start();
        clock.advance(1_000);
        session.capture_finish("Ana").unwrap();
        assert!(session.is_ticking());
        clock.advance(1_000);
        session.capture_finish("Leo").unwrap();
        assert!(!session.is_ticking());
        assert!(!session.timer().is_running());
    }

    #[test]
    fn test_save_retries_after_sink_failure() {
        let (mut session, clock, _rx) = session(CaptureMode::Finish);
        session.start();
        clock.advance(15_500);
        session.capture_finish("Ana").unwrap();

        let mut sink = FlakySink {
            failures_left: 1,
            stored: Vec::new(),
        };
        assert_matches!(session.save(&NoDirectory, &mut sink), Err(SaveError::Store(_)));
        assert_eq!(session.timer().phase(), TimerPhase::Finalized);
        let pending = session.pending_result().cloned().unwrap();
        assert_eq!(pending.entries[0].time, "00:15,50");

        clock.advance(60_000);
        assert_eq!(session.save(&NoDirectory, &mut sink).unwrap(), 1);
        assert!(session.pending_result().is_none());
        assert_eq!(sink.stored, vec![pending]);
    }

    #[test]
    fn test_save_without_entries_keeps_heat_open() {
        let (mut session, _, _rx) = session(CaptureMode::Laps);
        session.start();
        let mut db = HeatDb::open_in_memory().unwrap();
        assert_matches!(
            session.save(&NoDirectory, &mut db),
            Err(SaveError::Heat(HeatError::NoValidEntries))
        );
        assert!(session.is_ticking());
        assert!(session.pending_result().is_none());
    }

    #[test]
    fn test_save_lap_heat_into_db() {
        let (mut session, clock, _rx) = session(CaptureMode::Laps);
        session.start();
        clock.advance(9_870);
        let lap = session.capture_lap().unwrap().unwrap();
        session.assign_swimmers_to_lap(lap, &["Ana", "Leo"]).unwrap();
        session.set_feedback(FeedbackKey::lap(lap, "Leo"), "kick").unwrap();

        let dir = MemoryDirectory::new().with_swimmer("Leo", "leo@example.com");
        let mut db = HeatDb::open_in_memory().unwrap();
        let id = session.save(&dir, &mut db).unwrap();
        assert!(!session.is_ticking());

        let stored = db.get_heat(id).unwrap().unwrap();
        assert_eq!(stored.result.entries.len(), 1);
        assert_eq!(stored.result.entries[0].name, "Leo");
        assert_eq!(stored.result.entries[0].time, "00:09,87");
        assert_eq!(stored.result.entries[0].feedback, "kick");
    }

    #[test]
    fn test_refocus_discards_previous_heat() {
        let (mut session, clock, _rx) = session(CaptureMode::Finish);
        session.start();
        clock.advance(500);
        session.capture_finish("Ana").unwrap();

        let cfg = HeatConfiguration::new(vec!["Mia".into()], "50 m", HashMap::new());
        session.refocus(HeatTimer::new(cfg, CaptureMode::Finish, clock.clone()));
        assert!(!session.is_ticking());
        assert_eq!(session.timer().phase(), TimerPhase::Idle);
        assert_eq!(session.timer().config().distance, "50 m");
    }
}
