use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Unified event type consumed by the heat screen
#[derive(Clone, Debug)]
pub enum HeatEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of screen events (keyboard, resize, clock ticks)
pub trait HeatEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<HeatEvent, RecvTimeoutError>;

    /// Sender that feeds this source, used to attach a tick source
    fn sender(&self) -> Sender<HeatEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<HeatEvent>,
    rx: Receiver<HeatEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let keys = tx.clone();

        thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if keys.send(HeatEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if keys.send(HeatEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("terminal input closed - {}", e);
                    break;
                }
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<HeatEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<HeatEvent> {
        self.tx.clone()
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    tx: Sender<HeatEvent>,
    rx: Receiver<HeatEvent>,
}

impl TestEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for TestEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<HeatEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<HeatEvent> {
        self.tx.clone()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// An owned, cancelable tick thread.
///
/// Sends [`HeatEvent::Tick`] every interval until cancelled or dropped.
/// Cancelling joins the thread, so once `cancel` returns no further tick from
/// this handle can be sent.
#[derive(Debug)]
pub struct TickHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TickHandle {
    pub fn spawn(interval: Duration, tx: Sender<HeatEvent>) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if tx.send(HeatEvent::Tick).is_err() {
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            stop: Some(stop),
            thread: Some(thread),
        }
    }

    pub fn is_active(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancel(&mut self) {
        // dropping the sender disconnects the tick loop
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("tick thread panicked");
            }
        }
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runner that advances the screen one event/tick at a time
pub struct Runner<E: HeatEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: HeatEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn sender(&self) -> Sender<HeatEvent> {
        self.event_source.sender()
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> HeatEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => HeatEvent::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn step_returns_tick_on_timeout() {
        let es = TestEventSource::new();
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        // With no events available, step should yield Tick
        let ev = runner.step();
        match ev {
            HeatEvent::Tick => {}
            _ => panic!("expected Tick on timeout"),
        }
    }

    #[test]
    fn step_passes_through_events() {
        let es = TestEventSource::new();
        es.sender().send(HeatEvent::Resize).unwrap();
        let ticker = FixedTicker::new(Duration::from_millis(10));
        let runner = Runner::new(es, ticker);

        match runner.step() {
            HeatEvent::Resize => {}
            _ => panic!("expected Resize event"),
        }
    }

    #[test]
    fn tick_handle_sends_ticks_until_cancelled() {
        let (tx, rx) = mpsc::channel();
        let mut handle = TickHandle::spawn(Duration::from_millis(2), tx);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)),
            Ok(HeatEvent::Tick)
        ));
        assert!(handle.is_active());

        handle.cancel();
        assert!(!handle.is_active());
        // drain whatever was sent before the join, then nothing more arrives
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn tick_handle_cancels_on_drop() {
        let (tx, rx) = mpsc::channel();
        {
            let _handle = TickHandle::spawn(Duration::from_millis(1), tx);
            thread::sleep(Duration::from_millis(5));
        }
        while rx.try_recv().is_ok() {}
        // the thread owned the only sender and has exited
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(20)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn cancel_is_prompt() {
        let (tx, _rx) = mpsc::channel();
        let mut handle = TickHandle::spawn(Duration::from_secs(30), tx);
        let started = Instant::now();
        handle.cancel();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
