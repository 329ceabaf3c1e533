use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic milliseconds for the heat clock
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall clock anchored at construction time
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one
/// handle and pass the other into a timer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Elapsed time of a heat.
///
/// While running the value is always recomputed as `now - anchor`, never
/// accumulated from tick deltas, so late or skipped ticks cannot drift.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockState {
    elapsed_ms: u64,
    anchor_ms: Option<u64>,
}

impl ClockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.anchor_ms.is_some()
    }

    pub fn start(&mut self, now_ms: u64) {
        if self.is_running() {
            return;
        }
        self.anchor_ms = Some(now_ms.saturating_sub(self.elapsed_ms));
    }

    pub fn pause(&mut self, now_ms: u64) {
        if let Some(anchor) = self.anchor_ms.take() {
            self.elapsed_ms = now_ms.saturating_sub(anchor).max(self.elapsed_ms);
        }
    }

    pub fn tick(&mut self, now_ms: u64) -> u64 {
        if let Some(anchor) = self.anchor_ms {
            // monotonic non-decreasing even if a caller hands us an older `now`
            self.elapsed_ms = now_ms.saturating_sub(anchor).max(self.elapsed_ms);
        }
        self.elapsed_ms
    }

    pub fn reset(&mut self) {
        self.elapsed_ms = 0;
        self.anchor_ms = None;
    }

    /// Last settled value, as of the latest tick/pause
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn elapsed_at(&self, now_ms: u64) -> u64 {
        match self.anchor_ms {
            Some(anchor) => now_ms.saturating_sub(anchor).max(self.elapsed_ms),
            None => self.elapsed_ms,
        }
    }
}
