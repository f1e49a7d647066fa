use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEvent};

/// Live stats refresh while a test is running
pub const LIVE_TICK: Duration = Duration::from_millis(100);
/// Poll interval when nothing on screen is counting
pub const IDLE_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Where key and resize events come from; `None` means nothing arrived in time.
pub trait AppEventSource {
    fn next_event(&self, timeout: Duration) -> Option<AppEvent>;
}

/// Reads the real terminal
#[derive(Debug, Default)]
pub struct CrosstermEventSource;

impl CrosstermEventSource {
    pub fn new() -> Self {
        Self
    }
}

impl AppEventSource for CrosstermEventSource {
    fn next_event(&self, timeout: Duration) -> Option<AppEvent> {
        let ready = event::poll(timeout)
            .inspect_err(|e| tracing::warn!(error = %e, "terminal poll failed"))
            .ok()?;
        if !ready {
            return None;
        }
        match event::read() {
            Ok(Event::Key(key)) => Some(AppEvent::Key(key)),
            Ok(Event::Resize(..)) => Some(AppEvent::Resize),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "terminal read failed");
                None
            }
        }
    }
}

/// Scripted events for tests; a dropped sender just yields ticks
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl AppEventSource for TestEventSource {
    fn next_event(&self, timeout: Duration) -> Option<AppEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Fast ticks during a run, slow ones otherwise, so the live timer stops
/// once a test completes or is abandoned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTicker {
    pub live: Duration,
    pub idle: Duration,
}

impl SessionTicker {
    /// Same interval whatever the session is doing
    pub fn fixed(interval: Duration) -> Self {
        Self {
            live: interval,
            idle: interval,
        }
    }

    pub fn interval(&self, live: bool) -> Duration {
        if live {
            self.live
        } else {
            self.idle
        }
    }
}

impl Default for SessionTicker {
    fn default() -> Self {
        Self {
            live: LIVE_TICK,
            idle: IDLE_TICK,
        }
    }
}

/// Turns an event source into one event per call, synthesising ticks
pub struct Runner<E: AppEventSource> {
    events: E,
    ticker: SessionTicker,
}

impl<E: AppEventSource> Runner<E> {
    pub fn new(events: E, ticker: SessionTicker) -> Self {
        Self { events, ticker }
    }

    /// Wait at most one tick interval; `live` picks the interval
    pub fn step(&self, live: bool) -> AppEvent {
        self.events
            .next_event(self.ticker.interval(live))
            .unwrap_or(AppEvent::Tick)
    }
}

/// Decides when an idle snippet is due to be swapped
#[derive(Clone, Copy, Debug)]
pub struct RotationCadence {
    every: Duration,
    last: Instant,
}

impl RotationCadence {
    pub fn new(every: Duration, now: Instant) -> Self {
        Self { every, last: now }
    }

    /// Restart the countdown, e.g. after the user picked a snippet.
    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    /// True at most once per period; only counts down while `idle`.
    pub fn due(&mut self, now: Instant, idle: bool) -> bool {
        if !idle {
            self.last = now;
            return false;
        }
        if self.every.is_zero() || now.duration_since(self.last) < self.every {
            return false;
        }
        self.last = now;
        true
    }
}
