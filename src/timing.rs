use std::time::SystemTime;

/// Standard typing convention: five characters make a word
pub const CHARS_PER_WORD: f64 = 5.0;

/// Owns the start and stop timestamps of a single run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingTracker {
    started_at: Option<SystemTime>,
    stopped_at: Option<SystemTime>,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start timestamp once; later calls return the original one.
    pub fn start(&mut self, now: SystemTime) -> SystemTime {
        *self.started_at.get_or_insert(now)
    }

    /// Sets the stop timestamp once, never earlier than the start.
    pub fn stop(&mut self, now: SystemTime) -> SystemTime {
        if let Some(stopped) = self.stopped_at {
            return stopped;
        }
        let stopped = match self.started_at {
            Some(started) if now < started => started,
            _ => now,
        };
        self.stopped_at = Some(stopped);
        stopped
    }

    pub fn clear(&mut self) {
        self.started_at = None;
        self.stopped_at = None;
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<SystemTime> {
        self.stopped_at
    }

    /// Seconds between start and stop, or start and `now` while running.
    pub fn elapsed_secs(&self, now: SystemTime) -> f64 {
        match self.started_at {
            None => 0.0,
            Some(started) => {
                let end = self.stopped_at.unwrap_or(now);
                end.duration_since(started)
                    .unwrap_or_default()
                    .as_secs_f64()
            }
        }
    }
}

/// Words per minute for `chars_typed` characters over `elapsed_secs`.
pub fn wpm(chars_typed: usize, elapsed_secs: f64) -> u32 {
    if elapsed_secs <= 0.0 {
        return 0;
    }
    let minutes = elapsed_secs / 60.0;
    ((chars_typed as f64 / CHARS_PER_WORD) / minutes).round() as u32
}
