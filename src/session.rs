use std::time::SystemTime;

use crate::diff::{self, Diff};
use crate::language::Language;
use crate::snippets::Snippet;
use crate::timing::{self, TimingTracker};
use crate::validator::ScoreSubmission;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
}

/// What a call to [`TypingSession::apply_input`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// session was not running
    Ignored,
    Progress,
    Completed,
}

/// Final metrics of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionResult {
    pub language: Language,
    pub wpm: u32,
    pub accuracy: u32,
    pub errors: usize,
    pub time_secs: u64,
    pub mistakes: usize,
}

impl SessionResult {
    pub fn to_submission(&self) -> ScoreSubmission {
        ScoreSubmission {
            language: Some(self.language.to_string()),
            wpm: Some(self.wpm as i64),
            accuracy: Some(self.accuracy as i64),
            errors: Some(self.errors as i64),
            time: Some(self.time_secs as i64),
        }
    }
}

/// One user's typing test against a single snippet
#[derive(Debug, Clone)]
pub struct TypingSession {
    snippet: Option<Snippet>,
    input: String,
    cursor: usize,
    error_count: usize,
    mistakes: usize,
    state: SessionState,
    timing: TimingTracker,
}

impl Default for TypingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingSession {
    pub fn new() -> Self {
        Self {
            snippet: None,
            input: String::new(),
            cursor: 0,
            error_count: 0,
            mistakes: 0,
            state: SessionState::Idle,
            timing: TimingTracker::new(),
        }
    }

    pub fn with_snippet(snippet: Snippet) -> Self {
        let mut session = Self::new();
        session.snippet = Some(snippet);
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snippet(&self) -> Option<&Snippet> {
        self.snippet.as_ref()
    }

    pub fn target(&self) -> &str {
        self.snippet.as_ref().map(|s| s.code.as_str()).unwrap_or("")
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Keystrokes that landed on a wrong character, including ones later fixed
    pub fn mistakes(&self) -> usize {
        self.mistakes
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.timing.started_at()
    }

    pub fn completed_at(&self) -> Option<SystemTime> {
        self.timing.stopped_at()
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn diff(&self) -> Diff {
        diff::diff(self.target(), &self.input)
    }

    pub fn start(&mut self) -> bool {
        self.start_at(SystemTime::now())
    }

    /// Begin a run. Only valid from Idle or Completed with a snippet loaded;
    /// otherwise nothing happens.
    pub fn start_at(&mut self, now: SystemTime) -> bool {
        if self.snippet.is_none() || self.state == SessionState::Running {
            return false;
        }
        self.clear_progress();
        self.timing.start(now);
        self.state = SessionState::Running;
        true
    }

    pub fn apply_input(&mut self, buffer: &str) -> InputOutcome {
        self.apply_input_at(buffer, SystemTime::now())
    }

    /// Replace the input buffer and re-diff it against the target.
    pub fn apply_input_at(&mut self, buffer: &str, now: SystemTime) -> InputOutcome {
        if self.state != SessionState::Running {
            return InputOutcome::Ignored;
        }

        let target_len = self.target().chars().count();
        let buffer: String = buffer.chars().take(target_len).collect();
        let new_cursor = buffer.chars().count();

        if new_cursor > self.cursor {
            let target = self.target();
            self.mistakes += buffer
                .chars()
                .zip(target.chars())
                .skip(self.cursor)
                .filter(|(typed, expected)| typed != expected)
                .count();
        }

        self.error_count = diff::count_errors(self.target(), &buffer);
        self.cursor = new_cursor;
        self.input = buffer;

        if diff::is_complete(self.target(), &self.input) {
            self.timing.stop(now);
            self.state = SessionState::Completed;
            InputOutcome::Completed
        } else {
            InputOutcome::Progress
        }
    }

    /// Back to Idle from any state, dropping progress and timestamps.
    pub fn reset(&mut self) {
        self.clear_progress();
        self.state = SessionState::Idle;
    }

    /// Discard any run in progress and load a snippet for another language.
    pub fn change_language(&mut self, snippet: Snippet) {
        self.reset();
        self.snippet = Some(snippet);
    }

    /// Swap the snippet shown while idle. Refused in any other state.
    pub fn rotate(&mut self, snippet: Snippet) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.snippet = Some(snippet);
        true
    }

    /// Percentage of typed characters that match, 100 before anything is typed.
    pub fn accuracy(&self) -> u32 {
        if self.cursor == 0 {
            return 100;
        }
        let correct = (self.cursor - self.error_count) as f64;
        (100.0 * correct / self.cursor as f64).round() as u32
    }

    pub fn elapsed_secs(&self, now: SystemTime) -> f64 {
        self.timing.elapsed_secs(now)
    }

    /// WPM for the live display, based on the cursor position
    pub fn live_wpm(&self, now: SystemTime) -> u32 {
        if self.state != SessionState::Running {
            return 0;
        }
        timing::wpm(self.cursor, self.timing.elapsed_secs(now))
    }

    pub fn result(&self) -> Option<SessionResult> {
        if self.state != SessionState::Completed {
            return None;
        }
        let snippet = self.snippet.as_ref()?;
        let elapsed = self.timing.elapsed_secs(SystemTime::now());
        Some(SessionResult {
            language: snippet.language,
            wpm: timing::wpm(snippet.char_len(), elapsed),
            accuracy: self.accuracy(),
            errors: self.error_count,
            time_secs: elapsed.round() as u64,
            mistakes: self.mistakes,
        })
    }

    fn clear_progress(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.error_count = 0;
        self.mistakes = 0;
        self.timing.clear();
    }
}
