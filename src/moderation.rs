use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub const DEFAULT_PROHIBITED_WORDS: [&str; 5] = ["spam", "hack", "cheat", "bot", "script"];

/// How many of an author's latest messages are compared for repeats
pub const REPEAT_LOOKBACK: usize = 5;
pub const REPEAT_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModerationError {
    #[error("message contains prohibited content")]
    Prohibited(String),
    #[error("duplicate message")]
    Duplicate,
}

/// Content screen applied to chat text before it is accepted
pub trait ModerationFilter: Send + Sync {
    fn screen(&self, text: &str) -> Result<(), ModerationError>;
}

/// Case-insensitive substring match against a word list
#[derive(Debug, Clone)]
pub struct SubstringFilter {
    words: Vec<String>,
}

impl SubstringFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

impl Default for SubstringFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PROHIBITED_WORDS)
    }
}

impl ModerationFilter for SubstringFilter {
    fn screen(&self, text: &str) -> Result<(), ModerationError> {
        let lowered = text.to_lowercase();
        match self.words.iter().find(|w| lowered.contains(w.as_str())) {
            Some(word) => Err(ModerationError::Prohibited(word.clone())),
            None => Ok(()),
        }
    }
}

/// A previously accepted message, as far as repeat detection cares
#[derive(Debug, Clone, Copy)]
pub struct PastMessage<'a> {
    pub author: &'a str,
    pub text: &'a str,
    pub submitted_at: DateTime<Utc>,
}

/// Reject `text` if it matches one of the author's last few messages sent
/// within the repeat window. `history` is ordered oldest first.
pub fn check_repeat<'a, I>(
    history: I,
    author: &str,
    text: &str,
    now: DateTime<Utc>,
) -> Result<(), ModerationError>
where
    I: DoubleEndedIterator<Item = PastMessage<'a>>,
{
    let window = Duration::seconds(REPEAT_WINDOW_SECS);
    let repeated = history
        .rev()
        .filter(|m| m.author == author)
        .take(REPEAT_LOOKBACK)
        .any(|m| m.text == text && now - m.submitted_at < window);
    if repeated {
        Err(ModerationError::Duplicate)
    } else {
        Ok(())
    }
}
