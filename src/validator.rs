use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::language::Language;

pub const MAX_WPM: i64 = 300;
pub const MAX_ACCURACY: i64 = 100;
pub const MAX_ERRORS: i64 = 1000;
pub const MIN_TIME_SECS: i64 = 1;
pub const MAX_TIME_SECS: i64 = 3600;

/// Above this speed a near-perfect run is treated as implausible
pub const PLAUSIBLE_WPM: i64 = 200;
pub const PLAUSIBLE_ACCURACY: i64 = 95;

/// Metrics as reported by a client; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub language: Option<String>,
    pub wpm: Option<i64>,
    pub accuracy: Option<i64>,
    pub errors: Option<i64>,
    pub time: Option<i64>,
}

/// A submission that passed every check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidScore {
    pub language: Language,
    pub wpm: u16,
    pub accuracy: u8,
    pub errors: u16,
    pub time_secs: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field {0} is required")]
    MissingField(&'static str),
    #[error("unsupported language '{0}'")]
    UnknownLanguage(String),
    #[error("wpm {0} outside 0-300")]
    Wpm(i64),
    #[error("accuracy {0} outside 0-100%")]
    Accuracy(i64),
    #[error("error count {0} outside 0-1000")]
    Errors(i64),
    #[error("time {0}s outside 1-3600s")]
    Time(i64),
    #[error("score too high to be plausible ({wpm} wpm at {accuracy}%)")]
    Implausible { wpm: i64, accuracy: i64 },
}

fn required<T: Clone>(value: &Option<T>, name: &'static str) -> Result<T, ValidationError> {
    value.clone().ok_or(ValidationError::MissingField(name))
}

fn in_range(
    value: i64,
    min: i64,
    max: i64,
    err: fn(i64) -> ValidationError,
) -> Result<i64, ValidationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(err(value))
    }
}

/// Checks run in order and stop at the first failure: presence, language,
/// ranges, plausibility.
pub fn validate(submission: &ScoreSubmission) -> Result<ValidScore, ValidationError> {
    let language = required(&submission.language, "language")?;
    let wpm = required(&submission.wpm, "wpm")?;
    let accuracy = required(&submission.accuracy, "accuracy")?;
    let errors = required(&submission.errors, "errors")?;
    let time = required(&submission.time, "time")?;

    let language: Language = language
        .trim()
        .parse()
        .map_err(|_| ValidationError::UnknownLanguage(language.clone()))?;

    let wpm = in_range(wpm, 0, MAX_WPM, ValidationError::Wpm)?;
    let accuracy = in_range(accuracy, 0, MAX_ACCURACY, ValidationError::Accuracy)?;
    let errors = in_range(errors, 0, MAX_ERRORS, ValidationError::Errors)?;
    let time = in_range(time, MIN_TIME_SECS, MAX_TIME_SECS, ValidationError::Time)?;

    // heuristic guard, tolerant of false positives
    if wpm > PLAUSIBLE_WPM && accuracy > PLAUSIBLE_ACCURACY {
        return Err(ValidationError::Implausible { wpm, accuracy });
    }

    Ok(ValidScore {
        language,
        wpm: wpm as u16,
        accuracy: accuracy as u8,
        errors: errors as u16,
        time_secs: time as u16,
    })
}
