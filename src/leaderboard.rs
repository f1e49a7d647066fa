use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::identity::Fingerprint;
use crate::language::{Language, LeaderboardFilter};

pub const LEADERBOARD_SIZE: usize = 50;

/// One accepted score, immutable once persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: String,
    pub username: String,
    pub language: Language,
    pub wpm: u16,
    pub accuracy: u8,
    pub errors: u16,
    pub time_secs: u16,
    pub submitted_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

impl ScoreRecord {
    /// wpm weighted by accuracy, scaled by 100 to stay integral
    fn rank_key(&self) -> u32 {
        self.wpm as u32 * self.accuracy as u32
    }
}

/// Public view of a user's best score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub language: Language,
    pub wpm: u16,
    pub accuracy: u8,
    pub errors: u16,
    pub time_secs: u16,
    pub submitted_at: DateTime<Utc>,
}

impl From<&ScoreRecord> for LeaderboardEntry {
    fn from(r: &ScoreRecord) -> Self {
        Self {
            username: r.username.clone(),
            language: r.language,
            wpm: r.wpm,
            accuracy: r.accuracy,
            errors: r.errors,
            time_secs: r.time_secs,
            submitted_at: r.submitted_at,
        }
    }
}

fn by_strength(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    a.rank_key()
        .cmp(&b.rank_key())
        .then(a.accuracy.cmp(&b.accuracy))
        .then(a.wpm.cmp(&b.wpm))
}

/// Best score per user, strongest first, at most [`LEADERBOARD_SIZE`] rows.
///
/// `history` is in submission order; when a user has two equally strong
/// records the earlier one stands.
pub fn rank(history: &[ScoreRecord], filter: LeaderboardFilter) -> Vec<LeaderboardEntry> {
    let mut best: HashMap<&str, &ScoreRecord> = HashMap::new();
    for record in history.iter().filter(|r| filter.matches(r.language)) {
        best.entry(record.username.as_str())
            .and_modify(|current| {
                if by_strength(record, *current) == Ordering::Greater {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    best.into_values()
        .sorted_by(|a, b| by_strength(b, a).then_with(|| a.username.cmp(&b.username)))
        .take(LEADERBOARD_SIZE)
        .map(LeaderboardEntry::from)
        .collect()
}
