use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of snippet languages, shared by snippet selection, score
/// validation and the leaderboard filter.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Cpp,
    Go,
    Rust,
    Scala,
    C,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Python,
        Language::Javascript,
        Language::Cpp,
        Language::Go,
        Language::Rust,
        Language::Scala,
        Language::C,
    ];

    /// Name shown in the terminal header
    pub fn label(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Javascript => "JavaScript",
            Language::Cpp => "C++",
            Language::Go => "Go",
            Language::Rust => "Rust",
            Language::Scala => "Scala",
            Language::C => "C",
        }
    }

    pub fn next(&self) -> Language {
        let idx = Self::ALL.iter().position(|l| l == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn previous(&self) -> Language {
        let idx = Self::ALL.iter().position(|l| l == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language '{0}'")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.to_string() == wanted)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Leaderboard view selector: every language, or just one
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum LeaderboardFilter {
    #[default]
    All,
    Only(Language),
}

impl LeaderboardFilter {
    pub fn matches(&self, language: Language) -> bool {
        match self {
            LeaderboardFilter::All => true,
            LeaderboardFilter::Only(l) => *l == language,
        }
    }

    /// Cycle all -> python -> ... -> c -> all
    pub fn next(&self) -> LeaderboardFilter {
        match self {
            LeaderboardFilter::All => LeaderboardFilter::Only(Language::ALL[0]),
            LeaderboardFilter::Only(Language::C) => LeaderboardFilter::All,
            LeaderboardFilter::Only(l) => LeaderboardFilter::Only(l.next()),
        }
    }

    pub fn previous(&self) -> LeaderboardFilter {
        match self {
            LeaderboardFilter::All => LeaderboardFilter::Only(Language::C),
            LeaderboardFilter::Only(Language::Python) => LeaderboardFilter::All,
            LeaderboardFilter::Only(l) => LeaderboardFilter::Only(l.previous()),
        }
    }
}

impl fmt::Display for LeaderboardFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderboardFilter::All => f.write_str("all"),
            LeaderboardFilter::Only(l) => write!(f, "{l}"),
        }
    }
}

impl FromStr for LeaderboardFilter {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "all" {
            Ok(LeaderboardFilter::All)
        } else {
            s.parse().map(LeaderboardFilter::Only)
        }
    }
}
