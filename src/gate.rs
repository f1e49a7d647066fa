use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Collection, Persistence, StoreError};

/// Actions throttled by the submission gate, each with its own ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Login,
    Chat,
    Score,
}

/// At most `max` attempts per actor in any trailing `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max: usize,
}

impl RateLimitPolicy {
    pub const fn new(window_secs: u64, max: usize) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            max,
        }
    }

    pub fn for_kind(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Login => Self::new(3600, 10),
            ActionKind::Chat => Self::new(60, 10),
            ActionKind::Score => Self::new(300, 20),
        }
    }
}

/// Who an attempt is charged to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorKey(String);

impl ActorKey {
    /// Login attempts are charged to the network address alone.
    pub fn login(address: &str) -> Self {
        Self(address.to_string())
    }

    /// Chat and score attempts are charged to the user on a given address.
    pub fn user(username: &str, address: &str) -> Self {
        Self(format!("{username}_{address}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    actor: String,
    entry: String,
    at: i64,
}

/// Sliding-window rate limiter over the persisted ledgers
#[derive(Clone)]
pub struct SubmissionGate {
    store: Arc<dyn Persistence>,
}

impl SubmissionGate {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }

    /// Prune entries that left the window, then count the actor's remaining ones.
    pub fn check(
        &self,
        actor: &ActorKey,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, StoreError> {
        let policy = RateLimitPolicy::for_kind(kind);
        let window = policy.window.as_secs() as i64;
        let now_secs = now.timestamp();

        let survivors = self.store.retain(Collection::Ledger(kind), &|body: &str| {
            match serde_json::from_str::<LedgerEntry>(body) {
                Ok(e) => now_secs - e.at < window,
                // unreadable rows would otherwise never age out
                Err(_) => false,
            }
        })?;

        let attempts: Vec<i64> = survivors
            .iter()
            .filter_map(|body| serde_json::from_str::<LedgerEntry>(body).ok())
            .filter(|e| e.actor == actor.as_str())
            .map(|e| e.at)
            .collect();

        if attempts.len() < policy.max {
            return Ok(GateDecision::Allowed);
        }

        let oldest = attempts.iter().copied().min().unwrap_or(now_secs);
        let retry_after = (oldest + window - now_secs).max(0) as u64;
        tracing::warn!(
            actor = actor.as_str(),
            %kind,
            attempts = attempts.len(),
            retry_after,
            "rate limited"
        );
        Ok(GateDecision::Denied {
            retry_after: Duration::from_secs(retry_after),
        })
    }

    pub fn record(
        &self,
        actor: &ActorKey,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = LedgerEntry {
            actor: actor.as_str().to_string(),
            entry: format!("{}_{}", actor.as_str(), now.timestamp_micros()),
            at: now.timestamp(),
        };
        let body = serde_json::to_string(&entry)?;
        self.store
            .append(Collection::Ledger(kind), &body, usize::MAX, None)?;
        Ok(())
    }
}
