use std::time::Duration;

use thiserror::Error;

use crate::gate::ActionKind;
use crate::identity::UsernameError;
use crate::moderation::ModerationError;
use crate::store::StoreError;
use crate::validator::ValidationError;

pub const MAX_MESSAGE_CHARS: usize = 200;

/// Malformed input, recoverable by the caller fixing what it sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error(transparent)]
    Score(#[from] ValidationError),
    #[error(transparent)]
    Username(#[from] UsernameError),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message too long (max 200 characters)")]
    MessageTooLong,
}

/// Why a board operation was refused
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("login required")]
    Unauthenticated,
    #[error("{0}")]
    Validation(#[from] InputError),
    #[error("too many {kind} attempts, retry in {}s", retry_after.as_secs())]
    RateLimited {
        kind: ActionKind,
        retry_after: Duration,
    },
    #[error("{0}")]
    Moderation(#[from] ModerationError),
    #[error("could not save: {0}")]
    Persistence(#[from] StoreError),
}

impl SubmitError {
    /// Whether sending the same request again later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::RateLimited { .. } => true,
            SubmitError::Persistence(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<ValidationError> for SubmitError {
    fn from(e: ValidationError) -> Self {
        SubmitError::Validation(InputError::Score(e))
    }
}

impl From<UsernameError> for SubmitError {
    fn from(e: UsernameError) -> Self {
        SubmitError::Validation(InputError::Username(e))
    }
}
