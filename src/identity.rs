use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::util::sha256_hex;

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 20;

/// Network-level facts about whoever is calling in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Client info for this terminal process
    pub fn local(address: impl Into<String>) -> Self {
        Self::new(
            address,
            format!("codetype/{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
        )
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            address_hash: sha256_hex(self.address.as_bytes()),
            agent_hash: sha256_hex(self.user_agent.as_bytes()),
        }
    }
}

/// One-way hashes stored alongside submissions instead of raw client data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub address_hash: String,
    pub agent_hash: String,
}

/// The caller of a board operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: Option<String>,
    pub client: ClientInfo,
}

impl Actor {
    pub fn anonymous(client: ClientInfo) -> Self {
        Self {
            username: None,
            client,
        }
    }

    pub fn signed_in(username: impl Into<String>, client: ClientInfo) -> Self {
        Self {
            username: Some(username.into()),
            client,
        }
    }

    pub fn from_session(session: &dyn SessionStore, client: ClientInfo) -> Self {
        Self {
            username: session.current_user(),
            client,
        }
    }
}

/// Where the signed-in username lives between operations
pub trait SessionStore {
    fn current_user(&self) -> Option<String>;
    fn sign_in(&self, username: &str);
    fn sign_out(&self);
}

/// In-process session for the terminal client
#[derive(Debug, Default)]
pub struct LocalSession {
    user: Mutex<Option<String>>,
}

impl LocalSession {
    pub fn new(user: Option<String>) -> Self {
        Self {
            user: Mutex::new(user),
        }
    }
}

impl SessionStore for LocalSession {
    fn current_user(&self) -> Option<String> {
        self.user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn sign_in(&self, username: &str) {
        *self
            .user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(username.to_string());
    }

    fn sign_out(&self) {
        *self
            .user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Why a username was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("username is required")]
    Empty,
    #[error("username must be 3-20 characters")]
    Length,
    #[error("username may only contain letters, numbers and underscores")]
    Charset,
}

/// Trim and check a username; returns the trimmed form.
pub fn validate_username(raw: &str) -> Result<&str, UsernameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(UsernameError::Empty);
    }
    let len = name.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(UsernameError::Length);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(UsernameError::Charset);
    }
    Ok(name)
}
