// Library half of the crate: the typing engine and the shared board.
// The terminal front end in main.rs/ui.rs is the only consumer outside tests.
pub mod app_dirs;
pub mod board;
pub mod config;
pub mod diff;
pub mod error;
pub mod gate;
pub mod identity;
pub mod language;
pub mod leaderboard;
pub mod moderation;
pub mod runtime;
pub mod session;
pub mod snippets;
pub mod store;
pub mod timing;
pub mod typing_policy;
pub mod util;
pub mod validator;
