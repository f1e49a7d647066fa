use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/codetype`, or the platform data dir without a HOME
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("codetype"),
            )
        } else {
            ProjectDirs::from("", "", "codetype")
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("codetype.db"))
    }

    pub fn log_dir() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_the_state_dir() {
        let (Some(state), Some(db), Some(logs)) =
            (AppDirs::state_dir(), AppDirs::db_path(), AppDirs::log_dir())
        else {
            return;
        };
        assert_eq!(db.parent(), Some(state.as_path()));
        assert_eq!(logs.parent(), Some(state.as_path()));
        assert!(state.ends_with("codetype"));
    }
}
