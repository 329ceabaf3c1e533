use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "heatlog";
const DB_FILE: &str = "heats.db";
const CONFIG_FILE: &str = "config.json";

/// Where heatlog keeps its database and settings
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }

    /// `$HOME/.local/state/heatlog/heats.db`, or the platform data dir without a home
    pub fn db_path() -> Option<PathBuf> {
        let dir = match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".local").join("state").join(APP_NAME),
            None => Self::project()?.data_local_dir().to_path_buf(),
        };
        Some(dir.join(DB_FILE))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::project().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_under_state_dir() {
        if let (Some(path), Some(home)) = (AppDirs::db_path(), std::env::var_os("HOME")) {
            assert_eq!(path, PathBuf::from(home).join(".local/state/heatlog/heats.db"));
        }
    }

    #[test]
    fn test_config_and_db_are_separate_files() {
        if let (Some(db), Some(config)) = (AppDirs::db_path(), AppDirs::config_path()) {
            assert!(config.ends_with(CONFIG_FILE));
            assert_ne!(db, config);
        }
    }
}
