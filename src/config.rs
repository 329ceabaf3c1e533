use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::heat::{HeatSetup, DEFAULT_DISTANCES, DEFAULT_STROKES};
use crate::timer::CaptureMode;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub capture_mode: CaptureMode,
    pub tick_interval_ms: u64,
    pub distances: Vec<String>,
    pub strokes: Vec<String>,
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_mode: CaptureMode::Finish,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            distances: DEFAULT_DISTANCES.iter().map(|d| d.to_string()).collect(),
            strokes: DEFAULT_STROKES.iter().map(|s| s.to_string()).collect(),
            db_path: None,
        }
    }
}

impl Config {
    /// Setup screen state using this config's distance and stroke catalogues
    pub fn heat_setup(&self) -> HeatSetup {
        HeatSetup::new(self.distances.clone(), self.strokes.clone())
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("heatlog_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("ignoring unreadable config {} - {}", self.path.display(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            capture_mode: CaptureMode::Laps,
            tick_interval_ms: 25,
            distances: vec!["400 m".into()],
            strokes: vec!["Medley".into()],
            db_path: Some(dir.path().join("club.db")),
        };
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "capture_mode": "laps" }"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.capture_mode, CaptureMode::Laps);
        assert_eq!(cfg.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(cfg.strokes.len(), 4);
    }

    #[test]
    fn heat_setup_uses_catalogues() {
        let cfg = Config {
            distances: vec!["400 m".into()],
            ..Config::default()
        };
        let mut setup = cfg.heat_setup();
        assert!(setup.select_distance("400 m").is_ok());
        assert!(setup.select_distance("50 m").is_err());
    }
}
