use crate::constants::{
    DEFAULT_BOOT_DEADLINE_SECS, DEFAULT_HISTORY_LIMIT, DEFAULT_WAKE_LOCK_TIMEOUT_SECS,
};
use crate::error::{AppError, AppResult};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB: &str = "ALARMGAME_DB";
pub const ENV_LOG: &str = "ALARMGAME_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults to `alarmgame.db` in the platform data directory.
    pub database_path: Option<PathBuf>,
    pub wake_lock_timeout_secs: u64,
    pub boot_deadline_secs: u64,
    pub history_limit: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            wake_lock_timeout_secs: DEFAULT_WAKE_LOCK_TIMEOUT_SECS,
            boot_deadline_secs: DEFAULT_BOOT_DEADLINE_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn wake_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.wake_lock_timeout_secs)
    }

    pub fn boot_deadline(&self) -> Duration {
        Duration::from_secs(self.boot_deadline_secs)
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "alarmgame", "AlarmGame")
}

pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn load_from(path: &Path) -> AppResult<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| AppError::Config(format!("failed to parse {}: {e}", path.display())))
}

pub fn write_config(path: &Path, cfg: &Config) -> AppResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let contents = toml::to_string_pretty(cfg)
        .map_err(|e| AppError::Config(format!("failed to render config: {e}")))?;
    fs::write(path, contents)?;
    Ok(())
}

/// Load the config file at `path`, falling back to defaults on any error and
/// writing the defaults out when no file exists yet. Env overrides apply last.
pub fn load_or_init_at(path: &Path) -> Config {
    let mut config = match load_from(path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let cfg = Config::default();
            if let Err(e) = write_config(path, &cfg) {
                warn!("failed to write default config: {e}");
            }
            cfg
        }
        Err(e) => {
            warn!("config load failed, using defaults: {e}");
            Config::default()
        }
    };
    apply_env_overrides(&mut config);
    config
}

pub fn load_or_init() -> Config {
    if let Some(path) = config_path() {
        load_or_init_at(&path)
    } else {
        warn!("no config directory on this platform, using defaults");
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        config
    }
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(db) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
        config.database_path = Some(PathBuf::from(db));
    }
    if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
        config.log_level = level;
    }
}
