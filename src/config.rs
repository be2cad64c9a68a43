use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cue_plan::{CuePlan, PlanError, DEFAULT_START_DELAY_SECS};
use crate::timer::TimerSettings;
use crate::trigger::{TriggerToggles, DEFAULT_DETECTION_PROBABILITY};

pub const DEFAULT_SESSION_LENGTH_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write config: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("detection probability {0} is outside 0.0..=1.0")]
    Probability(f64),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// User preferences, optionally stored between runs. Trigger toggles and
/// session progress are never stored, so each run starts with both
/// detectors off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub session_length_secs: u64,
    pub start_delay_secs: u64,
    pub interval_secs: Option<u64>,
    #[serde(skip)]
    pub clap_trigger: bool,
    #[serde(skip)]
    pub hand_trigger: bool,
    pub detection_probability: f64,
    pub bell_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_length_secs: DEFAULT_SESSION_LENGTH_SECS,
            start_delay_secs: DEFAULT_START_DELAY_SECS,
            interval_secs: None,
            clap_trigger: false,
            hand_trigger: false,
            detection_probability: DEFAULT_DETECTION_PROBABILITY,
            bell_path: None,
        }
    }
}

impl Config {
    pub fn cue_plan(&self) -> Result<CuePlan, PlanError> {
        let plan = CuePlan::with_start_delay(self.session_length_secs, self.start_delay_secs)?;
        match self.interval_secs {
            Some(every) => plan.with_interval(every, 1),
            None => Ok(plan),
        }
    }

    pub fn toggles(&self) -> TriggerToggles {
        TriggerToggles {
            clap: self.clap_trigger,
            hand: self.hand_trigger,
        }
    }

    pub fn timer_settings(&self) -> Result<TimerSettings, ConfigError> {
        if !(0.0..=1.0).contains(&self.detection_probability) {
            return Err(ConfigError::Probability(self.detection_probability));
        }
        let mut settings = TimerSettings::new(self.cue_plan()?);
        settings.toggles = self.toggles();
        Ok(settings)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "gong") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("gong_config.json")
        };
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
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = ?self.path, error = %err, "ignoring malformed config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
