//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SEGUE_CONFIG`)
//! 3. Platform config file (`<config_dir>/segue/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing platform config file is not an error: a warning is logged and
//! compiled defaults are used. An explicitly named file (CLI or environment)
//! that cannot be read is an error.

use crate::settings::{TransitionMode, TransitionSettings};
use crate::envelope::EnvelopeCurve;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SEGUE_CONFIG";

/// Timing knobs for the transition engine
///
/// Defaults: 50ms ramp tick, 100ms duration poll, 250ms position poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between volume updates while a crossfade is running
    pub ramp_tick_ms: u64,

    /// Interval between checks for a known track duration
    pub duration_poll_ms: u64,

    /// Interval between checks of the playback position against the transition point
    pub position_poll_ms: u64,
}

impl TimingConfig {
    pub fn ramp_tick(&self) -> Duration {
        Duration::from_millis(self.ramp_tick_ms)
    }

    pub fn duration_poll(&self) -> Duration {
        Duration::from_millis(self.duration_poll_ms)
    }

    pub fn position_poll(&self) -> Duration {
        Duration::from_millis(self.position_poll_ms)
    }

    /// Reject intervals that would turn a poll loop into a busy loop
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ramp_tick_ms", self.ramp_tick_ms),
            ("duration_poll_ms", self.duration_poll_ms),
            ("position_poll_ms", self.position_poll_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("timing.{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ramp_tick_ms: 50,
            duration_poll_ms: 100,
            position_poll_ms: 250,
        }
    }
}

/// Transition override for a playlist, optionally narrowed to a track pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub playlist_id: String,

    #[serde(default)]
    pub from_track: Option<String>,

    #[serde(default)]
    pub to_track: Option<String>,

    #[serde(flatten)]
    pub settings: TransitionSettings,
}

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegueConfig {
    /// tracing filter directive used when RUST_LOG is unset
    pub log_level: String,

    pub timing: TimingConfig,

    /// Settings applied when no rule matches
    pub default_transition: TransitionSettings,

    pub rules: Vec<TransitionRule>,
}

impl Default for SegueConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            timing: TimingConfig::default(),
            default_transition: TransitionSettings {
                mode: TransitionMode::Crossfade,
                duration_ms: 5000,
                curve_out: EnvelopeCurve::EqualPower,
                curve_in: EnvelopeCurve::EqualPower,
            },
            rules: Vec::new(),
        }
    }
}

impl SegueConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SegueConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;

        for rule in &self.rules {
            if rule.playlist_id.trim().is_empty() {
                return Err(Error::Config("rules[].playlist_id must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Resolve the config file by priority and load it
    ///
    /// # Arguments
    /// * `cli_path` - Path given on the command line, if any
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match ConfigResolver::new().resolve(cli_path) {
            ConfigSource::Explicit(path) => {
                info!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            ConfigSource::Platform(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            ConfigSource::Platform(path) => {
                warn!("No config file at {}, using compiled defaults", path.display());
                Ok(Self::default())
            }
            ConfigSource::Defaults => {
                warn!("Could not determine config directory, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Where configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or via environment variable
    Explicit(PathBuf),
    /// Platform default location (may not exist)
    Platform(PathBuf),
    /// No location could be determined
    Defaults,
}

/// Resolves the config file location
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    env_var_name: String,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::with_env_var(CONFIG_ENV_VAR)
    }

    pub fn with_env_var(env_var_name: &str) -> Self {
        Self {
            env_var_name: env_var_name.to_string(),
        }
    }

    pub fn resolve(&self, cli_path: Option<&Path>) -> ConfigSource {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return ConfigSource::Explicit(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return ConfigSource::Explicit(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config file
        match default_config_path() {
            Some(path) => ConfigSource::Platform(path),
            // Priority 4: Compiled defaults
            None => ConfigSource::Defaults,
        }
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform config file path (`~/.config/segue/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("segue").join("config.toml"))
}
