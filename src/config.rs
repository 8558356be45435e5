use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::workflow::StepSpec;
use crate::{Error, Result};

/// Default per-node worker timeout (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Hard ceiling for any per-node timeout (1 hour).
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Default timeout for a single validation step (15 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "max_timeout_secs")]
    pub max_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Explicit step sequence. Empty means "synthesize from the project".
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    pub command: Option<String>,
    pub roles_dir: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn max_timeout_secs() -> u64 {
    MAX_TIMEOUT_SECS
}

fn step_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

/// Default and ceiling applied to every worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    default: Duration,
    max: Duration,
}

impl TimeoutPolicy {
    /// The default is capped at `max` so it can never exceed the ceiling.
    pub fn new(default: Duration, max: Duration) -> Self {
        Self {
            default: default.min(max),
            max,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default
    }

    pub fn max_timeout(&self) -> Duration {
        self.max
    }

    /// Effective timeout for a call that may carry its own request.
    pub fn resolve(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default).min(self.max)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(MAX_TIMEOUT_SECS),
        )
    }
}

impl Config {
    pub fn tierflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".tierflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::tierflow_dir()?.join("tierflow.toml"))
    }

    pub fn effective_command(&self) -> &str {
        self.agent.command.as_deref().unwrap_or("claude")
    }

    pub fn roles_dir(&self) -> Option<PathBuf> {
        self.agent.roles_dir.as_deref().map(expand_tilde)
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(
            Duration::from_secs(self.dispatch.default_timeout_secs),
            Duration::from_secs(self.dispatch.max_timeout_secs),
        )
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.validation.step_timeout_secs)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            default_timeout_secs = config.dispatch.default_timeout_secs,
            max_timeout_secs = config.dispatch.max_timeout_secs,
            steps = config.validation.steps.len(),
            command = ?config.agent.command,
            "Config loaded"
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
