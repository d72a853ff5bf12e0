//! Supervisor configuration.
//!
//! Per Iron Lotus Framework: Configuration is validated at load time (Poka-Yoke),
//! with sensible defaults and clear error messages.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SupervisorError};

/// Grace period after SIGTERM before escalating to SIGKILL.
pub const TERM_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Interval between liveness checks while waiting out a grace period.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Name of the shared log file inside the log directory.
pub const LOG_FILE_NAME: &str = "daemons.log";

/// Supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Directory overseers write their PID files into.
    #[serde(default = "default_pid_directory")]
    pub pid_directory: PathBuf,

    /// Directory detached daemons log into.
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// OS user daemons must run as. `None` runs them as whoever starts them.
    #[serde(default)]
    pub user: Option<String>,

    /// Pass `--trace` to every overseer.
    #[serde(default)]
    pub trace: bool,

    /// Pass `--verbose` to every overseer.
    #[serde(default)]
    pub verbose: bool,

    /// Number of taskmaster daemons launched by `start`.
    #[serde(default = "default_start_taskmasters")]
    pub start_taskmasters: u32,

    /// SIGINT grace period used by `stop` when none is given.
    #[serde(default = "default_grace_period")]
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,

    /// Daemons always launched by `start`, in order.
    #[serde(default = "default_baseline_daemons")]
    pub baseline_daemons: Vec<String>,

    /// Daemon launched `start_taskmasters` times by `start`.
    #[serde(default = "default_taskmaster_daemon")]
    pub taskmaster_daemon: String,

    /// How overseer processes are launched and recognized.
    #[serde(default)]
    pub overseer: OverseerConfig,
}

fn default_pid_directory() -> PathBuf {
    PathBuf::from("/var/tmp/phd/pid")
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("/var/tmp/phd/log")
}

fn default_start_taskmasters() -> u32 {
    4
}

fn default_grace_period() -> Duration {
    Duration::from_secs(15)
}

fn default_baseline_daemons() -> Vec<String> {
    vec![
        "RepositoryPullLocalDaemon".to_string(),
        "GarbageCollectorDaemon".to_string(),
        "TriggerDaemon".to_string(),
    ]
}

fn default_taskmaster_daemon() -> String {
    "TaskmasterDaemon".to_string()
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pid_directory: default_pid_directory(),
            log_directory: default_log_directory(),
            user: None,
            trace: false,
            verbose: false,
            start_taskmasters: default_start_taskmasters(),
            grace_period: default_grace_period(),
            baseline_daemons: default_baseline_daemons(),
            taskmaster_daemon: default_taskmaster_daemon(),
            overseer: OverseerConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Creates a configuration with the given control directories and defaults elsewhere.
    #[must_use]
    pub fn new(pid_directory: impl Into<PathBuf>, log_directory: impl Into<PathBuf>) -> Self {
        Self {
            pid_directory: pid_directory.into(),
            log_directory: log_directory.into(),
            ..Self::default()
        }
    }

    /// Path of the shared daemon log file.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.log_directory.join(LOG_FILE_NAME)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.pid_directory.as_os_str().is_empty() {
            return Err(SupervisorError::configuration("pid_directory cannot be empty"));
        }
        if self.log_directory.as_os_str().is_empty() {
            return Err(SupervisorError::configuration("log_directory cannot be empty"));
        }
        if self.user.as_deref().is_some_and(str::is_empty) {
            return Err(SupervisorError::configuration(
                "user cannot be empty; omit it to run daemons as the current user",
            ));
        }
        if self.taskmaster_daemon.is_empty() || self.baseline_daemons.iter().any(String::is_empty)
        {
            return Err(SupervisorError::configuration("daemon names cannot be empty"));
        }
        self.overseer.validate()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SupervisorError::configuration(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SupervisorError::configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Overseer launch and recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverseerConfig {
    /// Overseer executable, resolved relative to `script_dir`.
    #[serde(default = "default_overseer_command")]
    pub command: String,

    /// Working directory for every launch. Kept fixed so process listings
    /// show the same command line for every overseer.
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,

    /// Command-line substrings that identify an overseer in the process table.
    #[serde(default = "default_signature")]
    pub signature: Vec<String>,
}

fn default_overseer_command() -> String {
    "./phd-daemon".to_string()
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("scripts/daemon")
}

fn default_signature() -> Vec<String> {
    vec![
        "phd-daemon".to_string(),
        "launch_daemon".to_string(),
        "exec_daemon".to_string(),
    ]
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            command: default_overseer_command(),
            script_dir: default_script_dir(),
            signature: default_signature(),
        }
    }
}

impl OverseerConfig {
    /// Validates overseer settings.
    ///
    /// # Errors
    /// Returns an error if the command or signature is empty.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(SupervisorError::configuration("overseer.command cannot be empty"));
        }
        if self.signature.is_empty() || self.signature.iter().any(|s| s.is_empty()) {
            return Err(SupervisorError::configuration(
                "overseer.signature must list at least one non-empty pattern",
            ));
        }
        Ok(())
    }

    /// Returns true if `command` looks like an overseer command line.
    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        self.signature.iter().any(|pattern| command.contains(pattern.as_str()))
    }
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
