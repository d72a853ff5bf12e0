//! Error types for phd-core.
//!
//! Per Iron Lotus Framework: All errors are explicit, no panics allowed.
//! Only environment-level and request-level failures are errors; per-target
//! problems (a bad PID argument, one failed launch in a batch) are reported
//! through the typed reports in [`crate::shutdown`] and [`crate::supervisor`].

use std::fmt;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Why a daemon name could not be resolved to exactly one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityKind {
    /// No available daemon contains the substring.
    NotFound,
    /// Several daemons contain the substring and none equals it.
    Multiple,
}

impl fmt::Display for AmbiguityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no daemons match"),
            Self::Multiple => f.write_str("multiple daemons match"),
        }
    }
}

/// Error type for supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A control directory or configuration value is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A daemon name did not resolve to exactly one implementation.
    #[error("{kind} '{substring}'{}", format_candidates(.candidates))]
    Ambiguity {
        /// The substring that was looked up.
        substring: String,
        /// Whether nothing or too much matched.
        kind: AmbiguityKind,
        /// Every matching name (empty for `NotFound`).
        candidates: Vec<String>,
    },

    /// A debug launch was requested under the wrong OS user.
    #[error(
        "daemons are configured to run as \"{required}\", but the current user is \"{current}\"; \
         use sudo, pass --as-current-user, or change the configured user"
    )]
    UserMismatch {
        /// The configured daemon user.
        required: String,
        /// The effective user of this process.
        current: String,
    },

    /// The privilege-elevated spawn failed.
    #[error("elevation failed: {0}")]
    Elevation(String),

    /// Conflicting or malformed command options.
    #[error("usage error: {0}")]
    Usage(String),

    /// The overseer process could not be spawned or exited with failure.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// The daemon-log registry or the task-lease store failed.
    #[error("registry error: {0}")]
    Registry(String),

    /// Signal delivery failed.
    #[error("signal error: {0}")]
    Signal(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(": {}", candidates.join(", "))
    }
}

impl SupervisorError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an elevation error.
    #[must_use]
    pub fn elevation(msg: impl Into<String>) -> Self {
        Self::Elevation(msg.into())
    }

    /// Creates a usage error.
    #[must_use]
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Creates a registry error.
    #[must_use]
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Creates a signal error.
    #[must_use]
    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    /// Returns true if this error aborts the whole command.
    ///
    /// Environment and request-level failures are fatal; a spawn, elevation
    /// or I/O failure only affects the launch it belongs to.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Usage(_) | Self::UserMismatch { .. } | Self::Registry(_)
        )
    }

    /// Returns true if a launch that failed this way is retried once without elevation.
    #[must_use]
    pub const fn is_retryable_without_elevation(&self) -> bool {
        matches!(self, Self::Elevation(_))
    }
}

impl From<serde_json::Error> for SupervisorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
