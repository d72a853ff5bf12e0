//! Platform error types.

use phd_core::SupervisorError;

/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Platform not supported.
    #[error("platform not supported: {0}")]
    NotSupported(String),

    /// Spawn failed.
    #[error("failed to spawn overseer: {0}")]
    Spawn(String),

    /// Signal failed.
    #[error("failed to send signal: {0}")]
    Signal(String),

    /// The process table could not be read.
    #[error("failed to scan processes: {0}")]
    Scan(String),

    /// The effective UID has no user database entry.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Creates a not supported error.
    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Creates a signal error.
    #[must_use]
    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    /// Creates a scan error.
    #[must_use]
    pub fn scan(msg: impl Into<String>) -> Self {
        Self::Scan(msg.into())
    }
}

impl From<PlatformError> for SupervisorError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Signal(msg) => Self::Signal(msg),
            PlatformError::Spawn(msg) => Self::Spawn(msg),
            PlatformError::Io(e) => Self::Io(e),
            PlatformError::UnknownUser(msg) => Self::configuration(format!("unknown user: {msg}")),
            other @ (PlatformError::NotSupported(_) | PlatformError::Scan(_)) => {
                Self::configuration(other.to_string())
            }
        }
    }
}
