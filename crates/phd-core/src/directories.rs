//! Control directories (PID and log directories).
//!
//! # Toyota Way: Poka-Yoke (ポカヨケ)
//! Refuse to launch or stop anything when the control directories are
//! unusable; a daemon that cannot write its PID file is a daemon nobody
//! can stop later.

use std::path::{Path, PathBuf};

use crate::config::{LOG_FILE_NAME, SupervisorConfig};
use crate::error::{Result, SupervisorError};

/// The PID and log directories of one supervisor configuration.
///
/// The two are independent settings and may point at the same path.
/// Every accessor re-checks the directory, since another supervisor
/// invocation may have removed it in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDirectories {
    pid: PathBuf,
    log: PathBuf,
}

impl ControlDirectories {
    /// Creates the pair from explicit paths.
    #[must_use]
    pub fn new(pid: impl Into<PathBuf>, log: impl Into<PathBuf>) -> Self {
        Self {
            pid: pid.into(),
            log: log.into(),
        }
    }

    /// Takes both paths from the configuration.
    #[must_use]
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(&config.pid_directory, &config.log_directory)
    }

    /// The PID directory, created if missing.
    pub fn pid_directory(&self) -> Result<PathBuf> {
        ensure(&self.pid)
    }

    /// The PID directory, created if missing and checked to be a writable directory.
    pub fn writable_pid_directory(&self) -> Result<PathBuf> {
        ensure_writable(&self.pid)
    }

    /// The log directory, created if missing.
    pub fn log_directory(&self) -> Result<PathBuf> {
        ensure(&self.log)
    }

    /// The shared daemon log file inside the log directory.
    pub fn log_file(&self) -> Result<PathBuf> {
        Ok(self.log_directory()?.join(LOG_FILE_NAME))
    }
}

/// Ensures `path` exists, creating it and any missing parents.
///
/// # Errors
/// Returns [`SupervisorError::Configuration`] if the directory does not exist
/// and cannot be created.
pub fn ensure(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    std::fs::create_dir_all(path).map_err(|e| {
        SupervisorError::configuration(format!(
            "phd requires the directory '{}' to exist, but it does not exist and could not \
             be created ({e}). Create this directory or update pid_directory / log_directory \
             in your configuration to point to an existing directory.",
            path.display()
        ))
    })?;
    tracing::debug!(path = %path.display(), "created control directory");
    Ok(path.to_path_buf())
}

/// Ensures `path` exists and checks that it is a writable directory.
///
/// # Errors
/// Returns [`SupervisorError::Configuration`] if the path cannot be created,
/// is not a directory, or is not writable by this process.
pub fn ensure_writable(path: &Path) -> Result<PathBuf> {
    let path = ensure(path)?;
    if !path.is_dir() {
        return Err(SupervisorError::configuration(format!(
            "'{}' exists but is not a directory",
            path.display()
        )));
    }
    if !is_writable(&path) {
        return Err(SupervisorError::configuration(format!(
            "directory '{}' is not writable",
            path.display()
        )));
    }
    Ok(path)
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use nix::unistd::{AccessFlags, access};
    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| !m.permissions().readonly())
}
