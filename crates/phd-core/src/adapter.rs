//! OS seams used by the launcher and the shutdown coordinator.
//!
//! # Toyota Way: Standardized Work (標準作業)
//! The lifecycle logic in this crate only talks to the operating system
//! through these traits. `phd-platform` provides the Unix implementations;
//! `phd-test` provides scripted ones.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Pid, ProcessEntry, Signal};

/// Signal delivery, liveness checks and process-table scans.
pub trait ProcessTable: Send + Sync {
    /// Returns true if the OS reports a live process for `pid`.
    ///
    /// PID reuse is not detected: a recycled PID reads as alive.
    fn is_alive(&self, pid: Pid) -> bool;

    /// Delivers `signal` to `pid`.
    ///
    /// # Errors
    /// Returns an error if the OS refuses delivery (no such process,
    /// permission denied).
    fn signal(&self, pid: Pid, signal: Signal) -> Result<()>;

    /// Lists every process visible to this user, excluding the caller.
    ///
    /// # Errors
    /// Returns an error if the process table cannot be read.
    fn processes(&self) -> Result<Vec<ProcessEntry>>;
}

/// A command to run: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub cwd: PathBuf,
}

impl Invocation {
    /// Creates an invocation.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }

    /// Wraps this invocation in a non-interactive `sudo` scoped to `user`.
    ///
    /// `-E` keeps the environment and `-n` fails instead of prompting.
    #[must_use]
    pub fn elevated(&self, user: &str) -> Self {
        let mut args = vec![
            "-En".to_string(),
            "-u".to_string(),
            user.to_string(),
            "--".to_string(),
            self.program.clone(),
        ];
        args.extend(self.args.iter().cloned());
        Self {
            program: "sudo".to_string(),
            args,
            cwd: self.cwd.clone(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished detached launch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOutput {
    /// Exit code, `None` if the launcher process died from a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl SpawnOutput {
    /// Creates a successful output with the given stderr.
    #[must_use]
    pub fn success(stderr: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Creates a failed output.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the process exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns overseer processes.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Name of the effective OS user of this process.
    ///
    /// # Errors
    /// Returns an error if the user database has no entry for the effective UID.
    fn effective_user(&self) -> Result<String>;

    /// Runs `invocation` with `payload` written to its stdin and waits for it
    /// to exit. Overseers daemonize themselves, so this returns once the
    /// launcher half has detached.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started or its output read.
    async fn run_detached(&self, invocation: &Invocation, payload: &[u8]) -> Result<SpawnOutput>;

    /// Runs `invocation` attached to this terminal with `payload` on stdin,
    /// blocking until it exits. Interrupts reach only the child.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started.
    async fn run_foreground(&self, invocation: &Invocation, payload: &[u8]) -> Result<i32>;
}
