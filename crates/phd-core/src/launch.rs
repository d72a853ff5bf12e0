//! Launching overseer processes.
//!
//! # Toyota Way: Jidoka (自働化)
//! A launch either produces a running overseer or a precise error. The one
//! automatic recovery is a single retry without `sudo` when elevation fails.
//!
//! # Flow
//!
//! ```text
//! resolve name → check OS user → announce → build LaunchConfig
//!     ├─ debug:    run overseer in the foreground, config via temp file
//!     └─ detached: run overseer (optionally under sudo), config on stdin
//!                  └─ elevation failed → retry once as current user
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::{Invocation, Spawner};
use crate::config::SupervisorConfig;
use crate::directories::ControlDirectories;
use crate::error::{Result, SupervisorError};
use crate::registry::{DaemonDescriptor, DaemonRegistry};

/// Text `sudo -n` prints when it needs a password. Some implementations
/// print it and still exit zero.
pub const SUDO_PASSWORD_REQUIRED: &str = "a password is required";

/// One daemon to run inside an overseer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSpec {
    /// Daemon implementation name.
    pub class: String,
    /// Daemon arguments.
    pub argv: Vec<String>,
}

/// Configuration handed to a new overseer on its standard input.
///
/// `trace` and `verbose` travel as command-line flags, not in the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Detach from the terminal.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub daemonize: bool,
    /// Log file for detached overseers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
    /// Directory the overseer writes its PID file into.
    pub piddir: PathBuf,
    /// Daemons to host.
    pub daemons: Vec<DaemonSpec>,
    /// Pass `--trace`.
    #[serde(skip)]
    pub trace: bool,
    /// Pass `--verbose`.
    #[serde(skip)]
    pub verbose: bool,
}

impl LaunchConfig {
    /// Command-line flags for the overseer.
    #[must_use]
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.trace {
            flags.push("--trace".to_string());
        }
        if self.verbose {
            flags.push("--verbose".to_string());
        }
        flags
    }

    /// Serialized payload for the overseer's standard input.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A request to launch one daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Name or unambiguous substring of the daemon.
    pub daemon: String,
    /// Daemon arguments.
    pub argv: Vec<String>,
    /// Run in the foreground with tracing on, instead of detached.
    pub debug: bool,
    /// Skip the configured-user check.
    pub run_as_current_user: bool,
}

impl LaunchRequest {
    /// Creates a detached launch request with no arguments.
    #[must_use]
    pub fn new(daemon: impl Into<String>) -> Self {
        Self {
            daemon: daemon.into(),
            argv: Vec::new(),
            debug: false,
            run_as_current_user: false,
        }
    }

    /// Sets the daemon arguments.
    #[must_use]
    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    /// Runs in the foreground.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Skips the configured-user check.
    #[must_use]
    pub fn as_current_user(mut self, run_as_current_user: bool) -> Self {
        self.run_as_current_user = run_as_current_user;
        self
    }
}

/// Which OS user a detached overseer is started as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAs {
    /// Whoever runs the supervisor.
    CurrentUser,
    /// The configured user, through `sudo`.
    User(String),
}

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The overseer detached.
    Detached {
        /// The daemon launched.
        daemon: DaemonDescriptor,
        /// The user it was finally started as.
        run_as: RunAs,
        /// True if elevation failed and the launch was retried as the current user.
        fell_back: bool,
    },
    /// A foreground overseer ran to completion.
    Foreground {
        /// The daemon launched.
        daemon: DaemonDescriptor,
        /// The overseer's exit code.
        exit_code: i32,
    },
}

impl LaunchOutcome {
    /// The daemon that was launched.
    #[must_use]
    pub fn daemon(&self) -> &DaemonDescriptor {
        match self {
            Self::Detached { daemon, .. } | Self::Foreground { daemon, .. } => daemon,
        }
    }
}

/// Launches overseers.
pub struct Launcher {
    config: SupervisorConfig,
    directories: ControlDirectories,
    spawner: Arc<dyn Spawner>,
}

impl Launcher {
    /// Creates a launcher.
    #[must_use]
    pub fn new(config: SupervisorConfig, spawner: Arc<dyn Spawner>) -> Self {
        let directories = ControlDirectories::from_config(&config);
        Self {
            config,
            directories,
            spawner,
        }
    }

    /// Decides which user a launch runs as.
    ///
    /// # Errors
    /// Returns [`SupervisorError::UserMismatch`] for a debug launch under the
    /// wrong user: elevating while attached to a terminal would silently change
    /// the security context.
    pub fn run_as(&self, request: &LaunchRequest) -> Result<RunAs> {
        if request.run_as_current_user {
            return Ok(RunAs::CurrentUser);
        }
        let Some(required) = self.config.user.as_deref() else {
            return Ok(RunAs::CurrentUser);
        };

        let current = self.spawner.effective_user()?;
        if required == current {
            return Ok(RunAs::CurrentUser);
        }
        if request.debug {
            return Err(SupervisorError::UserMismatch {
                required: required.to_string(),
                current,
            });
        }

        tracing::info!(user = required, "Starting daemons as {required}");
        Ok(RunAs::User(required.to_string()))
    }

    /// Builds the overseer configuration for one daemon.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Configuration`] if the log directory cannot be
    /// created or the PID directory is not a writable directory.
    pub fn build_config(
        &self,
        daemon: &DaemonDescriptor,
        argv: &[String],
        debug: bool,
    ) -> Result<LaunchConfig> {
        let log = if debug {
            None
        } else {
            Some(self.directories.log_file()?)
        };
        let piddir = self.directories.writable_pid_directory()?;

        Ok(LaunchConfig {
            daemonize: !debug,
            log,
            piddir,
            daemons: vec![DaemonSpec {
                class: daemon.name().to_string(),
                argv: argv.to_vec(),
            }],
            trace: debug || self.config.trace,
            verbose: debug || self.config.verbose,
        })
    }

    /// The overseer command line for `launch_config`, run from the script directory.
    #[must_use]
    pub fn invocation(&self, launch_config: &LaunchConfig) -> Invocation {
        Invocation::new(
            self.config.overseer.command.clone(),
            launch_config.flags(),
            self.config.overseer.script_dir.clone(),
        )
    }

    /// Resolves and launches one daemon.
    ///
    /// # Errors
    /// Returns an error if the name is ambiguous, the user check fails, the
    /// control directories are unusable, or the spawn fails (after the single
    /// retry without elevation, where one applies).
    pub async fn launch(
        &self,
        registry: &DaemonRegistry,
        request: &LaunchRequest,
    ) -> Result<LaunchOutcome> {
        let daemon = registry.resolve(&request.daemon)?;
        let run_as = self.run_as(request)?;

        announce(&daemon, &request.argv, request.debug);

        let launch_config = self.build_config(&daemon, &request.argv, request.debug)?;
        let invocation = self.invocation(&launch_config);
        let payload = launch_config.to_payload()?;

        if request.debug {
            tracing::info!(
                cwd = %invocation.cwd.display(),
                "    {} $ {invocation}",
                invocation.cwd.display()
            );
            let exit_code = self.spawner.run_foreground(&invocation, &payload).await?;
            return Ok(LaunchOutcome::Foreground { daemon, exit_code });
        }

        match self.execute_detached(&invocation, &payload, &run_as).await {
            Ok(()) => Ok(LaunchOutcome::Detached {
                daemon,
                run_as,
                fell_back: false,
            }),
            Err(e) if e.is_retryable_without_elevation() => {
                tracing::warn!(error = %e, "sudo command failed. Starting daemon as current user");
                self.execute_detached(&invocation, &payload, &RunAs::CurrentUser)
                    .await?;
                Ok(LaunchOutcome::Detached {
                    daemon,
                    run_as: RunAs::CurrentUser,
                    fell_back: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn execute_detached(
        &self,
        invocation: &Invocation,
        payload: &[u8],
        run_as: &RunAs,
    ) -> Result<()> {
        let (invocation, elevated) = match run_as {
            RunAs::User(user) => (invocation.elevated(user), true),
            RunAs::CurrentUser => (invocation.clone(), false),
        };

        let output = match self.spawner.run_detached(&invocation, payload).await {
            Ok(output) => output,
            Err(e) if elevated => return Err(SupervisorError::elevation(e.to_string())),
            Err(e) => return Err(e),
        };

        if !output.succeeded() {
            let status = output
                .code
                .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
            let msg = format!(
                "'{invocation}' exited with {status}: {}",
                output.stderr.trim()
            );
            return Err(if elevated {
                SupervisorError::elevation(msg)
            } else {
                SupervisorError::spawn(msg)
            });
        }

        if elevated && output.stderr.contains(SUDO_PASSWORD_REQUIRED) {
            return Err(SupervisorError::elevation(
                "sudo exited with a zero exit code, but emitted output consistent with failure",
            ));
        }

        tracing::debug!(command = %invocation, "overseer launched");
        Ok(())
    }
}

fn announce(daemon: &DaemonDescriptor, argv: &[String], debug_mode: bool) {
    let mode = if debug_mode {
        " in debug mode (not daemonized)"
    } else {
        ""
    };
    if argv.is_empty() {
        tracing::info!(
            daemon = %daemon,
            debug = debug_mode,
            "Launching daemon \"{daemon}\"{mode}."
        );
    } else {
        tracing::info!(
            daemon = %daemon,
            debug = debug_mode,
            "Launching daemon \"{daemon}\"{mode} with arguments {}.",
            argv.join(" ")
        );
    }
}
