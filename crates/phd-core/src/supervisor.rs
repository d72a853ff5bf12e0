//! Supervisor - the operator-facing commands.
//!
//! # Toyota Way: Heijunka (平準化)
//! `start` launches a fixed, levelled set of daemons: the baseline daemons
//! once each, then the taskmaster N times.
//!
//! # Toyota Way: Jidoka (自働化)
//! `start` refuses to run on top of live daemons. One failed launch does not
//! stop the rest of the batch, but an unusable environment stops everything.

use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::{ProcessTable, Spawner};
use crate::clock::{Clock, TokioClock};
use crate::config::SupervisorConfig;
use crate::directories::ControlDirectories;
use crate::error::{Result, SupervisorError};
use crate::launch::{LaunchOutcome, LaunchRequest, Launcher};
use crate::pidfile::{self, KnownDaemon};
use crate::registry::DaemonRegistry;
use crate::remote::{LeaseStore, NoLeases, NoRemote, RemoteStatusSource};
use crate::shutdown::{ShutdownCoordinator, StopReport, StopRequest};
use crate::types::Pid;

// =============================================================================
// Reports
// =============================================================================

/// One launch in a `start` batch that failed.
#[derive(Debug)]
pub struct LaunchFailure {
    /// Daemon name as configured.
    pub daemon: String,
    /// Why it failed.
    pub error: SupervisorError,
}

/// What `start` did.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Leases expired, or `None` with `--keep-leases`.
    pub freed_leases: Option<u64>,
    /// Successful launches, in launch order.
    pub launched: Vec<LaunchOutcome>,
    /// Failed launches, in launch order.
    pub failures: Vec<LaunchFailure>,
    /// Where detached daemons log.
    pub log_file: PathBuf,
}

/// Outcome of `start`.
#[derive(Debug)]
pub enum StartOutcome {
    /// Daemons were already running; nothing was done.
    AlreadyRunning {
        /// The live daemons that blocked the start.
        running: Vec<KnownDaemon>,
    },
    /// The batch was launched.
    Started(StartReport),
}

impl StartOutcome {
    /// Process exit code for the CLI.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyRunning { .. } => 1,
            Self::Started(_) => 0,
        }
    }
}

/// Outcome of `restart`.
#[derive(Debug)]
pub struct RestartReport {
    /// The stop half.
    pub stop: StopReport,
    /// The start half.
    pub start: StartOutcome,
}

impl RestartReport {
    /// Process exit code for the CLI: that of the start half.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.start.exit_code()
    }
}

/// Where a status entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A PID file on this host.
    Local,
    /// The shared daemon registry.
    Remote,
}

/// One line of `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatusEntry {
    /// Overseer process ID, when known.
    pub pid: Option<Pid>,
    /// Daemon implementation name, when known.
    pub class: Option<String>,
    /// Registry identifier, when known.
    pub log_id: Option<String>,
    /// PID file, for local entries.
    pub pid_file: Option<PathBuf>,
    /// Where the entry came from.
    pub origin: Origin,
    /// Liveness.
    pub running: bool,
}

// =============================================================================
// Supervisor
// =============================================================================

/// Daemon supervisor.
///
/// # Example
///
/// ```rust,ignore
/// let supervisor = Supervisor::builder(config)
///     .registry(registry)
///     .process_table(Arc::new(UnixProcessTable::new()))
///     .spawner(Arc::new(CommandSpawner::new()))
///     .build()?;
/// let outcome = supervisor.start(false).await?;
/// std::process::exit(outcome.exit_code());
/// ```
pub struct Supervisor {
    config: SupervisorConfig,
    directories: ControlDirectories,
    registry: DaemonRegistry,
    processes: Arc<dyn ProcessTable>,
    remote: Arc<dyn RemoteStatusSource>,
    leases: Arc<dyn LeaseStore>,
    launcher: Launcher,
    shutdown: ShutdownCoordinator,
}

impl Supervisor {
    /// Starts building a supervisor.
    #[must_use]
    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The daemon registry.
    #[must_use]
    pub const fn registry(&self) -> &DaemonRegistry {
        &self.registry
    }

    /// Sorted names of every registered daemon.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Configuration`] if no daemon is registered.
    pub fn list_available(&self) -> Result<Vec<String>> {
        if self.registry.is_empty() {
            return Err(SupervisorError::configuration("no daemons are registered"));
        }
        Ok(self.registry.list_available())
    }

    /// Launches one daemon.
    ///
    /// # Errors
    /// See [`Launcher::launch`].
    pub async fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        self.launcher.launch(&self.registry, request).await
    }

    /// Every daemon known locally or to the registry, with liveness.
    ///
    /// # Errors
    /// Returns an error if the PID directory or the registry cannot be read.
    pub async fn status(&self) -> Result<Vec<DaemonStatusEntry>> {
        let pid_dir = self.directories.pid_directory()?;
        let known = pidfile::load_all(&pid_dir, self.remote.as_ref()).await?;

        Ok(known
            .iter()
            .map(|daemon| DaemonStatusEntry {
                pid: daemon.pid(),
                class: daemon.class().map(str::to_string),
                log_id: daemon.log_id().map(str::to_string),
                pid_file: match daemon {
                    KnownDaemon::Local(record) => Some(record.pid_file.clone()),
                    KnownDaemon::Remote(_) => None,
                },
                origin: match daemon {
                    KnownDaemon::Local(_) => Origin::Local,
                    KnownDaemon::Remote(_) => Origin::Remote,
                },
                running: daemon.is_running(self.processes.as_ref()),
            })
            .collect())
    }

    /// Launches the baseline daemons and the taskmasters.
    ///
    /// # Errors
    /// Returns an error for environment-level failures: unreadable PID
    /// directory, registry or lease store failures, unusable log or PID
    /// directory. Per-daemon launch failures are collected in the report.
    pub async fn start(&self, keep_leases: bool) -> Result<StartOutcome> {
        let pid_dir = self.directories.pid_directory()?;
        let running: Vec<KnownDaemon> = pidfile::load_all(&pid_dir, self.remote.as_ref())
            .await?
            .into_iter()
            .filter(|daemon| daemon.is_running(self.processes.as_ref()))
            .collect();

        if !running.is_empty() {
            tracing::error!(
                running = running.len(),
                "phd start: Unable to start daemons because daemons are already running. \
                 You can view running daemons with 'phd status'. \
                 You can stop running daemons with 'phd stop'. \
                 You can use 'phd restart' to stop all daemons before starting new daemons."
            );
            return Ok(StartOutcome::AlreadyRunning { running });
        }

        let mut report = StartReport::default();
        if keep_leases {
            tracing::info!("Not touching active task queue leases.");
        } else {
            tracing::info!("Freeing active task leases...");
            let count = self.leases.expire_all_active_leases().await?;
            tracing::info!(count, "Freed {count} task lease(s).");
            report.freed_leases = Some(count);
        }

        report.log_file = self.will_launch_daemons()?;

        for name in self.start_batch() {
            let request = LaunchRequest::new(name.clone());
            match self.launch(&request).await {
                Ok(outcome) => report.launched.push(outcome),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    tracing::error!(daemon = %name, error = %error, "launch failed");
                    report.failures.push(LaunchFailure {
                        daemon: name,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            launched = report.launched.len(),
            failed = report.failures.len(),
            "Done."
        );
        Ok(StartOutcome::Started(report))
    }

    /// Stops daemons. See [`ShutdownCoordinator::stop`].
    ///
    /// # Errors
    /// Returns an error for conflicting options or an unusable PID directory.
    pub async fn stop(&self, request: &StopRequest) -> Result<StopReport> {
        if request.force && request.gently {
            return Err(SupervisorError::usage(
                "You can not specify conflicting options --gently and --force together.",
            ));
        }
        let pid_dir = self.directories.pid_directory()?;
        self.shutdown.stop(&pid_dir, request).await
    }

    /// Stops every daemon, then starts the standard set.
    ///
    /// Explicit PIDs in `request` are ignored.
    ///
    /// # Errors
    /// Returns the first environment-level error from either half.
    pub async fn restart(&self, request: &StopRequest, keep_leases: bool) -> Result<RestartReport> {
        let stop_all = StopRequest {
            pids: Vec::new(),
            ..request.clone()
        };
        let stop = self.stop(&stop_all).await?;
        let start = self.start(keep_leases).await?;
        Ok(RestartReport { stop, start })
    }

    /// Daemon names for `start`, in launch order.
    fn start_batch(&self) -> Vec<String> {
        let taskmasters = self.config.start_taskmasters as usize;
        self.config
            .baseline_daemons
            .iter()
            .cloned()
            .chain(std::iter::repeat(self.config.taskmaster_daemon.clone()).take(taskmasters))
            .collect()
    }

    fn will_launch_daemons(&self) -> Result<PathBuf> {
        tracing::info!("Preparing to launch daemons.");
        let log_file = self.directories.log_file()?;
        tracing::info!(log = %log_file.display(), "NOTE: Logs will appear in '{}'.", log_file.display());
        Ok(log_file)
    }
}

// =============================================================================
// SupervisorBuilder
// =============================================================================

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    registry: DaemonRegistry,
    processes: Option<Arc<dyn ProcessTable>>,
    spawner: Option<Arc<dyn Spawner>>,
    remote: Arc<dyn RemoteStatusSource>,
    leases: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
}

impl SupervisorBuilder {
    /// Creates a builder with no registry, no remote registry and no lease store.
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            registry: DaemonRegistry::new(),
            processes: None,
            spawner: None,
            remote: Arc::new(NoRemote),
            leases: Arc::new(NoLeases),
            clock: Arc::new(TokioClock),
        }
    }

    /// Sets the daemon registry.
    #[must_use]
    pub fn registry(mut self, registry: DaemonRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the process table.
    #[must_use]
    pub fn process_table(mut self, processes: Arc<dyn ProcessTable>) -> Self {
        self.processes = Some(processes);
        self
    }

    /// Sets the spawner.
    #[must_use]
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Sets the shared daemon registry.
    #[must_use]
    pub fn remote(mut self, remote: Arc<dyn RemoteStatusSource>) -> Self {
        self.remote = remote;
        self
    }

    /// Sets the task lease store.
    #[must_use]
    pub fn leases(mut self, leases: Arc<dyn LeaseStore>) -> Self {
        self.leases = leases;
        self
    }

    /// Sets the clock used by stop escalation.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the configuration and builds the supervisor.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Configuration`] if the configuration is
    /// invalid or no process table or spawner was given.
    pub fn build(self) -> Result<Supervisor> {
        self.config.validate()?;
        let processes = self
            .processes
            .ok_or_else(|| SupervisorError::configuration("no process table configured"))?;
        let spawner = self
            .spawner
            .ok_or_else(|| SupervisorError::configuration("no spawner configured"))?;

        let directories = ControlDirectories::from_config(&self.config);
        let launcher = Launcher::new(self.config.clone(), spawner);
        let shutdown = ShutdownCoordinator::new(
            Arc::clone(&processes),
            self.clock,
            self.config.overseer.clone(),
        );

        Ok(Supervisor {
            config: self.config,
            directories,
            registry: self.registry,
            processes,
            remote: self.remote,
            leases: self.leases,
            launcher,
            shutdown,
        })
    }
}
