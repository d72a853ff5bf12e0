//! Stopping overseers: escalating signals and PID-file cleanup.
//!
//! # Toyota Way: Heijunka (平準化)
//! Every target set goes through the same three tiers, and each tier's
//! window closes before the next one opens:
//!
//! ```text
//! SIGINT (grace period) → SIGTERM (15s) → SIGKILL (no wait)
//! ```
//!
//! Stop never fails on a per-target problem. Bad PID arguments, survivors
//! and rogue processes end up in the [`StopReport`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::ProcessTable;
use crate::clock::Clock;
use crate::config::{OverseerConfig, POLL_INTERVAL, TERM_GRACE_PERIOD};
use crate::error::{Result, SupervisorError};
use crate::pidfile::{self, PidRecord};
use crate::types::{Pid, RogueProcess, Signal};

/// Arguments to a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRequest {
    /// Explicit PID arguments; empty stops every known overseer.
    pub pids: Vec<String>,
    /// SIGINT grace period; zero skips straight to SIGTERM.
    pub grace_period: Duration,
    /// Also escalate against rogue processes.
    pub force: bool,
    /// Skip rogue handling entirely.
    pub gently: bool,
}

impl StopRequest {
    /// Stops everything with the given grace period.
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self {
            pids: Vec::new(),
            grace_period,
            force: false,
            gently: false,
        }
    }

    /// Restricts the stop to these PID arguments.
    #[must_use]
    pub fn with_pids<I, S>(mut self, pids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pids = pids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets `--force`.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets `--gently`.
    #[must_use]
    pub fn gently(mut self, gently: bool) -> Self {
        self.gently = gently;
        self
    }
}

/// Where a stop invocation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPhase {
    /// Nothing started yet.
    Idle,
    /// Reading PID files and validating arguments.
    Resolving,
    /// Delivering one signal tier.
    Signaling(Signal),
    /// Removing PID files and handling rogue processes.
    Reconciling,
    /// Finished.
    Done,
}

/// What rogue handling found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RogueReport {
    /// Processes that look like overseers but have no PID file.
    pub found: Vec<RogueProcess>,
    /// True if the rogue processes were signalled.
    pub stopped: bool,
    /// Rogue PIDs not confirmed dead after escalation.
    pub survivors: Vec<Pid>,
    /// Why the process table could not be scanned, if it could not.
    pub scan_error: Option<String>,
}

impl RogueReport {
    /// Returns true if no rogue process was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }
}

/// Outcome of a stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// PID arguments that were not numbers.
    pub invalid_pids: Vec<String>,
    /// PID arguments not found in any PID file.
    pub unknown_pids: Vec<Pid>,
    /// PIDs the escalation was run against.
    pub targeted: Vec<Pid>,
    /// Targeted PIDs not confirmed dead.
    pub survivors: Vec<Pid>,
    /// PID files deleted after their overseer exited.
    pub removed_pid_files: Vec<PathBuf>,
    /// PID files that could not be deleted, with the reason.
    pub removal_errors: Vec<(PathBuf, String)>,
    /// Rogue handling, when it ran.
    pub rogue: Option<RogueReport>,
    /// True if there was nothing to stop.
    pub nothing_running: bool,
    /// Phases entered, in order.
    pub phases: Vec<StopPhase>,
}

impl StopReport {
    /// Process exit code for the CLI. Stop always succeeds.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        0
    }

    fn enter(&mut self, phase: StopPhase) {
        self.phases.push(phase);
    }
}

/// Runs stop escalations against the process table.
pub struct ShutdownCoordinator {
    processes: Arc<dyn ProcessTable>,
    clock: Arc<dyn Clock>,
    overseer: OverseerConfig,
}

impl ShutdownCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        processes: Arc<dyn ProcessTable>,
        clock: Arc<dyn Clock>,
        overseer: OverseerConfig,
    ) -> Self {
        Self {
            processes,
            clock,
            overseer,
        }
    }

    /// Sends `signal` to every non-zero PID, then waits up to `wait` for them
    /// to exit, polling every 100ms. Returns the PIDs still alive.
    ///
    /// With a zero `wait` nothing is polled and every signalled PID is returned.
    pub async fn send_signal(&self, pids: &[Pid], signal: Signal, wait: Duration) -> Vec<Pid> {
        // PID 0 addresses our own process group.
        let mut remaining: Vec<Pid> = unique(pids.iter().copied().filter(|&pid| pid != 0));

        for &pid in &remaining {
            tracing::info!(pid, signal = %signal, "{} process {pid}...", signal.verb());
            if let Err(e) = self.processes.signal(pid, signal) {
                tracing::debug!(pid, signal = %signal, error = %e, "signal not delivered");
            }
        }

        if wait.is_zero() {
            return remaining;
        }

        let start = self.clock.now();
        loop {
            remaining.retain(|&pid| {
                let alive = self.processes.is_alive(pid);
                if !alive {
                    tracing::info!(pid, "Process {pid} exited.");
                }
                alive
            });
            if remaining.is_empty() {
                break;
            }
            self.clock.sleep(POLL_INTERVAL).await;
            if self.clock.now().duration_since(start) >= wait {
                break;
            }
        }
        remaining
    }

    /// Escalates SIGINT → SIGTERM → SIGKILL and returns the survivors.
    ///
    /// SIGINT is skipped when `grace_period` is zero. SIGKILL is not
    /// confirmed, so anything it was sent to is reported as a survivor.
    pub async fn send_stop_signals(&self, pids: &[Pid], grace_period: Duration) -> Vec<Pid> {
        self.escalate(pids, grace_period, &mut Vec::new()).await
    }

    async fn escalate(
        &self,
        pids: &[Pid],
        grace_period: Duration,
        phases: &mut Vec<StopPhase>,
    ) -> Vec<Pid> {
        let mut pids = pids.to_vec();

        if !grace_period.is_zero() {
            phases.push(StopPhase::Signaling(Signal::Int));
            pids = self.send_signal(&pids, Signal::Int, grace_period).await;
        }
        if !pids.is_empty() {
            phases.push(StopPhase::Signaling(Signal::Term));
            pids = self.send_signal(&pids, Signal::Term, TERM_GRACE_PERIOD).await;
        }
        if !pids.is_empty() {
            phases.push(StopPhase::Signaling(Signal::Kill));
            pids = self.send_signal(&pids, Signal::Kill, Duration::ZERO).await;
        }
        pids
    }

    /// Stops overseers tracked by PID files in `pid_dir`.
    ///
    /// Once the PID files are read, nothing fails the stop: PID files that
    /// cannot be removed and process-table scan failures are logged and
    /// recorded in the report.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Usage`] if both `force` and `gently` are set,
    /// before anything is read or signalled, and [`SupervisorError::Configuration`]
    /// if the PID directory cannot be listed.
    pub async fn stop(&self, pid_dir: &Path, request: &StopRequest) -> Result<StopReport> {
        if request.force && request.gently {
            return Err(SupervisorError::usage(
                "You can not specify conflicting options --gently and --force together.",
            ));
        }

        let mut report = StopReport::default();
        report.enter(StopPhase::Idle);
        report.enter(StopPhase::Resolving);

        let records = pidfile::load_local(pid_dir)?;
        if records.is_empty() {
            report.enter(StopPhase::Reconciling);
            if request.pids.is_empty() && !request.gently {
                let rogue = self
                    .process_rogue(&records, request.grace_period, true, request.force)
                    .await;
                report.nothing_running = rogue.is_empty() && rogue.scan_error.is_none();
                report.rogue = Some(rogue);
            } else {
                report.nothing_running = true;
            }
            if report.nothing_running {
                tracing::info!("There are no running daemons.");
            }
            report.enter(StopPhase::Done);
            return Ok(report);
        }

        let running_pids: BTreeSet<Pid> = records
            .iter()
            .filter_map(|r| r.pid)
            .filter(|&pid| pid != 0)
            .collect();
        let targets = if request.pids.is_empty() {
            running_pids.iter().copied().collect()
        } else {
            select_targets(&request.pids, &running_pids, &mut report)
        };

        if targets.is_empty() {
            tracing::info!("No daemons to kill.");
            report.enter(StopPhase::Done);
            return Ok(report);
        }

        report.targeted.clone_from(&targets);
        let survivors = self
            .escalate(&targets, request.grace_period, &mut report.phases)
            .await;
        report.survivors.clone_from(&survivors);

        report.enter(StopPhase::Reconciling);
        (report.removed_pid_files, report.removal_errors) =
            remove_stopped(&records, &targets, &survivors);

        if !request.gently {
            let rogue = self
                .process_rogue(
                    &records,
                    request.grace_period,
                    request.pids.is_empty(),
                    request.force,
                )
                .await;
            report.rogue = Some(rogue);
        }

        report.enter(StopPhase::Done);
        Ok(report)
    }

    /// Scans for overseer-looking processes with no PID file and, with
    /// `force`, escalates against them. With `warn` and no `force` the
    /// operator is told how to stop them. A failed scan is logged and
    /// recorded in [`RogueReport::scan_error`].
    pub async fn process_rogue(
        &self,
        records: &[PidRecord],
        grace_period: Duration,
        warn: bool,
        force: bool,
    ) -> RogueReport {
        let mut report = RogueReport::default();
        match self.find_rogue(records).await {
            Ok(found) => report.found = found,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Unable to scan for processes running without PID files."
                );
                report.scan_error = Some(e.to_string());
            }
        }
        if report.is_empty() {
            return report;
        }

        if force {
            let pids: Vec<Pid> = report.found.iter().map(|p| p.pid).collect();
            report.stopped = true;
            report.survivors = self.send_stop_signals(&pids, grace_period).await;
            if !report.survivors.is_empty() {
                tracing::warn!(
                    survivors = ?report.survivors,
                    "Unable to stop processes running without PID files. \
                     Try running this command again with sudo."
                );
            }
        } else if warn {
            let listing: Vec<String> = report
                .found
                .iter()
                .map(|p| format!("{} {}", p.pid, p.command))
                .collect();
            tracing::warn!(
                count = report.found.len(),
                "There are processes running that look like daemons but have no \
                 corresponding PID files:\n\n{}\n\nStop these processes by re-running \
                 this command with the --force parameter.",
                listing.join("\n")
            );
        }
        report
    }

    async fn find_rogue(&self, records: &[PidRecord]) -> Result<Vec<RogueProcess>> {
        let tracked: BTreeSet<Pid> = records.iter().filter_map(|r| r.pid).collect();
        // Scans read /proc or run `ps`; both block.
        let processes = Arc::clone(&self.processes);
        let entries = tokio::task::spawn_blocking(move || processes.processes())
            .await
            .map_err(|e| {
                SupervisorError::configuration(format!("process scan did not finish: {e}"))
            })??;
        Ok(entries
            .into_iter()
            .filter(|p| p.pid != 0 && !tracked.contains(&p.pid))
            .filter(|p| self.overseer.matches(&p.command))
            .collect())
    }
}

fn select_targets(
    args: &[String],
    running_pids: &BTreeSet<Pid>,
    report: &mut StopReport,
) -> Vec<Pid> {
    let mut targets = Vec::new();
    for arg in args {
        let Some(pid) = parse_pid(arg) else {
            tracing::warn!(pid = %arg, "PID '{arg}' is not a valid PID.");
            report.invalid_pids.push(arg.clone());
            continue;
        };
        if !running_pids.contains(&pid) {
            tracing::warn!(
                pid,
                "PID \"{pid}\" is not a known daemon PID. It will not be killed."
            );
            report.unknown_pids.push(pid);
            continue;
        }
        if !targets.contains(&pid) {
            targets.push(pid);
        }
    }
    targets
}

/// Parses a PID argument: ASCII digits only.
fn parse_pid(arg: &str) -> Option<Pid> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    arg.parse().ok()
}

fn unique(pids: impl Iterator<Item = Pid>) -> Vec<Pid> {
    let mut seen = BTreeSet::new();
    pids.filter(|pid| seen.insert(*pid)).collect()
}

/// Removes the PID files of stopped targets. Returns the removed files and
/// the ones that could not be removed.
fn remove_stopped(
    records: &[PidRecord],
    targets: &[Pid],
    survivors: &[Pid],
) -> (Vec<PathBuf>, Vec<(PathBuf, String)>) {
    let files: BTreeSet<&PathBuf> = records
        .iter()
        .filter(|r| {
            r.pid
                .is_some_and(|pid| targets.contains(&pid) && !survivors.contains(&pid))
        })
        .map(|r| &r.pid_file)
        .collect();

    let mut removed = Vec::with_capacity(files.len());
    let mut errors = Vec::new();
    for file in files {
        match pidfile::remove(file) {
            Ok(()) => {
                tracing::debug!(path = %file.display(), "removed PID file");
                removed.push(file.clone());
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Unable to remove PID file.");
                errors.push((file.clone(), e.to_string()));
            }
        }
    }
    (removed, errors)
}
