//! Scripted process table.
//!
//! # Toyota Way: Genchi Genbutsu (現地現物)
//! Every signal the supervisor sends is recorded with the virtual time it
//! was sent at, so tests assert on what actually happened.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use phd_core::{Pid, ProcessEntry, ProcessTable, Signal, SupervisorError};

use crate::clock::ManualClock;

/// One signal delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentSignal {
    /// Target.
    pub pid: Pid,
    /// Signal sent.
    pub signal: Signal,
    /// Virtual time of delivery.
    pub at: Duration,
}

#[derive(Debug, Clone, Default)]
struct FakeProcess {
    command: String,
    /// Virtual time of death, once scheduled.
    dies_at: Option<Duration>,
    /// Delay before exiting after each signal; absent means the signal is ignored.
    reactions: HashMap<Signal, Duration>,
    deny_signals: bool,
}

/// An in-memory process table driven by a [`ManualClock`].
///
/// Processes ignore SIGINT and SIGTERM unless told otherwise, and die at once
/// on SIGKILL.
#[derive(Debug)]
pub struct FakeProcessTable {
    clock: Arc<ManualClock>,
    processes: Mutex<BTreeMap<Pid, FakeProcess>>,
    sent: Mutex<Vec<SentSignal>>,
    scan_failure: Mutex<Option<String>>,
}

impl FakeProcessTable {
    /// Creates an empty table on `clock`.
    #[must_use]
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            processes: Mutex::new(BTreeMap::new()),
            sent: Mutex::new(Vec::new()),
            scan_failure: Mutex::new(None),
        }
    }

    /// Adds a live process with no recognizable command line.
    pub fn spawn(&self, pid: Pid) -> &Self {
        self.spawn_command(pid, format!("process-{pid}"))
    }

    /// Adds a live process with the given command line.
    pub fn spawn_command(&self, pid: Pid, command: impl Into<String>) -> &Self {
        let mut reactions = HashMap::new();
        reactions.insert(Signal::Kill, Duration::ZERO);
        self.processes.lock().insert(
            pid,
            FakeProcess {
                command: command.into(),
                reactions,
                ..FakeProcess::default()
            },
        );
        self
    }

    /// Makes `pid` exit `delay` after receiving `signal`.
    pub fn exit_after(&self, pid: Pid, signal: Signal, delay: Duration) -> &Self {
        if let Some(process) = self.processes.lock().get_mut(&pid) {
            process.reactions.insert(signal, delay);
        }
        self
    }

    /// Makes `pid` ignore every signal, SIGKILL included (an unkillable
    /// process, as seen from a user without permission to signal it).
    pub fn ignore_everything(&self, pid: Pid) -> &Self {
        if let Some(process) = self.processes.lock().get_mut(&pid) {
            process.reactions.clear();
        }
        self
    }

    /// Makes delivery to `pid` fail with a permission error.
    pub fn deny_signals(&self, pid: Pid) -> &Self {
        if let Some(process) = self.processes.lock().get_mut(&pid) {
            process.deny_signals = true;
        }
        self
    }

    /// Makes every process scan fail with `reason`.
    pub fn fail_scans(&self, reason: impl Into<String>) -> &Self {
        *self.scan_failure.lock() = Some(reason.into());
        self
    }

    /// Every delivery attempt so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentSignal> {
        self.sent.lock().clone()
    }

    /// Signals delivered to `pid`, in order.
    #[must_use]
    pub fn signals_to(&self, pid: Pid) -> Vec<Signal> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.pid == pid)
            .map(|s| s.signal)
            .collect()
    }

    /// Returns true if `signal` was ever sent to anyone.
    #[must_use]
    pub fn was_sent(&self, signal: Signal) -> bool {
        self.sent.lock().iter().any(|s| s.signal == signal)
    }

    fn alive_at(process: &FakeProcess, now: Duration) -> bool {
        process.dies_at.is_none_or(|dies_at| now < dies_at)
    }
}

impl ProcessTable for FakeProcessTable {
    fn is_alive(&self, pid: Pid) -> bool {
        let now = self.clock.elapsed();
        self.processes
            .lock()
            .get(&pid)
            .is_some_and(|process| Self::alive_at(process, now))
    }

    fn signal(&self, pid: Pid, signal: Signal) -> phd_core::Result<()> {
        let now = self.clock.elapsed();
        self.sent.lock().push(SentSignal {
            pid,
            signal,
            at: now,
        });

        let mut processes = self.processes.lock();
        let process = processes
            .get_mut(&pid)
            .filter(|process| Self::alive_at(process, now))
            .ok_or_else(|| SupervisorError::signal(format!("kill({pid}, {signal}): ESRCH")))?;

        if process.deny_signals {
            return Err(SupervisorError::signal(format!(
                "kill({pid}, {signal}): EPERM"
            )));
        }

        if let Some(delay) = process.reactions.get(&signal) {
            let dies_at = now + *delay;
            process.dies_at = Some(process.dies_at.map_or(dies_at, |d| d.min(dies_at)));
        }
        Ok(())
    }

    fn processes(&self) -> phd_core::Result<Vec<ProcessEntry>> {
        if let Some(reason) = self.scan_failure.lock().clone() {
            return Err(SupervisorError::configuration(reason));
        }
        let now = self.clock.elapsed();
        Ok(self
            .processes
            .lock()
            .iter()
            .filter(|(_, process)| Self::alive_at(process, now))
            .map(|(&pid, process)| ProcessEntry::new(pid, process.command.clone()))
            .collect())
    }
}
