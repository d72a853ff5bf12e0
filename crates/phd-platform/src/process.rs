//! Process table access: liveness, signals and scans.
//!
//! # Toyota Way: Genchi Genbutsu (現地現物)
//! Go and see: liveness comes from `kill(pid, 0)` and the process list from
//! `/proc`, never from what a PID file claims.

use std::path::{Path, PathBuf};

use phd_core::{Pid, ProcessEntry, ProcessTable, Signal};

use crate::error::{PlatformError, Result};

#[cfg(unix)]
use nix::sys::signal::{Signal as NixSignal, kill as nix_kill};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Process table of the local Unix host.
#[derive(Debug, Clone)]
pub struct UnixProcessTable {
    proc_root: PathBuf,
}

impl UnixProcessTable {
    /// Creates a process table reading `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Creates a process table reading a procfs mounted at `proc_root`.
    ///
    /// When `proc_root` is not a directory, scans fall back to `ps`.
    #[must_use]
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn scan(&self) -> Result<Vec<ProcessEntry>> {
        let mut entries = if self.proc_root.is_dir() {
            scan_procfs(&self.proc_root)?
        } else {
            scan_ps()?
        };
        let own = std::process::id();
        entries.retain(|entry| entry.pid != own && entry.pid != 0);
        entries.sort_by_key(|entry| entry.pid);
        Ok(entries)
    }
}

impl Default for UnixProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for UnixProcessTable {
    fn is_alive(&self, pid: Pid) -> bool {
        let Some(raw) = raw_pid(pid) else {
            return false;
        };

        #[cfg(unix)]
        {
            // Null signal: existence check only. EPERM means it exists but is not ours.
            match nix_kill(NixPid::from_raw(raw), None) {
                Ok(()) | Err(nix::errno::Errno::EPERM) => true,
                Err(_) => false,
            }
        }

        #[cfg(not(unix))]
        {
            let _ = raw;
            false
        }
    }

    fn signal(&self, pid: Pid, signal: Signal) -> phd_core::Result<()> {
        let raw = raw_pid(pid)
            .ok_or_else(|| PlatformError::signal(format!("refusing to signal PID {pid}")))?;

        #[cfg(unix)]
        {
            let nix_signal = match signal {
                Signal::Int => NixSignal::SIGINT,
                Signal::Term => NixSignal::SIGTERM,
                Signal::Kill => NixSignal::SIGKILL,
            };
            nix_kill(NixPid::from_raw(raw), nix_signal)
                .map_err(|e| PlatformError::signal(format!("kill({pid}, {signal}) failed: {e}")))?;
            tracing::debug!(pid, signal = %signal, "sent signal");
            Ok(())
        }

        #[cfg(not(unix))]
        {
            let _ = (raw, signal);
            Err(PlatformError::not_supported("signals not supported on this platform").into())
        }
    }

    fn processes(&self) -> phd_core::Result<Vec<ProcessEntry>> {
        Ok(self.scan()?)
    }
}

/// Converts to a signalable PID. Zero and values that would wrap negative
/// address process groups, so they are rejected.
fn raw_pid(pid: Pid) -> Option<i32> {
    i32::try_from(pid).ok().filter(|&raw| raw > 0)
}

/// Lists processes from a procfs tree.
fn scan_procfs(root: &Path) -> Result<Vec<ProcessEntry>> {
    let dir = std::fs::read_dir(root)
        .map_err(|e| PlatformError::scan(format!("cannot read {}: {e}", root.display())))?;

    let mut entries = Vec::new();
    for entry in dir.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<Pid>().ok())
        else {
            continue;
        };
        // Processes can exit between listing and reading.
        let Ok(raw) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        if let Some(command) = parse_cmdline(&raw) {
            entries.push(ProcessEntry::new(pid, command));
        }
    }
    Ok(entries)
}

/// Joins a NUL-separated `/proc/{pid}/cmdline`. Kernel threads have none.
fn parse_cmdline(raw: &[u8]) -> Option<String> {
    let command = raw
        .split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    (!command.is_empty()).then_some(command)
}

/// Lists processes with `ps`, for hosts without procfs.
fn scan_ps() -> Result<Vec<ProcessEntry>> {
    let output = std::process::Command::new("ps")
        .args(["-o", "pid=,command=", "-a", "-x", "-w", "-w"])
        .output()
        .map_err(|e| PlatformError::scan(format!("cannot run ps: {e}")))?;
    if !output.status.success() {
        return Err(PlatformError::scan(format!(
            "ps exited with {}",
            output.status
        )));
    }
    Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses `ps -o pid=,command=` output.
fn parse_ps_output(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let (pid, command) = line.trim().split_once(char::is_whitespace)?;
            let pid = pid.parse().ok()?;
            let command = command.trim();
            (!command.is_empty()).then(|| ProcessEntry::new(pid, command))
        })
        .collect()
}
