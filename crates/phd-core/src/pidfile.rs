//! PID files: what this host knows about running overseers.
//!
//! Overseers write one JSON document each into the PID directory:
//!
//! ```text
//! {"pid": 1234, "start": 1700000000, "config": {...},
//!  "daemons": [{"id": "a1b2", "class": "TaskmasterDaemon", "argv": []}]}
//! ```
//!
//! The supervisor only reads these files, and deletes them after it has
//! seen the overseer exit. Reads take no lock; a file vanishing between
//! listing and reading is skipped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adapter::ProcessTable;
use crate::error::{Result, SupervisorError};
use crate::remote::{RemoteRecord, RemoteStatusSource};
use crate::types::Pid;

/// One daemon described by a PID file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRecord {
    /// Overseer process ID; `None` when the file could not be parsed.
    pub pid: Option<Pid>,
    /// File this record was read from.
    pub pid_file: PathBuf,
    /// Registry identifier of the hosted daemon, if the overseer reported one.
    pub log_id: Option<String>,
    /// Hosted daemon implementation name.
    pub class: Option<String>,
    /// Hosted daemon arguments.
    pub argv: Vec<String>,
    /// Overseer start time (Unix seconds).
    pub start: Option<u64>,
}

impl PidRecord {
    /// Creates a record for `pid` read from `pid_file`.
    #[must_use]
    pub fn new(pid: Option<Pid>, pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            pid_file: pid_file.into(),
            log_id: None,
            class: None,
            argv: Vec::new(),
            start: None,
        }
    }

    /// Returns true if the overseer process is alive.
    ///
    /// Records without a PID, or with PID zero, are never running.
    #[must_use]
    pub fn is_running(&self, processes: &dyn ProcessTable) -> bool {
        self.pid
            .is_some_and(|pid| pid != 0 && processes.is_alive(pid))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PidFileContents {
    #[serde(default)]
    pid: Option<Pid>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    daemons: Vec<PidFileDaemon>,
}

#[derive(Debug, Default, Deserialize)]
struct PidFileDaemon {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    argv: Vec<String>,
}

/// Parses the contents of one PID file into records.
///
/// An overseer with no daemons still yields one record so it can be stopped.
/// Unparseable contents yield a single record with no PID.
#[must_use]
pub fn parse(path: &Path, contents: &str) -> Vec<PidRecord> {
    let parsed: PidFileContents = serde_json::from_str(contents).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "unparseable PID file");
        PidFileContents::default()
    });

    let mut daemons = parsed.daemons;
    if daemons.is_empty() {
        daemons.push(PidFileDaemon::default());
    }

    daemons
        .into_iter()
        .map(|daemon| PidRecord {
            pid: parsed.pid,
            pid_file: path.to_path_buf(),
            log_id: daemon.id,
            class: daemon.class,
            argv: daemon.argv,
            start: parsed.start,
        })
        .collect()
}

/// Reads every PID file in `pid_dir` and flattens the records.
///
/// # Errors
/// Returns [`SupervisorError::Configuration`] if the directory cannot be listed.
pub fn load_local(pid_dir: &Path) -> Result<Vec<PidRecord>> {
    let entries = std::fs::read_dir(pid_dir).map_err(|e| {
        SupervisorError::configuration(format!(
            "cannot list PID directory '{}': {e}",
            pid_dir.display()
        ))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        match std::fs::read_to_string(&path) {
            Ok(contents) => records.extend(parse(&path, &contents)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping PID file"),
        }
    }
    Ok(records)
}

/// Removes a PID file. A file already removed by someone else is not an error.
///
/// # Errors
/// Returns an I/O error for anything other than "not found".
pub fn remove(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A daemon known either from a local PID file or from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownDaemon {
    /// Tracked by a PID file on this host.
    Local(PidRecord),
    /// Only tracked by the shared registry.
    Remote(RemoteRecord),
}

impl KnownDaemon {
    /// Process ID, when known.
    #[must_use]
    pub fn pid(&self) -> Option<Pid> {
        match self {
            Self::Local(record) => record.pid,
            Self::Remote(record) => record.pid,
        }
    }

    /// Registry identifier, when known.
    #[must_use]
    pub fn log_id(&self) -> Option<&str> {
        match self {
            Self::Local(record) => record.log_id.as_deref(),
            Self::Remote(record) => Some(record.id.as_str()),
        }
    }

    /// Daemon implementation name, when known.
    #[must_use]
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::Local(record) => record.class.as_deref(),
            Self::Remote(record) => record.class.as_deref(),
        }
    }

    /// Returns true if this daemon counts as running.
    ///
    /// Local records are checked against the process table. Remote records
    /// were selected by the registry's "alive" status and may live on another
    /// host, so they are taken at the registry's word.
    #[must_use]
    pub fn is_running(&self, processes: &dyn ProcessTable) -> bool {
        match self {
            Self::Local(record) => record.is_running(processes),
            Self::Remote(_) => true,
        }
    }
}

/// Local PID-file records plus registry daemons not already tracked locally.
///
/// # Errors
/// Returns an error if the PID directory cannot be listed or the registry
/// cannot be queried.
pub async fn load_all(
    pid_dir: &Path,
    remote: &dyn RemoteStatusSource,
) -> Result<Vec<KnownDaemon>> {
    let local = load_local(pid_dir)?;

    let local_ids: Vec<String> = local
        .iter()
        .filter_map(|record| record.log_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let remote_records = remote.find_alive_excluding(&local_ids).await?;
    tracing::debug!(
        local = local.len(),
        remote = remote_records.len(),
        "loaded known daemons"
    );

    Ok(local
        .into_iter()
        .map(KnownDaemon::Local)
        .chain(
            remote_records
                .into_iter()
                .filter(|record| !local_ids.contains(&record.id))
                .map(KnownDaemon::Remote),
        )
        .collect())
}
