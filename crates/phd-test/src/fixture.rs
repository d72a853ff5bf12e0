//! Temporary control directories and PID files.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use phd_core::{Daemon, DaemonRegistry, Pid, SupervisorConfig};
use serde_json::json;
use tempfile::TempDir;

/// A temporary root holding `pid/` and `log/` control directories.
#[derive(Debug)]
pub struct PidDirFixture {
    root: TempDir,
}

impl PidDirFixture {
    /// Creates the root and an empty PID directory.
    ///
    /// # Errors
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        let root = tempfile::tempdir()?;
        std::fs::create_dir_all(root.path().join("pid"))?;
        Ok(Self { root })
    }

    /// The fixture root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// The PID directory.
    #[must_use]
    pub fn pid_dir(&self) -> PathBuf {
        self.root.path().join("pid")
    }

    /// The log directory (created on first launch).
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.path().join("log")
    }

    /// A configuration pointing at this fixture's directories.
    #[must_use]
    pub fn config(&self) -> SupervisorConfig {
        SupervisorConfig::new(self.pid_dir(), self.log_dir())
    }

    /// Writes a PID file for an overseer hosting `daemons` (`(id, class)` pairs).
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_overseer(&self, name: &str, pid: Pid, daemons: &[(&str, &str)]) -> io::Result<PathBuf> {
        let daemons: Vec<_> = daemons
            .iter()
            .map(|(id, class)| json!({"id": id, "class": class, "argv": []}))
            .collect();
        let contents = json!({
            "pid": pid,
            "start": 1_700_000_000_u64,
            "config": {"daemonize": true, "piddir": self.pid_dir()},
            "daemons": daemons,
        });
        self.write_raw(name, &contents.to_string())
    }

    /// Writes arbitrary PID file contents.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_raw(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.pid_dir().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Names of the files currently in the PID directory, sorted.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn pid_files(&self) -> io::Result<Vec<String>> {
        let mut names = std::fs::read_dir(self.pid_dir())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}

/// A daemon that does nothing.
#[derive(Debug, Clone)]
pub struct NoopDaemon {
    name: String,
}

impl NoopDaemon {
    /// Creates a daemon reporting `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Daemon for NoopDaemon {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, _argv: &[String]) -> phd_core::Result<()> {
        Ok(())
    }
}

/// The names `start` launches by default.
pub const STANDARD_DAEMONS: [&str; 4] = [
    "RepositoryPullLocalDaemon",
    "GarbageCollectorDaemon",
    "TriggerDaemon",
    "TaskmasterDaemon",
];

/// A registry with every standard daemon backed by a [`NoopDaemon`].
#[must_use]
pub fn standard_registry() -> DaemonRegistry {
    let mut registry = DaemonRegistry::new();
    for name in STANDARD_DAEMONS {
        registry.register(name, move || Box::new(NoopDaemon::new(name)));
    }
    registry
}
