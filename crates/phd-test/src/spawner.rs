//! Scripted spawner that records every launch.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use phd_core::{Invocation, SpawnOutput, Spawner, SupervisorError};

/// How a recorded launch was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// `run_detached`.
    Detached,
    /// `run_foreground`.
    Foreground,
}

/// One recorded launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRecord {
    /// What was run.
    pub invocation: Invocation,
    /// What was fed to its stdin.
    pub payload: Vec<u8>,
    /// How it was run.
    pub mode: SpawnMode,
}

impl SpawnRecord {
    /// Returns true if this launch went through `sudo`.
    #[must_use]
    pub fn elevated(&self) -> bool {
        self.invocation.program == "sudo"
    }

    /// The stdin payload parsed as JSON.
    ///
    /// # Panics
    /// Panics if the payload is not JSON.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn config(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("launch payload is JSON")
    }
}

/// A scripted result for one detached launch.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// The launcher exited with this output.
    Output(SpawnOutput),
    /// The launcher could not be started at all.
    SpawnFailure(String),
    /// Talking to the launcher failed with an I/O error.
    IoFailure(String),
}

/// A [`Spawner`] that replays scripted results.
///
/// Detached launches succeed silently once the script runs out; foreground
/// launches exit zero.
#[derive(Debug)]
pub struct ScriptedSpawner {
    user: Mutex<String>,
    script: Mutex<VecDeque<Scripted>>,
    records: Mutex<Vec<SpawnRecord>>,
}

impl ScriptedSpawner {
    /// Creates a spawner whose effective user is `user`.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: Mutex::new(user.into()),
            script: Mutex::new(VecDeque::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Queues a result for the next detached launch.
    pub fn push(&self, scripted: Scripted) -> &Self {
        self.script.lock().push_back(scripted);
        self
    }

    /// Queues a launcher exit.
    pub fn push_output(&self, output: SpawnOutput) -> &Self {
        self.push(Scripted::Output(output))
    }

    /// Every launch so far, in order.
    #[must_use]
    pub fn records(&self) -> Vec<SpawnRecord> {
        self.records.lock().clone()
    }

    /// Number of launches so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    fn record(&self, invocation: &Invocation, payload: &[u8], mode: SpawnMode) {
        self.records.lock().push(SpawnRecord {
            invocation: invocation.clone(),
            payload: payload.to_vec(),
            mode,
        });
    }
}

#[async_trait]
impl Spawner for ScriptedSpawner {
    fn effective_user(&self) -> phd_core::Result<String> {
        Ok(self.user.lock().clone())
    }

    async fn run_detached(
        &self,
        invocation: &Invocation,
        payload: &[u8],
    ) -> phd_core::Result<SpawnOutput> {
        self.record(invocation, payload, SpawnMode::Detached);
        match self.script.lock().pop_front() {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::SpawnFailure(msg)) => Err(SupervisorError::spawn(msg)),
            Some(Scripted::IoFailure(msg)) => Err(std::io::Error::other(msg).into()),
            None => Ok(SpawnOutput::success("")),
        }
    }

    async fn run_foreground(&self, invocation: &Invocation, payload: &[u8]) -> phd_core::Result<i32> {
        self.record(invocation, payload, SpawnMode::Foreground);
        Ok(0)
    }
}
