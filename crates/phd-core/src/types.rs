//! Core types shared by the launcher and the shutdown coordinator.

use serde::{Deserialize, Serialize};

/// Operating system process identifier.
///
/// Zero is representable because PID files can contain it, but it must never
/// reach a signaling primitive: `kill(0, ..)` targets the caller's process group.
pub type Pid = u32;

/// Signals used by the escalating shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Interrupt (graceful shutdown).
    Int,
    /// Terminate (graceful shutdown).
    Term,
    /// Kill (immediate termination).
    Kill,
}

impl Signal {
    /// Returns the Unix signal number.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        match self {
            Self::Int => 2,
            Self::Kill => 9,
            Self::Term => 15,
        }
    }

    /// Creates a signal from a Unix signal number.
    #[must_use]
    pub const fn from_i32(sig: i32) -> Option<Self> {
        match sig {
            2 => Some(Self::Int),
            9 => Some(Self::Kill),
            15 => Some(Self::Term),
            _ => None,
        }
    }

    /// Conventional signal name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int => "SIGINT",
            Self::Term => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }

    /// Operator-facing verb for the action this signal performs.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Int => "Interrupting",
            Self::Term => "Terminating",
            Self::Kill => "Killing",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A process found in the OS process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Process ID.
    pub pid: Pid,
    /// Full command line, arguments separated by spaces.
    pub command: String,
}

impl ProcessEntry {
    /// Creates a process entry.
    #[must_use]
    pub fn new(pid: Pid, command: impl Into<String>) -> Self {
        Self {
            pid,
            command: command.into(),
        }
    }
}

/// A process that looks like an overseer but has no PID file.
pub type RogueProcess = ProcessEntry;
