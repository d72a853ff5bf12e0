// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # phd-core
//!
//! Core primitives for supervising daemon overseer processes.
//!
//! - [`DaemonRegistry`] resolves daemon names to registered implementations
//! - [`Launcher`] starts overseers, detached or in the foreground
//! - [`pidfile`] reads what running overseers recorded about themselves
//! - [`ShutdownCoordinator`] stops overseers with escalating signals
//! - [`Supervisor`] ties these together into `start`, `stop`, `restart`,
//!   `status` and `launch`
//!
//! The operating system is reached only through [`ProcessTable`],
//! [`Spawner`] and [`Clock`]; `phd-platform` implements them for Unix.
//!
//! ## Iron Lotus Framework
//!
//! - **Jidoka**: explicit errors, no panics; per-target problems are reports
//! - **Poka-Yoke**: control directories and configuration checked before use
//! - **Heijunka**: every stop walks the same SIGINT → SIGTERM → SIGKILL ladder
//!
//! ## Example
//!
//! ```rust,ignore
//! use phd_core::{StopRequest, Supervisor, SupervisorConfig};
//!
//! let supervisor = Supervisor::builder(SupervisorConfig::default())
//!     .registry(registry)
//!     .process_table(processes)
//!     .spawner(spawner)
//!     .build()?;
//!
//! let report = supervisor.stop(&StopRequest::new(Duration::from_secs(15))).await?;
//! println!("{} survivors", report.survivors.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod directories;
pub mod error;
pub mod launch;
pub mod pidfile;
pub mod registry;
pub mod remote;
pub mod shutdown;
pub mod supervisor;
pub mod types;

pub use adapter::{Invocation, ProcessTable, SpawnOutput, Spawner};
pub use clock::{Clock, TokioClock};
pub use config::{OverseerConfig, SupervisorConfig};
pub use daemon::{Daemon, DaemonFactory};
pub use directories::ControlDirectories;
pub use error::{AmbiguityKind, Result, SupervisorError};
pub use launch::{DaemonSpec, LaunchConfig, LaunchOutcome, LaunchRequest, Launcher, RunAs};
pub use pidfile::{KnownDaemon, PidRecord};
pub use registry::{DaemonDescriptor, DaemonRegistry};
pub use remote::{LeaseStore, NoLeases, NoRemote, RemoteRecord, RemoteStatusSource};
pub use shutdown::{RogueReport, ShutdownCoordinator, StopPhase, StopReport, StopRequest};
pub use supervisor::{
    DaemonStatusEntry, LaunchFailure, Origin, RestartReport, StartOutcome, StartReport, Supervisor,
    SupervisorBuilder,
};
pub use types::{Pid, ProcessEntry, RogueProcess, Signal};
