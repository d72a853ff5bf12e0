//! phd: Local Daemon Supervisor
//!
//! Launches overseer processes, tracks them through PID files and stops
//! them with an escalating SIGINT, SIGTERM, SIGKILL sequence.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use phd::prelude::*;
//!
//! # async fn run(registry: DaemonRegistry) -> phd::core::Result<()> {
//! let supervisor = unix_supervisor(SupervisorConfig::default())
//!     .registry(registry)
//!     .build()?;
//! let outcome = supervisor.start(false).await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub use phd_core as core;
pub use phd_platform as platform;

/// Prelude module for common imports.
pub mod prelude {
    pub use phd_core::{
        Daemon, DaemonRegistry, LaunchOutcome, LaunchRequest, Signal, StartOutcome, StopReport,
        StopRequest, Supervisor, SupervisorConfig, SupervisorError,
    };
    pub use phd_platform::{CommandSpawner, UnixProcessTable, unix_supervisor};
}
