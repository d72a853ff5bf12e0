// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # phd-platform
//!
//! Unix implementations of the `phd-core` OS seams:
//!
//! - [`UnixProcessTable`]: `kill(2)` signals and liveness checks, process
//!   scans from `/proc` (or `ps` where there is no procfs)
//! - [`CommandSpawner`]: overseer launches through `tokio::process`, with
//!   the effective user looked up in the user database
//!
//! ## Iron Lotus Framework
//!
//! - **Genchi Genbutsu**: liveness observed from the kernel, not PID files
//! - **Poka-Yoke**: PIDs that would address a process group are refused
//!
//! ## Example
//!
//! ```rust,ignore
//! use phd_platform::unix_supervisor;
//!
//! let supervisor = unix_supervisor(config).registry(registry).build()?;
//! supervisor.start(false).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use phd_core::{SupervisorBuilder, SupervisorConfig};

pub mod error;
pub mod process;
pub mod spawn;

pub use error::{PlatformError, Result};
pub use process::UnixProcessTable;
pub use spawn::CommandSpawner;

/// A supervisor builder wired to this host's process table and spawner.
#[must_use]
pub fn unix_supervisor(config: SupervisorConfig) -> SupervisorBuilder {
    SupervisorBuilder::new(config)
        .process_table(Arc::new(UnixProcessTable::new()))
        .spawner(Arc::new(CommandSpawner::new()))
}
