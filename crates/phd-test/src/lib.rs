// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # phd-test
//!
//! Testing infrastructure for the phd supervisor.
//!
//! - **Virtual time**: [`ManualClock`] turns grace periods into instant sleeps
//! - **Scripted processes**: [`FakeProcessTable`] decides who dies on which signal
//! - **Scripted launches**: [`ScriptedSpawner`] replays launcher exits and records payloads
//! - **Shared state**: [`StaticRemote`] and [`CountingLeases`]
//! - **Harness**: [`SupervisorTestHarness`] wires all of them to temporary directories
//!
//! ## Iron Lotus Framework
//!
//! - **Built-in Quality** (品質の作り込み): Quality cannot be inspected in
//! - **Popperian Falsification**: Tests designed to refute claims
//!
//! ## Example
//!
//! ```rust,ignore
//! use phd_test::SupervisorTestHarness;
//!
//! let harness = SupervisorTestHarness::new()?;
//! harness.dirs.write_overseer("daemon.1", 100, &[])?;
//! harness.processes.spawn(100).exit_after(100, Signal::Int, Duration::from_secs(1));
//!
//! let report = harness.supervisor.stop(&StopRequest::new(Duration::from_secs(15))).await?;
//! assert!(report.survivors.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod fixture;
pub mod harness;
pub mod process;
pub mod remote;
pub mod spawner;

pub use clock::ManualClock;
pub use fixture::{NoopDaemon, PidDirFixture, STANDARD_DAEMONS, standard_registry};
pub use harness::{SupervisorTestHarness, SupervisorTestHarnessBuilder};
pub use process::{FakeProcessTable, SentSignal};
pub use remote::{CountingLeases, StaticRemote};
pub use spawner::{Scripted, ScriptedSpawner, SpawnMode, SpawnRecord};
