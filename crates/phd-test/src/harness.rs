//! Supervisor test harness.
//!
//! # Toyota Way: Built-in Quality (品質の作り込み)
//! Quality cannot be inspected in; it must be built in.

use std::sync::Arc;

use phd_core::{DaemonRegistry, RemoteRecord, Supervisor, SupervisorConfig};

use crate::clock::ManualClock;
use crate::fixture::{PidDirFixture, standard_registry};
use crate::process::FakeProcessTable;
use crate::remote::{CountingLeases, StaticRemote};
use crate::spawner::ScriptedSpawner;

/// A [`Supervisor`] wired to scripted doubles and temporary directories.
pub struct SupervisorTestHarness {
    /// Control directories.
    pub dirs: PidDirFixture,
    /// Virtual time.
    pub clock: Arc<ManualClock>,
    /// Process table.
    pub processes: Arc<FakeProcessTable>,
    /// Spawner.
    pub spawner: Arc<ScriptedSpawner>,
    /// Daemon registry.
    pub remote: Arc<StaticRemote>,
    /// Lease store.
    pub leases: Arc<CountingLeases>,
    /// The supervisor under test.
    pub supervisor: Supervisor,
}

impl SupervisorTestHarness {
    /// Creates a new test harness builder.
    #[must_use]
    pub fn builder() -> SupervisorTestHarnessBuilder {
        SupervisorTestHarnessBuilder::default()
    }

    /// Creates a harness with default settings.
    ///
    /// # Errors
    /// Returns an error if the temporary directories cannot be created.
    pub fn new() -> phd_core::Result<Self> {
        Self::builder().build()
    }
}

/// Builder for [`SupervisorTestHarness`].
pub struct SupervisorTestHarnessBuilder {
    current_user: String,
    remote: Vec<RemoteRecord>,
    active_leases: u64,
    registry: DaemonRegistry,
    configure: Option<Box<dyn FnOnce(&mut SupervisorConfig)>>,
}

impl Default for SupervisorTestHarnessBuilder {
    fn default() -> Self {
        Self {
            current_user: "operator".to_string(),
            remote: Vec::new(),
            active_leases: 0,
            registry: standard_registry(),
            configure: None,
        }
    }
}

impl SupervisorTestHarnessBuilder {
    /// Sets the effective user reported by the spawner.
    #[must_use]
    pub fn with_current_user(mut self, user: impl Into<String>) -> Self {
        self.current_user = user.into();
        self
    }

    /// Sets the daemons the shared registry reports alive.
    #[must_use]
    pub fn with_remote(mut self, records: Vec<RemoteRecord>) -> Self {
        self.remote = records;
        self
    }

    /// Sets the number of outstanding task leases.
    #[must_use]
    pub const fn with_active_leases(mut self, leases: u64) -> Self {
        self.active_leases = leases;
        self
    }

    /// Replaces the daemon registry.
    #[must_use]
    pub fn with_registry(mut self, registry: DaemonRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adjusts the configuration after the directories are filled in.
    #[must_use]
    pub fn with_config(mut self, configure: impl FnOnce(&mut SupervisorConfig) + 'static) -> Self {
        self.configure = Some(Box::new(configure));
        self
    }

    /// Builds the harness.
    ///
    /// # Errors
    /// Returns an error if the temporary directories cannot be created or the
    /// configuration is invalid.
    pub fn build(self) -> phd_core::Result<SupervisorTestHarness> {
        let dirs = PidDirFixture::new()?;
        let mut config = dirs.config();
        if let Some(configure) = self.configure {
            configure(&mut config);
        }

        let clock = Arc::new(ManualClock::new());
        let processes = Arc::new(FakeProcessTable::new(Arc::clone(&clock)));
        let spawner = Arc::new(ScriptedSpawner::new(self.current_user));
        let remote = Arc::new(StaticRemote::new(self.remote));
        let leases = Arc::new(CountingLeases::new(self.active_leases));

        let supervisor = Supervisor::builder(config)
            .registry(self.registry)
            .process_table(processes.clone())
            .spawner(spawner.clone())
            .remote(remote.clone())
            .leases(leases.clone())
            .clock(clock.clone())
            .build()?;

        Ok(SupervisorTestHarness {
            dirs,
            clock,
            processes,
            spawner,
            remote,
            leases,
            supervisor,
        })
    }
}
