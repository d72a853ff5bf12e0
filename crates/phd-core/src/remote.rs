//! External collaborators: the daemon-log registry and the task-lease store.
//!
//! Both are shared between every supervisor talking to the same database,
//! so they see daemons this host's PID directory does not.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Pid;

/// A daemon the registry believes is alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Registry identifier of the daemon.
    pub id: String,
    /// Process ID, when the registry knows it.
    #[serde(default)]
    pub pid: Option<Pid>,
    /// Host the daemon reported from.
    #[serde(default)]
    pub host: Option<String>,
    /// Daemon implementation name.
    #[serde(default)]
    pub class: Option<String>,
}

impl RemoteRecord {
    /// Creates a record with only an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pid: None,
            host: None,
            class: None,
        }
    }

    /// Sets the process ID.
    #[must_use]
    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Sets the reporting host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the daemon class.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
}

/// Query interface over the daemon-log registry.
#[async_trait]
pub trait RemoteStatusSource: Send + Sync {
    /// Returns daemons with status "alive" whose id is not in `local_ids`.
    ///
    /// # Errors
    /// Returns [`crate::SupervisorError::Registry`] if the registry cannot be queried.
    async fn find_alive_excluding(&self, local_ids: &[String]) -> Result<Vec<RemoteRecord>>;
}

/// Registry for hosts without a shared daemon log: knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

#[async_trait]
impl RemoteStatusSource for NoRemote {
    async fn find_alive_excluding(&self, _local_ids: &[String]) -> Result<Vec<RemoteRecord>> {
        Ok(Vec::new())
    }
}

/// Background task queue leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Expires every active lease in one bulk update, returning how many changed.
    ///
    /// Idempotent: a second call with no new leases returns zero.
    ///
    /// # Errors
    /// Returns [`crate::SupervisorError::Registry`] if the store cannot be updated.
    async fn expire_all_active_leases(&self) -> Result<u64>;
}

/// Lease store for hosts without a task queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLeases;

#[async_trait]
impl LeaseStore for NoLeases {
    async fn expire_all_active_leases(&self) -> Result<u64> {
        Ok(0)
    }
}
