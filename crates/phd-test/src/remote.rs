//! In-memory daemon registry and lease store.

use async_trait::async_trait;
use parking_lot::Mutex;
use phd_core::{LeaseStore, RemoteRecord, RemoteStatusSource, SupervisorError};

/// A daemon registry holding a fixed set of "alive" records.
#[derive(Debug, Default)]
pub struct StaticRemote {
    records: Vec<RemoteRecord>,
    fail: bool,
    queries: Mutex<Vec<Vec<String>>>,
}

impl StaticRemote {
    /// Creates a registry with these alive daemons.
    #[must_use]
    pub fn new(records: Vec<RemoteRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Creates a registry whose queries fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// The exclusion lists passed to each query.
    #[must_use]
    pub fn queries(&self) -> Vec<Vec<String>> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl RemoteStatusSource for StaticRemote {
    async fn find_alive_excluding(&self, local_ids: &[String]) -> phd_core::Result<Vec<RemoteRecord>> {
        self.queries.lock().push(local_ids.to_vec());
        if self.fail {
            return Err(SupervisorError::registry("daemon log unavailable"));
        }
        Ok(self
            .records
            .iter()
            .filter(|record| !local_ids.contains(&record.id))
            .cloned()
            .collect())
    }
}

/// A lease store holding a number of active leases.
#[derive(Debug, Default)]
pub struct CountingLeases {
    active: Mutex<u64>,
    calls: Mutex<u32>,
}

impl CountingLeases {
    /// Creates a store with `active` leases outstanding.
    #[must_use]
    pub fn new(active: u64) -> Self {
        Self {
            active: Mutex::new(active),
            calls: Mutex::new(0),
        }
    }

    /// Leases still active.
    #[must_use]
    pub fn active(&self) -> u64 {
        *self.active.lock()
    }

    /// Number of bulk expiries requested.
    #[must_use]
    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl LeaseStore for CountingLeases {
    async fn expire_all_active_leases(&self) -> phd_core::Result<u64> {
        *self.calls.lock() += 1;
        Ok(std::mem::take(&mut *self.active.lock()))
    }
}
