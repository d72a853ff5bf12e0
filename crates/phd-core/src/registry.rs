//! Daemon registry: maps symbolic names to daemon implementations.
//!
//! Implementations are registered explicitly, one call per daemon. Lookup is a
//! case-insensitive substring match with an exact-match short circuit, so
//! `phd launch garbage` finds `GarbageCollectorDaemon`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::daemon::{Daemon, DaemonFactory};
use crate::error::{AmbiguityKind, Result, SupervisorError};

/// A resolved daemon implementation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DaemonDescriptor(String);

impl DaemonDescriptor {
    /// Returns the daemon name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DaemonDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of daemon implementations available on this host.
#[derive(Clone, Default)]
pub struct DaemonRegistry {
    factories: BTreeMap<String, DaemonFactory>,
}

impl fmt::Debug for DaemonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonRegistry")
            .field("daemons", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DaemonRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a daemon implementation under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Daemon> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Daemon> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Returns every registered daemon name, sorted.
    #[must_use]
    pub fn list_available(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Resolves a substring to exactly one daemon.
    ///
    /// A candidate equal to `substring` (ignoring case) wins outright;
    /// otherwise exactly one candidate must contain it.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Ambiguity`] when nothing or more than one
    /// daemon matches.
    pub fn resolve(&self, substring: &str) -> Result<DaemonDescriptor> {
        let needle = substring.to_lowercase();
        let mut matches = Vec::new();

        for name in self.factories.keys() {
            let lower = name.to_lowercase();
            if !lower.contains(&needle) {
                continue;
            }
            if lower == needle {
                return Ok(DaemonDescriptor(name.clone()));
            }
            matches.push(name.clone());
        }

        match matches.len() {
            0 => Err(SupervisorError::Ambiguity {
                substring: substring.to_string(),
                kind: AmbiguityKind::NotFound,
                candidates: vec![],
            }),
            1 => Ok(DaemonDescriptor(matches.remove(0))),
            _ => Err(SupervisorError::Ambiguity {
                substring: substring.to_string(),
                kind: AmbiguityKind::Multiple,
                candidates: matches,
            }),
        }
    }

    /// Constructs the daemon behind a resolved descriptor.
    ///
    /// # Errors
    /// Returns an error if the descriptor came from another registry.
    pub fn instantiate(&self, descriptor: &DaemonDescriptor) -> Result<Box<dyn Daemon>> {
        self.factories
            .get(descriptor.name())
            .map(|factory| factory())
            .ok_or_else(|| SupervisorError::Ambiguity {
                substring: descriptor.name().to_string(),
                kind: AmbiguityKind::NotFound,
                candidates: vec![],
            })
    }
}
