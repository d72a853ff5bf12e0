//! Daemon implementation contract.
//!
//! # Toyota Way: Standardized Work (標準作業)
//! Every daemon an overseer can host follows the same contract, so the
//! registry can hand out implementations without knowing their types.

use async_trait::async_trait;

use crate::error::Result;

/// A long-running worker implementation hosted by an overseer.
///
/// # Example
///
/// ```rust,ignore
/// use phd_core::{Daemon, Result};
/// use async_trait::async_trait;
///
/// struct GarbageCollector;
///
/// #[async_trait]
/// impl Daemon for GarbageCollector {
///     fn name(&self) -> &str { "GarbageCollectorDaemon" }
///
///     async fn run(&mut self, argv: &[String]) -> Result<()> {
///         // Collect garbage until told to stop...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Daemon: Send + 'static {
    /// Returns the registered name of this daemon.
    fn name(&self) -> &str;

    /// Runs the daemon with its command-line arguments.
    ///
    /// # Errors
    /// Returns an error if the daemon encounters a fatal error.
    async fn run(&mut self, argv: &[String]) -> Result<()>;
}

/// Constructor for a registered daemon.
pub type DaemonFactory = std::sync::Arc<dyn Fn() -> Box<dyn Daemon> + Send + Sync>;
