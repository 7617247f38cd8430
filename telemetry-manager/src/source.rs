//! Upstream data sources consumed by the sampler.
//!
//! Each lookup is a simple request/response against a platform collaborator
//! (settings store, cluster membership, session store, entity index). No
//! retry contract is imposed here: implementations return current best-known
//! values or fail outright, and the sampler treats every call as its own
//! failure domain.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by platform data sources.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SourceError {
    /// The backing store could not be reached or answered with an error.
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// The lookup did not complete in time.
    #[error("data source timed out after {0:?}")]
    Timeout(Duration),
}

/// A specialized `Result` for platform lookups.
pub type SourceResult<T> = Result<T, SourceError>;

/// Platform-wide settings relevant to telemetry.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    /// Stable unique id of this platform installation.
    pub instance_id: String,
    /// Platform release version.
    pub version: String,
    /// When this installation was created, RFC 3339.
    pub created_at: String,
    /// Whether an enterprise edition license is activated.
    pub enterprise_edition: bool,
}

/// Cluster membership information.
#[derive(Debug, Clone, Copy)]
pub struct ClusterInfo {
    /// Number of platform nodes currently in the cluster.
    pub instance_count: u64,
}

/// Connector population counts.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorStats {
    /// All registered connectors.
    pub total: u64,
    /// Connectors currently reporting as active.
    pub active: u64,
}

/// The platform state consumed by one sampler run.
pub trait PlatformSource: Send + Sync {
    /// Current platform settings.
    fn settings(&self) -> SourceResult<PlatformSettings>;

    /// Current cluster membership.
    fn cluster_info(&self) -> SourceResult<ClusterInfo>;

    /// Number of user sessions active within `window`.
    fn active_session_count(&self, window: Duration) -> SourceResult<u64>;

    /// Total number of users on the platform.
    fn user_count(&self) -> SourceResult<u64>;

    /// Total and active connector counts.
    fn connector_stats(&self) -> SourceResult<ConnectorStats>;
}
