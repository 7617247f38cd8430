//! Scheduled platform telemetry: periodic sampling of platform state into a
//! metric registry, exported to file, console and a remote collector.
//!
//! The host scheduler drives two entry points. [`TelemetryManager::setup`]
//! runs once per process: it probes the remote collector, wires the active
//! sink set, and builds the registry and domain instruments. The scheduler
//! then invokes [`TelemetryManager::run_once`] on a fixed interval (under a
//! distributed lock, so a single cluster node samples at a time — the lock
//! itself is the scheduler's concern, described by
//! [`TelemetryManager::definition`]).
//!
//! Telemetry never blocks the platform: a setup that ends with zero active
//! sinks still yields a working manager, and every sampling or export
//! failure terminates in a log line.

mod config;
mod manager;
mod sampler;
mod source;

pub use config::{ConfigError, TelemetryConfig};
pub use manager::{ManagerDefinition, ManagerError, ManagerState, SinkKind, TelemetryManager};
pub use sampler::TelemetrySampler;
pub use source::{
    ClusterInfo, ConnectorStats, PlatformSettings, PlatformSource, SourceError, SourceResult,
};
