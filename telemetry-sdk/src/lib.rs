//! Batch metric collection and export pipeline.
//!
//! This crate implements the measurement side of platform telemetry: a
//! process-wide [`MeterRegistry`] of named instruments that business code
//! updates, and one [`BatchExportingReader`] per destination that samples the
//! registry on a *collect* cadence and ships the accumulated points on an
//! independent *export* cadence.
//!
//! Telemetry is best effort by design. A destination that cannot be reached
//! loses points; nothing in this crate retries, alerts, or surfaces an error
//! to an interactive caller.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use telemetry_sdk::metrics::exporters::FileMetricExporter;
//! use telemetry_sdk::metrics::{MeterRegistry, ReaderBuilder};
//! use telemetry_sdk::Resource;
//!
//! # fn main() -> Result<(), telemetry_sdk::MetricError> {
//! let exporter = FileMetricExporter::new("/var/log/platform/metrics.ndjson")?;
//! let reader = ReaderBuilder::new(exporter)
//!     .with_collect_interval(Duration::from_secs(60))
//!     .with_export_interval(Duration::from_secs(300))
//!     .build()?;
//!
//! let registry = MeterRegistry::builder()
//!     .with_resource(Resource::builder().with_service_name("platform").build())
//!     .with_reader(reader)
//!     .build();
//! registry.start();
//!
//! let active_users = registry.up_down_counter("platform.users.active");
//! active_users.set(17);
//!
//! registry.shutdown();
//! # Ok(())
//! # }
//! ```

mod common;
mod error;
mod resource;

pub mod metrics;

pub use common::{KeyValue, Value};
pub use error::{MetricError, MetricResult};
pub use resource::{
    Resource, ResourceBuilder, SERVICE_INSTANCE_ID, SERVICE_NAME, SERVICE_VERSION,
};
