//! Interface for delivering metric batches to a destination.

use async_trait::async_trait;

use super::data::{InstrumentKind, MetricsBatch, Temporality};
use crate::error::MetricResult;

/// A destination capability: accepts a batch of points and delivers it
/// somewhere (local file, console, remote collector).
///
/// Exporters are stateless between exports apart from buffering inside an
/// open file handle or HTTP client. All errors returned by [export] are
/// considered unrecoverable by the pipeline: the reader logs them and moves
/// on to the next scheduled tick. No retry logic is implemented on top.
///
/// [export]: PushMetricExporter::export
#[async_trait]
pub trait PushMetricExporter: Send + Sync + 'static {
    /// Serialize and transmit a batch of points to the destination.
    async fn export(&self, batch: &MetricsBatch) -> MetricResult<()>;

    /// The temporality this destination wants for the given instrument kind.
    ///
    /// Counters default to [Temporality::Delta]; a destination may override
    /// per kind (the console forces up-down counters to cumulative for
    /// readability).
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        let _ = kind;
        Temporality::Delta
    }

    /// Release any held resources. Exports after shutdown fail.
    fn shutdown(&self) -> MetricResult<()> {
        Ok(())
    }
}
