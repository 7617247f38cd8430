//! OTLP-over-HTTP export for the platform metric pipeline.
//!
//! Provides [`OtlpMetricExporter`], a push exporter that POSTs OTLP-JSON
//! metric batches to a collector endpoint, and [`probe_connectivity`], the
//! best-effort reachability check a manager runs once at setup before wiring
//! the remote sink in.

mod probe;
mod transform;

pub use probe::probe_connectivity;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use telemetry_sdk::metrics::exporter::PushMetricExporter;
use telemetry_sdk::metrics::MetricsBatch;
use telemetry_sdk::{MetricError, MetricResult};

use crate::transform::ExportMetricsServiceRequest;

const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while building an [OtlpMetricExporter].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExporterBuildError {
    /// No collector endpoint was provided.
    #[error("no collector endpoint configured")]
    MissingEndpoint,

    /// The underlying HTTP client could not be constructed.
    #[error("cannot build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A push exporter that delivers metric batches to an OTLP collector over
/// HTTP.
///
/// The HTTP client is created once and lives for the process lifetime.
/// Delta temporality for every instrument kind. All delivery is
/// at-most-once: a failed POST is reported to the reader, which logs it and
/// moves on.
pub struct OtlpMetricExporter {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl OtlpMetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> OtlpExporterBuilder {
        OtlpExporterBuilder::default()
    }

    /// The collector endpoint batches are POSTed to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for OtlpMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpMetricExporter")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl PushMetricExporter for OtlpMetricExporter {
    async fn export(&self, batch: &MetricsBatch) -> MetricResult<()> {
        let body = ExportMetricsServiceRequest::from(batch);
        debug!(endpoint = %self.endpoint, points = batch.len(), "posting metrics batch");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|err| MetricError::Other(format!("otlp export failed: {err}")))?;
        if !response.status().is_success() {
            return Err(MetricError::Other(format!(
                "collector rejected batch with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Configuration for the OTLP HTTP exporter.
#[derive(Debug, Default)]
pub struct OtlpExporterBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl OtlpExporterBuilder {
    /// Set the collector URL, e.g. `https://collector.example/v1/metrics`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-request timeout. Defaults to 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = Some(timeout);
        }
        self
    }

    /// Build the exporter with the current configuration.
    pub fn build(self) -> Result<OtlpMetricExporter, ExporterBuildError> {
        let endpoint = self.endpoint.ok_or(ExporterBuildError::MissingEndpoint)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_EXPORT_TIMEOUT))
            .build()?;
        Ok(OtlpMetricExporter { client, endpoint })
    }
}
