use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{MetricError, MetricResult};
use crate::metrics::data::{InstrumentKind, MetricsBatch, Temporality};
use crate::metrics::exporter::PushMetricExporter;

/// An exporter that stores finished batches in memory.
///
/// Useful for testing and debugging the pipeline. Batches are retrieved with
/// [get_finished_batches]; failure and slow-export behavior can be injected
/// to exercise the reader's guards.
///
/// [get_finished_batches]: InMemoryMetricExporter::get_finished_batches
#[derive(Clone)]
pub struct InMemoryMetricExporter {
    batches: Arc<Mutex<VecDeque<MetricsBatch>>>,
    temporality: Temporality,
    export_delay: Option<Duration>,
    fail_exports: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    is_shutdown: Arc<AtomicBool>,
}

impl Default for InMemoryMetricExporter {
    fn default() -> Self {
        InMemoryMetricExporterBuilder::new().build()
    }
}

impl fmt::Debug for InMemoryMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporter").finish()
    }
}

impl InMemoryMetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> InMemoryMetricExporterBuilder {
        InMemoryMetricExporterBuilder::new()
    }

    /// All batches exported so far, in export order.
    pub fn get_finished_batches(&self) -> MetricResult<Vec<MetricsBatch>> {
        Ok(self.batches.lock()?.iter().cloned().collect())
    }

    /// Make subsequent exports fail (or succeed again).
    pub fn set_fail_exports(&self, fail: bool) {
        self.fail_exports.store(fail, Ordering::Relaxed);
    }

    /// Number of exports currently executing.
    pub fn active_exports(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// The largest number of exports ever observed executing at once.
    pub fn max_concurrent_exports(&self) -> usize {
        self.max_active.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PushMetricExporter for InMemoryMetricExporter {
    async fn export(&self, batch: &MetricsBatch) -> MetricResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.export_delay {
            std::thread::sleep(delay);
        }

        let result = if self.fail_exports.load(Ordering::Relaxed) {
            Err(MetricError::Other("simulated export failure".into()))
        } else {
            self.batches.lock().map(|mut batches| {
                batches.push_back(batch.clone());
            })?;
            Ok(())
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        self.temporality
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.is_shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Builder for [InMemoryMetricExporter].
#[derive(Debug, Default)]
pub struct InMemoryMetricExporterBuilder {
    temporality: Option<Temporality>,
    export_delay: Option<Duration>,
}

impl InMemoryMetricExporterBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the temporality reported for every instrument kind.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = Some(temporality);
        self
    }

    /// Make every export take at least `delay`, to simulate a slow sink.
    pub fn with_export_delay(mut self, delay: Duration) -> Self {
        self.export_delay = Some(delay);
        self
    }

    /// Create the exporter with the current configuration.
    pub fn build(self) -> InMemoryMetricExporter {
        InMemoryMetricExporter {
            batches: Arc::new(Mutex::new(VecDeque::new())),
            temporality: self.temporality.unwrap_or(Temporality::Delta),
            export_delay: self.export_delay,
            fail_exports: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}
