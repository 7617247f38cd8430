use std::fmt;
use std::io::{stdout, Write};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MetricError, MetricResult};
use crate::metrics::data::{InstrumentKind, MetricsBatch, Temporality};
use crate::metrics::exporter::PushMetricExporter;

/// An exporter that writes human-readable batch summaries to standard
/// output. Intended for development use only.
///
/// Up-down counters are reported cumulatively so the printed value is the
/// current count rather than a delta, which is easier to read while
/// debugging; monotonic counters stay delta.
pub struct ConsoleMetricExporter {
    writer: Mutex<Option<Box<dyn Write + Send + Sync>>>,
}

impl ConsoleMetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> ConsoleMetricExporterBuilder {
        ConsoleMetricExporterBuilder::default()
    }
}

impl Default for ConsoleMetricExporter {
    fn default() -> Self {
        ConsoleMetricExporterBuilder::default().build()
    }
}

impl fmt::Debug for ConsoleMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConsoleMetricExporter")
    }
}

#[async_trait]
impl PushMetricExporter for ConsoleMetricExporter {
    async fn export(&self, batch: &MetricsBatch) -> MetricResult<()> {
        let mut guard = self.writer.lock()?;
        let writer = guard.as_mut().ok_or(MetricError::AlreadyShutdown)?;
        write_batch(writer.as_mut(), batch).map_err(|err| MetricError::Other(err.to_string()))
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        match kind {
            InstrumentKind::UpDownCounter => Temporality::Cumulative,
            InstrumentKind::Counter => Temporality::Delta,
        }
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.writer.lock()?.take();
        Ok(())
    }
}

fn write_batch(writer: &mut dyn Write, batch: &MetricsBatch) -> std::io::Result<()> {
    writeln!(writer, "Metrics Batch ({} points)", batch.len())?;
    if !batch.resource.is_empty() {
        writeln!(writer, "Resource")?;
        for attribute in batch.resource.iter() {
            writeln!(writer, "\t{}={}", attribute.key, attribute.value)?;
        }
    }
    writeln!(writer, "Points")?;
    for point in &batch.points {
        let kind = match point.kind {
            InstrumentKind::Counter => "counter",
            InstrumentKind::UpDownCounter => "up-down-counter",
        };
        let temporality = match point.temporality {
            Temporality::Delta => "delta",
            Temporality::Cumulative => "cumulative",
        };
        writeln!(
            writer,
            "\t{} ({kind}, {temporality}) value={}",
            point.name, point.value
        )?;
    }
    writer.flush()
}

/// Configuration for the console metrics exporter.
#[derive(Default)]
pub struct ConsoleMetricExporterBuilder {
    writer: Option<Box<dyn Write + Send + Sync>>,
}

impl ConsoleMetricExporterBuilder {
    /// Set the writer the exporter will write to instead of stdout.
    pub fn with_writer(mut self, writer: impl Write + Send + Sync + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create the exporter with the current configuration.
    pub fn build(self) -> ConsoleMetricExporter {
        ConsoleMetricExporter {
            writer: Mutex::new(Some(self.writer.unwrap_or_else(|| Box::new(stdout())))),
        }
    }
}

impl fmt::Debug for ConsoleMetricExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConsoleMetricExporterBuilder")
    }
}
