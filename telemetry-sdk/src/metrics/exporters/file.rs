use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::transform::BatchRecord;
use crate::error::{MetricError, MetricResult};
use crate::metrics::data::MetricsBatch;
use crate::metrics::exporter::PushMetricExporter;

/// An exporter that appends newline-delimited JSON batch records to a local
/// file.
///
/// The handle is opened once at construction, append-only; the file is never
/// truncated by this component. Delta temporality for every instrument kind.
pub struct FileMetricExporter {
    file: Mutex<Option<File>>,
    path: PathBuf,
}

impl FileMetricExporter {
    /// Open (or create) the metrics file at `path` for appending.
    pub fn new(path: impl AsRef<Path>) -> MetricResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                MetricError::Other(format!("cannot open metrics file {}: {err}", path.display()))
            })?;
        Ok(FileMetricExporter {
            file: Mutex::new(Some(file)),
            path,
        })
    }

    /// The file this exporter appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMetricExporter")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl PushMetricExporter for FileMetricExporter {
    async fn export(&self, batch: &MetricsBatch) -> MetricResult<()> {
        let mut guard = self.file.lock()?;
        let file = guard.as_mut().ok_or(MetricError::AlreadyShutdown)?;
        serde_json::to_writer(&mut *file, &BatchRecord::from(batch))
            .map_err(|err| MetricError::Other(err.to_string()))?;
        file.write_all(b"\n")
            .map_err(|err| MetricError::Other(err.to_string()))
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.file.lock()?.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{InstrumentKind, MetricPoint, Temporality};
    use crate::Resource;
    use std::time::SystemTime;

    fn batch(value: i64) -> MetricsBatch {
        MetricsBatch {
            resource: Resource::builder().with_service_name("test").build(),
            points: vec![MetricPoint {
                name: "events".into(),
                kind: InstrumentKind::Counter,
                value,
                start_time: SystemTime::now(),
                time: SystemTime::now(),
                temporality: Temporality::Delta,
            }],
        }
    }

    #[test]
    fn appends_one_json_line_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.ndjson");

        let exporter = FileMetricExporter::new(&path).unwrap();
        futures_executor::block_on(exporter.export(&batch(1))).unwrap();
        futures_executor::block_on(exporter.export(&batch(2))).unwrap();
        exporter.shutdown().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(record["points"][0]["name"], "events");
        assert_eq!(record["points"][0]["value"], 2);
        assert_eq!(record["points"][0]["temporality"], "delta");
        assert_eq!(record["resource"][0]["key"], "service.name");
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.ndjson");

        let first = FileMetricExporter::new(&path).unwrap();
        futures_executor::block_on(first.export(&batch(1))).unwrap();
        first.shutdown().unwrap();

        let second = FileMetricExporter::new(&path).unwrap();
        futures_executor::block_on(second.export(&batch(2))).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn export_after_shutdown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileMetricExporter::new(dir.path().join("m.ndjson")).unwrap();
        exporter.shutdown().unwrap();
        let result = futures_executor::block_on(exporter.export(&batch(1)));
        assert!(matches!(result, Err(MetricError::AlreadyShutdown)));
    }
}
