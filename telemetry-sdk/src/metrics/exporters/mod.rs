//! Built-in destinations for metric batches.

mod file;
mod memory;
mod stdout;
mod transform;

pub use file::FileMetricExporter;
pub use memory::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};
pub use stdout::{ConsoleMetricExporter, ConsoleMetricExporterBuilder};
