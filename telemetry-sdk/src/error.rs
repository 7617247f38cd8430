use std::sync::PoisonError;

use thiserror::Error;

/// Errors produced by the metric pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// Invalid pipeline configuration, detected at build time.
    #[error("Config error: {0}")]
    Config(String),

    /// The component was asked to do work after shutdown.
    #[error("the metric pipeline component is already shut down")]
    AlreadyShutdown,

    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}

/// A specialized `Result` for metric pipeline operations.
pub type MetricResult<T> = Result<T, MetricError>;
