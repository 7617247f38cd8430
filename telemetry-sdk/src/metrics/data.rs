//! Types for delivery of sampled metric time series data.

use std::borrow::Cow;
use std::time::SystemTime;

use crate::resource::Resource;

/// Defines the window that an exported value was calculated over.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Temporality {
    /// Each exported value is the change since the last export.
    Delta,

    /// Each exported value is the running total since process start.
    Cumulative,
}

/// The kind of measurement an instrument records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// A monotonic counter. The value only ever increases.
    Counter,

    /// A counter whose value can increase or decrease, representing a
    /// current count snapshot (e.g. "active connectors").
    UpDownCounter,
}

/// A consistent read of one instrument, taken by a collection tick.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSnapshot {
    /// The instrument name.
    pub name: Cow<'static, str>,
    /// The instrument kind.
    pub kind: InstrumentKind,
    /// The cumulative value at the time of the snapshot.
    pub value: i64,
    /// When the instrument was created.
    pub start_time: SystemTime,
}

/// A single immutable data point produced by a collection tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    /// Name of the instrument that produced this point.
    pub name: Cow<'static, str>,
    /// The instrument kind.
    pub kind: InstrumentKind,
    /// The point value, interpreted per `temporality`.
    pub value: i64,
    /// When the instrument's time series started.
    pub start_time: SystemTime,
    /// When this point was recorded.
    pub time: SystemTime,
    /// Whether `value` is a delta or a running total.
    pub temporality: Temporality,
}

/// A batch of points together with the [Resource] that produced them.
///
/// This is what a sink receives on every export tick.
#[derive(Debug, Clone)]
pub struct MetricsBatch {
    /// The entity that produced the points.
    pub resource: Resource,
    /// The collected points, at most one per instrument.
    pub points: Vec<MetricPoint>,
}

impl MetricsBatch {
    /// Number of points in the batch.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the batch carries no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
