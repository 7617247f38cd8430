//! Serializable wire form of a metric batch for the file destination.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::common::Value;
use crate::metrics::data::{InstrumentKind, MetricPoint, MetricsBatch, Temporality};

/// One newline-delimited record: the resource plus every point of a batch.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchRecord {
    resource: Vec<AttributeRecord>,
    points: Vec<PointRecord>,
}

impl From<&MetricsBatch> for BatchRecord {
    fn from(batch: &MetricsBatch) -> Self {
        BatchRecord {
            resource: batch
                .resource
                .iter()
                .map(|kv| AttributeRecord {
                    key: kv.key.to_string(),
                    value: (&kv.value).into(),
                })
                .collect(),
            points: batch.points.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug)]
struct AttributeRecord {
    key: String,
    value: ValueRecord,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum ValueRecord {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl From<&Value> for ValueRecord {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(v) => ValueRecord::Bool(*v),
            Value::I64(v) => ValueRecord::I64(*v),
            Value::F64(v) => ValueRecord::F64(*v),
            Value::String(v) => ValueRecord::String(v.to_string()),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PointRecord {
    name: String,
    kind: &'static str,
    value: i64,
    temporality: &'static str,
    // nanosecond timestamps exceed the safe JSON integer range, so they
    // travel as strings
    start_time_unix_nano: String,
    time_unix_nano: String,
}

impl From<&MetricPoint> for PointRecord {
    fn from(point: &MetricPoint) -> Self {
        PointRecord {
            name: point.name.to_string(),
            kind: match point.kind {
                InstrumentKind::Counter => "counter",
                InstrumentKind::UpDownCounter => "upDownCounter",
            },
            value: point.value,
            temporality: match point.temporality {
                Temporality::Delta => "delta",
                Temporality::Cumulative => "cumulative",
            },
            start_time_unix_nano: unix_nanos(point.start_time),
            time_unix_nano: unix_nanos(point.time),
        }
    }
}

pub(crate) fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .to_string()
}
