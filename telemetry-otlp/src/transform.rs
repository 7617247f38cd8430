//! OTLP-JSON wire form of a metric batch.
//!
//! Field names and encodings follow the OTLP/HTTP JSON mapping: camelCase
//! keys, numeric temporality codes, 64-bit integers carried as strings.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use telemetry_sdk::metrics::{InstrumentKind, MetricPoint, MetricsBatch, Temporality};
use telemetry_sdk::Value;

const AGGREGATION_TEMPORALITY_DELTA: u8 = 1;
const AGGREGATION_TEMPORALITY_CUMULATIVE: u8 = 2;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportMetricsServiceRequest {
    resource_metrics: Vec<ResourceMetrics>,
}

impl From<&MetricsBatch> for ExportMetricsServiceRequest {
    fn from(batch: &MetricsBatch) -> Self {
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: ResourceJson {
                    attributes: batch
                        .resource
                        .iter()
                        .map(|kv| KeyValueJson {
                            key: kv.key.to_string(),
                            value: AnyValueJson::from(&kv.value),
                        })
                        .collect(),
                },
                scope_metrics: vec![ScopeMetrics {
                    scope: ScopeJson {
                        name: env!("CARGO_PKG_NAME"),
                        version: env!("CARGO_PKG_VERSION"),
                    },
                    metrics: batch.points.iter().map(Metric::from).collect(),
                }],
            }],
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResourceMetrics {
    resource: ResourceJson,
    scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Serialize, Debug)]
struct ResourceJson {
    attributes: Vec<KeyValueJson>,
}

#[derive(Serialize, Debug)]
struct KeyValueJson {
    key: String,
    value: AnyValueJson,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
enum AnyValueJson {
    StringValue(String),
    BoolValue(bool),
    // 64-bit integers are strings in OTLP JSON
    IntValue(String),
    DoubleValue(f64),
}

impl From<&Value> for AnyValueJson {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(v) => AnyValueJson::StringValue(v.to_string()),
            Value::Bool(v) => AnyValueJson::BoolValue(*v),
            Value::I64(v) => AnyValueJson::IntValue(v.to_string()),
            Value::F64(v) => AnyValueJson::DoubleValue(*v),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ScopeMetrics {
    scope: ScopeJson,
    metrics: Vec<Metric>,
}

#[derive(Serialize, Debug)]
struct ScopeJson {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize, Debug)]
struct Metric {
    name: String,
    sum: Sum,
}

impl From<&MetricPoint> for Metric {
    fn from(point: &MetricPoint) -> Self {
        Metric {
            name: point.name.to_string(),
            sum: Sum {
                data_points: vec![NumberDataPoint {
                    start_time_unix_nano: unix_nanos(point.start_time),
                    time_unix_nano: unix_nanos(point.time),
                    as_int: point.value.to_string(),
                }],
                aggregation_temporality: match point.temporality {
                    Temporality::Delta => AGGREGATION_TEMPORALITY_DELTA,
                    Temporality::Cumulative => AGGREGATION_TEMPORALITY_CUMULATIVE,
                },
                is_monotonic: matches!(point.kind, InstrumentKind::Counter),
            },
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Sum {
    data_points: Vec<NumberDataPoint>,
    aggregation_temporality: u8,
    is_monotonic: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct NumberDataPoint {
    start_time_unix_nano: String,
    time_unix_nano: String,
    as_int: String,
}

fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .to_string()
}
