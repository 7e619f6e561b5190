//! Output metrics model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AttributeMap, InstrumentationScope, SpanId, TraceId};

/// Aggregation temporality of a metric.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum Temporality {
    /// Each data point covers the time since the series started.
    #[default]
    #[serde(rename = "AGGREGATION_TEMPORALITY_CUMULATIVE", alias = "cumulative")]
    Cumulative,

    /// Each data point covers the time since the previous export.
    #[serde(rename = "AGGREGATION_TEMPORALITY_DELTA", alias = "delta")]
    Delta,
}

/// A batch of metrics, grouped by resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Metrics grouped by resource.
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl Metrics {
    /// Returns `true` if the batch holds no resources.
    pub fn is_empty(&self) -> bool {
        self.resource_metrics.is_empty()
    }

    /// Returns the total number of data points in the batch.
    pub fn data_point_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .map(|m| m.data.data_point_count())
            .sum()
    }
}

/// Metrics produced for a single resource.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    /// Resource attributes.
    pub resource: Arc<AttributeMap>,

    /// Metrics grouped by instrumentation scope.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// Metrics produced by a single instrumentation scope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopeMetrics {
    /// The instrumentation scope.
    pub scope: InstrumentationScope,

    /// Metrics.
    pub metrics: Vec<Metric>,
}

/// A named metric and its data points.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metric {
    /// Metric name.
    pub name: String,

    /// Unit of the metric's values, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,

    /// Data points.
    #[serde(flatten)]
    pub data: MetricData,
}

/// The data points of a metric.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    /// Monotonic integer sums.
    Sum(Sum),

    /// Explicit-bucket histograms.
    Histogram(Histogram),

    /// Base-2 exponential histograms.
    ExponentialHistogram(ExponentialHistogram),
}

impl MetricData {
    /// Returns the number of data points.
    pub fn data_point_count(&self) -> usize {
        match self {
            Self::Sum(sum) => sum.data_points.len(),
            Self::Histogram(histogram) => histogram.data_points.len(),
            Self::ExponentialHistogram(histogram) => histogram.data_points.len(),
        }
    }
}

/// A sum metric.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    /// Aggregation temporality.
    pub aggregation_temporality: Temporality,

    /// Whether the sum only ever increases.
    pub is_monotonic: bool,

    /// Data points.
    pub data_points: Vec<NumberDataPoint>,
}

/// An integer data point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDataPoint {
    /// Series attributes.
    pub attributes: Arc<AttributeMap>,

    /// Start of the covered time range, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the data point, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Value.
    pub value: u64,

    /// Exemplars.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<Exemplar>,
}

/// An explicit-bucket histogram metric.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    /// Aggregation temporality.
    pub aggregation_temporality: Temporality,

    /// Data points.
    pub data_points: Vec<HistogramDataPoint>,
}

/// An explicit-bucket histogram data point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramDataPoint {
    /// Series attributes.
    pub attributes: Arc<AttributeMap>,

    /// Start of the covered time range, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the data point, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Number of recorded values.
    pub count: u64,

    /// Sum of recorded values.
    pub sum: f64,

    /// Smallest recorded value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Largest recorded value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Per-bucket counts, one more than the number of bounds.
    pub bucket_counts: Vec<u64>,

    /// Bucket upper bounds.
    pub explicit_bounds: Vec<f64>,

    /// Exemplars.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<Exemplar>,
}

/// A base-2 exponential histogram metric.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExponentialHistogram {
    /// Aggregation temporality.
    pub aggregation_temporality: Temporality,

    /// Data points.
    pub data_points: Vec<ExponentialHistogramDataPoint>,
}

/// A base-2 exponential histogram data point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExponentialHistogramDataPoint {
    /// Series attributes.
    pub attributes: Arc<AttributeMap>,

    /// Start of the covered time range, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the data point, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Number of recorded values.
    pub count: u64,

    /// Sum of recorded values.
    pub sum: f64,

    /// Bucket resolution.
    pub scale: i32,

    /// Number of recorded values that were exactly zero.
    pub zero_count: u64,

    /// Buckets for positive values.
    pub positive: ExponentialBuckets,

    /// Buckets for negative values.
    pub negative: ExponentialBuckets,

    /// Smallest recorded value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Largest recorded value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Exemplars.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<Exemplar>,
}

/// A contiguous run of exponential histogram buckets.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExponentialBuckets {
    /// Bucket index of the first count.
    pub offset: i32,

    /// Bucket counts.
    pub bucket_counts: Vec<u64>,
}

/// A sample measurement linked to the trace that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exemplar {
    /// Trace identifier of the sampled span.
    pub trace_id: TraceId,

    /// Span identifier of the sampled span.
    pub span_id: SpanId,

    /// Measured value.
    pub value: f64,

    /// Time the exemplar was recorded, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,
}
