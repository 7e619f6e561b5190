use serde::{Deserialize, Serialize};

use super::{AttributeMap, SpanId, TraceId};

/// A batch of spans, grouped by the resource that produced them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Traces {
    /// Spans grouped by resource.
    pub resource_spans: Vec<ResourceSpans>,
}

impl Traces {
    /// Returns the total number of spans in the batch.
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum()
    }
}

/// Spans produced by a single resource.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceSpans {
    /// The producing resource.
    pub resource: Resource,

    /// Spans grouped by instrumentation scope.
    pub scope_spans: Vec<ScopeSpans>,
}

/// An entity producing telemetry, such as a service instance.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Resource {
    /// Resource attributes.
    pub attributes: AttributeMap,
}

/// Spans produced by a single instrumentation scope.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScopeSpans {
    /// The instrumentation scope.
    pub scope: InstrumentationScope,

    /// Spans.
    pub spans: Vec<Span>,
}

/// The library or component that produced a group of spans or metrics.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstrumentationScope {
    /// Scope name.
    pub name: String,

    /// Scope version.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// A single operation within a trace.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Span {
    /// Trace identifier.
    pub trace_id: TraceId,

    /// Span identifier.
    pub span_id: SpanId,

    /// Operation name.
    pub name: String,

    /// Span kind.
    pub kind: SpanKind,

    /// Start time, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// End time, in nanoseconds since the Unix epoch.
    pub end_time_unix_nano: u64,

    /// Span attributes.
    pub attributes: AttributeMap,

    /// Timestamped events recorded during the span.
    pub events: Vec<SpanEvent>,

    /// Span status.
    pub status: Status,
}

/// A timestamped event recorded during a span.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpanEvent {
    /// Event name.
    pub name: String,

    /// Event time, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Event attributes.
    pub attributes: AttributeMap,
}

/// Span status.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Status {
    /// Status code.
    pub code: StatusCode,

    /// Status message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// The role of a span within a trace.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum SpanKind {
    /// Unspecified.
    #[default]
    #[serde(rename = "SPAN_KIND_UNSPECIFIED")]
    Unspecified,

    /// An internal operation.
    #[serde(rename = "SPAN_KIND_INTERNAL")]
    Internal,

    /// Server-side handling of a remote request.
    #[serde(rename = "SPAN_KIND_SERVER")]
    Server,

    /// A request to a remote service.
    #[serde(rename = "SPAN_KIND_CLIENT")]
    Client,

    /// The sender of an asynchronous message.
    #[serde(rename = "SPAN_KIND_PRODUCER")]
    Producer,

    /// The receiver of an asynchronous message.
    #[serde(rename = "SPAN_KIND_CONSUMER")]
    Consumer,
}

impl SpanKind {
    /// Returns the canonical string form, such as `SPAN_KIND_SERVER`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "SPAN_KIND_UNSPECIFIED",
            Self::Internal => "SPAN_KIND_INTERNAL",
            Self::Server => "SPAN_KIND_SERVER",
            Self::Client => "SPAN_KIND_CLIENT",
            Self::Producer => "SPAN_KIND_PRODUCER",
            Self::Consumer => "SPAN_KIND_CONSUMER",
        }
    }
}

/// The outcome of a span.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum StatusCode {
    /// Unset.
    #[default]
    #[serde(rename = "STATUS_CODE_UNSET")]
    Unset,

    /// Completed successfully.
    #[serde(rename = "STATUS_CODE_OK")]
    Ok,

    /// Completed with an error.
    #[serde(rename = "STATUS_CODE_ERROR")]
    Error,
}

impl StatusCode {
    /// Returns the canonical string form, such as `STATUS_CODE_OK`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "STATUS_CODE_UNSET",
            Self::Ok => "STATUS_CODE_OK",
            Self::Error => "STATUS_CODE_ERROR",
        }
    }
}
