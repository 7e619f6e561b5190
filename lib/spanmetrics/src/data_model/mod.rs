//! Trace input and metric output types.
//!
//! These follow the shape of the OpenTelemetry data model closely enough to be decoded from, and encoded to, JSON
//! that resembles the OTLP JSON encoding.

mod common;
pub use self::common::{AttributeMap, AttributeValue, IdParseError, SpanId, TraceId};

pub mod metrics;
pub use self::metrics::Temporality;

mod traces;
pub use self::traces::{
    InstrumentationScope, Resource, ResourceSpans, ScopeSpans, Span, SpanEvent, SpanKind, Status, StatusCode, Traces,
};
