//! Span metrics.
//!
//! This crate turns spans into request count (`calls`), latency (`duration`), and span event (`events`) metrics,
//! aggregated per resource and per unique combination of configured dimensions.

#![deny(missing_docs)]

pub mod aggregator;
pub mod config;
mod connector;
mod consumer;
pub mod data_model;
pub mod dimensions;
pub mod key;
pub mod resource;
mod telemetry;

pub use self::config::{ConnectorSettings, SpanMetricsConfiguration, ValidationError};
pub use self::connector::{Capabilities, SpanMetricsConnector};
pub use self::consumer::MetricsConsumer;
