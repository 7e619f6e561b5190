//! Per-resource aggregation state.

use std::sync::Arc;

use crate::{
    aggregator::{Aggregator as _, HistogramAggregator, SumAggregator},
    config::ConnectorSettings,
    data_model::{
        metrics::{self as model, Metric, ScopeMetrics},
        AttributeMap, InstrumentationScope,
    },
    key::SeriesKey,
};

/// Instrumentation scope name attached to every emitted metric.
pub const SCOPE_NAME: &str = "spanmetricsconnector";

/// Identity of a resource.
///
/// Derived from an order-independent hash of the resource attributes, or of only the configured key attributes. Two
/// resources whose attributes hash identically share aggregation state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResourceKey(u128);

impl ResourceKey {
    /// Computes the key for the given resource attributes.
    ///
    /// When `key_attributes` is empty, every attribute contributes to the key.
    pub fn from_attributes<S: AsRef<str>>(attributes: &AttributeMap, key_attributes: &[S]) -> Self {
        if key_attributes.is_empty() {
            Self(attributes.digest())
        } else {
            Self(attributes.digest_of(key_attributes))
        }
    }
}

/// Aggregation state for a single resource.
#[derive(Debug)]
pub struct ResourceMetrics {
    calls: SumAggregator,
    durations: Option<HistogramAggregator>,
    events: SumAggregator,
    attributes: Arc<AttributeMap>,
    start_time_unix_nano: u64,
}

impl ResourceMetrics {
    /// Creates empty aggregation state for a resource first seen at `start_time_unix_nano`.
    pub fn new(attributes: Arc<AttributeMap>, settings: &ConnectorSettings, start_time_unix_nano: u64) -> Self {
        Self {
            calls: SumAggregator::new(settings.exemplars),
            durations: settings
                .histogram
                .as_ref()
                .map(|layout| HistogramAggregator::new(layout.clone(), settings.exemplars)),
            events: SumAggregator::new(settings.exemplars),
            attributes,
            start_time_unix_nano,
        }
    }

    /// Returns the `calls` family.
    pub fn calls_mut(&mut self) -> &mut SumAggregator {
        &mut self.calls
    }

    /// Returns the `duration` family, if histograms are enabled.
    pub fn durations_mut(&mut self) -> Option<&mut HistogramAggregator> {
        self.durations.as_mut()
    }

    /// Returns the `events` family.
    pub fn events_mut(&mut self) -> &mut SumAggregator {
        &mut self.events
    }

    /// Removes the series for `key` from every family.
    pub fn remove_series(&mut self, key: &SeriesKey) {
        self.calls.remove(key);
        if let Some(durations) = self.durations.as_mut() {
            durations.remove(key);
        }
        self.events.remove(key);
    }

    /// Clears the exemplars of every series, keeping accumulated values.
    pub fn reset_exemplars(&mut self) {
        self.calls.reset(true);
        if let Some(durations) = self.durations.as_mut() {
            durations.reset(true);
        }
        self.events.reset(true);
    }

    /// Returns the total number of series across all families.
    pub fn series_count(&self) -> usize {
        self.calls.len() + self.durations.as_ref().map_or(0, |d| d.len()) + self.events.len()
    }

    /// Builds the metrics for this resource as of `time_unix_nano`.
    pub fn build(&self, settings: &ConnectorSettings, time_unix_nano: u64) -> model::ResourceMetrics {
        let start = self.start_time_unix_nano;
        let temporality = settings.temporality;

        let mut metrics = Vec::with_capacity(3);
        metrics.push(Metric {
            name: settings.names.calls.clone(),
            unit: None,
            data: self.calls.build_metric(start, time_unix_nano, temporality),
        });

        if let Some(durations) = &self.durations {
            metrics.push(Metric {
                name: settings.names.duration.clone(),
                unit: Some(settings.unit.as_str()),
                data: durations.build_metric(start, time_unix_nano, temporality),
            });
        }

        if settings.events_enabled {
            metrics.push(Metric {
                name: settings.names.events.clone(),
                unit: None,
                data: self.events.build_metric(start, time_unix_nano, temporality),
            });
        }

        model::ResourceMetrics {
            resource: Arc::clone(&self.attributes),
            scope_metrics: vec![ScopeMetrics {
                scope: InstrumentationScope {
                    name: SCOPE_NAME.to_string(),
                    version: String::new(),
                },
                metrics,
            }],
        }
    }
}
