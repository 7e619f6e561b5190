use std::sync::Arc;

use spanmetrics_common::collections::FastIndexMap;

use super::{Aggregator, ExemplarConfig, Exemplars};
use crate::{
    data_model::{
        metrics::{MetricData, NumberDataPoint, Sum},
        AttributeMap, SpanId, Temporality, TraceId,
    },
    key::SeriesKey,
};

/// A monotonic counter series.
#[derive(Debug)]
pub struct SumSeries {
    attributes: Arc<AttributeMap>,
    count: u64,
    exemplars: Exemplars,
}

impl SumSeries {
    fn new(attributes: Arc<AttributeMap>, exemplars: ExemplarConfig) -> Self {
        Self {
            attributes,
            count: 0,
            exemplars: Exemplars::new(exemplars),
        }
    }

    /// Adds `delta` to the counter.
    pub fn add(&mut self, delta: u64) {
        self.count = self.count.saturating_add(delta);
    }

    /// Records an exemplar.
    pub fn add_exemplar(&mut self, trace_id: TraceId, span_id: SpanId, value: f64, time_unix_nano: u64) {
        self.exemplars.record(trace_id, span_id, value, time_unix_nano);
    }

    /// Returns the current count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the collected exemplars.
    pub fn exemplars(&self) -> &Exemplars {
        &self.exemplars
    }
}

/// Aggregates monotonic counters. Used for both `calls` and `events`.
#[derive(Debug)]
pub struct SumAggregator {
    series: FastIndexMap<SeriesKey, SumSeries>,
    exemplars: ExemplarConfig,
}

impl SumAggregator {
    /// Creates an empty `SumAggregator`.
    pub fn new(exemplars: ExemplarConfig) -> Self {
        Self {
            series: FastIndexMap::default(),
            exemplars,
        }
    }

    /// Returns the series for `key`, if it exists.
    pub fn get(&self, key: &SeriesKey) -> Option<&SumSeries> {
        self.series.get(key)
    }
}

impl Aggregator for SumAggregator {
    type Series = SumSeries;

    fn get_or_create(&mut self, key: &SeriesKey, attributes: &Arc<AttributeMap>) -> &mut SumSeries {
        let exemplars = self.exemplars;
        self.series
            .entry(key.clone())
            .or_insert_with(|| SumSeries::new(Arc::clone(attributes), exemplars))
    }

    fn remove(&mut self, key: &SeriesKey) -> bool {
        self.series.swap_remove(key).is_some()
    }

    fn reset(&mut self, exemplars_only: bool) {
        if exemplars_only {
            self.series.values_mut().for_each(|series| series.exemplars.clear());
        } else {
            self.series.clear();
        }
    }

    fn build_metric(&self, start_time_unix_nano: u64, time_unix_nano: u64, temporality: Temporality) -> MetricData {
        let data_points = self
            .series
            .values()
            .map(|series| NumberDataPoint {
                attributes: Arc::clone(&series.attributes),
                start_time_unix_nano,
                time_unix_nano,
                value: series.count,
                exemplars: series.exemplars.as_slice().to_vec(),
            })
            .collect();

        MetricData::Sum(Sum {
            aggregation_temporality: temporality,
            is_monotonic: true,
            data_points,
        })
    }

    fn len(&self) -> usize {
        self.series.len()
    }
}
