use std::sync::Arc;

use histograms::{ExplicitBucketHistogram, ExponentialHistogram};
use spanmetrics_common::collections::FastIndexMap;

use super::{Aggregator, ExemplarConfig, Exemplars};
use crate::{
    data_model::{
        metrics::{
            ExponentialBuckets as ExponentialBucketsData, ExponentialHistogram as ExponentialHistogramData,
            ExponentialHistogramDataPoint, Histogram, HistogramDataPoint, MetricData,
        },
        AttributeMap, SpanId, Temporality, TraceId,
    },
    key::SeriesKey,
};

/// Bucket layout shared by every series of a duration histogram.
#[derive(Clone, Debug, PartialEq)]
pub enum HistogramLayout {
    /// Fixed, ascending bucket upper bounds.
    Explicit {
        /// Bucket upper bounds, in the configured duration unit.
        bounds: Arc<[f64]>,
    },

    /// Base-2 exponential buckets with automatic scale.
    Exponential {
        /// Maximum number of buckets per sign.
        max_size: u32,
    },
}

#[derive(Debug)]
enum HistogramState {
    Explicit(ExplicitBucketHistogram),
    Exponential(ExponentialHistogram),
}

/// A duration histogram series.
#[derive(Debug)]
pub struct HistogramSeries {
    attributes: Arc<AttributeMap>,
    state: HistogramState,
    exemplars: Exemplars,
}

impl HistogramSeries {
    fn new(attributes: Arc<AttributeMap>, layout: &HistogramLayout, exemplars: ExemplarConfig) -> Self {
        let state = match layout {
            HistogramLayout::Explicit { bounds } => {
                HistogramState::Explicit(ExplicitBucketHistogram::new(Arc::clone(bounds)))
            }
            HistogramLayout::Exponential { max_size } => {
                HistogramState::Exponential(ExponentialHistogram::new(*max_size))
            }
        };

        Self {
            attributes,
            state,
            exemplars: Exemplars::new(exemplars),
        }
    }

    /// Records a single value.
    pub fn observe(&mut self, value: f64) {
        match &mut self.state {
            HistogramState::Explicit(histogram) => histogram.observe(value),
            HistogramState::Exponential(histogram) => histogram.observe(value),
        }
    }

    /// Records an exemplar.
    pub fn add_exemplar(&mut self, trace_id: TraceId, span_id: SpanId, value: f64, time_unix_nano: u64) {
        self.exemplars.record(trace_id, span_id, value, time_unix_nano);
    }

    /// Returns the number of recorded values.
    pub fn count(&self) -> u64 {
        match &self.state {
            HistogramState::Explicit(histogram) => histogram.count(),
            HistogramState::Exponential(histogram) => histogram.count(),
        }
    }

    /// Returns the sum of recorded values.
    pub fn sum(&self) -> f64 {
        match &self.state {
            HistogramState::Explicit(histogram) => histogram.sum(),
            HistogramState::Exponential(histogram) => histogram.sum(),
        }
    }

    /// Returns the collected exemplars.
    pub fn exemplars(&self) -> &Exemplars {
        &self.exemplars
    }

    fn explicit_data_point(&self, start_time_unix_nano: u64, time_unix_nano: u64) -> Option<HistogramDataPoint> {
        let HistogramState::Explicit(histogram) = &self.state else {
            return None;
        };

        Some(HistogramDataPoint {
            attributes: Arc::clone(&self.attributes),
            start_time_unix_nano,
            time_unix_nano,
            count: histogram.count(),
            sum: histogram.sum(),
            min: histogram.min(),
            max: histogram.max(),
            bucket_counts: histogram.bucket_counts().to_vec(),
            explicit_bounds: histogram.bounds().to_vec(),
            exemplars: self.exemplars.as_slice().to_vec(),
        })
    }

    fn exponential_data_point(
        &self, start_time_unix_nano: u64, time_unix_nano: u64,
    ) -> Option<ExponentialHistogramDataPoint> {
        let HistogramState::Exponential(histogram) = &self.state else {
            return None;
        };

        Some(ExponentialHistogramDataPoint {
            attributes: Arc::clone(&self.attributes),
            start_time_unix_nano,
            time_unix_nano,
            count: histogram.count(),
            sum: histogram.sum(),
            scale: histogram.scale(),
            zero_count: histogram.zero_count(),
            positive: to_buckets(histogram.positive()),
            negative: to_buckets(histogram.negative()),
            min: histogram.min(),
            max: histogram.max(),
            exemplars: self.exemplars.as_slice().to_vec(),
        })
    }
}

fn to_buckets(buckets: &histograms::ExponentialBuckets) -> ExponentialBucketsData {
    ExponentialBucketsData {
        offset: buckets.offset(),
        bucket_counts: buckets.counts().to_vec(),
    }
}

/// Aggregates span durations into histograms.
#[derive(Debug)]
pub struct HistogramAggregator {
    layout: HistogramLayout,
    series: FastIndexMap<SeriesKey, HistogramSeries>,
    exemplars: ExemplarConfig,
}

impl HistogramAggregator {
    /// Creates an empty `HistogramAggregator`.
    pub fn new(layout: HistogramLayout, exemplars: ExemplarConfig) -> Self {
        Self {
            layout,
            series: FastIndexMap::default(),
            exemplars,
        }
    }

    /// Returns the series for `key`, if it exists.
    pub fn get(&self, key: &SeriesKey) -> Option<&HistogramSeries> {
        self.series.get(key)
    }
}

impl Aggregator for HistogramAggregator {
    type Series = HistogramSeries;

    fn get_or_create(&mut self, key: &SeriesKey, attributes: &Arc<AttributeMap>) -> &mut HistogramSeries {
        let Self {
            layout,
            series,
            exemplars,
        } = self;
        series
            .entry(key.clone())
            .or_insert_with(|| HistogramSeries::new(Arc::clone(attributes), layout, *exemplars))
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
        match self.layout {
            HistogramLayout::Explicit { .. } => MetricData::Histogram(Histogram {
                aggregation_temporality: temporality,
                data_points: self
                    .series
                    .values()
                    .filter_map(|series| series.explicit_data_point(start_time_unix_nano, time_unix_nano))
                    .collect(),
            }),
            HistogramLayout::Exponential { .. } => MetricData::ExponentialHistogram(ExponentialHistogramData {
                aggregation_temporality: temporality,
                data_points: self
                    .series
                    .values()
                    .filter_map(|series| series.exponential_data_point(start_time_unix_nano, time_unix_nano))
                    .collect(),
            }),
        }
    }

    fn len(&self) -> usize {
        self.series.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit_layout() -> HistogramLayout {
        HistogramLayout::Explicit {
            bounds: Arc::from(&[10.0, 50.0, 100.0][..]),
        }
    }

    #[test]
    fn explicit_series_build_histogram() {
        let mut aggregator = HistogramAggregator::new(explicit_layout(), ExemplarConfig::default());
        let attrs = Arc::new(AttributeMap::from_iter([("service.name", "checkout")]));
        let key = SeriesKey::from("checkout");

        for value in [10.0, 20.0, 30.0] {
            aggregator.get_or_create(&key, &attrs).observe(value);
        }

        let series = aggregator.get(&key).unwrap();
        assert_eq!(series.count(), 3);
        assert_eq!(series.sum(), 60.0);

        let MetricData::Histogram(histogram) = aggregator.build_metric(1, 2, Temporality::Cumulative) else {
            panic!("expected an explicit histogram");
        };
        let point = &histogram.data_points[0];
        assert_eq!(point.count, 3);
        assert_eq!(point.sum, 60.0);
        assert_eq!(point.bucket_counts, vec![1, 2, 0, 0]);
        assert_eq!(point.explicit_bounds, vec![10.0, 50.0, 100.0]);
        assert_eq!(point.min, Some(10.0));
        assert_eq!(point.max, Some(30.0));
    }

    #[test]
    fn exponential_series_build_exponential_histogram() {
        let mut aggregator = HistogramAggregator::new(
            HistogramLayout::Exponential { max_size: 160 },
            ExemplarConfig::default(),
        );
        let attrs = Arc::new(AttributeMap::new());
        let key = SeriesKey::from("a");

        aggregator.get_or_create(&key, &attrs).observe(0.0);
        aggregator.get_or_create(&key, &attrs).observe(4.0);
        aggregator.get_or_create(&key, &attrs).observe(1000.0);

        let MetricData::ExponentialHistogram(histogram) = aggregator.build_metric(1, 2, Temporality::Delta) else {
            panic!("expected an exponential histogram");
        };
        let point = &histogram.data_points[0];
        assert_eq!(point.count, 3);
        assert_eq!(point.zero_count, 1);
        assert_eq!(point.sum, 1004.0);
        assert_eq!(point.positive.bucket_counts.iter().sum::<u64>(), 2);
        assert!(point.negative.bucket_counts.is_empty());
        assert!(point.positive.bucket_counts.len() <= 160);
    }

    #[test]
    fn reset_exemplars_only_keeps_counts() {
        let mut aggregator = HistogramAggregator::new(
            explicit_layout(),
            ExemplarConfig {
                enabled: true,
                max_per_data_point: None,
            },
        );
        let attrs = Arc::new(AttributeMap::new());
        let key = SeriesKey::from("a");
        let series = aggregator.get_or_create(&key, &attrs);
        series.observe(5.0);
        series.add_exemplar(TraceId::from_bytes([3; 16]), SpanId::from_bytes([4; 8]), 5.0, 100);
        assert_eq!(aggregator.get(&key).unwrap().exemplars().len(), 1);

        aggregator.reset(true);
        let series = aggregator.get(&key).unwrap();
        assert_eq!(series.count(), 1);
        assert!(series.exemplars().is_empty());

        aggregator.reset(false);
        assert!(aggregator.is_empty());
    }
}
