//! Per-resource series aggregation.

use std::sync::Arc;

use crate::{
    data_model::{metrics::MetricData, AttributeMap, Temporality},
    key::SeriesKey,
};

mod exemplar;
pub use self::exemplar::{ExemplarConfig, Exemplars};

mod histogram;
pub use self::histogram::{HistogramAggregator, HistogramLayout, HistogramSeries};

mod sum;
pub use self::sum::{SumAggregator, SumSeries};

/// A keyed family of series that can be exported as a single metric.
///
/// Implementations are used for the `calls` and `events` sums and for the `duration` histogram.
pub trait Aggregator {
    /// The series type.
    type Series;

    /// Returns the series for `key`, creating it with `attributes` if it does not yet exist.
    ///
    /// Attributes are only used on creation: an existing series keeps the attributes it was created with.
    fn get_or_create(&mut self, key: &SeriesKey, attributes: &Arc<AttributeMap>) -> &mut Self::Series;

    /// Removes the series for `key`, returning `true` if it existed.
    fn remove(&mut self, key: &SeriesKey) -> bool;

    /// Resets the aggregator.
    ///
    /// When `exemplars_only` is `true`, every series keeps its accumulated value and only its exemplars are cleared.
    /// Otherwise, all series are removed.
    fn reset(&mut self, exemplars_only: bool);

    /// Builds the data points of every series.
    fn build_metric(&self, start_time_unix_nano: u64, time_unix_nano: u64, temporality: Temporality) -> MetricData;

    /// Returns the number of series.
    fn len(&self) -> usize;

    /// Returns `true` if there are no series.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
