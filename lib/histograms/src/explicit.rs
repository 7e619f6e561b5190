use std::sync::Arc;

use snafu::{ensure, Snafu};

/// Errors that can occur when merging histograms.
#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum MergeError {
    /// The two histograms use different bucket bounds.
    #[snafu(display(
        "Bucket bounds mismatch: expected {} bounds, got {} (or bounds differ in value).",
        expected,
        actual
    ))]
    BoundsMismatch {
        /// Number of bounds in the destination histogram.
        expected: usize,
        /// Number of bounds in the source histogram.
        actual: usize,
    },
}

/// A histogram with fixed, explicit bucket bounds.
///
/// Given `N` bounds sorted in ascending order, the histogram holds `N + 1` buckets. Bucket `i` counts values `v` where
/// `bounds[i - 1] < v <= bounds[i]`, with the first bucket open below and the last bucket open above.
///
/// Bounds are shared behind an `Arc`, as every series of the same family uses the same layout.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplicitBucketHistogram {
    bounds: Arc<[f64]>,
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl ExplicitBucketHistogram {
    /// Creates a new, empty `ExplicitBucketHistogram` with the given upper bounds.
    ///
    /// Bounds are expected to be sorted in ascending order.
    pub fn new(bounds: Arc<[f64]>) -> Self {
        let bucket_counts = vec![0; bounds.len() + 1];
        Self {
            bounds,
            bucket_counts,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Records a single value.
    pub fn observe(&mut self, value: f64) {
        self.observe_n(value, 1);
    }

    /// Records a value `n` times.
    pub fn observe_n(&mut self, value: f64, n: u64) {
        if n == 0 {
            return;
        }

        let index = self.bounds.partition_point(|bound| *bound < value);
        self.bucket_counts[index] += n;
        self.count += n;
        self.sum += value * n as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Merges another histogram into this one.
    ///
    /// # Errors
    ///
    /// If the bucket bounds of both histograms differ, an error is returned and this histogram is left unchanged.
    pub fn merge(&mut self, other: &Self) -> Result<(), MergeError> {
        ensure!(
            self.bounds == other.bounds,
            BoundsMismatch {
                expected: self.bounds.len(),
                actual: other.bounds.len(),
            }
        );

        for (dst, src) in self.bucket_counts.iter_mut().zip(other.bucket_counts.iter()) {
            *dst += *src;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        Ok(())
    }

    /// Clears all recorded values, keeping the bucket bounds.
    pub fn reset(&mut self) {
        self.bucket_counts.iter_mut().for_each(|count| *count = 0);
        self.count = 0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    /// Returns the upper bounds of the buckets.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Returns the per-bucket counts, one more than the number of bounds.
    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }

    /// Returns the number of recorded values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `true` if no values have been recorded.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the sum of recorded values.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the smallest recorded value, if any.
    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    /// Returns the largest recorded value, if any.
    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }
}
