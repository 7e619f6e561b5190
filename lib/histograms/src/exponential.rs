use std::f64::consts::LOG2_E;

/// Largest supported scale, and the scale a fresh histogram starts at.
pub const MAX_SCALE: i32 = 20;

/// Smallest supported scale.
///
/// At this scale, every finite, non-zero `f64` magnitude maps into one of three buckets (indices -2 through 0), so no
/// further downscaling is ever needed.
pub const MIN_SCALE: i32 = -10;

/// Default maximum number of buckets per sign.
pub const DEFAULT_MAX_SIZE: u32 = 160;

const MIN_MAX_SIZE: u32 = 2;

const SIGNIFICAND_WIDTH: u32 = 52;
const SIGNIFICAND_MASK: u64 = (1 << SIGNIFICAND_WIDTH) - 1;
const EXPONENT_MASK: u64 = 0x7ff;
const EXPONENT_BIAS: i32 = 1023;
const MIN_SUBNORMAL_EXPONENT: i32 = -1074;

/// A contiguous run of exponential bucket counts.
///
/// `counts[i]` holds the count for bucket index `offset + i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExponentialBuckets {
    offset: i32,
    counts: Vec<u64>,
}

impl ExponentialBuckets {
    /// Returns the bucket index of the first count.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Returns the bucket counts.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Returns `true` if no buckets are populated.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns the sum of all bucket counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn last_index(&self) -> i32 {
        self.offset + self.counts.len() as i32 - 1
    }

    fn range_including(&self, index: i32) -> (i32, i32) {
        if self.counts.is_empty() {
            (index, index)
        } else {
            (self.offset.min(index), self.last_index().max(index))
        }
    }

    fn increment(&mut self, index: i32, n: u64) {
        if self.counts.is_empty() {
            self.offset = index;
            self.counts.push(n);
            return;
        }

        if index < self.offset {
            let grow_by = (self.offset - index) as usize;
            self.counts.splice(0..0, std::iter::repeat(0).take(grow_by));
            self.offset = index;
        }

        let pos = (index - self.offset) as usize;
        if pos >= self.counts.len() {
            self.counts.resize(pos + 1, 0);
        }
        self.counts[pos] += n;
    }

    fn downscale(&mut self, change: u32) {
        if change == 0 || self.counts.is_empty() {
            return;
        }

        let new_offset = self.offset >> change;
        let new_len = ((self.last_index() >> change) - new_offset + 1) as usize;
        let mut counts = vec![0; new_len];
        for (i, count) in self.counts.iter().enumerate() {
            let index = (self.offset + i as i32) >> change;
            counts[(index - new_offset) as usize] += *count;
        }

        self.offset = new_offset;
        self.counts = counts;
    }

    fn clear(&mut self) {
        self.offset = 0;
        self.counts.clear();
    }
}

/// A base-2 exponential histogram.
///
/// Buckets are laid out so that, at scale `s`, bucket `i` covers the range `(base^i, base^(i+1)]` where
/// `base = 2^(2^-s)`. Positive and negative values are tracked in separate bucket runs that share one scale, and
/// exact zeroes are counted separately.
///
/// The histogram starts at [`MAX_SCALE`]. Whenever recording a value would require more than `max_size` buckets for
/// one sign, the histogram downscales (halving its resolution as many times as needed) and merges existing buckets
/// accordingly.
///
/// Downscaling stops at [`MIN_SCALE`], so `max_size` is best-effort there: with a `max_size` of 2, values spanning
/// nearly the entire `f64` range can still occupy three buckets. Span durations never get close to that.
///
/// Non-finite values are ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialHistogram {
    max_size: u32,
    scale: i32,
    zero_count: u64,
    positive: ExponentialBuckets,
    negative: ExponentialBuckets,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl ExponentialHistogram {
    /// Creates a new, empty `ExponentialHistogram` holding at most `max_size` buckets per sign.
    ///
    /// Values of `max_size` below 2 are raised to 2.
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size: max_size.max(MIN_MAX_SIZE),
            scale: MAX_SCALE,
            zero_count: 0,
            positive: ExponentialBuckets::default(),
            negative: ExponentialBuckets::default(),
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
        if n == 0 || !value.is_finite() {
            return;
        }

        self.count += n;
        self.sum += value * n as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if value == 0.0 {
            self.zero_count += n;
            return;
        }

        let positive = value > 0.0;
        let mut index = map_to_index(value.abs(), self.scale);

        let (low, high) = self.buckets(positive).range_including(index);
        let change = self.clamp_change(change_needed(low, high, self.max_size));
        if change > 0 {
            self.downscale(change);
            index >>= change;
        }

        self.buckets_mut(positive).increment(index, n);
    }

    /// Merges another histogram into this one.
    ///
    /// The result uses the coarser of the two scales, downscaled further if the combined bucket range would exceed
    /// this histogram's maximum size.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }

        if other.scale < self.scale {
            self.downscale((self.scale - other.scale) as u32);
        }
        let shift = (other.scale - self.scale) as u32;

        let change = combined_change(&self.positive, &other.positive, shift, self.max_size)
            .max(combined_change(&self.negative, &other.negative, shift, self.max_size));
        let change = self.clamp_change(change);
        self.downscale(change);
        let shift = shift + change;

        for (i, count) in other.positive.counts.iter().enumerate() {
            if *count > 0 {
                self.positive.increment((other.positive.offset + i as i32) >> shift, *count);
            }
        }
        for (i, count) in other.negative.counts.iter().enumerate() {
            if *count > 0 {
                self.negative.increment((other.negative.offset + i as i32) >> shift, *count);
            }
        }

        self.zero_count += other.zero_count;
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Clears all recorded values and returns to the maximum scale.
    pub fn reset(&mut self) {
        self.scale = MAX_SCALE;
        self.zero_count = 0;
        self.positive.clear();
        self.negative.clear();
        self.count = 0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    /// Returns the maximum number of buckets per sign.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Returns the current scale.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Returns the number of recorded values that were exactly zero.
    pub fn zero_count(&self) -> u64 {
        self.zero_count
    }

    /// Returns the buckets for positive values.
    pub fn positive(&self) -> &ExponentialBuckets {
        &self.positive
    }

    /// Returns the buckets for negative values, indexed by absolute value.
    pub fn negative(&self) -> &ExponentialBuckets {
        &self.negative
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

    fn buckets(&self, positive: bool) -> &ExponentialBuckets {
        if positive {
            &self.positive
        } else {
            &self.negative
        }
    }

    fn buckets_mut(&mut self, positive: bool) -> &mut ExponentialBuckets {
        if positive {
            &mut self.positive
        } else {
            &mut self.negative
        }
    }

    fn clamp_change(&self, change: u32) -> u32 {
        change.min((self.scale - MIN_SCALE) as u32)
    }

    fn downscale(&mut self, change: u32) {
        if change == 0 {
            return;
        }

        self.positive.downscale(change);
        self.negative.downscale(change);
        self.scale -= change as i32;
    }
}

impl Default for ExponentialHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

/// Returns how many times the scale must be halved so that `[low, high]` spans at most `max_size` buckets.
fn change_needed(mut low: i32, mut high: i32, max_size: u32) -> u32 {
    let mut change = 0;
    while i64::from(high) - i64::from(low) + 1 > i64::from(max_size) {
        low >>= 1;
        high >>= 1;
        change += 1;
    }
    change
}

fn combined_change(dst: &ExponentialBuckets, src: &ExponentialBuckets, shift: u32, max_size: u32) -> u32 {
    if src.is_empty() {
        return 0;
    }

    let src_low = src.offset >> shift;
    let src_high = src.last_index() >> shift;
    let (low, high) = if dst.is_empty() {
        (src_low, src_high)
    } else {
        (dst.offset.min(src_low), dst.last_index().max(src_high))
    };
    change_needed(low, high, max_size)
}

/// Maps a positive, finite, non-zero value to its bucket index at the given scale.
fn map_to_index(value: f64, scale: i32) -> i32 {
    let bits = value.to_bits();
    let raw_exponent = ((bits >> SIGNIFICAND_WIDTH) & EXPONENT_MASK) as i32;
    let significand = bits & SIGNIFICAND_MASK;

    let (exponent, exact_power_of_two) = if raw_exponent == 0 {
        // Subnormal: value is `significand * 2^-1074`.
        let exponent = (63 - significand.leading_zeros()) as i32 + MIN_SUBNORMAL_EXPONENT;
        (exponent, significand.is_power_of_two())
    } else {
        (raw_exponent - EXPONENT_BIAS, significand == 0)
    };

    if scale <= 0 {
        let exponent = if exact_power_of_two { exponent - 1 } else { exponent };
        return exponent >> -scale;
    }

    if exact_power_of_two {
        return (exponent << scale) - 1;
    }

    // Values strictly between 2^e and 2^(e+1) belong to buckets [e << scale, ((e + 1) << scale) - 1].
    let scale_factor = LOG2_E * f64::from(1u32 << scale);
    let index = (value.ln() * scale_factor).floor() as i32;
    index.clamp(exponent << scale, ((exponent + 1) << scale) - 1)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_is_counted_separately() {
        let mut hist = ExponentialHistogram::default();
        hist.observe(0.0);
        hist.observe(0.0);

        assert_eq!(hist.zero_count(), 2);
        assert_eq!(hist.count(), 2);
        assert!(hist.positive().is_empty());
        assert_eq!(hist.scale(), MAX_SCALE);
    }

    #[test]
    fn powers_of_two_are_upper_inclusive() {
        assert_eq!(map_to_index(1.0, 0), -1);
        assert_eq!(map_to_index(2.0, 0), 0);
        assert_eq!(map_to_index(3.0, 0), 1);
        assert_eq!(map_to_index(4.0, 0), 1);
        assert_eq!(map_to_index(4.0, -1), 0);
        assert_eq!(map_to_index(1.0, MAX_SCALE), -1);
        assert_eq!(map_to_index(2.0, MAX_SCALE), (1 << MAX_SCALE) - 1);
        assert_eq!(map_to_index(1.5, 1), 1);
        assert_eq!(map_to_index(3.0, 1), 3);
    }

    #[test]
    fn single_value_stays_at_max_scale() {
        let mut hist = ExponentialHistogram::default();
        hist.observe(1.0);

        assert_eq!(hist.scale(), MAX_SCALE);
        assert_eq!(hist.positive().offset(), -1);
        assert_eq!(hist.positive().counts(), &[1]);
        assert_eq!(hist.min(), Some(1.0));
        assert_eq!(hist.max(), Some(1.0));
    }

    #[test]
    fn wide_range_downscales_to_fit() {
        let mut hist = ExponentialHistogram::new(4);
        hist.observe(1.0);
        hist.observe(1000.0);

        assert!(hist.scale() < MAX_SCALE);
        assert!(hist.positive().counts().len() <= 4);
        assert_eq!(hist.positive().total(), 2);
        assert_eq!(hist.sum(), 1001.0);
    }

    #[test]
    fn negative_values_use_negative_buckets() {
        let mut hist = ExponentialHistogram::default();
        hist.observe(-3.0);
        hist.observe(3.0);

        assert_eq!(hist.positive().total(), 1);
        assert_eq!(hist.negative().total(), 1);
        assert_eq!(hist.positive().offset(), hist.negative().offset());
        assert_eq!(hist.min(), Some(-3.0));
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let mut hist = ExponentialHistogram::default();
        hist.observe(f64::NAN);
        hist.observe(f64::INFINITY);
        assert!(hist.is_empty());
    }

    #[test]
    fn merge_combines_at_coarser_scale() {
        let mut a = ExponentialHistogram::new(8);
        a.observe(1.0);
        a.observe(2.0);

        let mut b = ExponentialHistogram::new(8);
        b.observe(4.0);
        b.observe(1000.0);
        b.observe(0.0);

        a.merge(&b);
        assert_eq!(a.count(), 5);
        assert_eq!(a.zero_count(), 1);
        assert_eq!(a.positive().total(), 4);
        assert!(a.scale() <= b.scale());
        assert!(a.positive().counts().len() <= 8);
        assert_eq!(a.max(), Some(1000.0));
    }

    #[test]
    fn reset_restores_max_scale() {
        let mut hist = ExponentialHistogram::new(2);
        hist.observe(1.0);
        hist.observe(1e9);
        hist.reset();

        assert!(hist.is_empty());
        assert_eq!(hist.scale(), MAX_SCALE);
        assert!(hist.positive().is_empty());
        assert_eq!(hist.max_size(), 2);
    }

    #[test]
    fn extreme_values_stop_at_min_scale() {
        let mut hist = ExponentialHistogram::new(2);
        hist.observe(f64::MAX);
        hist.observe(f64::from_bits(1));

        assert_eq!(hist.scale(), MIN_SCALE);
        assert_eq!(hist.count(), 2);
        assert_eq!(hist.positive().total(), 2);
        assert!(hist.positive().counts().len() <= 3);
    }

    proptest! {
        #[test]
        fn bucket_totals_match_count(max_size in 2u32..32, values in proptest::collection::vec(1e-6f64..1e9, 1..64)) {
            let mut hist = ExponentialHistogram::new(max_size);
            for value in &values {
                hist.observe(*value);
            }

            prop_assert_eq!(hist.count(), values.len() as u64);
            prop_assert_eq!(hist.positive().total(), values.len() as u64);
            prop_assert!(hist.positive().counts().len() <= max_size as usize);

            // Allow one bucket of slack for rounding in the logarithm at positive scales.
            let low = hist.positive().offset() - 1;
            let high = hist.positive().offset() + hist.positive().counts().len() as i32;
            for value in &values {
                let index = map_to_index(*value, hist.scale());
                prop_assert!(index >= low && index <= high);
            }
        }

        #[test]
        fn downscaling_matches_direct_mapping(value in 1e-300f64..1e300, scale in -8i32..=0, change in 0u32..=2) {
            prop_assert_eq!(map_to_index(value, scale) >> change, map_to_index(value, scale - change as i32));
        }
    }
}
