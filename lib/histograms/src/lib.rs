//! Histogram data structures for aggregating latency distributions.
//!
//! Two interchangeable representations are provided:
//!
//! - [`ExplicitBucketHistogram`]: fixed, caller-supplied upper bounds.
//! - [`ExponentialHistogram`]: base-2 exponential buckets that rescale automatically to stay within a maximum bucket
//!   count.
//!
//! Both expose the same `observe`/`merge`/`reset` lifecycle and report count, sum, min and max alongside their
//! bucket layout.
#![deny(missing_docs)]

mod explicit;
pub use self::explicit::{ExplicitBucketHistogram, MergeError};

mod exponential;
pub use self::exponential::{ExponentialBuckets, ExponentialHistogram, DEFAULT_MAX_SIZE, MAX_SCALE, MIN_SCALE};
