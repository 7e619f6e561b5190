//! Time-related functions.

use std::time::SystemTime;

/// Get the current Unix timestamp, in nanoseconds.
///
/// Saturates at `u64::MAX`, and returns zero if the system clock reports a time before the Unix epoch.
pub fn get_unix_timestamp_nanos() -> u64 {
    let since_unix_epoch = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(since_unix_epoch.as_nanos()).unwrap_or(u64::MAX)
}
