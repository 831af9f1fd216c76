// Scheduling constants (no magic values)
use std::time::Duration;

/// Delay used for a time-of-day job whose last run is older than
/// `STALE_RUN_WINDOW` (or that never ran)
pub const TIME_OF_DAY_CATCH_UP_DELAY: Duration = Duration::from_secs(10);

/// A time-of-day job whose last run is older than this catches up early
pub const STALE_RUN_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay before an out-of-band fire requested through `Job::run_async`
pub const RUN_ASYNC_DELAY: Duration = Duration::from_millis(50);

/// Longest interval accepted before clamping (10 years)
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Poll period of the manager's drain loop during `stop`
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Registry name of the built-in in-process lock provider
pub const DEFAULT_LOCK_PROVIDER: &str = "memory";

/// Result text recorded when the job lock is held elsewhere
pub const LOCK_NOT_ACQUIRED_RESULT: &str = "Could not acquire a job lock.";

/// Result text for a successful run that reported nothing
pub const DEFAULT_COMPLETED_RESULT: &str = "Completed";
