//! Schedule policy - computes when a job fires next
//!
//! - Interval: now + interval
//! - Time of day: today's target, tomorrow's target once today's has passed,
//!   or a short catch-up fire when the last run is older than a day

use chrono::{DateTime, Days, NaiveDateTime, TimeDelta, TimeZone};
use std::time::Duration;
use tracing::debug;

use super::job::constants::{MAX_INTERVAL_SECS, STALE_RUN_WINDOW, TIME_OF_DAY_CATCH_UP_DELAY};
use crate::domain::JobSchedule;

/// Next fire time for `schedule`, evaluated in `now`'s time zone
pub fn next_run_at<Tz: TimeZone>(
    schedule: &JobSchedule,
    now: DateTime<Tz>,
    last_run: Option<DateTime<Tz>>,
) -> DateTime<Tz> {
    match schedule {
        JobSchedule::Interval { seconds } => now + seconds_delta(*seconds),
        JobSchedule::TimeOfDay { at } => {
            if is_stale(&now, last_run.as_ref()) {
                debug!(
                    last_run = ?last_run.as_ref().map(|t| t.naive_local()),
                    "Last run older than a day, scheduling catch-up"
                );
                return now + catch_up_delta();
            }

            let today = now.date_naive().and_time(*at);
            match resolve_local(&now.timezone(), today) {
                Some(target) if target > now => target,
                _ => {
                    let tomorrow = today
                        .checked_add_days(Days::new(1))
                        .and_then(|naive| resolve_local(&now.timezone(), naive));
                    match tomorrow {
                        Some(target) => target,
                        None => now + catch_up_delta(),
                    }
                }
            }
        }
    }
}

/// How long to sleep from `now` until `next` (zero if already due)
pub fn delay_until<Tz: TimeZone>(next: &DateTime<Tz>, now: &DateTime<Tz>) -> Duration {
    next.clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

fn is_stale<Tz: TimeZone>(now: &DateTime<Tz>, last_run: Option<&DateTime<Tz>>) -> bool {
    match last_run {
        None => true,
        Some(last) => {
            let window = TimeDelta::from_std(STALE_RUN_WINDOW).unwrap_or(TimeDelta::days(1));
            now.clone().signed_duration_since(last.clone()) > window
        }
    }
}

/// Map a local wall-clock time into the zone. A time skipped by a DST gap
/// is shifted one hour forward.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        naive
            .checked_add_signed(TimeDelta::hours(1))
            .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
    })
}

fn seconds_delta(seconds: u64) -> TimeDelta {
    TimeDelta::seconds(seconds.min(MAX_INTERVAL_SECS) as i64)
}

fn catch_up_delta() -> TimeDelta {
    TimeDelta::from_std(TIME_OF_DAY_CATCH_UP_DELAY).unwrap_or(TimeDelta::seconds(10))
}
