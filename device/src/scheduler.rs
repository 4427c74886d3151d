//! Work-hour capture schedule.
//!
//! Everything here is a pure function of the clock reading and the schedule.

use chrono::{DateTime, FixedOffset, Timelike};
use std::time::Duration;

use crate::config::ScheduleConfig;

const HOURS_PER_DAY: i32 = 24;
const SECONDS_PER_HOUR: u64 = 3_600;

/// Whether `hour` falls inside the work window. A window whose start is not
/// before its end wraps past midnight; equal bounds cover the whole day.
pub fn in_work_window(hour: u32, schedule: &ScheduleConfig) -> bool {
    let h = hour as i32;
    let (start, end) = (schedule.work_start_hour, schedule.work_end_hour);
    if start < end {
        start <= h && h < end
    } else {
        h >= start || h < end
    }
}

fn due_at_hour(hour: u32, schedule: &ScheduleConfig, last_capture_hour: Option<u32>) -> bool {
    if !in_work_window(hour, schedule) {
        return false;
    }
    if schedule.interval_hours <= 0 {
        return true;
    }
    match last_capture_hour {
        None => true,
        Some(last) => (hour as i32 - last as i32).rem_euclid(HOURS_PER_DAY) >= schedule.interval_hours,
    }
}

pub fn is_capture_due<T: Timelike>(
    now: &T,
    schedule: &ScheduleConfig,
    last_capture_hour: Option<u32>,
) -> bool {
    due_at_hour(now.hour(), schedule, last_capture_hour)
}

/// Time until the start of the next hour at which a capture would be due,
/// never more than `cap` and never zero.
pub fn next_wake_delay(
    now: &DateTime<FixedOffset>,
    schedule: &ScheduleConfig,
    last_capture_hour: Option<u32>,
    cap: Duration,
) -> Duration {
    let into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
    let to_next_hour = SECONDS_PER_HOUR - into_hour;

    let delay = (0..HOURS_PER_DAY as u64)
        .find(|k| {
            let hour = ((u64::from(now.hour()) + 1 + k) % HOURS_PER_DAY as u64) as u32;
            due_at_hour(hour, schedule, last_capture_hour)
        })
        .map(|k| Duration::from_secs(to_next_hour + k * SECONDS_PER_HOUR))
        .unwrap_or(cap);

    delay.min(cap).max(Duration::from_secs(1))
}

/// The hour of the last capture, if it is recent enough for hour arithmetic
/// modulo 24 to mean something.
pub fn recent_capture_hour(
    now: &DateTime<FixedOffset>,
    last_capture: Option<&DateTime<FixedOffset>>,
) -> Option<u32> {
    let last = last_capture?;
    let age = now.signed_duration_since(*last);
    if age.num_hours().abs() < i64::from(HOURS_PER_DAY) {
        Some(last.with_timezone(now.offset()).hour())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap()
    }

    fn local(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 18, hour, minute, 0)
            .unwrap()
    }

    const DAY: ScheduleConfig = ScheduleConfig {
        work_start_hour: 7,
        work_end_hour: 18,
        interval_hours: 3,
    };

    #[test]
    fn interval_gates_captures_inside_window() {
        assert!(is_capture_due(&at(10), &DAY, Some(7)));
        assert!(!is_capture_due(&at(9), &DAY, Some(7)));
        assert!(!is_capture_due(&at(20), &DAY, Some(7)));
        assert!(!is_capture_due(&at(20), &DAY, None));
    }

    #[test]
    fn first_capture_of_the_window_is_due() {
        assert!(is_capture_due(&at(7), &DAY, None));
        assert!(!is_capture_due(&at(6), &DAY, None));
        assert!(is_capture_due(&at(17), &DAY, None));
        assert!(!is_capture_due(&at(18), &DAY, None));
    }

    #[test]
    fn inverted_window_spans_midnight() {
        let night = ScheduleConfig {
            work_start_hour: 22,
            work_end_hour: 6,
            interval_hours: 1,
        };
        assert!(is_capture_due(&at(23), &night, None));
        assert!(is_capture_due(&at(2), &night, None));
        assert!(!is_capture_due(&at(12), &night, None));
        assert!(!is_capture_due(&at(6), &night, None));
    }

    #[test]
    fn elapsed_hours_wrap_around_midnight() {
        let night = ScheduleConfig {
            work_start_hour: 20,
            work_end_hour: 8,
            interval_hours: 3,
        };
        assert!(is_capture_due(&at(1), &night, Some(22)));
        assert!(!is_capture_due(&at(0), &night, Some(22)));
    }

    #[test]
    fn non_positive_interval_means_every_wake() {
        for interval_hours in [0, -4] {
            let s = ScheduleConfig { interval_hours, ..DAY };
            assert!(is_capture_due(&at(9), &s, Some(9)));
            assert!(!is_capture_due(&at(19), &s, Some(9)));
        }
    }

    #[test]
    fn equal_bounds_cover_the_day() {
        let s = ScheduleConfig {
            work_start_hour: 5,
            work_end_hour: 5,
            interval_hours: 1,
        };
        assert!((0..24).all(|h| in_work_window(h, &s)));
    }

    #[test]
    fn wake_delay_targets_next_due_hour_under_cap() {
        let cap = Duration::from_secs(15 * 60);
        // Due again at 12:00, so sleep the full cap.
        assert_eq!(next_wake_delay(&local(9, 5), &DAY, Some(9), cap), cap);
        // 11:50 with a capture at 9 is ten minutes from the 12:00 slot.
        assert_eq!(
            next_wake_delay(&local(11, 50), &DAY, Some(9), cap),
            Duration::from_secs(10 * 60)
        );
        let hour = Duration::from_secs(3_600);
        assert_eq!(next_wake_delay(&local(6, 30), &DAY, None, hour), Duration::from_secs(30 * 60));
    }

    #[test]
    fn wake_delay_is_never_zero() {
        let at_boundary = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 18, 6, 59, 59)
            .unwrap();
        let d = next_wake_delay(&at_boundary, &DAY, None, Duration::from_secs(900));
        assert_eq!(d, Duration::from_secs(1));
    }

    #[test]
    fn stale_captures_are_forgotten() {
        let now = local(9, 0);
        let earlier = local(7, 0);
        assert_eq!(recent_capture_hour(&now, Some(&earlier)), Some(7));

        let yesterday = now - chrono::Duration::hours(25);
        assert_eq!(recent_capture_hour(&now, Some(&yesterday)), None);
        assert_eq!(recent_capture_hour(&now, None), None);
    }

    #[test]
    fn capture_hour_is_read_in_the_current_offset() {
        let now = FixedOffset::east_opt(19_800)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
            .unwrap();
        let last_utc = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 10, 18, 3, 30, 0)
            .unwrap();
        assert_eq!(recent_capture_hour(&now, Some(&last_utc)), Some(9));
    }
}
