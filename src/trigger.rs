//! Next-fire computation for alarms.
//!
//! All arithmetic happens on civil (wall-clock) dates in the supplied time
//! zone; the result is converted to an absolute instant only at the end.
//!
//! Wall times that fall into a DST gap are shifted forward by the length of
//! the gap (02:30 on a spring-forward night becomes 03:30). Wall times that
//! occur twice on a fall-back night resolve to the first occurrence.

use crate::repeat_days::RepeatDays;
use chrono::{
    DateTime, Datelike, Days, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeZone,
};

/// Compute the next instant at `hour:minute:00.000` strictly after `now`.
///
/// One-shot alarms (empty `repeat`) fire today if that is still ahead,
/// otherwise tomorrow. Repeating alarms fire on the earliest selected
/// weekday; today only qualifies when the time is strictly after `now`.
///
/// Returns `None` only for an out-of-range `hour`/`minute`.
pub fn compute_next_trigger<Tz: TimeZone>(
    hour: u32,
    minute: u32,
    repeat: RepeatDays,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let tz = now.timezone();
    let today = now.date_naive();
    let at = |date: NaiveDate| resolve_local(&tz, date.and_time(time));

    let tomorrow = today.checked_add_days(Days::new(1))?;

    if repeat.is_one_shot() {
        let candidate = at(today);
        if candidate > *now {
            return Some(candidate);
        }
        return Some(at(tomorrow));
    }

    // Offset 7 covers a single selected weekday whose slot today already passed.
    let best = (0..=7u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)).map(|d| (offset, d)))
        .filter(|(_, date)| repeat.contains(date.weekday()))
        .map(|(offset, date)| (offset, at(date)))
        .filter(|(offset, candidate)| *offset > 0 || candidate > now)
        .map(|(_, candidate)| candidate)
        .min();

    Some(best.unwrap_or_else(|| at(tomorrow)))
}

/// Same as [`compute_next_trigger`], in epoch milliseconds and the device's local zone.
pub fn next_trigger_millis(hour: u32, minute: u32, repeat: RepeatDays, now_ms: i64) -> Option<i64> {
    next_trigger_millis_in(&Local, hour, minute, repeat, now_ms)
}

pub fn next_trigger_millis_in<Tz: TimeZone>(
    tz: &Tz,
    hour: u32,
    minute: u32,
    repeat: RepeatDays,
    now_ms: i64,
) -> Option<i64> {
    let now = tz.timestamp_millis_opt(now_ms).single()?;
    compute_next_trigger(hour, minute, repeat, &now).map(|dt| dt.timestamp_millis())
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Read the wall time with the offset in force before the transition.
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::hours(24)))
                .fix();
            let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}
