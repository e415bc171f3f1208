//! Calendar arithmetic for repeating reminders

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDateTime, Offset, Utc};

use crate::models::{RepeatFrequency, RepeatRule};

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Upper bound on candidate steps walked past the estimated starting point
const MAX_STEPS: u32 = 64;

/// Computes the next occurrence of a repeating series
pub trait RecurrenceCalculator {
    /// First occurrence strictly after `now`, or `None` once the series has ended
    fn compute_next_trigger(
        &self,
        now: i64,
        start_at: Option<i64>,
        base_at_local: Option<&str>,
        repeat: &RepeatRule,
    ) -> Option<i64>;
}

/// Default calculator: daily, weekly and monthly steps in a fixed UTC offset.
///
/// The series is anchored at `base_at_local` (wall clock in `offset`) when it
/// parses, otherwise at `start_at`. Monthly steps clamp to the last day of
/// shorter months without drifting the anchor day.
#[derive(Debug, Clone, Copy)]
pub struct CalendarRecurrence {
    offset: FixedOffset,
}

impl Default for CalendarRecurrence {
    fn default() -> Self {
        Self::utc()
    }
}

impl CalendarRecurrence {
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    fn to_local(&self, millis: i64) -> Option<NaiveDateTime> {
        DateTime::from_timestamp_millis(millis)
            .map(|at| at.with_timezone(&self.offset).naive_local())
    }

    fn to_millis(&self, local: NaiveDateTime) -> Option<i64> {
        local
            .and_local_timezone(self.offset)
            .single()
            .map(|at| at.timestamp_millis())
    }

    fn anchor(&self, start_at: Option<i64>, base_at_local: Option<&str>) -> Option<NaiveDateTime> {
        base_at_local
            .and_then(parse_local)
            .or_else(|| start_at.and_then(|at| self.to_local(at)))
    }
}

fn parse_local(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn next_daily(anchor: NaiveDateTime, now: NaiveDateTime, step: u32) -> Option<NaiveDateTime> {
    let step = i64::from(step);
    let elapsed = (now - anchor).num_days().max(0);
    let mut k = elapsed / step;
    for _ in 0..MAX_STEPS {
        let candidate = anchor.checked_add_signed(Duration::days(k * step))?;
        if candidate > now {
            return Some(candidate);
        }
        k += 1;
    }
    None
}

fn next_weekly(
    anchor: NaiveDateTime,
    now: NaiveDateTime,
    step: u32,
    weekdays: &[u8],
) -> Option<NaiveDateTime> {
    let mut days: Vec<i64> = weekdays
        .iter()
        .filter(|day| (1..=7).contains(*day))
        .map(|day| i64::from(*day) - 1)
        .collect();
    if days.is_empty() {
        days.push(i64::from(anchor.weekday().num_days_from_monday()));
    }
    days.sort_unstable();
    days.dedup();

    let week_start =
        anchor.date() - Duration::days(i64::from(anchor.weekday().num_days_from_monday()));
    let step = i64::from(step);
    let elapsed_weeks = (now.date() - week_start).num_days().max(0) / 7;
    let mut week = (elapsed_weeks / step - 1).max(0) * step;

    for _ in 0..MAX_STEPS {
        for day in &days {
            let date = week_start.checked_add_signed(Duration::days(week * 7 + day))?;
            let candidate = date.and_time(anchor.time());
            if candidate >= anchor && candidate > now {
                return Some(candidate);
            }
        }
        week += step;
    }
    None
}

fn next_monthly(anchor: NaiveDateTime, now: NaiveDateTime, step: u32) -> Option<NaiveDateTime> {
    let months_between = (now.year() - anchor.year()) * 12 + i32::try_from(now.month()).ok()?
        - i32::try_from(anchor.month()).ok()?;
    let steps_behind = (months_between / i32::try_from(step).ok()? - 1).max(0);
    let mut k = u32::try_from(steps_behind).ok()? * step;

    for _ in 0..MAX_STEPS {
        let candidate = anchor.checked_add_months(Months::new(k))?;
        if candidate > now {
            return Some(candidate);
        }
        k += step;
    }
    None
}

impl RecurrenceCalculator for CalendarRecurrence {
    fn compute_next_trigger(
        &self,
        now: i64,
        start_at: Option<i64>,
        base_at_local: Option<&str>,
        repeat: &RepeatRule,
    ) -> Option<i64> {
        let anchor = self.anchor(start_at, base_at_local)?;
        let now_local = self.to_local(now)?;
        let step = repeat.step();

        let next = match repeat.frequency {
            RepeatFrequency::Daily => next_daily(anchor, now_local, step),
            RepeatFrequency::Weekly => next_weekly(anchor, now_local, step, &repeat.weekdays),
            RepeatFrequency::Monthly => next_monthly(anchor, now_local, step),
        }?;

        let next = self.to_millis(next)?;
        match repeat.until {
            Some(until) if next > until => None,
            _ => Some(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc_ms(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        chrono::Utc
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn daily_returns_first_occurrence_after_now() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Daily);
        let next = calc.compute_next_trigger(
            utc_ms(2026, 3, 10, 12, 0),
            None,
            Some("2026-03-01T09:30"),
            &rule,
        );
        assert_eq!(next, Some(utc_ms(2026, 3, 11, 9, 30)));
    }

    #[test]
    fn future_anchor_is_its_own_first_occurrence() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Daily).with_interval(3);
        let start = utc_ms(2026, 5, 1, 8, 0);
        let next = calc.compute_next_trigger(utc_ms(2026, 4, 1, 0, 0), Some(start), None, &rule);
        assert_eq!(next, Some(start));
    }

    #[test]
    fn occurrence_equal_to_now_is_skipped() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Daily).with_interval(2);
        let start = utc_ms(2026, 1, 1, 7, 0);
        let next = calc.compute_next_trigger(utc_ms(2026, 1, 5, 7, 0), Some(start), None, &rule);
        assert_eq!(next, Some(utc_ms(2026, 1, 7, 7, 0)));
    }

    #[test]
    fn weekly_walks_selected_weekdays() {
        let calc = CalendarRecurrence::utc();
        // 2026-01-05 is a Monday
        let rule = RepeatRule::new(RepeatFrequency::Weekly).with_weekdays(vec![5, 1, 3]);
        let anchor = Some("2026-01-05T18:00");

        let wed = calc.compute_next_trigger(utc_ms(2026, 1, 5, 18, 0), None, anchor, &rule);
        assert_eq!(wed, Some(utc_ms(2026, 1, 7, 18, 0)));

        let next_mon = calc.compute_next_trigger(utc_ms(2026, 1, 9, 19, 0), None, anchor, &rule);
        assert_eq!(next_mon, Some(utc_ms(2026, 1, 12, 18, 0)));
    }

    #[test]
    fn biweekly_without_weekdays_uses_anchor_day() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Weekly).with_interval(2);
        let next = calc.compute_next_trigger(
            utc_ms(2026, 1, 8, 0, 0),
            None,
            Some("2026-01-06T10:00"),
            &rule,
        );
        assert_eq!(next, Some(utc_ms(2026, 1, 20, 10, 0)));
    }

    #[test]
    fn monthly_clamps_without_drifting() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Monthly);
        let anchor = Some("2026-01-31T09:00");

        let feb = calc.compute_next_trigger(utc_ms(2026, 2, 1, 0, 0), None, anchor, &rule);
        assert_eq!(feb, Some(utc_ms(2026, 2, 28, 9, 0)));

        let mar = calc.compute_next_trigger(utc_ms(2026, 3, 1, 0, 0), None, anchor, &rule);
        assert_eq!(mar, Some(utc_ms(2026, 3, 31, 9, 0)));
    }

    #[test]
    fn local_anchor_respects_offset() {
        let calc = CalendarRecurrence::new(FixedOffset::east_opt(9 * 3600).unwrap());
        let rule = RepeatRule::new(RepeatFrequency::Daily);
        // 08:00 in UTC+9 is 23:00 UTC the previous day
        let next = calc.compute_next_trigger(
            utc_ms(2026, 6, 1, 0, 0),
            None,
            Some("2026-05-20T08:00:00"),
            &rule,
        );
        assert_eq!(next, Some(utc_ms(2026, 6, 1, 23, 0)));
    }

    #[test]
    fn series_past_until_has_ended() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Daily).until(utc_ms(2026, 2, 3, 0, 0));
        let start = Some(utc_ms(2026, 2, 1, 9, 0));

        assert_eq!(
            calc.compute_next_trigger(utc_ms(2026, 2, 1, 12, 0), start, None, &rule),
            Some(utc_ms(2026, 2, 2, 9, 0))
        );
        assert_eq!(
            calc.compute_next_trigger(utc_ms(2026, 2, 2, 12, 0), start, None, &rule),
            None
        );
    }

    #[test]
    fn missing_anchor_yields_none() {
        let calc = CalendarRecurrence::utc();
        let rule = RepeatRule::new(RepeatFrequency::Daily);
        assert_eq!(calc.compute_next_trigger(0, None, Some("not a date"), &rule), None);
    }
}
