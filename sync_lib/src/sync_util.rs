use anyhow::{format_err, Error};
use chrono::{Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use log::debug;
use rand::{thread_rng, Rng};

pub const POUNDS_PER_KILOGRAM: f64 = 2.20462;
pub const METERS_PER_MILE: f64 = 1609.34;

/// Fixed padding added to the end timestamp of instantaneous points. The
/// dataset patch endpoint rejects zero-length intervals, whether 110ns is a
/// hard protocol requirement or just a safe padding value is unconfirmed,
/// keep it as-is.
pub const INSTANT_POINT_EPSILON_NANOS: i64 = 110;

const RATE_LIMIT_JITTER_MIN_SECS: u64 = 60;
const RATE_LIMIT_JITTER_MAX_SECS: u64 = 300;

pub fn nanos_from_millis(millis: i64) -> i64 {
    millis * 1_000_000
}

/// Vendor specified retry interval plus a minutes-scale random jitter, so
/// that several syncs rate limited at the same instant don't all come back
/// at once.
pub fn rate_limit_backoff_secs(retry_after_secs: u64) -> u64 {
    let delay = retry_after_secs
        + thread_rng().gen_range(RATE_LIMIT_JITTER_MIN_SECS..RATE_LIMIT_JITTER_MAX_SECS);
    debug!("backing off {}s after rate limit", delay);
    delay
}

/// Parse a sync boundary date, either ISO "yyyy-mm-dd" or one of the
/// relative forms "today", "yesterday", "N days ago".
pub fn parse_sync_date(date_str: &str) -> Result<NaiveDate, Error> {
    let today = Local::today().naive_local();
    match date_str.trim().to_lowercase().as_str() {
        "today" => Ok(today),
        "yesterday" => Ok(today - Duration::days(1)),
        trimmed => {
            if let Some(days) = trimmed.strip_suffix(" days ago") {
                let days: i64 = days.trim().parse()?;
                Ok(today - Duration::days(days))
            } else {
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .map_err(|e| format_err!("Invalid date {} : {}", date_str, e))
            }
        }
    }
}

/// Iterate days in [start, end), end exclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let ndays = (end - start).num_days().max(0);
    (0..ndays).map(move |d| start + Duration::days(d))
}

/// Resolve the utc offset of a local timestamp in the given timezone.
/// Ambiguous local times (fall-back DST transition) take the earlier
/// offset, non-existent local times (spring-forward gap) are interpreted as
/// utc instants.
pub fn tz_offset_at(tz: Tz, local: NaiveDateTime) -> FixedOffset {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.offset().fix(),
        LocalResult::Ambiguous(first, _) => first.offset().fix(),
        LocalResult::None => tz.offset_from_utc_datetime(&local).fix(),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use chrono::{Duration, Local, NaiveDate};
    use chrono_tz::Tz;

    use crate::sync_util::{date_range, parse_sync_date, rate_limit_backoff_secs, tz_offset_at};

    #[test]
    fn test_parse_sync_date() -> Result<(), Error> {
        assert_eq!(
            parse_sync_date("2016-08-20")?,
            NaiveDate::from_ymd(2016, 8, 20)
        );
        let today = Local::today().naive_local();
        assert_eq!(parse_sync_date("today")?, today);
        assert_eq!(parse_sync_date("yesterday")?, today - Duration::days(1));
        assert_eq!(parse_sync_date("7 days ago")?, today - Duration::days(7));
        assert!(parse_sync_date("2016-13-45").is_err());
        Ok(())
    }

    #[test]
    fn test_date_range_end_exclusive() {
        let start = NaiveDate::from_ymd(2016, 8, 20);
        let end = NaiveDate::from_ymd(2016, 8, 23);
        let days: Vec<_> = date_range(start, end).collect();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0], start);
        assert_eq!(*days.last().unwrap(), NaiveDate::from_ymd(2016, 8, 22));
        assert_eq!(date_range(end, start).count(), 0);
    }

    #[test]
    fn test_rate_limit_backoff_bounds() {
        for _ in 0..100 {
            let delay = rate_limit_backoff_secs(3600);
            assert!(delay >= 3600 + 60);
            assert!(delay < 3600 + 300);
        }
    }

    #[test]
    fn test_tz_offset_at_dst_transition() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let winter = NaiveDate::from_ymd(2017, 1, 15).and_hms(12, 0, 0);
        let summer = NaiveDate::from_ymd(2017, 7, 15).and_hms(12, 0, 0);
        assert_eq!(tz_offset_at(tz, winter).local_minus_utc(), -5 * 3600);
        assert_eq!(tz_offset_at(tz, summer).local_minus_utc(), -4 * 3600);
    }
}
