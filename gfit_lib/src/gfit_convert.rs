use anyhow::{format_err, Error};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use log::debug;
use maplit::hashmap;
use std::collections::HashMap;

use fitbit_lib::fitbit_model::{
    ActivityEntry, FatLogEntry, IntradayPoint, SleepSessionLog, WeightLogEntry,
};
use sync_lib::{
    metric_types::MetricType,
    sync_util::{
        nanos_from_millis, tz_offset_at, INSTANT_POINT_EPSILON_NANOS, METERS_PER_MILE,
        POUNDS_PER_KILOGRAM,
    },
};

use crate::{
    gfit_data_source::{APPLICATION_NAME, DEVICE_UID},
    gfit_model::{GfitApplication, GfitDataPoint, GfitSession, GfitValue},
};

/// "Unable to detect activity" in the target vocabulary, used for exercise
/// names with no mapping.
pub const UNKNOWN_ACTIVITY_TYPE: i64 = 4;
pub const SLEEP_ACTIVITY_TYPE: i64 = 72;

lazy_static! {
    /// Fitbit exercise names (lowercased, including the alias spellings the
    /// app produces) to google fit activity type codes.
    static ref ACTIVITY_TYPE_MAP: HashMap<&'static str, i64> = hashmap! {
        "aerobic workout" => 9,
        "badminton" => 10,
        "baseball" => 11,
        "basketball" => 12,
        "bike" => 1,
        "biking" => 1,
        "outdoor bike" => 1,
        "dancing" => 24,
        "elliptical" => 25,
        "golf" => 32,
        "hike" => 35,
        "hiking" => 35,
        "kayaking" => 40,
        "martial arts" => 44,
        "run" => 8,
        "running" => 8,
        "treadmill" => 88,
        "swim" => 82,
        "swimming" => 82,
        "tennis" => 87,
        "volleyball" => 89,
        "walk" => 7,
        "walking" => 7,
        "weights" => 80,
        "weightlifting" => 80,
        "workout" => 80,
        "yoga" => 100,
    };

    /// Fitbit sleep stage labels to google fit sleep segment codes. The
    /// `unknown` stage (a DST artifact occasionally trailing a session) is
    /// deliberately absent, such points are dropped.
    static ref SLEEP_STAGE_MAP: HashMap<&'static str, i64> = hashmap! {
        "restless" => 112,
        "wake" => 112,
        "awake" => 112,
        "asleep" => 72,
        "light" => 109,
        "deep" => 110,
        "rem" => 111,
    };
}

/// Epoch nanoseconds of a local "HH:MM:SS" time of day on the given date in
/// the given utc offset.
fn local_time_nanos(date: NaiveDate, time_of_day: &str, offset: FixedOffset) -> Result<i64, Error> {
    let timestamp = format!("{}T{}{}", date, time_of_day, offset);
    let datetime = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| format_err!("Invalid timestamp {} : {}", timestamp, e))?;
    Ok(nanos_from_millis(datetime.timestamp_millis()))
}

/// Convert one intraday sample. Counts get the integer slot, everything
/// else the floating point slot, distance is converted from miles to
/// meters.
pub fn convert_intraday_point(
    metric: MetricType,
    date: NaiveDate,
    point: &IntradayPoint,
    offset: FixedOffset,
) -> Result<GfitDataPoint, Error> {
    let value = match metric {
        MetricType::Steps => GfitValue::integer(point.value as i64),
        MetricType::Distance => GfitValue::float(point.value * METERS_PER_MILE),
        MetricType::HeartRate | MetricType::Calories => GfitValue::float(point.value),
        MetricType::Weight | MetricType::BodyFat | MetricType::Sleep | MetricType::Activity => {
            return Err(format_err!("{} is not an intraday metric", metric))
        }
    };
    let start_time_nanos = local_time_nanos(date, point.time.as_str(), offset)?;
    Ok(GfitDataPoint {
        data_type_name: metric.data_type_name().into(),
        start_time_nanos,
        end_time_nanos: start_time_nanos + INSTANT_POINT_EPSILON_NANOS,
        value: vec![value],
    })
}

/// Convert a day of intraday samples, dropping all-zero points for the
/// metrics whose policy says so.
pub fn convert_intraday_points(
    metric: MetricType,
    date: NaiveDate,
    points: &[IntradayPoint],
    offset: FixedOffset,
) -> Result<Vec<GfitDataPoint>, Error> {
    let mut converted: Vec<_> = points
        .iter()
        .map(|point| convert_intraday_point(metric, date, point, offset))
        .collect::<Result<_, Error>>()?;
    if metric.skip_zero_values() {
        converted.retain(|point| !point.is_zero());
    }
    Ok(converted)
}

/// Weight logs arrive in pounds (the client requests the en_US locale) and
/// the target expects kilograms. Logs without a time of day are stamped
/// with the configured daily log time.
pub fn convert_weight_point(
    entry: &WeightLogEntry,
    default_time: NaiveTime,
    offset: FixedOffset,
) -> Result<GfitDataPoint, Error> {
    let time = entry.time.unwrap_or(default_time);
    let start_time_nanos = local_time_nanos(
        entry.date,
        &time.format("%H:%M:%S").to_string(),
        offset,
    )?;
    Ok(GfitDataPoint {
        data_type_name: MetricType::Weight.data_type_name().into(),
        start_time_nanos,
        end_time_nanos: start_time_nanos + INSTANT_POINT_EPSILON_NANOS,
        value: vec![GfitValue::float(entry.weight / POUNDS_PER_KILOGRAM)],
    })
}

pub fn convert_body_fat_point(
    entry: &FatLogEntry,
    default_time: NaiveTime,
    offset: FixedOffset,
) -> Result<GfitDataPoint, Error> {
    let time = entry.time.unwrap_or(default_time);
    let start_time_nanos = local_time_nanos(
        entry.date,
        &time.format("%H:%M:%S").to_string(),
        offset,
    )?;
    Ok(GfitDataPoint {
        data_type_name: MetricType::BodyFat.data_type_name().into(),
        start_time_nanos,
        end_time_nanos: start_time_nanos + INSTANT_POINT_EPSILON_NANOS,
        value: vec![GfitValue::float(entry.fat)],
    })
}

pub fn sleep_stage_code(level: &str) -> Option<i64> {
    SLEEP_STAGE_MAP.get(level.to_lowercase().as_str()).copied()
}

pub fn activity_type_code(activity_name: &str) -> i64 {
    ACTIVITY_TYPE_MAP
        .get(activity_name.to_lowercase().as_str())
        .copied()
        .unwrap_or_else(|| {
            debug!("unmapped activity name {}", activity_name);
            UNKNOWN_ACTIVITY_TYPE
        })
}

/// Convert one sleep session into a session record plus its stage segment
/// points. The utc offset is resolved once at the session's own start
/// instant so a DST transition mid-sleep can't skew the segments. Points
/// with an unmappable stage are dropped and the session envelope is derived
/// only from the surviving points, a session with no surviving points
/// yields None.
pub fn convert_sleep_session(
    session: &SleepSessionLog,
    tz: Tz,
) -> Result<Option<(GfitSession, Vec<GfitDataPoint>)>, Error> {
    let offset = tz_offset_at(tz, session.start_time);
    let mut points = Vec::new();
    for point in session.level_points() {
        let code = match sleep_stage_code(point.level.as_str()) {
            Some(code) => code,
            None => {
                debug!(
                    "dropping sleep point with stage {} in session {}",
                    point.level, session.log_id
                );
                continue;
            }
        };
        let start = offset
            .from_local_datetime(&point.date_time)
            .single()
            .ok_or_else(|| format_err!("Invalid sleep timestamp {}", point.date_time))?;
        let start_time_nanos = nanos_from_millis(start.timestamp_millis());
        points.push(GfitDataPoint {
            data_type_name: MetricType::Sleep.data_type_name().into(),
            start_time_nanos,
            end_time_nanos: start_time_nanos + point.seconds as i64 * 1_000_000_000,
            value: vec![GfitValue::integer(code)],
        });
    }
    if points.is_empty() {
        return Ok(None);
    }
    let start_time_millis = points
        .iter()
        .map(|p| p.start_time_nanos)
        .min()
        .unwrap_or(0)
        / 1_000_000;
    let end_time_millis = points.iter().map(|p| p.end_time_nanos).max().unwrap_or(0) / 1_000_000;
    let gfit_session = GfitSession {
        id: format!("{}:fitbit:{}", DEVICE_UID, session.log_id).into(),
        name: "Sleep".into(),
        description: "".into(),
        start_time_millis,
        end_time_millis,
        modified_time_millis: Utc::now().timestamp_millis(),
        activity_type: SLEEP_ACTIVITY_TYPE,
        application: GfitApplication {
            name: APPLICATION_NAME.into(),
        },
    };
    Ok(Some((gfit_session, points)))
}

/// Convert one exercise log entry into a session record plus the single
/// activity segment point covering it. The literal utc offset embedded in
/// the log's start time is used as-is.
pub fn convert_activity_log(entry: &ActivityEntry) -> (GfitSession, GfitDataPoint) {
    let start_time_millis = entry.start_time.timestamp_millis();
    let end_time_millis = start_time_millis + entry.duration as i64;
    let activity_type = entry
        .activity_name
        .as_ref()
        .map_or(UNKNOWN_ACTIVITY_TYPE, |name| activity_type_code(name.as_str()));
    let session = GfitSession {
        id: format!("{}:fitbit:{}", DEVICE_UID, entry.log_id).into(),
        name: entry
            .activity_name
            .clone()
            .unwrap_or_else(|| "Activity".into()),
        description: "".into(),
        start_time_millis,
        end_time_millis,
        modified_time_millis: Utc::now().timestamp_millis(),
        activity_type,
        application: GfitApplication {
            name: APPLICATION_NAME.into(),
        },
    };
    let segment = GfitDataPoint {
        data_type_name: MetricType::Activity.data_type_name().into(),
        start_time_nanos: nanos_from_millis(start_time_millis),
        end_time_nanos: nanos_from_millis(end_time_millis),
        value: vec![GfitValue::integer(activity_type)],
    };
    (session, segment)
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use approx::assert_abs_diff_eq;
    use chrono::{FixedOffset, NaiveDate, NaiveTime};
    use chrono_tz::Tz;

    use fitbit_lib::fitbit_model::{IntradayPoint, SleepSessionLog, WeightLogEntry};
    use sync_lib::{metric_types::MetricType, sync_util::INSTANT_POINT_EPSILON_NANOS};

    use crate::gfit_convert::{
        activity_type_code, convert_intraday_point, convert_intraday_points,
        convert_sleep_session, convert_weight_point, sleep_stage_code, UNKNOWN_ACTIVITY_TYPE,
    };

    fn intraday_point(time: &str, value: f64) -> IntradayPoint {
        IntradayPoint {
            time: time.into(),
            value,
        }
    }

    #[test]
    fn test_convert_intraday_point_interval() -> Result<(), Error> {
        let date = NaiveDate::from_ymd(2016, 8, 20);
        let offset = FixedOffset::east(5 * 3600 + 1800);
        let point = convert_intraday_point(
            MetricType::Steps,
            date,
            &intraday_point("08:30:00", 25.0),
            offset,
        )?;
        assert!(point.end_time_nanos >= point.start_time_nanos);
        assert_eq!(
            point.end_time_nanos - point.start_time_nanos,
            INSTANT_POINT_EPSILON_NANOS
        );
        assert_eq!(point.value[0].int_val, Some(25));
        assert_eq!(point.value[0].fp_val, None);
        Ok(())
    }

    #[test]
    fn test_convert_intraday_point_deterministic() -> Result<(), Error> {
        let date = NaiveDate::from_ymd(2016, 8, 20);
        let offset = FixedOffset::west(4 * 3600);
        let raw = intraday_point("23:59:00", 1.5);
        let first = convert_intraday_point(MetricType::Distance, date, &raw, offset)?;
        let second = convert_intraday_point(MetricType::Distance, date, &raw, offset)?;
        assert_eq!(
            serde_json::to_string(&first)?,
            serde_json::to_string(&second)?
        );
        Ok(())
    }

    #[test]
    fn test_distance_unit_conversion() -> Result<(), Error> {
        let date = NaiveDate::from_ymd(2016, 8, 20);
        let offset = FixedOffset::east(0);
        let point = convert_intraday_point(
            MetricType::Distance,
            date,
            &intraday_point("12:00:00", 1.0),
            offset,
        )?;
        assert_abs_diff_eq!(point.value[0].fp_val.unwrap(), 1609.34);
        Ok(())
    }

    #[test]
    fn test_weight_unit_conversion() -> Result<(), Error> {
        let entry = WeightLogEntry {
            log_id: 1,
            date: NaiveDate::from_ymd(2016, 8, 20),
            time: None,
            weight: 100.0,
        };
        let default_time = NaiveTime::from_hms(23, 59, 59);
        let point = convert_weight_point(&entry, default_time, FixedOffset::east(0))?;
        assert_abs_diff_eq!(point.value[0].fp_val.unwrap(), 45.3592, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_zero_point_filtering() -> Result<(), Error> {
        let date = NaiveDate::from_ymd(2016, 8, 20);
        let offset = FixedOffset::east(0);
        let raw = vec![intraday_point("08:30:00", 0.0), intraday_point("08:31:00", 5.0)];
        let points = convert_intraday_points(MetricType::Steps, date, &raw, offset)?;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value[0].int_val, Some(5));
        // heart rate keeps everything
        let points = convert_intraday_points(MetricType::HeartRate, date, &raw, offset)?;
        assert_eq!(points.len(), 2);
        Ok(())
    }

    #[test]
    fn test_sleep_stage_codes() {
        assert_eq!(sleep_stage_code("wake"), sleep_stage_code("awake"));
        assert_eq!(sleep_stage_code("deep"), Some(110));
        assert_eq!(sleep_stage_code("unknown"), None);
    }

    #[test]
    fn test_activity_type_aliases() {
        assert_eq!(activity_type_code("Bike"), activity_type_code("Biking"));
        assert_eq!(activity_type_code("Run"), 8);
        assert_eq!(activity_type_code("underwater hockey"), UNKNOWN_ACTIVITY_TYPE);
    }

    #[test]
    fn test_sleep_session_drops_unknown_stage() -> Result<(), Error> {
        let session = r#"{
            "logId": 987,
            "startTime": "2020-03-07T23:58:30.000",
            "levels": {
                "data": [
                    {"dateTime": "2020-03-07T23:58:30.000", "level": "light", "seconds": 1800},
                    {"dateTime": "2020-03-08T00:28:30.000", "level": "deep", "seconds": 900},
                    {"dateTime": "2020-03-08T00:43:30.000", "level": "unknown", "seconds": 3600}
                ]
            }
        }"#;
        let session: SleepSessionLog = serde_json::from_str(session)?;
        let tz: Tz = "America/New_York".parse().unwrap();
        let (gfit_session, points) = convert_sleep_session(&session, tz)?.unwrap();
        assert_eq!(points.len(), 2);
        // envelope derives from the surviving points only
        assert_eq!(
            gfit_session.start_time_millis,
            points[0].start_time_nanos / 1_000_000
        );
        assert_eq!(
            gfit_session.end_time_millis,
            points[1].end_time_nanos / 1_000_000
        );
        assert_eq!(
            gfit_session.id.as_str(),
            "io.fitbit-gfit-sync:fitbit:987"
        );
        Ok(())
    }

    #[test]
    fn test_sleep_session_all_unknown_yields_none() -> Result<(), Error> {
        let session = r#"{
            "logId": 988,
            "startTime": "2020-03-08T01:58:30.000",
            "levels": {
                "data": [
                    {"dateTime": "2020-03-08T01:58:30.000", "level": "unknown", "seconds": 60}
                ]
            }
        }"#;
        let session: SleepSessionLog = serde_json::from_str(session)?;
        let tz: Tz = "America/New_York".parse().unwrap();
        assert!(convert_sleep_session(&session, tz)?.is_none());
        Ok(())
    }
}
