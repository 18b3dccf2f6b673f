use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use stack_string::StackString;

/// One intraday time series sample, `time` is a local "HH:MM:SS" time of
/// day, the date it belongs to only exists in the surrounding request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IntradayPoint {
    pub time: StackString,
    pub value: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WeightLogEntry {
    #[serde(rename = "logId")]
    pub log_id: u64,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub weight: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FatLogEntry {
    #[serde(rename = "logId")]
    pub log_id: u64,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub fat: f64,
}

/// One sleep stage segment from the v1.2 sleep log, `date_time` is local
/// wall-clock time without an offset.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SleepLevelPoint {
    #[serde(rename = "dateTime")]
    pub date_time: NaiveDateTime,
    pub level: StackString,
    pub seconds: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SleepLevels {
    #[serde(default)]
    pub data: Vec<SleepLevelPoint>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SleepSessionLog {
    #[serde(rename = "logId")]
    pub log_id: u64,
    #[serde(rename = "startTime")]
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub levels: SleepLevels,
}

impl SleepSessionLog {
    pub fn level_points(&self) -> &[SleepLevelPoint] {
        &self.levels.data
    }
}

/// Exercise log entry, `start_time` carries the utc offset fitbit recorded
/// at the start of the activity, it must be used as-is since a DST
/// transition can change the correct offset mid-session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActivityEntry {
    #[serde(rename = "logId")]
    pub log_id: u64,
    #[serde(rename = "activityName")]
    pub activity_name: Option<StackString>,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<FixedOffset>,
    pub duration: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ActivityPagination {
    #[serde(default)]
    pub next: StackString,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActivityListResponse {
    pub activities: Vec<ActivityEntry>,
    #[serde(default)]
    pub pagination: ActivityPagination,
}
