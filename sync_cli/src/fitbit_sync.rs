use anyhow::{format_err, Error};
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use log::debug;
use stack_string::StackString;
use std::collections::HashMap;
use std::io::{stdout, Write};

use fitbit_lib::{fitbit_client::FitbitClient, fitbit_model::ActivityListResponse};
use gfit_lib::{
    gfit_client::GfitClient,
    gfit_convert::{
        convert_activity_log, convert_body_fat_point, convert_intraday_points,
        convert_sleep_session, convert_weight_point,
    },
};
use sync_lib::{
    metric_types::MetricType,
    sync_config::SyncConfig,
    sync_util::{date_range, tz_offset_at},
};

/// One-shot batch synchronizer, reads a date range from fitbit and writes
/// it to google fit day by day, metric by metric, strictly sequentially.
/// Every write is idempotent by construction so an interrupted run can be
/// re-launched over the same range without creating duplicates.
pub struct FitbitSync {
    pub config: SyncConfig,
    pub fitbit: FitbitClient,
    pub gfit: GfitClient,
}

impl FitbitSync {
    pub fn new(config: SyncConfig, fitbit: FitbitClient, gfit: GfitClient) -> Self {
        Self {
            config,
            fitbit,
            gfit,
        }
    }

    fn is_enabled(&self, metric: MetricType) -> bool {
        match metric {
            MetricType::Steps => self.config.sync_steps,
            MetricType::Distance => self.config.sync_distance,
            MetricType::HeartRate => self.config.sync_heartrate,
            MetricType::Weight => self.config.sync_weight,
            MetricType::BodyFat => self.config.sync_body_fat,
            MetricType::Calories => self.config.sync_calories,
            MetricType::Sleep => self.config.sync_sleep,
            MetricType::Activity => self.config.sync_activities,
        }
    }

    pub fn enabled_metrics(&self) -> Vec<MetricType> {
        MetricType::all()
            .iter()
            .filter(|metric| self.is_enabled(**metric))
            .copied()
            .collect()
    }

    /// Utc offset used for a given day's local-time-of-day points.
    fn offset_for_date(&self, date: NaiveDate) -> FixedOffset {
        tz_offset_at(self.fitbit.get_tz(), date.and_hms(12, 0, 0))
    }

    fn weight_log_time(&self) -> Result<NaiveTime, Error> {
        NaiveTime::parse_from_str(self.config.weight_log_time.as_str(), "%H:%M:%S")
            .map_err(|e| format_err!("Invalid WEIGHT_LOG_TIME : {}", e))
    }

    /// Sync every enabled metric over [start_date, end_date), end
    /// exclusive, then the exercise log from start_date onwards.
    pub async fn run(&mut self, start_date: NaiveDate, end_date: NaiveDate) -> Result<(), Error> {
        self.fitbit.load_profile().await?;

        let metrics = self.enabled_metrics();
        let mut source_ids: HashMap<MetricType, StackString> = HashMap::new();
        for metric in &metrics {
            let id = self.gfit.ensure_data_source(*metric).await?;
            debug!("{} -> {}", metric, id);
            source_ids.insert(*metric, id);
        }

        for date in date_range(start_date, end_date) {
            writeln!(
                stdout().lock(),
                "------------------------------   {}  -------------------------",
                date
            )?;
            for metric in &metrics {
                let data_source_id = source_ids[metric].clone();
                match metric {
                    MetricType::Steps
                    | MetricType::Distance
                    | MetricType::HeartRate
                    | MetricType::Calories => {
                        self.sync_intraday(*metric, date, data_source_id.as_str())
                            .await?;
                    }
                    MetricType::Weight => {
                        self.sync_weight(date, data_source_id.as_str()).await?;
                    }
                    MetricType::BodyFat => {
                        self.sync_body_fat(date, data_source_id.as_str()).await?;
                    }
                    MetricType::Sleep => {
                        self.sync_sleep(date, data_source_id.as_str()).await?;
                    }
                    MetricType::Activity => {
                        // the exercise log is paginated over the whole
                        // range at once, after the per-day loop
                    }
                }
            }
        }

        if let Some(data_source_id) = source_ids.get(&MetricType::Activity) {
            let data_source_id = data_source_id.clone();
            self.sync_activities(start_date, data_source_id.as_str())
                .await?;
        }
        Ok(())
    }

    async fn sync_intraday(
        &mut self,
        metric: MetricType,
        date: NaiveDate,
        data_source_id: &str,
    ) -> Result<(), Error> {
        let raw = self.fitbit.get_intraday_time_series(metric, date).await?;
        let offset = self.offset_for_date(date);
        let points = convert_intraday_points(metric, date, &raw, offset)?;
        let npoints = points.len();
        self.gfit.write_dataset(data_source_id, points).await?;
        writeln!(
            stdout().lock(),
            "Synced {} {} points for day : {}",
            npoints,
            metric,
            date
        )?;
        Ok(())
    }

    async fn sync_weight(&mut self, date: NaiveDate, data_source_id: &str) -> Result<(), Error> {
        let entries = self.fitbit.get_weight_log(date).await?;
        let default_time = self.weight_log_time()?;
        let offset = self.offset_for_date(date);
        let points: Vec<_> = entries
            .iter()
            .map(|entry| convert_weight_point(entry, default_time, offset))
            .collect::<Result<_, Error>>()?;
        let npoints = points.len();
        self.gfit.write_dataset(data_source_id, points).await?;
        writeln!(
            stdout().lock(),
            "Synced {} weight logs for day : {}",
            npoints,
            date
        )?;
        Ok(())
    }

    async fn sync_body_fat(&mut self, date: NaiveDate, data_source_id: &str) -> Result<(), Error> {
        let entries = self.fitbit.get_fat_log(date).await?;
        let default_time = self.weight_log_time()?;
        let offset = self.offset_for_date(date);
        let points: Vec<_> = entries
            .iter()
            .map(|entry| convert_body_fat_point(entry, default_time, offset))
            .collect::<Result<_, Error>>()?;
        let npoints = points.len();
        self.gfit.write_dataset(data_source_id, points).await?;
        writeln!(
            stdout().lock(),
            "Synced {} body fat logs for day : {}",
            npoints,
            date
        )?;
        Ok(())
    }

    /// Each sleep session is written independently, one session record plus
    /// its stage segments as a single batch.
    async fn sync_sleep(&mut self, date: NaiveDate, data_source_id: &str) -> Result<(), Error> {
        let sessions = self.fitbit.get_sleep_log(date).await?;
        let tz = self.fitbit.get_tz();
        let mut nsessions = 0;
        for session in &sessions {
            if let Some((gfit_session, points)) = convert_sleep_session(session, tz)? {
                self.gfit.write_session(&gfit_session).await?;
                self.gfit.write_dataset(data_source_id, points).await?;
                nsessions += 1;
            }
        }
        writeln!(
            stdout().lock(),
            "Synced {} sleep sessions for day : {}",
            nsessions,
            date
        )?;
        Ok(())
    }

    /// Page through the exercise log after start_date. An empty page is
    /// always terminal, a non-empty continuation cursor fetches the next
    /// page, a loop rather than recursion so a deep backfill can't grow
    /// the stack.
    async fn sync_activities(
        &mut self,
        start_date: NaiveDate,
        data_source_id: &str,
    ) -> Result<(), Error> {
        let mut next_url: Option<StackString> = None;
        loop {
            let resp = match &next_url {
                Some(url) => self.fitbit.get_activity_list_page(url.as_str()).await?,
                None => self.fitbit.get_activity_list(start_date).await?,
            };
            if resp.activities.is_empty() {
                writeln!(
                    stdout().lock(),
                    "No exercises found after {}",
                    start_date
                )?;
                return Ok(());
            }
            let mut span_start = resp.activities[0].start_time;
            let mut span_end = span_start;
            for entry in &resp.activities {
                span_start = span_start.min(entry.start_time);
                span_end = span_end.max(entry.start_time);
                let (session, segment) = convert_activity_log(entry);
                self.gfit.write_session(&session).await?;
                self.gfit
                    .write_dataset(data_source_id, vec![segment])
                    .await?;
            }
            writeln!(
                stdout().lock(),
                "Synced {} activities between {} and {}",
                resp.activities.len(),
                span_start.format("%Y-%m-%d %H:%M"),
                span_end.format("%Y-%m-%d %H:%M")
            )?;
            match activity_page_continuation(&resp) {
                Some(url) => next_url = Some(url),
                None => return Ok(()),
            }
        }
    }
}

/// Continuation url of an exercise log page. None means the page is
/// terminal: an empty page never continues regardless of its cursor, and an
/// empty cursor means the log is exhausted.
fn activity_page_continuation(resp: &ActivityListResponse) -> Option<StackString> {
    if resp.activities.is_empty() || resp.pagination.next.is_empty() {
        None
    } else {
        Some(resp.pagination.next.clone())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Error;

    use fitbit_lib::{fitbit_client::FitbitClient, fitbit_model::ActivityListResponse};
    use gfit_lib::gfit_client::GfitClient;
    use sync_lib::{metric_types::MetricType, sync_config::SyncConfig};

    use crate::fitbit_sync::{activity_page_continuation, FitbitSync};

    #[test]
    fn test_enabled_metrics_default_config() {
        let sync = FitbitSync::new(SyncConfig::new(), FitbitClient::new(), GfitClient::new());
        let metrics = sync.enabled_metrics();
        assert_eq!(metrics.len(), MetricType::all().len());
        assert!(metrics.contains(&MetricType::Sleep));
    }

    #[test]
    fn test_activity_page_continuation_empty_page_is_terminal() -> Result<(), Error> {
        // an empty page ends pagination even if a cursor is present
        let page = r#"{
            "activities": [],
            "pagination": {"next": "https://api.fitbit.com/1/user/-/activities/list.json?offset=20"}
        }"#;
        let page: ActivityListResponse = serde_json::from_str(page)?;
        assert!(activity_page_continuation(&page).is_none());
        Ok(())
    }

    #[test]
    fn test_activity_page_continuation_cursor() -> Result<(), Error> {
        let page = r#"{
            "activities": [{
                "logId": 123,
                "activityName": "Run",
                "startTime": "2019-07-01T06:00:00.000-04:00",
                "duration": 1800000
            }],
            "pagination": {"next": ""}
        }"#;
        let page: ActivityListResponse = serde_json::from_str(page)?;
        assert!(activity_page_continuation(&page).is_none());

        let page = r#"{
            "activities": [{
                "logId": 123,
                "activityName": "Run",
                "startTime": "2019-07-01T06:00:00.000-04:00",
                "duration": 1800000
            }],
            "pagination": {"next": "https://api.fitbit.com/1/user/-/activities/list.json?offset=20"}
        }"#;
        let page: ActivityListResponse = serde_json::from_str(page)?;
        let next = activity_page_continuation(&page)
            .ok_or_else(|| anyhow::format_err!("expected a continuation"))?;
        assert!(next.as_str().ends_with("offset=20"));
        Ok(())
    }
}
