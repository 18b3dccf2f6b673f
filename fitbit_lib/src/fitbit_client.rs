use anyhow::{format_err, Error};
use base64::encode;
use chrono::{FixedOffset, NaiveDate};
use chrono_tz::Tz;
use log::debug;
use maplit::hashmap;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use stack_string::StackString;
use std::io::{stdout, Write};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    time::{sleep, Duration},
};

use sync_lib::{
    errors::SyncError, metric_types::MetricType, sync_config::SyncConfig,
    sync_util::rate_limit_backoff_secs,
};

use crate::fitbit_model::{
    ActivityListResponse, FatLogEntry, IntradayPoint, SleepSessionLog, WeightLogEntry,
};

const FITBIT_API_URL: &str = "https://api.fitbit.com/1";
const FITBIT_API_12_URL: &str = "https://api.fitbit.com/1.2";
const ACTIVITY_PAGE_SIZE: usize = 20;

#[derive(Default, Debug, Clone)]
pub struct FitbitClient {
    pub config: SyncConfig,
    pub user_id: StackString,
    pub access_token: StackString,
    pub refresh_token: StackString,
    pub client: Client,
    pub offset: Option<FixedOffset>,
    pub tz: Option<Tz>,
}

#[derive(Deserialize, Debug)]
struct AccessTokenResponse {
    access_token: StackString,
    refresh_token: StackString,
    user_id: StackString,
}

impl FitbitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_file(config: SyncConfig) -> Result<Self, Error> {
        let mut client = Self {
            config,
            ..Self::default()
        };
        let f = File::open(client.config.fitbit_tokenfile.as_str()).await?;
        let mut b = BufReader::new(f);
        let mut line = String::new();
        loop {
            line.clear();
            if b.read_line(&mut line).await? == 0 {
                break;
            }
            let mut items = line.split('=');
            if let Some(key) = items.next() {
                if let Some(val) = items.next() {
                    match key {
                        "user_id" => client.user_id = val.trim().into(),
                        "access_token" => client.access_token = val.trim().into(),
                        "refresh_token" => client.refresh_token = val.trim().into(),
                        _ => {}
                    }
                }
            }
        }
        if client.access_token.as_str() == "" || client.refresh_token.as_str() == "" {
            return Err(format_err!(
                "No fitbit tokens in {}",
                client.config.fitbit_tokenfile
            ));
        }
        Ok(client)
    }

    pub async fn to_file(&self) -> Result<(), Error> {
        let mut f = File::create(self.config.fitbit_tokenfile.as_str()).await?;
        f.write_all(format!("user_id={}\n", self.user_id).as_bytes())
            .await?;
        f.write_all(format!("access_token={}\n", self.access_token).as_bytes())
            .await?;
        f.write_all(format!("refresh_token={}\n", self.refresh_token).as_bytes())
            .await?;
        Ok(())
    }

    pub fn get_offset(&self) -> FixedOffset {
        self.offset.unwrap_or_else(|| FixedOffset::east(0))
    }

    pub fn get_tz(&self) -> Tz {
        self.tz.unwrap_or(Tz::UTC)
    }

    fn get_basic_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-type", "application/x-www-form-urlencoded".parse()?);
        headers.insert(
            "Authorization",
            format!(
                "Basic {}",
                encode(format!(
                    "{}:{}",
                    self.config.fitbit_clientid, self.config.fitbit_clientsecret
                ))
            )
            .parse()?,
        );
        Ok(headers)
    }

    fn get_auth_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", self.access_token).parse()?,
        );
        headers.insert("Accept-Language", "en_US".parse()?);
        headers.insert("Accept-Locale", "en_US".parse()?);
        Ok(headers)
    }

    /// Refresh the access token and persist the rotated tokens immediately.
    pub async fn refresh_access_token(&mut self) -> Result<(), Error> {
        let headers = self.get_basic_headers()?;
        let data = hashmap! {
            "grant_type" => "refresh_token",
            "refresh_token" => self.refresh_token.as_str(),
        };
        let url = "https://api.fitbit.com/oauth2/token";
        let auth_resp: AccessTokenResponse = self
            .client
            .post(url)
            .headers(headers)
            .form(&data)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.user_id = auth_resp.user_id;
        self.access_token = auth_resp.access_token;
        self.refresh_token = auth_resp.refresh_token;
        self.to_file().await?;
        Ok(())
    }

    async fn try_get(&self, url: &str) -> Result<String, Error> {
        let headers = self.get_auth_headers()?;
        let resp = self.client.get(url).headers(headers).send().await?;
        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600);
                Err(SyncError::RateLimited { retry_after_secs }.into())
            }
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized.into()),
            _ => resp
                .error_for_status()?
                .text()
                .await
                .map_err(Into::into),
        }
    }

    /// Rate limited read, sleeps out 429 responses indefinitely (plus
    /// jitter), refreshes an expired access token once, all other errors
    /// propagate.
    pub async fn get_url<T: DeserializeOwned>(&mut self, url: &str) -> Result<T, Error> {
        let mut refreshed = false;
        loop {
            match self.try_get(url).await {
                Ok(body) => return serde_json::from_str(&body).map_err(Into::into),
                Err(e) => match e.downcast_ref::<SyncError>() {
                    Some(SyncError::RateLimited { retry_after_secs }) => {
                        let delay = rate_limit_backoff_secs(*retry_after_secs);
                        writeln!(
                            stdout().lock(),
                            "-------------- Fitbit api rate limit reached, will retry in {}s \
                             --------------",
                            delay
                        )?;
                        sleep(Duration::from_secs(delay)).await;
                    }
                    Some(SyncError::Unauthorized) if !refreshed => {
                        debug!("fitbit access token expired, refreshing");
                        self.refresh_access_token().await?;
                        refreshed = true;
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    /// Fetch the user profile, caching the utc offset and iana timezone of
    /// the account.
    pub async fn load_profile(&mut self) -> Result<(), Error> {
        let url = format!("{}/user/-/profile.json", FITBIT_API_URL);
        let resp: Value = self.get_url(&url).await?;
        let user = resp
            .get("user")
            .ok_or_else(|| missing_key_fault("user", &url))?;
        let offset_millis = user
            .get("offsetFromUTCMillis")
            .and_then(Value::as_i64)
            .ok_or_else(|| missing_key_fault("offsetFromUTCMillis", &url))?;
        self.offset = Some(FixedOffset::east((offset_millis / 1000) as i32));
        let tz_name = user
            .get("timezone")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_key_fault("timezone", &url))?;
        let tz: Tz = tz_name
            .parse()
            .map_err(|e| format_err!("{} is not a valid timezone", e))?;
        self.tz = Some(tz);
        Ok(())
    }

    pub async fn get_intraday_time_series(
        &mut self,
        metric: MetricType,
        date: NaiveDate,
    ) -> Result<Vec<IntradayPoint>, Error> {
        let resource = metric
            .intraday_resource()
            .ok_or_else(|| format_err!("{} has no intraday time series", metric))?;
        let detail_level = metric
            .intraday_detail_level()
            .ok_or_else(|| format_err!("{} has no intraday detail level", metric))?;
        let key = metric
            .intraday_response_key()
            .ok_or_else(|| format_err!("{} has no intraday response key", metric))?;
        let url = format!(
            "{}/user/-/{}/date/{}/1d/{}.json",
            FITBIT_API_URL, resource, date, detail_level
        );
        let resp: Value = self.get_url(&url).await?;
        let dataset = resp
            .get(key)
            .and_then(|v| v.get("dataset"))
            .ok_or_else(|| missing_key_fault(key, &url))?;
        serde_json::from_str(&dataset.to_string()).map_err(Into::into)
    }

    pub async fn get_weight_log(&mut self, date: NaiveDate) -> Result<Vec<WeightLogEntry>, Error> {
        #[derive(Deserialize)]
        struct WeightLogResp {
            weight: Vec<WeightLogEntry>,
        }
        let url = format!(
            "{}/user/-/body/log/weight/date/{}.json",
            FITBIT_API_URL, date
        );
        let resp: WeightLogResp = self.get_url(&url).await?;
        Ok(resp.weight)
    }

    pub async fn get_fat_log(&mut self, date: NaiveDate) -> Result<Vec<FatLogEntry>, Error> {
        #[derive(Deserialize)]
        struct FatLogResp {
            fat: Vec<FatLogEntry>,
        }
        let url = format!("{}/user/-/body/log/fat/date/{}.json", FITBIT_API_URL, date);
        let resp: FatLogResp = self.get_url(&url).await?;
        Ok(resp.fat)
    }

    pub async fn get_sleep_log(&mut self, date: NaiveDate) -> Result<Vec<SleepSessionLog>, Error> {
        #[derive(Deserialize)]
        struct SleepLogResp {
            sleep: Vec<SleepSessionLog>,
        }
        let url = format!("{}/user/-/sleep/date/{}.json", FITBIT_API_12_URL, date);
        let resp: SleepLogResp = self.get_url(&url).await?;
        Ok(resp.sleep)
    }

    /// First page of the exercise log list after a given date, ascending.
    pub async fn get_activity_list(
        &mut self,
        after_date: NaiveDate,
    ) -> Result<ActivityListResponse, Error> {
        let url = format!(
            "{}/user/-/activities/list.json?afterDate={}&sort=asc&offset=0&limit={}",
            FITBIT_API_URL, after_date, ACTIVITY_PAGE_SIZE
        );
        self.get_activity_list_page(&url).await
    }

    /// Follow-up page via the continuation url fitbit handed back.
    pub async fn get_activity_list_page(
        &mut self,
        url: &str,
    ) -> Result<ActivityListResponse, Error> {
        self.get_url(url).await
    }
}

/// A structurally incomplete response almost always means the fitbit app was
/// not registered in the mode this client assumes, give a targeted
/// diagnostic instead of a serde stack trace.
fn missing_key_fault(key: &str, url: &str) -> Error {
    SyncError::ConfigurationFault(
        format!(
            "missing key {} in response from {}, make sure your fitbit app is registered as a \
             Personal application, intraday time series are not available otherwise",
            key, url
        )
        .into(),
    )
    .into()
}

#[cfg(test)]
mod tests {
    use anyhow::Error;
    use chrono::{Duration, Utc};
    use log::debug;

    use sync_lib::{metric_types::MetricType, sync_config::SyncConfig};

    use crate::fitbit_client::FitbitClient;

    #[tokio::test]
    #[ignore]
    async fn test_fitbit_client_from_file() -> Result<(), Error> {
        let config = SyncConfig::get_config(None)?;
        let client = FitbitClient::from_file(config).await?;
        debug!("{:?}", client);
        assert!(client.access_token.as_str().len() > 0);
        Ok(())
    }

    #[tokio::test]
    #[ignore]
    async fn test_load_profile() -> Result<(), Error> {
        let config = SyncConfig::get_config(None)?;
        let mut client = FitbitClient::from_file(config).await?;
        client.load_profile().await?;
        assert!(client.offset.is_some());
        assert!(client.tz.is_some());
        Ok(())
    }

    #[tokio::test]
    #[ignore]
    async fn test_get_intraday_time_series() -> Result<(), Error> {
        let config = SyncConfig::get_config(None)?;
        let mut client = FitbitClient::from_file(config).await?;
        let date = (Utc::now() - Duration::days(1)).naive_local().date();
        let points = client
            .get_intraday_time_series(MetricType::Steps, date)
            .await?;
        debug!("{:#?}", points);
        assert!(points.len() > 10);
        Ok(())
    }
}
