use anyhow::{format_err, Error};
use log::debug;
use maplit::hashmap;
use reqwest::{header::HeaderMap, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stack_string::StackString;

use sync_lib::{errors::SyncError, metric_types::MetricType, sync_config::SyncConfig};

use crate::{
    gfit_data_source::{get_data_source, get_data_source_id},
    gfit_model::{GfitDataPoint, GfitDataset, GfitSession},
};

const GOOGLE_FIT_API_URL: &str = "https://www.googleapis.com/fitness/v1/users/me";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Empirical bound below the request size limit of the dataset patch
/// endpoint, batches above it are halved until they fit.
pub const MAX_POINTS_PER_DATASET: usize = 1000;

#[derive(Default, Debug, Clone)]
pub struct GfitClient {
    pub config: SyncConfig,
    pub client: Client,
    pub client_id: StackString,
    pub client_secret: StackString,
    pub access_token: StackString,
    pub refresh_token: StackString,
}

#[derive(Serialize, Deserialize, Debug)]
struct GoogleTokens {
    client_id: StackString,
    client_secret: StackString,
    access_token: StackString,
    refresh_token: StackString,
}

impl GfitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_file(config: SyncConfig) -> Result<Self, Error> {
        let data = tokio::fs::read(config.google_tokenfile.as_str()).await?;
        let tokens: GoogleTokens = serde_json::from_slice(&data)?;
        Ok(Self {
            config,
            client: Client::new(),
            client_id: tokens.client_id,
            client_secret: tokens.client_secret,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    pub async fn to_file(&self) -> Result<(), Error> {
        let tokens = GoogleTokens {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        };
        let data = serde_json::to_vec_pretty(&tokens)?;
        tokio::fs::write(self.config.google_tokenfile.as_str(), &data).await?;
        Ok(())
    }

    /// Account scoped project number, the prefix of the oauth client id.
    pub fn project_number(&self) -> Result<StackString, Error> {
        self.client_id
            .as_str()
            .split('-')
            .next()
            .filter(|s| !s.is_empty())
            .map(Into::into)
            .ok_or_else(|| format_err!("Invalid google client id {}", self.client_id))
    }

    fn get_auth_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {}", self.access_token).parse()?,
        );
        Ok(headers)
    }

    /// Refresh the access token and persist it immediately.
    pub async fn refresh_access_token(&mut self) -> Result<(), Error> {
        #[derive(Deserialize)]
        struct RefreshResponse {
            access_token: StackString,
            refresh_token: Option<StackString>,
        }
        let data = hashmap! {
            "client_id" => self.client_id.as_str(),
            "client_secret" => self.client_secret.as_str(),
            "refresh_token" => self.refresh_token.as_str(),
            "grant_type" => "refresh_token",
        };
        let resp: RefreshResponse = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&data)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.access_token = resp.access_token;
        if let Some(refresh_token) = resp.refresh_token {
            self.refresh_token = refresh_token;
        }
        self.to_file().await?;
        Ok(())
    }

    /// Throw away the current transport and start over with a fresh client
    /// and a fresh access token.
    async fn reconnect(&mut self) -> Result<(), Error> {
        self.client = Client::builder().cookie_store(true).build()?;
        self.refresh_access_token().await
    }

    async fn try_send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let headers = self.get_auth_headers()?;
        let mut req = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::new(SyncError::TransientTransport(e.to_string().into()))
            } else {
                Error::new(e)
            }
        })?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(SyncError::DataSourceNotFound(url.into()).into()),
            StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized.into()),
            _ => resp.error_for_status()?.json().await.map_err(Into::into),
        }
    }

    /// One request with recovery: an expired token is refreshed and the
    /// call retried once, a broken transport gets one reconnect-and-retry,
    /// everything else propagates.
    async fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        match self.try_send(method.clone(), url, body).await {
            Err(e) => match e.downcast_ref::<SyncError>() {
                Some(SyncError::Unauthorized) => {
                    debug!("google access token expired, refreshing");
                    self.refresh_access_token().await?;
                    self.try_send(method, url, body).await
                }
                Some(SyncError::TransientTransport(_)) => {
                    debug!("transient transport failure {}, reconnecting", e);
                    self.reconnect().await?;
                    self.try_send(method, url, body).await
                }
                _ => Err(e),
            },
            resp => resp,
        }
    }

    /// Look up the data source for a metric, creating it on first use. Any
    /// failure other than "not found" propagates.
    pub async fn ensure_data_source(&mut self, metric: MetricType) -> Result<StackString, Error> {
        let project_number = self.project_number()?;
        let data_source_id = get_data_source_id(metric, project_number.as_str());
        let url = format!("{}/dataSources/{}", GOOGLE_FIT_API_URL, data_source_id);
        match self.request(Method::GET, &url, None).await {
            Ok(_) => Ok(data_source_id),
            Err(e) => match e.downcast_ref::<SyncError>() {
                Some(SyncError::DataSourceNotFound(_)) => {
                    debug!("creating data source {}", data_source_id);
                    let url = format!("{}/dataSources", GOOGLE_FIT_API_URL);
                    let body = serde_json::to_value(get_data_source(metric))?;
                    self.request(Method::POST, &url, Some(&body)).await?;
                    Ok(data_source_id)
                }
                _ => Err(e),
            },
        }
    }

    /// Idempotent dataset write, each chunk is patched under its own
    /// [min start, max end] envelope id so re-running the same day
    /// overwrites instead of duplicating. Empty input is a no-op.
    pub async fn write_dataset(
        &mut self,
        data_source_id: &str,
        points: Vec<GfitDataPoint>,
    ) -> Result<(), Error> {
        if points.is_empty() {
            return Ok(());
        }
        for batch in split_points(points) {
            let (min_start, max_end) = batch_envelope(&batch)?;
            let dataset_id = format!("{}-{}", min_start, max_end);
            let url = format!(
                "{}/dataSources/{}/datasets/{}",
                GOOGLE_FIT_API_URL, data_source_id, dataset_id
            );
            let body = serde_json::to_value(GfitDataset {
                data_source_id: data_source_id.into(),
                min_start_time_ns: min_start,
                max_end_time_ns: max_end,
                point: batch,
            })?;
            self.request(Method::PATCH, &url, Some(&body)).await?;
        }
        Ok(())
    }

    /// Upsert a session by its deterministic id.
    pub async fn write_session(&mut self, session: &GfitSession) -> Result<(), Error> {
        let url = format!("{}/sessions/{}", GOOGLE_FIT_API_URL, session.id);
        let body = serde_json::to_value(session)?;
        self.request(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }
}

/// [min(start), max(end)] envelope of a batch.
pub fn batch_envelope(points: &[GfitDataPoint]) -> Result<(i64, i64), Error> {
    let min_start = points
        .iter()
        .map(|p| p.start_time_nanos)
        .min()
        .ok_or_else(|| format_err!("Empty batch has no envelope"))?;
    let max_end = points
        .iter()
        .map(|p| p.end_time_nanos)
        .max()
        .ok_or_else(|| format_err!("Empty batch has no envelope"))?;
    Ok((min_start, max_end))
}

/// Halve oversized batches until every chunk fits under
/// `MAX_POINTS_PER_DATASET`, iterative to keep the call stack flat however
/// small the limit or large the backfill.
pub fn split_points(points: Vec<GfitDataPoint>) -> Vec<Vec<GfitDataPoint>> {
    let mut chunks = Vec::new();
    let mut stack = vec![points];
    while let Some(mut batch) = stack.pop() {
        if batch.len() > MAX_POINTS_PER_DATASET {
            let tail = batch.split_off(batch.len() / 2);
            stack.push(tail);
            stack.push(batch);
        } else if !batch.is_empty() {
            chunks.push(batch);
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use anyhow::Error;

    use sync_lib::{metric_types::MetricType, sync_config::SyncConfig};

    use crate::{
        gfit_client::{batch_envelope, split_points, GfitClient, MAX_POINTS_PER_DATASET},
        gfit_model::{GfitDataPoint, GfitValue},
    };

    fn step_point(start: i64) -> GfitDataPoint {
        GfitDataPoint {
            data_type_name: "com.google.step_count.delta".into(),
            start_time_nanos: start,
            end_time_nanos: start + 110,
            value: vec![GfitValue::integer(1)],
        }
    }

    #[test]
    fn test_project_number() -> Result<(), Error> {
        let client = GfitClient {
            client_id: "425298-abcdef.apps.googleusercontent.com".into(),
            ..GfitClient::new()
        };
        assert_eq!(client.project_number()?.as_str(), "425298");
        let client = GfitClient::new();
        assert!(client.project_number().is_err());
        Ok(())
    }

    #[test]
    fn test_split_points_union_and_envelopes() -> Result<(), Error> {
        let n = MAX_POINTS_PER_DATASET * 2 + 500;
        let points: Vec<_> = (0..n as i64).map(step_point).collect();
        let chunks = split_points(points.clone());
        assert!(chunks.len() > 1);
        let mut union = Vec::new();
        let mut prev_end = i64::min_value();
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_POINTS_PER_DATASET);
            let (min_start, max_end) = batch_envelope(chunk)?;
            assert!(min_start <= max_end);
            assert!(min_start > prev_end - 110);
            prev_end = max_end;
            union.extend_from_slice(chunk);
        }
        assert_eq!(union, points);
        Ok(())
    }

    #[test]
    fn test_split_points_small_batch_passthrough() {
        let points: Vec<_> = (0..10).map(step_point).collect();
        let chunks = split_points(points.clone());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], points);
        assert!(split_points(Vec::new()).is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_ensure_data_source() -> Result<(), Error> {
        let config = SyncConfig::get_config(None)?;
        let mut client = GfitClient::from_file(config).await?;
        let id = client.ensure_data_source(MetricType::Steps).await?;
        assert!(id.as_str().starts_with("raw:com.google.step_count.delta"));
        Ok(())
    }
}
