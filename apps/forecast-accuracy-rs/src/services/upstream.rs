//! Remote sources for one ingestion cycle: the reference sensor and the two
//! forecast providers. Each call reports its own outcome.

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::AppConfig;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{source_name} is not configured: {detail}")]
    NotConfigured {
        source_name: &'static str,
        detail: &'static str,
    },
    #[error("{source_name} request failed: {error}")]
    Request {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },
    #[error("{source_name} HTTP {status}: {body}")]
    Status {
        source_name: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{source_name} payload decode failed: {error}")]
    Decode {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },
    #[error("{source_name} payload unusable: {detail}")]
    Unusable {
        source_name: &'static str,
        detail: String,
    },
}

impl UpstreamError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::NotConfigured { .. } | Self::Decode { .. } | Self::Unusable { .. } => false,
        }
    }
}

pub const SENSOR_SOURCE: &str = "sensor";
pub const PROVIDER_A_SOURCE: &str = "forecast provider A";
pub const PROVIDER_B_SOURCE: &str = "forecast provider B";

/// Bounded exponential backoff applied to each upstream call independently.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            attempts: config.upstream_attempts.max(1),
            base_delay: Duration::from_millis(config.upstream_backoff_ms),
            max_delay: Duration::from_secs(10),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }
}

// ---- sensor wire schema ----

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(raw) => raw.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OnlineFlag {
    Bool(bool),
    Number(i64),
}

impl OnlineFlag {
    fn is_online(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorPayload {
    #[serde(default)]
    pub sensors: Vec<SensorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub value: Option<NumberOrString>,
    /// Epoch seconds of the device's last report.
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub online: Option<OnlineFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub value: f64,
    pub online: bool,
}

impl SensorSample {
    /// Extracts the first sensor's value. A missing or non-numeric value is
    /// unusable. When the payload carries no online flag, a report older than
    /// `max_age` marks the device offline.
    pub fn from_payload(
        payload: &SensorPayload,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Self, UpstreamError> {
        let unusable = |detail: &str| UpstreamError::Unusable {
            source_name: SENSOR_SOURCE,
            detail: detail.to_string(),
        };
        let entry = payload
            .sensors
            .first()
            .ok_or_else(|| unusable("no sensors in payload"))?;
        let value = entry
            .value
            .as_ref()
            .and_then(NumberOrString::as_f64)
            .ok_or_else(|| unusable("sensor value missing or not numeric"))?;

        let online = match (&entry.online, entry.time) {
            (Some(flag), _) => flag.is_online(),
            (None, Some(reported_at)) => {
                let age = now.timestamp().saturating_sub(reported_at);
                age <= i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX)
            }
            (None, None) => true,
        };

        Ok(Self { value, online })
    }
}

// ---- provider A wire schema (epoch-indexed runs) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderAPayload {
    #[serde(default)]
    pub forecasts: Vec<ProviderARun>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderARun {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub hours: Vec<ProviderAHour>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderAHour {
    #[serde(default)]
    pub hour_ts: Option<i64>,
    #[serde(default)]
    pub temp: Option<f64>,
}

// ---- provider B wire schema (local-string-indexed) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderBPayload {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub hourly: Option<ProviderBHourly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderBHourly {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
}

/// Per-call results of the fan-out; never collapsed into one failure.
#[derive(Debug)]
pub struct FetchOutcomes {
    pub sensor: Result<SensorPayload, UpstreamError>,
    pub provider_a: Result<ProviderAPayload, UpstreamError>,
    pub provider_b: Result<ProviderBPayload, UpstreamError>,
}

pub async fn fetch_all(http: &Client, config: &AppConfig) -> FetchOutcomes {
    let retry = RetryPolicy::from_config(config);
    let (sensor, provider_a, provider_b) = tokio::join!(
        fetch_sensor(http, config, retry),
        fetch_provider_a(http, config, retry),
        fetch_provider_b(http, config, retry),
    );
    FetchOutcomes {
        sensor,
        provider_a,
        provider_b,
    }
}

async fn fetch_sensor(
    http: &Client,
    config: &AppConfig,
    retry: RetryPolicy,
) -> Result<SensorPayload, UpstreamError> {
    let sensor = &config.sensor;
    let (Some(uuid), Some(api_key)) = (sensor.uuid.as_deref(), sensor.api_key.as_deref()) else {
        return Err(UpstreamError::NotConfigured {
            source_name: SENSOR_SOURCE,
            detail: "sensor uuid and api key are required",
        });
    };
    fetch_json(SENSOR_SOURCE, retry, || {
        http.get(&sensor.base_url)
            .query(&[
                ("cmd", "sensorsValues"),
                ("sensors", sensor.sensor_id.as_str()),
                ("uuid", uuid),
                ("api_key", api_key),
            ])
            .timeout(config.upstream_timeout)
    })
    .await
}

async fn fetch_provider_a(
    http: &Client,
    config: &AppConfig,
    retry: RetryPolicy,
) -> Result<ProviderAPayload, UpstreamError> {
    let Some(key) = config.provider_a.api_key.as_deref() else {
        return Err(UpstreamError::NotConfigured {
            source_name: PROVIDER_A_SOURCE,
            detail: "api key is required",
        });
    };
    fetch_json(PROVIDER_A_SOURCE, retry, || {
        http.get(&config.provider_a.base_url)
            .query(&[
                ("lat", config.latitude.to_string()),
                ("lon", config.longitude.to_string()),
            ])
            .header("X-Yandex-Weather-Key", key)
            .timeout(config.upstream_timeout)
    })
    .await
}

async fn fetch_provider_b(
    http: &Client,
    config: &AppConfig,
    retry: RetryPolicy,
) -> Result<ProviderBPayload, UpstreamError> {
    fetch_json(PROVIDER_B_SOURCE, retry, || {
        http.get(&config.provider_b.base_url)
            .query(&[
                ("latitude", config.latitude.to_string()),
                ("longitude", config.longitude.to_string()),
                ("timezone", config.local_timezone.name().to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("models", config.provider_b.model.clone()),
            ])
            .timeout(config.upstream_timeout)
    })
    .await
}

async fn fetch_json<T, F>(
    source_name: &'static str,
    retry: RetryPolicy,
    build: F,
) -> Result<T, UpstreamError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 1;
    loop {
        match fetch_once(source_name, build()).await {
            Ok(payload) => return Ok(payload),
            Err(err) if err.is_retryable() && attempt < retry.attempts => {
                let delay = retry.delay_after(attempt);
                tracing::debug!(
                    source = source_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upstream call failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

const MAX_ERROR_BODY_BYTES: usize = 512;

/// Cuts an upstream error body to [`MAX_ERROR_BODY_BYTES`] on a char boundary.
fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut end = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

async fn fetch_once<T: DeserializeOwned>(
    source_name: &'static str,
    request: RequestBuilder,
) -> Result<T, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|error| UpstreamError::Request { source_name, error })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            source_name,
            status,
            body: truncate_body(body),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|error| UpstreamError::Decode { source_name, error })
}
