use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::DEFAULT_RETENTION_DAYS;

pub const MEMORY_DATABASE_URL: &str = "memory://";

const DEFAULT_SENSOR_BASE_URL: &str = "https://narodmon.ru/api";
const DEFAULT_PROVIDER_A_BASE_URL: &str = "https://api.weather.yandex.ru/v2/forecast";
const DEFAULT_PROVIDER_B_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
const DEFAULT_PROVIDER_B_MODEL: &str = "ecmwf_aifs025_single";
const DEFAULT_LOCAL_TIMEZONE: &str = "Asia/Almaty";

fn config_file_path() -> Option<PathBuf> {
    env_optional_string("FORECAST_CONFIG_PATH").map(PathBuf::from)
}

/// Optional JSON file whose values apply when the matching env var is unset.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    local_timezone: Option<String>,
    #[serde(default)]
    sensor_id: Option<String>,
    #[serde(default)]
    retention_days: Option<u32>,
}

fn load_file_overrides() -> Option<FileOverrides> {
    let path = config_file_path()?;
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read config file; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse config file; using env defaults"
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorSourceConfig {
    pub base_url: String,
    pub sensor_id: String,
    pub uuid: Option<String>,
    pub api_key: Option<String>,
    /// Reports older than this mark the device offline.
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct ProviderAConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderBConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub shared_secret: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Provider B time index and display labels only; buckets are always UTC.
    pub local_timezone: Tz,
    pub sensor: SensorSourceConfig,
    pub provider_a: ProviderAConfig,
    pub provider_b: ProviderBConfig,
    pub upstream_timeout: Duration,
    pub upstream_attempts: u32,
    pub upstream_backoff_ms: u64,
    pub retention_days: u32,
    pub retention_sweep_interval_seconds: u64,
    pub dashboard_hours: u32,
    pub accuracy_days: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let overrides = load_file_overrides().unwrap_or_default();

        let database_url = env_optional_string("FORECAST_DATABASE_URL")
            .or_else(|| {
                overrides
                    .database_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .context("FORECAST_DATABASE_URL must be set (use memory:// for an in-process store)")?;
        let database_url = normalize_database_url(database_url);

        let shared_secret = env_optional_string("FORECAST_SHARED_SECRET")
            .context("FORECAST_SHARED_SECRET must be set")?;

        let latitude = env_f64("FORECAST_LATITUDE")
            .or(overrides.latitude)
            .unwrap_or(43.23);
        let longitude = env_f64("FORECAST_LONGITUDE")
            .or(overrides.longitude)
            .unwrap_or(76.86);
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            anyhow::bail!("coordinates out of range: latitude={latitude} longitude={longitude}");
        }

        let timezone_name = env_optional_string("FORECAST_LOCAL_TIMEZONE")
            .or(overrides.local_timezone)
            .unwrap_or_else(|| DEFAULT_LOCAL_TIMEZONE.to_string());
        let local_timezone = parse_timezone(&timezone_name)?;

        let sensor = SensorSourceConfig {
            base_url: env_string("FORECAST_SENSOR_BASE_URL", DEFAULT_SENSOR_BASE_URL),
            sensor_id: env_optional_string("FORECAST_SENSOR_ID")
                .or(overrides.sensor_id)
                .unwrap_or_else(|| "37687".to_string()),
            uuid: env_optional_string("FORECAST_SENSOR_UUID"),
            api_key: env_optional_string("FORECAST_SENSOR_API_KEY"),
            max_age: Duration::from_secs(env_u64("FORECAST_SENSOR_MAX_AGE_SECONDS", 7200).max(60)),
        };
        let provider_a = ProviderAConfig {
            base_url: env_string("FORECAST_PROVIDER_A_BASE_URL", DEFAULT_PROVIDER_A_BASE_URL),
            api_key: env_optional_string("FORECAST_PROVIDER_A_KEY"),
        };
        let provider_b = ProviderBConfig {
            base_url: env_string("FORECAST_PROVIDER_B_BASE_URL", DEFAULT_PROVIDER_B_BASE_URL),
            model: env_string("FORECAST_PROVIDER_B_MODEL", DEFAULT_PROVIDER_B_MODEL),
        };

        let upstream_timeout =
            Duration::from_secs(env_u64("FORECAST_UPSTREAM_TIMEOUT_SECONDS", 12).clamp(1, 120));
        let upstream_attempts = env_u64("FORECAST_UPSTREAM_ATTEMPTS", 2).clamp(1, 5) as u32;
        let upstream_backoff_ms = env_u64("FORECAST_UPSTREAM_BACKOFF_MS", 500).min(10_000);

        let retention_days = resolve_retention_days(
            env_optional_u32("FORECAST_RETENTION_DAYS"),
            overrides.retention_days,
        );
        let retention_sweep_interval_seconds =
            env_u64("FORECAST_RETENTION_SWEEP_INTERVAL_SECONDS", 3600).clamp(60, 24 * 3600);
        let dashboard_hours = env_u32("FORECAST_DASHBOARD_HOURS", 24).clamp(1, 24 * 30);
        let accuracy_days = env_u32("FORECAST_ACCURACY_DAYS", 30).clamp(1, 365);

        Ok(Self {
            database_url,
            shared_secret,
            latitude,
            longitude,
            local_timezone,
            sensor,
            provider_a,
            provider_b,
            upstream_timeout,
            upstream_attempts,
            upstream_backoff_ms,
            retention_days,
            retention_sweep_interval_seconds,
            dashboard_hours,
            accuracy_days,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

/// An explicit env value wins over the config file; zero falls back to the default.
fn resolve_retention_days(env: Option<u32>, file: Option<u32>) -> u32 {
    env.or(file)
        .filter(|days| *days > 0)
        .unwrap_or(DEFAULT_RETENTION_DAYS)
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|err| anyhow::anyhow!("invalid FORECAST_LOCAL_TIMEZONE {name:?}: {err}"))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_optional_u32(key: &str) -> Option<u32> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+asyncpg://") {
        return format!("postgresql://{stripped}");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iana_timezones() {
        assert_eq!(
            parse_timezone(" Asia/Almaty ").expect("tz"),
            chrono_tz::Asia::Almaty
        );
        assert!(parse_timezone("UTC+5").is_err());
    }

    #[test]
    fn normalizes_driver_prefixed_urls() {
        assert_eq!(
            normalize_database_url("postgresql+asyncpg://u@h/db".to_string()),
            "postgresql://u@h/db"
        );
        assert_eq!(
            normalize_database_url(MEMORY_DATABASE_URL.to_string()),
            MEMORY_DATABASE_URL
        );
    }

    #[test]
    fn env_retention_wins_over_config_file() {
        assert_eq!(resolve_retention_days(Some(7), Some(20)), 7);
        assert_eq!(resolve_retention_days(Some(45), Some(20)), 45);
        assert_eq!(resolve_retention_days(None, Some(20)), 20);
        assert_eq!(resolve_retention_days(None, None), DEFAULT_RETENTION_DAYS);
        assert_eq!(resolve_retention_days(Some(0), Some(20)), DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn file_overrides_tolerate_partial_documents() {
        let overrides: FileOverrides =
            serde_json::from_str(r#"{"latitude": 51.5, "local_timezone": "Europe/London"}"#)
                .expect("overrides");
        assert_eq!(overrides.latitude, Some(51.5));
        assert_eq!(overrides.local_timezone.as_deref(), Some("Europe/London"));
        assert!(overrides.database_url.is_none());
    }
}
