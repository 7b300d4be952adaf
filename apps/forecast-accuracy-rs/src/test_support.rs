use crate::config::{
    AppConfig, ProviderAConfig, ProviderBConfig, SensorSourceConfig, MEMORY_DATABASE_URL,
};
use crate::state::AppState;
use crate::store::MemoryReadingStore;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "test-shared-secret";

pub fn test_config() -> AppConfig {
    // Upstream URLs point at a closed local port so nothing leaves the host.
    AppConfig {
        database_url: MEMORY_DATABASE_URL.to_string(),
        shared_secret: TEST_SECRET.to_string(),
        latitude: 43.23,
        longitude: 76.86,
        local_timezone: chrono_tz::Asia::Almaty,
        sensor: SensorSourceConfig {
            base_url: "http://127.0.0.1:9/sensor".to_string(),
            sensor_id: "37687".to_string(),
            uuid: None,
            api_key: None,
            max_age: Duration::from_secs(7200),
        },
        provider_a: ProviderAConfig {
            base_url: "http://127.0.0.1:9/provider-a".to_string(),
            api_key: None,
        },
        provider_b: ProviderBConfig {
            base_url: "http://127.0.0.1:9/provider-b".to_string(),
            model: "ecmwf_aifs025_single".to_string(),
        },
        upstream_timeout: Duration::from_secs(1),
        upstream_attempts: 1,
        upstream_backoff_ms: 0,
        retention_days: 30,
        retention_sweep_interval_seconds: 3600,
        dashboard_hours: 24,
        accuracy_days: 30,
    }
}

pub fn test_state() -> AppState {
    AppState {
        config: test_config(),
        store: Arc::new(MemoryReadingStore::new()),
        http: reqwest::Client::new(),
    }
}
