//! One ingestion cycle: fan-out fetch, quality guard, alignment and the two
//! partial writes.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::time::Duration;

use crate::services::align::{align_provider_a, align_provider_b};
use crate::services::quality::{self, SensorHealth, STUCK_HISTORY};
use crate::services::upstream::{self, FetchOutcomes, SensorSample, UpstreamError};
use crate::state::AppState;
use crate::store::{ReadingField, ReadingPatch, ReadingStore, RecordFilter, StoreError};
use crate::time::{horizon_bucket, Bucket};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("sensor unavailable: {0}")]
    UpstreamFatal(#[source] UpstreamError),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CycleReport {
    pub success: bool,
    /// Sensor value observed this cycle, whether or not it was stored.
    pub actual: f64,
    #[serde(rename = "forecast_A")]
    pub forecast_a: Option<f64>,
    #[serde(rename = "forecast_B")]
    pub forecast_b: Option<f64>,
    /// Horizon bucket the forecasts were stored under.
    pub target_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub sensor_stuck: bool,
    pub sensor_online: bool,
    #[schema(value_type = String)]
    pub sensor_health: SensorHealth,
    pub actual_written: bool,
    pub stale_deleted: u64,
}

fn degrade<T>(outcome: Result<T, UpstreamError>) -> Option<T> {
    match outcome {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::warn!(error = %err, "forecast source degraded; storing null");
            None
        }
    }
}

/// Classifies the fetch results and applies them to the store. Nothing is
/// written unless the sensor produced a usable sample.
pub async fn reconcile(
    store: &dyn ReadingStore,
    outcomes: FetchOutcomes,
    now: DateTime<Utc>,
    tz: Tz,
    max_age: Duration,
) -> Result<CycleReport, CycleError> {
    let current = Bucket::floor(now);
    let horizon = horizon_bucket(current);

    let sample = outcomes
        .sensor
        .and_then(|payload| SensorSample::from_payload(&payload, now, max_age))
        .map_err(|err| {
            tracing::error!(error = %err, bucket = %current, "sensor fetch failed; aborting cycle");
            CycleError::UpstreamFatal(err)
        })?;

    let forecast_a = degrade(outcomes.provider_a)
        .and_then(|payload| align_provider_a(&payload, horizon));
    let forecast_b = degrade(outcomes.provider_b)
        .and_then(|payload| align_provider_b(&payload, horizon, tz));
    if forecast_a.is_none() {
        tracing::warn!(target_time = %horizon, "no provider A forecast for horizon bucket");
    }
    if forecast_b.is_none() {
        tracing::warn!(target_time = %horizon, "no provider B forecast for horizon bucket");
    }

    let history: Vec<f64> = store
        .query_recent(STUCK_HISTORY, RecordFilter::Has(ReadingField::Actual))
        .await?
        .into_iter()
        .filter_map(|record| record.actual)
        .collect();
    let health = quality::classify(&sample, &history);

    let stale_deleted = match health {
        SensorHealth::Offline => {
            tracing::warn!(value = sample.value, "sensor offline; skipping actual and cleaning up");
            quality::cleanup_stale_repeats(store).await?
        }
        SensorHealth::Stuck => {
            tracing::warn!(value = sample.value, "sensor value unchanged for three cycles; skipping actual");
            0
        }
        SensorHealth::Healthy => 0,
    };

    let write_actual = async {
        if health.writes_actual() {
            store
                .upsert_partial(current, &ReadingPatch::actual(sample.value))
                .await
        } else {
            Ok(())
        }
    };
    let forecast_patch = ReadingPatch::forecasts(forecast_a, forecast_b);
    let write_forecasts = store.upsert_partial(horizon, &forecast_patch);
    tokio::try_join!(write_actual, write_forecasts)?;

    tracing::info!(
        current = %current,
        horizon = %horizon,
        actual = sample.value,
        ?forecast_a,
        ?forecast_b,
        ?health,
        "collection cycle complete"
    );

    Ok(CycleReport {
        success: true,
        actual: sample.value,
        forecast_a,
        forecast_b,
        target_time: horizon.instant(),
        current_time: current.instant(),
        sensor_stuck: health == SensorHealth::Stuck,
        sensor_online: sample.online,
        sensor_health: health,
        actual_written: health.writes_actual(),
        stale_deleted,
    })
}

pub async fn run_cycle(state: &AppState) -> Result<CycleReport, CycleError> {
    let outcomes = upstream::fetch_all(&state.http, &state.config).await;
    reconcile(
        state.store.as_ref(),
        outcomes,
        Utc::now(),
        state.config.local_timezone,
        state.config.sensor.max_age,
    )
    .await
}
