use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::auth::SharedSecret;
use crate::error::AppResult;
use crate::services::accuracy::{interpolate_gaps, summarize, SourceAccuracy};
use crate::state::AppState;
use crate::store::{ReadingField, ReadingRecord, RecordFilter};
use crate::time::{current_bucket, display_hour_label, display_long_label, Bucket};

const MAX_DASHBOARD_HOURS: u32 = 24 * 30;
const MAX_ACCURACY_DAYS: u32 = 365;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DashboardQuery {
    #[serde(default)]
    hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AccuracyQuery {
    #[serde(default)]
    days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DashboardPoint {
    pub target_time: DateTime<Utc>,
    pub label: String,
    pub long_label: String,
    pub actual: Option<f64>,
    #[serde(rename = "forecast_A")]
    pub forecast_a: Option<f64>,
    #[serde(rename = "forecast_B")]
    pub forecast_b: Option<f64>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DashboardResponse {
    pub timezone: String,
    pub hours: u32,
    pub current_time: DateTime<Utc>,
    pub current_label: String,
    pub current: Option<ReadingRecord>,
    /// Readings in the window, gap-filled per field.
    pub points: Vec<DashboardPoint>,
    #[serde(rename = "has_forecast_A")]
    pub has_forecast_a: bool,
    #[serde(rename = "has_forecast_B")]
    pub has_forecast_b: bool,
    pub accuracy: AccuracyResponse,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AccuracyResponse {
    pub days: u32,
    pub since: DateTime<Utc>,
    pub records: usize,
    pub sources: Vec<SourceAccuracy>,
}

fn build_points(records: &[ReadingRecord], tz: Tz) -> Vec<DashboardPoint> {
    let filled = ReadingField::ALL
        .into_iter()
        .fold(records.to_vec(), |series, field| interpolate_gaps(&series, field));
    filled
        .into_iter()
        .map(|record| {
            let bucket = record.bucket();
            DashboardPoint {
                target_time: record.target_time,
                label: display_hour_label(bucket, tz),
                long_label: display_long_label(bucket, tz),
                actual: record.actual,
                forecast_a: record.forecast_a,
                forecast_b: record.forecast_b,
            }
        })
        .collect()
}

fn has_values(records: &[ReadingRecord], field: ReadingField) -> bool {
    records
        .iter()
        .any(|record| field.get(record).is_some_and(f64::is_finite))
}

pub(crate) fn build_accuracy(
    records: &[ReadingRecord],
    days: u32,
    since: DateTime<Utc>,
) -> AccuracyResponse {
    AccuracyResponse {
        days,
        since,
        records: records.len(),
        sources: summarize(records),
    }
}

pub(crate) fn build_dashboard(
    window: &[ReadingRecord],
    current: Bucket,
    hours: u32,
    tz: Tz,
    accuracy: AccuracyResponse,
) -> DashboardResponse {
    DashboardResponse {
        timezone: tz.name().to_string(),
        hours,
        current_time: current.instant(),
        current_label: display_long_label(current, tz),
        current: window
            .iter()
            .find(|record| record.bucket() == current)
            .cloned(),
        points: build_points(window, tz),
        has_forecast_a: has_values(window, ReadingField::ForecastA),
        has_forecast_b: has_values(window, ReadingField::ForecastB),
        accuracy,
    }
}

async fn load_accuracy(state: &AppState, days: u32) -> AppResult<AccuracyResponse> {
    let since = Utc::now() - Duration::days(i64::from(days));
    let records = state
        .store
        .query_since(since, RecordFilter::Has(ReadingField::Actual))
        .await?;
    Ok(build_accuracy(&records, days, since))
}

#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "dashboard",
    params(
        ("uuid" = String, Query, description = "Shared secret"),
        ("hours" = Option<u32>, Query, description = "Trailing window in hours")
    ),
    responses(
        (status = 200, description = "Dashboard series", body = DashboardResponse),
        (status = 403, description = "Invalid uuid", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn dashboard_handler(
    _secret: SharedSecret,
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Json<DashboardResponse>> {
    let hours = query
        .hours
        .unwrap_or(state.config.dashboard_hours)
        .clamp(1, MAX_DASHBOARD_HOURS);
    let current = current_bucket();
    let window = state
        .store
        .query_range(current.offset_hours(-i64::from(hours)), current)
        .await?;
    let accuracy = load_accuracy(&state, state.config.accuracy_days).await?;
    Ok(Json(build_dashboard(
        &window,
        current,
        hours,
        state.config.local_timezone,
        accuracy,
    )))
}

#[utoipa::path(
    get,
    path = "/api/accuracy",
    tag = "dashboard",
    params(
        ("uuid" = String, Query, description = "Shared secret"),
        ("days" = Option<u32>, Query, description = "Trailing window in days")
    ),
    responses(
        (status = 200, description = "Mean absolute error per forecast source", body = AccuracyResponse),
        (status = 403, description = "Invalid uuid", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn accuracy_handler(
    _secret: SharedSecret,
    State(state): State<AppState>,
    Query(query): Query<AccuracyQuery>,
) -> AppResult<Json<AccuracyResponse>> {
    let days = query
        .days
        .unwrap_or(state.config.accuracy_days)
        .clamp(1, MAX_ACCURACY_DAYS);
    Ok(Json(load_accuracy(&state, days).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard_handler))
        .route("/accuracy", get(accuracy_handler))
}
