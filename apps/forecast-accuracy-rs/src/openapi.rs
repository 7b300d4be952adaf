use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "forecast-accuracy-rs"),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::collect::collect_handler,
        crate::routes::maintenance::cleanup_handler,
        crate::routes::maintenance::cleanup_indexes_handler,
        crate::routes::dashboard::dashboard_handler,
        crate::routes::dashboard::accuracy_handler,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::routes::health::HealthResponse,
        crate::services::collect::CycleReport,
        crate::routes::maintenance::CleanupResponse,
        crate::routes::maintenance::IndexMaintenanceResponse,
        crate::store::IndexInfo,
        crate::store::ReadingRecord,
        crate::services::accuracy::SourceAccuracy,
        crate::routes::dashboard::DashboardPoint,
        crate::routes::dashboard::DashboardResponse,
        crate::routes::dashboard::AccuracyResponse,
    )),
    tags(
        (name = "collect", description = "Hourly ingestion cycle"),
        (name = "maintenance", description = "Record and index maintenance"),
        (name = "dashboard", description = "Series and forecast accuracy")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize openapi document");
        serde_json::Value::Null
    })
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = openapi_json();
        let paths = doc["paths"].as_object().expect("paths");
        for path in [
            "/healthz",
            "/api/collect",
            "/api/cleanup",
            "/api/cleanup-indexes",
            "/api/dashboard",
            "/api/accuracy",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
