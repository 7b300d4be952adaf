use axum::extract::{Query, State};
use axum::http::Method;
use axum::routing::any;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::SharedSecret;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{DeleteScope, IndexInfo};
use crate::time::parse_cutoff;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CleanupQuery {
    #[serde(default)]
    before: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted_count: u64,
    pub message: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IndexMaintenanceResponse {
    pub success: bool,
    pub indexes: Vec<IndexInfo>,
}

#[utoipa::path(
    delete,
    path = "/api/cleanup",
    tag = "maintenance",
    params(
        ("uuid" = String, Query, description = "Shared secret"),
        ("before" = Option<String>, Query, description = "Delete readings strictly before this date (YYYY-MM-DD or RFC 3339); all readings when omitted")
    ),
    responses(
        (status = 200, description = "Readings deleted", body = CleanupResponse),
        (status = 400, description = "Unparseable before", body = crate::error::ErrorBody),
        (status = 403, description = "Invalid uuid", body = crate::error::ErrorBody),
        (status = 405, description = "Method not allowed", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn cleanup_handler(
    _secret: SharedSecret,
    method: Method,
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> AppResult<Json<CleanupResponse>> {
    if method != Method::DELETE {
        return Err(AppError::method_not_allowed());
    }

    let before = query
        .before
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty());
    let scope = match before {
        Some(raw) => {
            let cutoff = parse_cutoff(raw)
                .map_err(|err| AppError::bad_request("Invalid date format").with_details(err))?;
            DeleteScope::Before(cutoff)
        }
        None => DeleteScope::All,
    };

    let deleted_count = state.store.delete_range(scope).await?;
    let message = match (scope, before) {
        (DeleteScope::Before(_), Some(raw)) => {
            format!("Deleted {deleted_count} records before {raw}")
        }
        _ => format!("Deleted all {deleted_count} records"),
    };
    tracing::info!(deleted_count, ?scope, "manual cleanup");

    Ok(Json(CleanupResponse {
        success: true,
        deleted_count,
        message,
    }))
}

#[utoipa::path(
    post,
    path = "/api/cleanup-indexes",
    tag = "maintenance",
    params(("uuid" = String, Query, description = "Shared secret")),
    responses(
        (status = 200, description = "Indexes rebuilt", body = IndexMaintenanceResponse),
        (status = 403, description = "Invalid uuid", body = crate::error::ErrorBody),
        (status = 405, description = "Method not allowed", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn cleanup_indexes_handler(
    _secret: SharedSecret,
    method: Method,
    State(state): State<AppState>,
) -> AppResult<Json<IndexMaintenanceResponse>> {
    if method != Method::POST {
        return Err(AppError::method_not_allowed());
    }
    let indexes = state.store.rebuild_indexes().await?;
    tracing::info!(count = indexes.len(), "indexes rebuilt");
    Ok(Json(IndexMaintenanceResponse {
        success: true,
        indexes,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cleanup", any(cleanup_handler))
        .route("/cleanup-indexes", any(cleanup_indexes_handler))
}
