use axum::extract::State;
use axum::http::Method;
use axum::routing::any;
use axum::{Json, Router};

use crate::auth::SharedSecret;
use crate::error::{AppError, AppResult};
use crate::services::collect::{self, CycleReport};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/collect",
    tag = "collect",
    params(("uuid" = String, Query, description = "Shared secret")),
    responses(
        (status = 200, description = "Cycle completed", body = CycleReport),
        (status = 403, description = "Invalid uuid", body = crate::error::ErrorBody),
        (status = 405, description = "Method not allowed", body = crate::error::ErrorBody),
        (status = 500, description = "Sensor unavailable or storage failure", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn collect_handler(
    _secret: SharedSecret,
    method: Method,
    State(state): State<AppState>,
) -> AppResult<Json<CycleReport>> {
    if method != Method::POST {
        return Err(AppError::method_not_allowed());
    }
    let report = collect::run_cycle(&state).await?;
    Ok(Json(report))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/collect", any(collect_handler))
}
