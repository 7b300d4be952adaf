pub mod collect;
pub mod dashboard;
pub mod health;
pub mod maintenance;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(collect::router())
                .merge(maintenance::router())
                .merge(dashboard::router())
                .merge(crate::openapi::router()),
        )
        .with_state(state)
}
