use crate::config::AppConfig;
use crate::store::SharedStore;
use axum::extract::FromRef;
use reqwest::Client;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: SharedStore,
    pub http: Client,
}

impl FromRef<AppState> for SharedStore {
    fn from_ref(state: &AppState) -> SharedStore {
        state.store.clone()
    }
}
