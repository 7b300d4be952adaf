//! Static shared-secret check for every `/api` operation.

use axum::extract::{FromRef, FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use std::future::Future;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct SecretQuery {
    #[serde(default)]
    uuid: Option<String>,
}

pub fn secret_matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Extractor that rejects with 403 unless the `uuid` query parameter equals
/// the configured shared secret. Runs before the handler body, so callers
/// are rejected before any method or input validation.
#[derive(Debug, Clone, Copy)]
pub struct SharedSecret;

impl<S> FromRequestParts<S> for SharedSecret
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let state = AppState::from_ref(state);
        let presented = Query::<SecretQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query.uuid)
            .unwrap_or_default();
        let verdict = match presented.as_deref() {
            Some(value) if secret_matches(&state.config.shared_secret, value) => Ok(SharedSecret),
            _ => {
                tracing::warn!(path = %parts.uri.path(), "rejected request with invalid uuid");
                Err(AppError::forbidden("Invalid uuid"))
            }
        };
        async move { verdict }
    }
}
