//! A liveness probe that also reports whether submissions can be processed.

use axum::{extract::State, Json};
use axum_macros::debug_handler;
use serde::Serialize;

use crate::AppState;

/// A `GET` response body for this API route.
#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse {
    /// Always `true`; the service is up if it answers.
    pub ok: bool,

    /// Whether every required configuration key is set. Which keys are missing is only logged.
    pub configured: bool,
}

/// Reports that the service is up and whether it's configured.
#[expect(clippy::unused_async, reason = "Axum route handlers must be async")]
#[debug_handler]
pub async fn get(State(state): State<AppState>) -> Json<GetResponse> {
    Json(GetResponse {
        ok: true,
        configured: state.settings.is_configured(),
    })
}
