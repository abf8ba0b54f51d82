use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    models::session::SessionData,
    services::revalidation::{PathOutcome, RevalidationRequest},
    state::AppState,
};

/// The response payload for a revalidation run.
#[derive(Serialize)]
pub struct RevalidateResponse {
    pub paths: Vec<PathOutcome>,
}

/// Refreshes the public pages affected by a committed admin write.
///
/// Cache failures are reported per path but never fail the request: the
/// write they follow has already been stored.
#[axum::debug_handler]
pub async fn revalidate(
    State(state): State<AppState>,
    Extension(_session): Extension<SessionData>,
    payload: std::result::Result<Json<RevalidationRequest>, JsonRejection>,
) -> Result<Json<RevalidateResponse>> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!("Rejected revalidation body: {}", e);
        AppError::Validation("Invalid request body".to_string())
    })?;

    let paths = state.revalidator.revalidate(&request).await;
    let failed = paths.iter().filter(|o| !o.ok).count();
    if failed > 0 {
        tracing::warn!("⚠️ {} of {} paths could not be revalidated", failed, paths.len());
    }

    Ok(Json(RevalidateResponse { paths }))
}
