//! HTTP request handlers.

use super::AppState;

use axum::{
    extract::State,
    response::{IntoResponse, Json},
};

/// Latest snapshot of every target, as a JSON array.
///
/// Serves whatever is currently published; polling errors never surface
/// here. Before the first cycle completes the array is empty.
pub async fn handle_status_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.read_all())
}
