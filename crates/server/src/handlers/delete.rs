use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
};

/// `DELETE /{path}` - idempotent removal.
pub async fn handle_delete(State(state): State<AppState>, Path(path): Path<String>) -> StatusCode {
    let path = format!("/{path}");
    if state.registry.delete(&path) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
