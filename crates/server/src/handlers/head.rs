use crate::server::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use durable_streams_common::headers::{CACHE_CONTROL, STREAM_NEXT_OFFSET};

/// `HEAD /{path}` - metadata only, no body.
pub async fn handle_head(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{path}");
    let now = Utc::now();

    let Some(info) = state.registry.head(&path, now) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(STREAM_NEXT_OFFSET, info.tail.encode())
        .header(CACHE_CONTROL, "no-store");

    if let Some(ct) = info.content_type {
        response = response.header(header::CONTENT_TYPE, ct);
    }

    response.body(Body::empty()).unwrap()
}
