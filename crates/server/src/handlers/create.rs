use crate::error::ServiceError;
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use durable_streams_common::headers::{STREAM_EXPIRES_AT, STREAM_NEXT_OFFSET, STREAM_TTL};
use durable_streams_common::ttl::{resolve_expiry, TtlParseError};
use tracing::debug;

/// `PUT /{path}` - create a stream, or idempotently confirm an existing one.
pub async fn handle_create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{path}");
    debug!(%path, "creating stream");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let ttl_raw = headers.get(STREAM_TTL).and_then(|v| v.to_str().ok());
    let expires_raw = headers.get(STREAM_EXPIRES_AT).and_then(|v| v.to_str().ok());

    let now = Utc::now();
    let expires_at = match resolve_expiry(ttl_raw, expires_raw, now) {
        Ok(e) => e,
        Err(TtlParseError::BothGiven) => return ServiceError::TtlConflict.into_response(),
        Err(TtlParseError::InvalidTtl) => return ServiceError::InvalidTtl.into_response(),
        Err(TtlParseError::InvalidExpiresAt) => return ServiceError::InvalidExpiresAt.into_response(),
    };

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(_) => return ServiceError::BadRequest("failed to read body".into()).into_response(),
    };
    let initial_data = if body_bytes.is_empty() {
        None
    } else {
        Some(body_bytes)
    };

    match state
        .registry
        .create(&path, content_type.clone(), expires_at, initial_data, now)
    {
        Ok(created) => {
            let head = state.registry.head(&path, now).expect("just created");
            let mut response = Response::builder()
                .status(if created {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                })
                .header(STREAM_NEXT_OFFSET, head.tail.encode())
                .header(header::LOCATION, &path);

            if let Some(ct) = content_type {
                response = response.header(header::CONTENT_TYPE, ct);
            }

            response.body(Body::empty()).unwrap()
        }
        Err(e) => e.into_response(),
    }
}
