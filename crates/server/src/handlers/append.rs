use crate::error::ServiceError;
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use durable_streams_common::headers::{
    PRODUCER_EPOCH, PRODUCER_ID, PRODUCER_SEQ, STREAM_NEXT_OFFSET, STREAM_SEQ,
};

/// `POST /{path}` - append a record, either as a plain client-ordered
/// write or as an idempotent-producer write (when `producer-id` is set).
pub async fn handle_append(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{path}");
    let now = Utc::now();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(_) => return ServiceError::BadRequest("failed to read body".into()).into_response(),
    };
    if body_bytes.is_empty() {
        return ServiceError::EmptyBody.into_response();
    }

    let producer_id = headers.get(PRODUCER_ID).and_then(|v| v.to_str().ok());

    if let Some(producer_id) = producer_id {
        let epoch = match headers
            .get(PRODUCER_EPOCH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(e) => e,
            None => return ServiceError::BadRequest("missing or invalid producer-epoch".into()).into_response(),
        };
        let seq = match headers
            .get(PRODUCER_SEQ)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(s) => s,
            None => return ServiceError::BadRequest("missing or invalid producer-seq".into()).into_response(),
        };

        return match state
            .registry
            .append_idempotent(&path, producer_id, epoch, seq, body_bytes, content_type, now)
        {
            Ok((offset, duplicate)) => Response::builder()
                .status(if duplicate { StatusCode::NO_CONTENT } else { StatusCode::OK })
                .header(STREAM_NEXT_OFFSET, offset.encode())
                .body(Body::empty())
                .unwrap(),
            Err(e) => e.into_response(),
        };
    }

    let seq = headers.get(STREAM_SEQ).and_then(|v| v.to_str().ok());

    match state.registry.append(&path, body_bytes, content_type, seq, now) {
        Ok(offset) => Response::builder()
            .status(StatusCode::OK)
            .header(STREAM_NEXT_OFFSET, offset.encode())
            .body(Body::empty())
            .unwrap(),
        Err(e) => e.into_response(),
    }
}
