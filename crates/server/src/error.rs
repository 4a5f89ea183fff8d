//! Server-side error taxonomy and its single HTTP response mapping.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use durable_streams_common::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("stream not found: {0}")]
    NotFound(String),

    #[error("stream already exists with a different configuration")]
    ConfigMismatch,

    #[error("content-type mismatch: expected {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    #[error("sequence conflict: {0}")]
    SequenceConflict(String),

    #[error("sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },

    #[error("stale epoch: server has {server_epoch}")]
    StaleEpoch { server_epoch: u64 },

    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    #[error("cannot specify both stream-ttl and stream-expires-at")]
    TtlConflict,

    #[error("invalid stream-ttl value")]
    InvalidTtl,

    #[error("invalid stream-expires-at value")]
    InvalidExpiresAt,

    #[error("empty body not allowed")]
    EmptyBody,

    #[error("empty JSON array not allowed on append")]
    EmptyArrayNotAllowed,

    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::ConfigMismatch | ServiceError::ContentTypeMismatch { .. } => {
                ErrorCode::Conflict
            }
            ServiceError::SequenceConflict(_) => ErrorCode::SequenceConflict,
            ServiceError::SequenceGap { .. } => ErrorCode::SequenceGap,
            ServiceError::StaleEpoch { .. } => ErrorCode::StaleEpoch,
            ServiceError::InvalidOffset(_) => ErrorCode::InvalidOffset,
            ServiceError::TtlConflict
            | ServiceError::InvalidTtl
            | ServiceError::InvalidExpiresAt
            | ServiceError::EmptyBody
            | ServiceError::EmptyArrayNotAllowed
            | ServiceError::BadRequest(_) => ErrorCode::InvalidRequest,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = StatusCode::from_u16(code.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.to_string();

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json");

        if let ServiceError::SequenceGap { expected, received } = &self {
            builder = builder
                .header(
                    durable_streams_common::headers::PRODUCER_EXPECTED_SEQ,
                    expected.to_string(),
                )
                .header(
                    durable_streams_common::headers::PRODUCER_RECEIVED_SEQ,
                    received.to_string(),
                );
        }
        if let ServiceError::StaleEpoch { server_epoch } = &self {
            builder = builder.header(
                durable_streams_common::headers::PRODUCER_EPOCH,
                server_epoch.to_string(),
            );
        }

        let body = serde_json::json!({
            "errorCode": code.as_str(),
            "message": message,
        });

        builder
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}
