use crate::cursor::{generate_response_cursor, parse_cursor, CursorOptions};
use crate::error::ServiceError;
use crate::registry::ReadResult;
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{sse::Event, IntoResponse, Response, Sse},
};
use chrono::Utc;
use durable_streams_common::headers::{
    CACHE_CONTROL, STREAM_CURSOR, STREAM_NEXT_OFFSET, STREAM_UP_TO_DATE,
};
use durable_streams_common::offset::RequestOffset;
use durable_streams_common::sse::{normalize_newlines, ControlEvent};
use futures::Stream;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub cursor: Option<String>,
}

/// `GET /{path}` - catch-up, long-poll, or SSE read, dispatched by `?live=`.
pub async fn handle_read(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let path = format!("/{path}");
    let now = Utc::now();

    if !state.registry.exists(&path, now) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let raw_offset = query.offset.as_deref().unwrap_or("-1");
    let offset = match RequestOffset::parse(raw_offset) {
        Ok(o) => o,
        Err(_) => return ServiceError::InvalidOffset(raw_offset.to_string()).into_response(),
    };

    let cursor_options = CursorOptions {
        interval_secs: state.options.cursor_interval_secs,
    };
    let client_cursor = query.cursor.as_deref().and_then(parse_cursor);
    let response_cursor = generate_response_cursor(
        client_cursor.unwrap_or(now.timestamp() as u64),
        cursor_options,
    );

    match query.live.as_deref() {
        Some("sse") => handle_sse(state, path, offset, response_cursor, cursor_options).await,
        Some("long-poll") => handle_long_poll(state, path, offset, response_cursor).await,
        _ => handle_catch_up(state, path, offset, response_cursor),
    }
}

fn catch_up_response(
    state: &AppState,
    path: &str,
    result: &ReadResult,
    cursor: u64,
    status: StatusCode,
) -> Response {
    let body = state.registry.format_records(path, &result.records);
    let mut response = Response::builder()
        .status(status)
        .header(STREAM_NEXT_OFFSET, result.next_offset.encode())
        .header(STREAM_CURSOR, cursor.to_string())
        .header(STREAM_UP_TO_DATE, result.up_to_date.to_string());

    if let Some(ct) = state.registry.content_type(path) {
        response = response.header(header::CONTENT_TYPE, ct);
    }

    response.body(Body::from(body)).unwrap()
}

fn handle_catch_up(state: AppState, path: String, offset: RequestOffset, cursor: u64) -> Response {
    let now = Utc::now();
    match state.registry.read(&path, &offset, now) {
        Ok(result) => catch_up_response(&state, &path, &result, cursor, StatusCode::OK),
        Err(e) => e.into_response(),
    }
}

async fn handle_long_poll(state: AppState, path: String, offset: RequestOffset, cursor: u64) -> Response {
    let now = Utc::now();
    let result = match state.registry.read(&path, &offset, now) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    if !result.records.is_empty() {
        return catch_up_response(&state, &path, &result, cursor, StatusCode::OK);
    }

    // Resolve `now`/`beginning` to a concrete cursor before waiting: the
    // next read, on wake, must start exactly after `next_offset`, not
    // re-run the original sentinel (which for `now` always yields zero
    // records, starving every subsequent read forever).
    let offset = RequestOffset::At(result.next_offset);

    let mut rx = state.registry.subscribe();
    let timeout_duration = Duration::from_millis(state.options.long_poll_timeout_ms);

    let woke = timeout(timeout_duration, async {
        loop {
            match rx.recv().await {
                Ok(notification) if notification.path == path => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await;

    match woke {
        Ok(true) => {
            let now = Utc::now();
            match state.registry.read(&path, &offset, now) {
                Ok(result) => catch_up_response(&state, &path, &result, cursor, StatusCode::OK),
                Err(e) => e.into_response(),
            }
        }
        Ok(false) | Err(_) => {
            let head = state.registry.head(&path, Utc::now());
            let tail = head.map(|h| h.tail).unwrap_or(result.next_offset);
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(STREAM_NEXT_OFFSET, tail.encode())
                .header(STREAM_CURSOR, cursor.to_string())
                .header(STREAM_UP_TO_DATE, "true")
                .header(CACHE_CONTROL, "no-store")
                .body(Body::empty())
                .unwrap()
        }
    }
}

async fn handle_sse(
    state: AppState,
    path: String,
    offset: RequestOffset,
    cursor: u64,
    cursor_options: CursorOptions,
) -> Response {
    let heartbeat = Duration::from_millis(state.options.sse_heartbeat_ms);
    let stream = create_sse_stream(state.clone(), path, offset, cursor, cursor_options);

    Sse::new(stream)
        .keep_alive(
            axum::response::sse::KeepAlive::new()
                .interval(heartbeat)
                .text("keepalive"),
        )
        .into_response()
}

fn create_sse_stream(
    state: AppState,
    path: String,
    mut offset: RequestOffset,
    cursor: u64,
    cursor_options: CursorOptions,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let mut rx = state.registry.subscribe();
        let mut current_cursor = cursor;

        if let Ok(result) = state.registry.read(&path, &offset, Utc::now()) {
            for record in &result.records {
                let text = String::from_utf8_lossy(&record.data);
                yield Ok(Event::default().event("data").data(normalize_newlines(&text)));
            }

            // Resolve to a concrete cursor regardless of whether any
            // records were just replayed: `now`/`beginning` on an
            // otherwise-empty backlog must still advance to the tail so
            // the wait loop below observes newly committed records.
            offset = RequestOffset::At(result.next_offset);

            current_cursor = generate_response_cursor(current_cursor, cursor_options);
            let control = ControlEvent {
                stream_next_offset: result.next_offset.encode(),
                stream_cursor: Some(current_cursor.to_string()),
                up_to_date: result.up_to_date,
            };
            yield Ok(Event::default().event("control").data(serde_json::to_string(&control).unwrap()));
        }

        loop {
            let timeout_duration = Duration::from_millis(state.options.long_poll_timeout_ms);

            match timeout(timeout_duration, rx.recv()).await {
                Ok(Ok(notification)) if notification.path == path => {
                    if let Ok(result) = state.registry.read(&path, &offset, Utc::now()) {
                        for record in &result.records {
                            let text = String::from_utf8_lossy(&record.data);
                            yield Ok(Event::default().event("data").data(normalize_newlines(&text)));
                        }
                        offset = RequestOffset::At(result.next_offset);

                        current_cursor = generate_response_cursor(current_cursor, cursor_options);
                        let control = ControlEvent {
                            stream_next_offset: result.next_offset.encode(),
                            stream_cursor: Some(current_cursor.to_string()),
                            up_to_date: result.up_to_date,
                        };
                        yield Ok(Event::default().event("control").data(serde_json::to_string(&control).unwrap()));
                    }
                }
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => break,
                Err(_) => {
                    current_cursor = generate_response_cursor(current_cursor, cursor_options);
                    let tail = state
                        .registry
                        .head(&path, Utc::now())
                        .map(|h| h.tail.encode())
                        .unwrap_or_default();

                    let control = ControlEvent {
                        stream_next_offset: tail,
                        stream_cursor: Some(current_cursor.to_string()),
                        up_to_date: true,
                    };
                    yield Ok(Event::default().event("control").data(serde_json::to_string(&control).unwrap()));
                }
            }
        }
    }
}
