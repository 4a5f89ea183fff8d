use axum::body::Body;
use axum::http::{Request, StatusCode};
use durable_streams_server::{create_router, AppState, ServerOptions};
use durable_streams_server::registry::StreamRegistry;
use tower::ServiceExt;

fn test_app() -> axum::Router {
    create_router(AppState {
        registry: StreamRegistry::new(),
        options: ServerOptions {
            long_poll_timeout_ms: 200,
            ..ServerOptions::default()
        },
    })
}

async fn send(app: &axum::Router, req: Request<Body>) -> axum::http::Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_bytes(response: axum::http::Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn header(response: &axum::http::Response<Body>, name: &str) -> String {
    response
        .headers()
        .get(name)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn create_then_append_then_read_round_trips() {
    let app = test_app();

    let create = send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/orders")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(create.status(), StatusCode::CREATED);

    let append = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/orders")
            .header("content-type", "text/plain")
            .body(Body::from("first"))
            .unwrap(),
    )
    .await;
    assert_eq!(append.status(), StatusCode::OK);
    let after_first = header(&append, "stream-next-offset");

    let append2 = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/orders")
            .header("content-type", "text/plain")
            .body(Body::from("second"))
            .unwrap(),
    )
    .await;
    let after_second = header(&append2, "stream-next-offset");
    assert!(after_second > after_first);

    let read = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/orders?offset=-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(read.status(), StatusCode::OK);
    let body = body_bytes(read).await;
    assert_eq!(body, b"firstsecond");
}

#[tokio::test]
async fn json_streams_are_wrapped_in_an_array_over_http() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap(),
    )
    .await;

    let read = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/events?offset=-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let body = body_bytes(read).await;
    assert_eq!(body, br#"[{"a":1}]"#.to_vec());
}

#[tokio::test]
async fn idempotent_producer_dedups_retransmit_and_rejects_later_gap() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/payments")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let first = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/payments")
            .header("content-type", "text/plain")
            .header("producer-id", "p1")
            .header("producer-epoch", "0")
            .header("producer-seq", "0")
            .body(Body::from("charge"))
            .unwrap(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_offset = header(&first, "stream-next-offset");

    let retransmit = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/payments")
            .header("content-type", "text/plain")
            .header("producer-id", "p1")
            .header("producer-epoch", "0")
            .header("producer-seq", "0")
            .body(Body::from("charge"))
            .unwrap(),
    )
    .await;
    assert_eq!(retransmit.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&retransmit, "stream-next-offset"), first_offset);

    let second = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/payments")
            .header("content-type", "text/plain")
            .header("producer-id", "p1")
            .header("producer-epoch", "0")
            .header("producer-seq", "1")
            .body(Body::from("second charge"))
            .unwrap(),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);

    let gap = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/payments")
            .header("content-type", "text/plain")
            .header("producer-id", "p1")
            .header("producer-epoch", "0")
            .header("producer-seq", "5")
            .body(Body::from("too far"))
            .unwrap(),
    )
    .await;
    assert_eq!(gap.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn sequence_gap_on_idempotent_append_is_rejected() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/gapstream")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let gap = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/gapstream")
            .header("content-type", "text/plain")
            .header("producer-id", "p1")
            .header("producer-epoch", "0")
            .header("producer-seq", "5")
            .body(Body::from("oops"))
            .unwrap(),
    )
    .await;
    assert_eq!(gap.status(), StatusCode::CONFLICT);
    assert_eq!(header(&gap, "producer-expected-seq"), "0");
}

#[tokio::test]
async fn long_poll_returns_no_content_on_timeout_when_up_to_date() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/idle")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/idle?offset=-1&live=long-poll")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&response, "stream-up-to-date"), "true");
}

#[tokio::test]
async fn long_poll_wakes_immediately_on_concurrent_append() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/live")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let waiter_app = app.clone();
    let waiter = tokio::spawn(async move {
        waiter_app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/live?offset=-1&live=long-poll")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/live")
            .header("content-type", "text/plain")
            .body(Body::from("woke up"))
            .unwrap(),
    )
    .await;

    let response = waiter.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(body, b"woke up");
}

#[tokio::test]
async fn long_poll_with_offset_now_delivers_the_next_committed_record() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/now-sub")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let waiter_app = app.clone();
    let waiter = tokio::spawn(async move {
        waiter_app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/now-sub?offset=now&live=long-poll")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/now-sub")
            .header("content-type", "text/plain")
            .body(Body::from("after now"))
            .unwrap(),
    )
    .await;

    let response = waiter.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(body, b"after now");
}

#[tokio::test]
async fn delete_then_read_is_not_found() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/gone")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let deleted = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/gone")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/gone?offset=-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_idempotent_stream_seq_must_strictly_increase() {
    let app = test_app();

    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/ordered")
            .header("content-type", "text/plain")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let first = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/ordered")
            .header("content-type", "text/plain")
            .header("stream-seq", "9")
            .body(Body::from("one"))
            .unwrap(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let replay = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/ordered")
            .header("content-type", "text/plain")
            .header("stream-seq", "9")
            .body(Body::from("replayed"))
            .unwrap(),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::CONFLICT);

    // Numeric, not lexicographic: 10 must be accepted as greater than 9.
    let next = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/ordered")
            .header("content-type", "text/plain")
            .header("stream-seq", "10")
            .body(Body::from("two"))
            .unwrap(),
    )
    .await;
    assert_eq!(next.status(), StatusCode::OK);
}
