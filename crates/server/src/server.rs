//! Router assembly, ambient middleware, and process entry point.

use crate::config::ServerOptions;
use crate::handlers::{append, create, delete, head, read};
use crate::registry::StreamRegistry;
use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete as delete_method, get, head as head_method, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    pub options: ServerOptions,
}

/// Build the router with all stream endpoints and ambient middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/{*path}", put(create::handle_create))
        .route("/{*path}", head_method(head::handle_head))
        .route("/{*path}", get(read::handle_read))
        .route("/{*path}", post(append::handle_append))
        .route("/{*path}", delete_method(delete::handle_delete))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Every response carries a small, fixed set of security headers
/// regardless of which handler produced it, so adding a new route can
/// never silently drop them.
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert(
        "cross-origin-resource-policy",
        HeaderValue::from_static("cross-origin"),
    );
    response
}

/// Bind and serve until the process is signaled to stop.
pub async fn start_server(options: ServerOptions) -> std::io::Result<()> {
    let registry = StreamRegistry::new();
    let state = AppState {
        registry,
        options: options.clone(),
    };

    let router = create_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!(%addr, "starting durable streams server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        create_router(AppState {
            registry: StreamRegistry::new(),
            options: ServerOptions::default(),
        })
    }

    #[tokio::test]
    async fn unknown_stream_head_is_not_found() {
        let app = test_app();
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("HEAD")
                    .uri("/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn every_response_carries_security_headers() {
        let app = test_app();
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("HEAD")
                    .uri("/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(
            response.headers().get("cross-origin-resource-policy").unwrap(),
            "cross-origin"
        );
    }
}
