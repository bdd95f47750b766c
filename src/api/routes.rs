//! Router assembly: API routes, the WebSocket endpoint and static assets.

use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;
use crate::config::expand_path;
use crate::ws;

pub fn create_router(state: AppState) -> Router {
    let static_dir = expand_path(&state.config.server.static_dir);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/generate", post(handlers::generate))
        .route("/ws", get(ws::websocket))
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
        .layer(build_cors_layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
