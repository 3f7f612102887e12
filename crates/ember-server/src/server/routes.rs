//! Router assembly.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::require_auth;

use super::chat::{chat_stream_get, chat_stream_post};
use super::health::healthz;
use super::selftest::selftest;
use super::state::AppState;

/// Build the full application router.
///
/// `cors_origins` lists allowed browser origins; empty allows any origin.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let authed = Router::new()
        .route(
            "/api/chat/stream",
            get(chat_stream_get).post(chat_stream_post),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.jwt),
            require_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/stream/selftest", get(selftest))
        .merge(authed)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
