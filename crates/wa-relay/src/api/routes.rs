//! Router assembly.

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;
use crate::auth::auth_middleware;

/// Build the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // Routes that drive the session require the shared token.
    let protected_routes = Router::new()
        .route("/whatsapp/qrcode", get(handlers::get_qrcode))
        .route("/whatsapp/disconnect", post(handlers::disconnect))
        .route("/send-message", post(handlers::send_message))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/whatsapp/status", get(handlers::get_status))
        .with_state(state);

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(ServiceBuilder::new().layer(trace_layer).layer(cors))
}
