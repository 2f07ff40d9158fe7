//! HTTP command front-end.
//!
//! Every route lives under `/v1` and requires the configured password in
//! the `Authorization` header. Failures are rendered as [`ApiError`]
//! bodies.
//!
//! [`ApiError`]: crate::common::errors::ApiError

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::server::AppState;

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/search", get(handlers::search))
        .route("/rooms", get(handlers::list_rooms))
        .route("/rooms/{room_id}/play", post(handlers::play))
        .route("/rooms/{room_id}/queue", get(handlers::get_queue))
        .route("/rooms/{room_id}/nowplaying", get(handlers::now_playing))
        .route("/rooms/{room_id}/skip", post(handlers::skip))
        .route("/rooms/{room_id}/pause", post(handlers::pause))
        .route("/rooms/{room_id}/resume", post(handlers::resume))
        .route("/rooms/{room_id}/start", post(handlers::start))
        .route("/rooms/{room_id}/connection", delete(handlers::disconnect));

    Router::new()
        .nest(API_V1, v1_routes)
        .layer(from_fn_with_state(state.clone(), middleware::check_auth))
        .layer(from_fn(middleware::add_response_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
