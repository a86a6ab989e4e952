use axum::Router;

use crate::state::SharedState;

/// Snapshot route.
pub mod canvas;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Health check route.
pub mod health;
/// Client identity extraction.
pub mod identity;
/// WebSocket upgrade route.
pub mod websocket;

/// Compose all route trees and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(canvas::router())
        .merge(websocket::router())
        .merge(docs::router());

    api_router.with_state(state)
}
