//! Library crate for place-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Storage layer.
pub mod dao;
/// Wire types of the HTTP and WebSocket surfaces.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Axum routers.
pub mod routes;
/// Business logic.
pub mod services;
/// Shared application state.
pub mod state;
