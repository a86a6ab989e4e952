/// Snapshot endpoint payloads.
pub mod canvas;
/// Health endpoint payloads.
pub mod health;
/// Query validation helpers.
pub mod validation;
/// WebSocket messages.
pub mod ws;
