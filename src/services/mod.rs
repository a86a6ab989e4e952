/// Fan-out of accepted pixels to live connections.
pub mod broadcast_service;
/// Cell reads and writes on top of the key-value store.
pub mod canvas_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// HTTP hook notified of accepted placements.
pub mod notify_service;
/// Validation and commit of placement requests.
pub mod placement_service;
/// Per-identity cooldowns.
pub mod rate_limiter;
/// Rate-limited grid reads.
pub mod snapshot_service;
/// Background connection and health supervision of the store.
pub mod storage_supervisor;
/// WebSocket connection lifecycle.
pub mod websocket_service;
