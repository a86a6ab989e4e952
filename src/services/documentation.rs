use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Place Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::canvas::snapshot,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::canvas::SnapshotResponse,
            crate::dto::canvas::TooManyRequestsBody,
            crate::dto::ws::PlacementRequest,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::ErrorNotice,
            crate::dto::ws::PlacementAck,
            crate::dto::ws::PixelMessage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "canvas", description = "Canvas snapshot reads"),
        (name = "ws", description = "WebSocket placement and live pixel updates"),
    )
)]
pub struct ApiDoc;
