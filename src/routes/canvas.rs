use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::canvas::{SnapshotQuery, SnapshotResponse, TooManyRequestsBody},
    error::AppError,
    services::snapshot_service,
    state::{SharedState, canvas::ClientIdentity},
};

/// Routes serving canvas reads.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(snapshot))
}

/// Read the top-left `columns × rows` block of the canvas, indexed as `pixels[x][y]`.
#[utoipa::path(
    get,
    path = "/",
    tag = "canvas",
    params(SnapshotQuery),
    responses(
        (status = 200, description = "Current colors", body = SnapshotResponse),
        (status = 400, description = "Missing, non-numeric or non-positive dimension"),
        (status = 413, description = "Dimension above the configured maximum"),
        (status = 429, description = "Snapshot cooldown still running", body = TooManyRequestsBody),
        (status = 503, description = "Store unreachable (degraded mode)")
    )
)]
pub async fn snapshot(
    State(state): State<SharedState>,
    identity: ClientIdentity,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SnapshotResponse>, AppError> {
    let response = snapshot_service::get_snapshot(&state, &identity, &query).await?;
    Ok(Json(response))
}
