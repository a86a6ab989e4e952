//! Rate-limited reads of the top-left block of the canvas.

use tracing::debug;

use crate::{
    dto::{
        canvas::{SnapshotQuery, SnapshotResponse},
        validation::GridDimensions,
    },
    error::ServiceError,
    services::{canvas_service, rate_limiter::OperationKind},
    state::{SharedState, canvas::ClientIdentity},
};

/// Read a `columns × rows` grid for `identity`.
///
/// Dimensions are checked before the store is touched. The snapshot cooldown starts only
/// once the grid has been read successfully.
pub async fn get_snapshot(
    state: &SharedState,
    identity: &ClientIdentity,
    query: &SnapshotQuery,
) -> Result<SnapshotResponse, ServiceError> {
    let dims = GridDimensions::from_query(query)?;
    let config = state.config();
    let columns = bounded(dims.columns, config.max_columns, "columns")?;
    let rows = bounded(dims.rows, config.max_rows, "rows")?;

    let store = state.require_store().await?;
    let limiter = state.rate_limiter();

    let approval = limiter
        .approve(store.as_ref(), identity, OperationKind::Snapshot)
        .await?;
    if !approval.approved {
        return Err(ServiceError::RateLimited {
            retry_after: approval.time_remaining,
        });
    }

    let pixels = canvas_service::read_grid(
        store.as_ref(),
        columns,
        rows,
        &config.default_color,
        config.snapshot_concurrency,
    )
    .await?;

    let placement = limiter
        .approve(store.as_ref(), identity, OperationKind::Placement)
        .await?;
    limiter
        .record(store.as_ref(), identity, OperationKind::Snapshot)
        .await?;

    debug!(identity = %identity, columns, rows, "snapshot served");
    Ok(SnapshotResponse {
        pixels,
        time_left: placement.time_remaining.as_secs_f64(),
    })
}

fn bounded(value: i64, max: u32, field: &str) -> Result<u32, ServiceError> {
    u32::try_from(value)
        .ok()
        .filter(|value| *value <= max)
        .ok_or_else(|| ServiceError::TooLarge(format!("{field} must be at most {max}")))
}
