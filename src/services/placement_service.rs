//! Validation, rate check and commit of a single placement request.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    dto::ws::{PlacementAck, PlacementRequest, ServerMessage},
    error::ServiceError,
    services::{canvas_service, rate_limiter::OperationKind},
    state::{
        SharedState,
        canvas::{ClientIdentity, Pixel},
    },
};

/// Reply sent for payloads that do not describe a pixel inside the grid.
pub const MALFORMED_PAYLOAD: &str = "Badly formed payload";

/// What happened to one inbound placement message.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// The pixel was stored and queued for broadcast.
    Accepted { pixel: Pixel, wait: Duration },
    /// The identity is still cooling down; nothing was written.
    Denied {
        cooldown: Duration,
        time_remaining: Duration,
    },
    /// The payload was not a valid pixel; no rate-limit slot was consumed.
    Malformed,
}

impl PlacementOutcome {
    /// Message written back to the originating socket.
    pub fn reply(&self) -> ServerMessage {
        match self {
            PlacementOutcome::Accepted { wait, .. } => ServerMessage::Ack(PlacementAck {
                wait_seconds: wait.as_secs_f64(),
            }),
            PlacementOutcome::Denied { cooldown, .. } => ServerMessage::error(format!(
                "rate limit exceeded of 1 request per {:.0} seconds",
                cooldown.as_secs_f64()
            )),
            PlacementOutcome::Malformed => ServerMessage::error(MALFORMED_PAYLOAD),
        }
    }
}

/// Decode a raw payload into an in-bounds pixel.
pub fn parse_pixel(config: &AppConfig, payload: &[u8]) -> Option<Pixel> {
    let request: PlacementRequest = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(err) => {
            debug!(error = %err, "rejecting malformed placement payload");
            return None;
        }
    };

    if !config.contains(request.x, request.y) {
        debug!(x = request.x, y = request.y, "rejecting out-of-bounds placement");
        return None;
    }
    Some(request.into())
}

/// Run one placement through validation, the cooldown check and the commit.
///
/// Store failures surface as [`ServiceError`]; the caller decides what the client sees.
pub async fn place_pixel(
    state: &SharedState,
    identity: &ClientIdentity,
    payload: &[u8],
) -> Result<PlacementOutcome, ServiceError> {
    let config = state.config();
    let Some(pixel) = parse_pixel(&config, payload) else {
        return Ok(PlacementOutcome::Malformed);
    };

    let store = state.require_store().await?;
    let limiter = state.rate_limiter();
    let approval = limiter
        .try_acquire(store.as_ref(), identity, OperationKind::Placement)
        .await?;
    let cooldown = limiter.cooldown(OperationKind::Placement);

    if !approval.approved {
        debug!(
            identity = %identity,
            remaining_secs = approval.time_remaining.as_secs_f64(),
            "placement denied by cooldown"
        );
        return Ok(PlacementOutcome::Denied {
            cooldown,
            time_remaining: approval.time_remaining,
        });
    }

    {
        // Writes to one cell reach the store and the broadcast queue in the same order.
        let _cell = state.cell_locks().lock(&(pixel.x, pixel.y)).await;
        canvas_service::paint(store.as_ref(), &pixel).await?;
        if !state.broadcaster().enqueue(pixel.clone()) {
            warn!(
                x = pixel.x,
                y = pixel.y,
                "broadcast engine stopped; pixel stored but not pushed"
            );
        }
    }
    if let Some(notifier) = state.notifier() {
        notifier.notify(pixel.clone());
    }

    debug!(identity = %identity, x = pixel.x, y = pixel.y, color = %pixel.color, "placement accepted");
    Ok(PlacementOutcome::Accepted {
        pixel,
        wait: cooldown,
    })
}
