use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::ServerMessage,
    error::ServiceError,
    services::placement_service,
    state::{
        SharedState,
        canvas::{ClientIdentity, ConnectionId},
        hub::DeliveryReceiver,
    },
};

/// A frame the socket does not accept within this delay means the client stopped reading.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type Outbound = mpsc::Sender<Message>;

/// Internal error type for placement handling on a socket.
///
/// Distinct from `ServiceError` which is also used for HTTP responses.
#[derive(Debug, Error)]
enum PlacementError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// Error from the store or the rate limiter.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Handle the full lifecycle of one canvas WebSocket connection.
///
/// The read loop, the delivery forwarder and the socket writer run concurrently on this
/// task. Whichever ends first flips the shared shutdown flag and the other two follow; the
/// connection is unregistered once all three have returned.
///
/// The outbound queue is bounded like the delivery channel, so a client that stops reading
/// backs up into its delivery channel until fan-out drops it.
pub async fn handle_socket(state: SharedState, identity: ClientIdentity, socket: WebSocket) {
    let id = ConnectionId::new();
    let deliveries = state.hub().register(id, identity.clone()).await;
    info!(connection = %id, identity = %identity, "canvas client connected");

    let (sink, stream) = socket.split();
    let capacity = state.config().delivery_buffer.max(1);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(capacity);
    let (shutdown, _) = watch::channel(false);

    tokio::join!(
        read_loop(&state, &identity, id, stream, outbound_tx.clone(), &shutdown),
        forward_deliveries(id, deliveries, outbound_tx, &shutdown),
        write_loop(id, sink, outbound_rx, &shutdown),
    );

    state.hub().unregister(id).await;
    info!(connection = %id, identity = %identity, "canvas client disconnected");
}

async fn read_loop(
    state: &SharedState,
    identity: &ClientIdentity,
    id: ConnectionId,
    mut stream: SplitStream<WebSocket>,
    outbound: Outbound,
    shutdown: &watch::Sender<bool>,
) {
    let mut stop = shutdown.subscribe();

    loop {
        let frame = tokio::select! {
            _ = stopped(&mut stop) => break,
            frame = stream.next() => frame,
        };

        let result = match frame {
            Some(Ok(Message::Text(text))) => {
                handle_placement(state, identity, &outbound, text.as_str().as_bytes()).await
            }
            Some(Ok(Message::Binary(bytes))) => {
                handle_placement(state, identity, &outbound, &bytes).await
            }
            Some(Ok(Message::Ping(payload))) => outbound
                .send(Message::Pong(payload))
                .await
                .map_err(|_| PlacementError::ConnectionClosed),
            Some(Ok(Message::Pong(_))) => Ok(()),
            Some(Ok(Message::Close(_))) | None => {
                debug!(connection = %id, "client closed the connection");
                break;
            }
            Some(Err(err)) => {
                warn!(connection = %id, error = %err, "websocket error");
                break;
            }
        };

        match result {
            Ok(()) => {}
            Err(PlacementError::ConnectionClosed) => {
                info!(connection = %id, "connection closed during placement handling, terminating");
                break;
            }
            Err(PlacementError::Service(err)) => {
                warn!(connection = %id, identity = %identity, error = %err, "placement failed");
                let notice = ServerMessage::error(err.client_message());
                if send_message_to_websocket(&outbound, &notice).await.is_err() {
                    break;
                }
            }
        }
    }

    shutdown.send_replace(true);
}

/// Validate, rate-check and commit one placement, then answer the originator.
async fn handle_placement(
    state: &SharedState,
    identity: &ClientIdentity,
    outbound: &Outbound,
    payload: &[u8],
) -> Result<(), PlacementError> {
    let outcome = placement_service::place_pixel(state, identity, payload).await?;
    send_message_to_websocket(outbound, &outcome.reply()).await
}

/// Move pixels from the connection's delivery channel onto its outbound queue.
///
/// Waits while the outbound queue is full, which leaves pixels piling up in the delivery
/// channel where fan-out notices them.
async fn forward_deliveries(
    id: ConnectionId,
    mut deliveries: DeliveryReceiver,
    outbound: Outbound,
    shutdown: &watch::Sender<bool>,
) {
    let mut stop = shutdown.subscribe();

    loop {
        let pixel = tokio::select! {
            _ = stopped(&mut stop) => break,
            pixel = deliveries.recv() => pixel,
        };
        let Some(pixel) = pixel else {
            // The hub dropped our channel, typically because we fell behind.
            debug!(connection = %id, "delivery channel closed");
            break;
        };
        let message = ServerMessage::Pixel(pixel.into());
        let sent = tokio::select! {
            _ = stopped(&mut stop) => break,
            sent = send_message_to_websocket(&outbound, &message) => sent,
        };
        if sent.is_err() {
            break;
        }
    }

    shutdown.send_replace(true);
}

/// Sole owner of the socket sink.
///
/// After shutdown it keeps flushing until every producer is gone, then closes the socket
/// exactly once. A failed or timed out write skips the close since the transport is no
/// longer usable; dropping the receiver then fails every pending producer.
async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    shutdown: &watch::Sender<bool>,
) {
    let mut stop = shutdown.subscribe();

    loop {
        let message = tokio::select! {
            biased;
            message = outbound.recv() => message,
            _ = stopped(&mut stop) => break,
        };
        let Some(message) = message else { break };
        if !write_frame(id, &mut sink, message).await {
            shutdown.send_replace(true);
            return;
        }
    }

    shutdown.send_replace(true);
    while let Some(message) = outbound.recv().await {
        if !write_frame(id, &mut sink, message).await {
            return;
        }
    }
    match timeout(WRITE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(connection = %id, error = %err, "websocket close failed"),
        Err(_) => debug!(connection = %id, "websocket close timed out"),
    }
}

/// Write one frame. Returns `false` once the socket is unusable.
async fn write_frame(
    id: ConnectionId,
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
) -> bool {
    match timeout(WRITE_TIMEOUT, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!(connection = %id, error = %err, "websocket write failed");
            false
        }
        Err(_) => {
            warn!(connection = %id, "websocket write timed out; client stopped reading");
            false
        }
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Serialize a payload and push it onto the provided WebSocket sender, waiting for room.
///
/// Returns `Ok(())` if the message was queued or if serialization failed (permanent error,
/// no point retrying). Returns `Err(PlacementError::ConnectionClosed)` if the writer channel
/// is closed.
async fn send_message_to_websocket<T>(tx: &Outbound, value: &T) -> Result<(), PlacementError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}` (permanent error, not retrying)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .await
        .map_err(|_| PlacementError::ConnectionClosed)
}
