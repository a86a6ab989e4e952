use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use place_back::{
    config::AppConfig,
    dao::kv_store::MemoryKeyValueStore,
    routes,
    state::{AppState, SharedState, canvas::Pixel},
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::{net::TcpListener, net::TcpStream, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> SocketAddr {
    spawn_server_with(AppConfig::default()).await.0
}

async fn spawn_server_with(config: AppConfig) -> (SocketAddr, SharedState) {
    let state = AppState::new(config, None);
    state
        .install_store(Arc::new(MemoryKeyValueStore::new()))
        .await;
    let app = routes::router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _response) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn wait_for_connections(addr: SocketAddr, expected: usize) {
    for _ in 0..200 {
        let health: Value = reqwest::get(format!("http://{addr}/healthcheck"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if health["connections"] == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server never reached {expected} connections");
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn placement_is_acked_broadcast_and_rate_limited() {
    let addr = spawn_server().await;
    let mut painter = connect(addr).await;
    let mut viewer = connect(addr).await;
    wait_for_connections(addr, 2).await;

    send_json(
        &mut painter,
        json!({"x": "1", "y": "2", "color": "#FF0000", "userId": "alice"}),
    )
    .await;

    let expected_push = json!({"x": "1", "y": "2", "color": "#FF0000", "userId": "alice"});
    let mut painter_messages = vec![next_json(&mut painter).await, next_json(&mut painter).await];
    painter_messages.sort_by_key(|message| message.get("waitSeconds").is_none());
    assert_eq!(painter_messages[0], json!({"waitSeconds": 20.0}));
    assert_eq!(painter_messages[1], expected_push);
    assert_eq!(next_json(&mut viewer).await, expected_push);

    send_json(&mut painter, json!({"x": "1", "y": "2", "color": "#00FF00"})).await;
    assert_eq!(
        next_json(&mut painter).await,
        json!({"Error": "rate limit exceeded of 1 request per 20 seconds"})
    );

    send_json(&mut viewer, json!({"x": "1", "y": "oops", "color": "#00FF00"})).await;
    assert_eq!(
        next_json(&mut viewer).await,
        json!({"Error": "Badly formed payload"})
    );
}

#[tokio::test]
async fn disconnected_client_does_not_block_others() {
    let addr = spawn_server().await;
    let mut painter = connect(addr).await;
    let leaver = connect(addr).await;
    wait_for_connections(addr, 2).await;

    drop(leaver);
    wait_for_connections(addr, 1).await;

    send_json(&mut painter, json!({"x": "0", "y": "0", "color": "#123456"})).await;
    let mut seen = vec![next_json(&mut painter).await, next_json(&mut painter).await];
    seen.sort_by_key(|message| message.get("waitSeconds").is_none());
    assert_eq!(seen[1]["color"], "#123456");
    assert_eq!(seen[1]["userId"], Value::Null);
}

#[tokio::test]
async fn client_that_stops_reading_is_dropped_from_fan_out() {
    let config = AppConfig {
        delivery_buffer: 4,
        ..AppConfig::default()
    };
    let (addr, state) = spawn_server_with(config).await;
    // Never polled again, so the server's writes pile up in the socket buffers.
    let _stalled = connect(addr).await;
    wait_for_connections(addr, 1).await;

    let color = format!("#{}", "A".repeat(1024));
    for x in 0..50_000u32 {
        state.broadcaster().enqueue(Pixel {
            x: x % 1024,
            y: 0,
            color: color.clone(),
            origin_id: None,
        });
        if x % 16 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if state.hub().len().await == 0 {
                return;
            }
        }
    }
    panic!("stalled client was never unregistered");
}

#[tokio::test]
async fn snapshot_reflects_placements_and_enforces_limits() {
    let addr = spawn_server().await;
    let base = format!("http://{addr}");

    let response = reqwest::get(format!("{base}/?columns=99999&rows=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    for query in ["columns=abc&rows=1", "rows=1", "columns=0&rows=1", "columns=2&rows=-1"] {
        let response = reqwest::get(format!("{base}/?{query}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
    }

    let mut painter = connect(addr).await;
    wait_for_connections(addr, 1).await;
    send_json(&mut painter, json!({"x": "1", "y": "0", "color": "#000000"})).await;
    next_json(&mut painter).await;
    next_json(&mut painter).await;

    let response = reqwest::get(format!("{base}/?columns=2&rows=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pixels"], json!([["#D9D3D9"], ["#000000"]]));
    let time_left = body["timeLeft"].as_f64().unwrap();
    assert!(time_left > 0.0 && time_left <= 20.0, "timeLeft = {time_left}");

    let response = reqwest::get(format!("{base}/?columns=2&rows=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Too many requests. Please try again later."
    );
    let retry_after = body["retryAfter"].as_u64().unwrap();
    assert!(retry_after > 0 && retry_after <= 5_000, "retryAfter = {retry_after}");
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let addr = spawn_server().await;

    let health: Value = reqwest::get(format!("http://{addr}/healthcheck"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok", "connections": 0}));

    let doc: Value = reqwest::get(format!("http://{addr}/api-doc/openapi.json"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(doc["paths"].get("/ws").is_some());
}
