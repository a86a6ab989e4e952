//! Optional HTTP hook told about every accepted placement.

use std::{sync::Arc, time::Duration};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{dto::ws::PixelMessage, state::canvas::Pixel};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures of a single notification attempt. They are logged and never reach the client.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build notification client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to send notification to `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode notification response from `{url}` (status {status})")]
    DecodeResponse {
        url: String,
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },
}

/// Reply expected from the hook endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotifyReply {
    /// Set by the hook when it rejected the pixel.
    #[serde(rename = "Error")]
    pub error: String,
    /// Informational text on success.
    #[serde(rename = "Message")]
    pub message: String,
}

/// POSTs accepted pixels to a fixed URL.
#[derive(Clone)]
pub struct PlacementNotifier {
    client: Client,
    url: Arc<str>,
}

impl PlacementNotifier {
    /// Notifier posting to `url` with a bounded request timeout.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| NotifyError::ClientBuilder { source })?;
        Ok(Self {
            client,
            url: Arc::from(url.into()),
        })
    }

    /// Fire and forget: the POST runs on its own task.
    pub fn notify(&self, pixel: Pixel) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.post(pixel).await {
                warn!(url = %notifier.url, error = %err, "placement notification failed");
            }
        })
    }

    /// Send one notification and log the hook's reply.
    pub async fn post(&self, pixel: Pixel) -> Result<NotifyReply, NotifyError> {
        let body = PixelMessage::from(pixel);
        let response = self
            .client
            .post(self.url.as_ref())
            .json(&body)
            .send()
            .await
            .map_err(|source| NotifyError::RequestSend {
                url: self.url.to_string(),
                source,
            })?;

        let status = response.status();
        let reply: NotifyReply =
            response
                .json()
                .await
                .map_err(|source| NotifyError::DecodeResponse {
                    url: self.url.to_string(),
                    status,
                    source,
                })?;

        if status == StatusCode::OK {
            debug!(url = %self.url, message = %reply.message, "placement notification delivered");
        } else {
            warn!(url = %self.url, %status, error = %reply.error, "placement notification rejected");
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use tokio::{net::TcpListener, sync::mpsc};

    use super::*;

    async fn spawn_hook(status: StatusCode, reply: Value) -> (String, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/hook",
            post(move |Json(body): Json<Value>| {
                let tx = tx.clone();
                let reply = reply.clone();
                async move {
                    let _ = tx.send(body);
                    (status, Json(reply))
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), rx)
    }

    fn pixel() -> Pixel {
        Pixel {
            x: 3,
            y: 4,
            color: "#FF0000".into(),
            origin_id: Some("alice".into()),
        }
    }

    #[tokio::test]
    async fn posts_pixel_in_wire_format() {
        let (url, mut bodies) =
            spawn_hook(StatusCode::OK, json!({"Error": "", "Message": "stored"})).await;
        let notifier = PlacementNotifier::new(url).unwrap();

        let reply = notifier.post(pixel()).await.unwrap();

        assert_eq!(reply.message, "stored");
        assert_eq!(
            bodies.recv().await.unwrap(),
            json!({"x": "3", "y": "4", "color": "#FF0000", "userId": "alice"})
        );
    }

    #[tokio::test]
    async fn rejected_notification_is_not_an_error() {
        let (url, _bodies) =
            spawn_hook(StatusCode::BAD_REQUEST, json!({"Error": "nope"})).await;
        let notifier = PlacementNotifier::new(url).unwrap();

        let reply = notifier.post(pixel()).await.unwrap();
        assert_eq!(reply.error, "nope");
        assert!(reply.message.is_empty());
    }

    #[tokio::test]
    async fn unreachable_hook_only_fails_the_background_task() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let notifier = PlacementNotifier::new(format!("http://{addr}/hook")).unwrap();

        assert!(matches!(
            notifier.post(pixel()).await,
            Err(NotifyError::RequestSend { .. })
        ));
        notifier.notify(pixel()).await.unwrap();
    }
}
