use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::ToSchema;

use crate::state::canvas::Pixel;

/// Placement request sent by canvas WebSocket clients.
///
/// Coordinates travel as decimal strings; they are parsed before any store key is built.
#[serde_as]
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlacementRequest {
    /// Column as a decimal string.
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String, example = "3")]
    pub x: u32,
    /// Row as a decimal string.
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String, example = "4")]
    pub y: u32,
    /// Opaque color, stored verbatim.
    #[schema(example = "#FF0000")]
    pub color: String,
    /// Optional client-chosen identifier echoed in the push.
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

impl From<PlacementRequest> for Pixel {
    fn from(value: PlacementRequest) -> Self {
        Self {
            x: value.x,
            y: value.y,
            color: value.color,
            origin_id: value.user_id,
        }
    }
}

/// Pixel pushed to every connection after a placement is accepted.
#[serde_as]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PixelMessage {
    /// Column as a decimal string.
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub x: u32,
    /// Row as a decimal string.
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub y: u32,
    /// Color as placed.
    pub color: String,
    /// `userId` of the placement, `null` when absent.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl From<Pixel> for PixelMessage {
    fn from(value: Pixel) -> Self {
        Self {
            x: value.x,
            y: value.y,
            color: value.color,
            user_id: value.origin_id,
        }
    }
}

/// Error notice: malformed payload, rate-limit denial or server-side failure.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorNotice {
    /// Human readable reason.
    #[serde(rename = "Error")]
    pub error: String,
}

/// Acknowledgement of an accepted placement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlacementAck {
    /// Seconds before the next placement will be accepted.
    #[serde(rename = "waitSeconds")]
    pub wait_seconds: f64,
}

/// Every message the server writes to a canvas WebSocket.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Sent to the originator only.
    Error(ErrorNotice),
    /// Sent to the originator only.
    Ack(PlacementAck),
    /// Sent to every connection.
    Pixel(PixelMessage),
}

impl ServerMessage {
    /// Error notice carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorNotice {
            error: message.into(),
        })
    }
}
