//! DTOs of the snapshot endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Raw snapshot query. Values stay strings so parse failures can be reported as JSON.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SnapshotQuery {
    /// Number of columns to return, `1..=max_columns`.
    pub columns: Option<String>,
    /// Number of rows to return, `1..=max_rows`.
    pub rows: Option<String>,
}

/// Full-grid read, indexed as `pixels[x][y]`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    /// Cell colors, one inner vector per column.
    pub pixels: Vec<Vec<String>>,
    /// Seconds until the caller may place its next pixel.
    #[serde(rename = "timeLeft")]
    pub time_left: f64,
}

/// Body of a `429 Too Many Requests` answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct TooManyRequestsBody {
    /// Milliseconds until the snapshot cooldown elapses.
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
    /// Human readable explanation.
    pub message: String,
}

impl TooManyRequestsBody {
    /// Body for a caller that must wait `retry_after`.
    pub fn new(retry_after: Duration) -> Self {
        Self {
            retry_after: u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            message: "Too many requests. Please try again later.".into(),
        }
    }
}
