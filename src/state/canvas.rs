use std::fmt;

use uuid::Uuid;

/// A color assigned to one grid coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixel {
    /// Column, `0..max_columns`.
    pub x: u32,
    /// Row, `0..max_rows`.
    pub y: u32,
    /// Opaque client-supplied color, stored verbatim.
    pub color: String,
    /// Free-form identifier supplied by the client that placed the pixel.
    pub origin_id: Option<String>,
}

/// Network identity used to key rate-limit records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wrap an already-resolved address string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Key fragment used in rate-limit records.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique handle of one live WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
