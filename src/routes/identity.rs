//! Network identity of the caller, used to key cooldown records.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use tracing::warn;

use crate::{
    error::AppError,
    state::{SharedState, canvas::ClientIdentity},
};

const FORWARDED_FOR: &str = "x-forwarded-for";

impl FromRequestParts<SharedState> for ClientIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if state.config().trust_forwarded_for {
            if let Some(ip) = forwarded_for(&parts.headers) {
                return Ok(ClientIdentity::new(ip.to_string()));
            }
        }

        let ConnectInfo(addr) = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .copied()
            .ok_or_else(|| {
                warn!("peer address missing from request extensions");
                AppError::Internal("peer address unavailable".into())
            })?;
        Ok(ClientIdentity::new(addr.ip().to_canonical().to_string()))
    }
}

/// First address of the `X-Forwarded-For` chain, when it parses.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    value.split(',').next()?.trim().parse().ok()
}
