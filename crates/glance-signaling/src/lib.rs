//! Signaling channels for Glance.
//!
//! The engine produces and consumes opaque payload tokens; this crate
//! moves them between the two peers. [`RelayClient`] talks to a
//! glance-relay instance over HTTP; [`ManualExchange`] pairs two
//! in-process channels for copy/paste-style flows and tests.

#![forbid(unsafe_code)]

pub mod manual;
pub mod relay;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use manual::{ManualChannel, ManualExchange};
pub use relay::{RelayChannel, RelayClient};

#[derive(Debug, Error)]
pub enum SignalError {
    /// The relay rejected or failed the request.
    #[error("relay request failed: {0}")]
    Relay(String),

    /// The room expired or never existed.
    #[error("room expired or not found")]
    RoomExpired,

    /// No peer payload arrived within the wait budget.
    #[error("timed out waiting for the peer payload")]
    Timeout,

    /// The other end of a manual exchange went away.
    #[error("peer channel closed")]
    Closed,
}

/// One side of a payload exchange.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Publish this side's payload token.
    async fn publish(&self, payload: &str) -> Result<(), SignalError>;

    /// Wait until the peer's payload token shows up.
    async fn wait_for_peer(&self, timeout: Duration) -> Result<String, SignalError>;
}
