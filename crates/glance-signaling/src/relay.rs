//! HTTP client for the glance-relay room store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use glance_common::protocol::{PayloadSlot, PublishPayload, RoomCreated, SlotContents};
use glance_common::RoomCode;

use crate::{SignalError, SignalingChannel};

/// How often a waiting side re-checks the peer slot.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn relay_error(e: reqwest::Error) -> SignalError {
    SignalError::Relay(e.to_string())
}

fn check_status(status: StatusCode) -> Result<(), SignalError> {
    match status {
        StatusCode::NOT_FOUND => Err(SignalError::RoomExpired),
        s if s.is_success() => Ok(()),
        s => Err(SignalError::Relay(format!("relay returned {s}"))),
    }
}

/// Client for one relay instance.
#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        RelayClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn slot_url(&self, code: RoomCode, slot: PayloadSlot) -> String {
        format!("{}/rooms/{}/{}", self.base_url, code, slot.as_str())
    }

    /// Allocate a fresh room.
    pub async fn create_room(&self) -> Result<RoomCode, SignalError> {
        let response = self
            .http
            .post(format!("{}/rooms", self.base_url))
            .send()
            .await
            .map_err(relay_error)?;
        check_status(response.status())?;
        let created: RoomCreated = response.json().await.map_err(relay_error)?;
        debug!(code = %created.code, expires_in_secs = created.expires_in_secs, "room created");
        Ok(created.code)
    }

    /// Release a room before its lifetime runs out.
    pub async fn release_room(&self, code: RoomCode) -> Result<(), SignalError> {
        let response = self
            .http
            .delete(format!("{}/rooms/{}", self.base_url, code))
            .send()
            .await
            .map_err(relay_error)?;
        check_status(response.status())
    }

    /// The channel for one side of a room: publishes into `slot` and
    /// waits on the peer's slot.
    pub fn channel(&self, code: RoomCode, slot: PayloadSlot) -> RelayChannel {
        RelayChannel {
            client: self.clone(),
            code,
            slot,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// One side of a relay room.
pub struct RelayChannel {
    client: RelayClient,
    code: RoomCode,
    slot: PayloadSlot,
    poll_interval: Duration,
}

impl RelayChannel {
    pub fn code(&self) -> RoomCode {
        self.code
    }

    /// Override the slot poll cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn fetch_peer(&self) -> Result<Option<String>, SignalError> {
        let response = self
            .client
            .http
            .get(self.client.slot_url(self.code, self.slot.peer()))
            .send()
            .await
            .map_err(relay_error)?;
        check_status(response.status())?;
        let contents: SlotContents = response.json().await.map_err(relay_error)?;
        Ok(contents.payload)
    }
}

#[async_trait]
impl SignalingChannel for RelayChannel {
    async fn publish(&self, payload: &str) -> Result<(), SignalError> {
        let response = self
            .client
            .http
            .put(self.client.slot_url(self.code, self.slot))
            .json(&PublishPayload {
                payload: payload.to_string(),
            })
            .send()
            .await
            .map_err(relay_error)?;
        check_status(response.status())
    }

    async fn wait_for_peer(&self, timeout: Duration) -> Result<String, SignalError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(payload) = self.fetch_peer().await? {
                return Ok(payload);
            }
            if tokio::time::Instant::now() + self.poll_interval > deadline {
                return Err(SignalError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
