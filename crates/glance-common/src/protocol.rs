//! Wire types for the relay key-value store.
//!
//! The relay moves opaque encoded payloads between the two peers of a
//! session; it never inspects them. Rooms are addressed by a short
//! [`RoomCode`](crate::RoomCode) and expire after a bounded lifetime.

use serde::{Deserialize, Serialize};

use crate::RoomCode;

/// Which negotiation slot of a room a payload occupies.
///
/// The host publishes into `Offer` and waits on `Answer`; the viewer
/// does the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSlot {
    Offer,
    Answer,
}

impl PayloadSlot {
    /// URL path segment for this slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadSlot::Offer => "offer",
            PayloadSlot::Answer => "answer",
        }
    }

    /// The slot the peer on the other side publishes into.
    pub fn peer(&self) -> PayloadSlot {
        match self {
            PayloadSlot::Offer => PayloadSlot::Answer,
            PayloadSlot::Answer => PayloadSlot::Offer,
        }
    }
}

/// Response to room creation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoomCreated {
    pub code: RoomCode,
    /// Seconds until the room is purged if not released earlier.
    pub expires_in_secs: u64,
}

/// Body for publishing a payload into a room slot.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublishPayload {
    pub payload: String,
}

/// Response when fetching a room slot.
///
/// `payload` is `None` while the peer has not published yet.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SlotContents {
    pub payload: Option<String>,
}

/// Generic error body from the relay.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayError {
    pub message: String,
}
