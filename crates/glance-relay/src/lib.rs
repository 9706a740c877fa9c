//! Payload relay for Glance signaling.
//!
//! Hosts create a room, publish their offer payload, and poll the
//! answer slot; viewers do the reverse. The relay is a dumb store: it
//! never decodes payloads and forgets everything when a room expires.

#![forbid(unsafe_code)]

pub mod routes;
pub mod store;

pub use routes::router;
pub use store::{spawn_purge_loop, RoomStore, DEFAULT_PURGE_INTERVAL, DEFAULT_ROOM_TTL};
