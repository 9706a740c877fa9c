//! WebRTC backend for the Glance engine.
//!
//! [`RtcTransportFactory`] plugs a real peer connection into the
//! session state machine; [`SyntheticMediaSource`] provides sample-fed
//! placeholder tracks where no capture pipeline is wired up.

#![forbid(unsafe_code)]

pub mod media;
pub mod transport;

pub use media::{RtcLocalTrack, SyntheticMediaSource};
pub use transport::{RtcConfig, RtcPeerTransport, RtcTransportFactory};
