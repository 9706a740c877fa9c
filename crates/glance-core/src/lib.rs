//! Glance negotiation engine.
//!
//! Everything needed to take a share session from local capture to a
//! connected peer link: the descriptor payload codec, candidate
//! gathering control, remote track routing, and the session state
//! machine. Transport and capture backends plug in through the
//! [`transport::PeerTransport`] and [`media::MediaSource`] seams.

#![forbid(unsafe_code)]

pub mod codec;
pub mod dummy;
pub mod error;
pub mod gathering;
pub mod media;
pub mod router;
pub mod session;
pub mod transport;

pub use codec::{DescriptorKind, EncodedPayload, SessionDescriptor};
pub use error::{DecodeError, EngineError, MediaDevice, Result};
pub use session::{ConnectionSession, Role, SessionConfig, SessionEvent, SessionSlot, SessionState};
