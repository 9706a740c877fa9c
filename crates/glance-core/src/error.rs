//! Error types for the negotiation engine.

use thiserror::Error;

use crate::codec::DescriptorKind;
use crate::session::SessionState;

/// Result type alias using the engine's error type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A local capture device class, used in acquisition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaDevice {
    Screen,
    Camera,
    Microphone,
}

impl std::fmt::Display for MediaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaDevice::Screen => write!(f, "screen capture"),
            MediaDevice::Camera => write!(f, "camera"),
            MediaDevice::Microphone => write!(f, "microphone"),
        }
    }
}

/// Failure to decode an encoded payload token.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The token is not valid text in the safe-text alphabet.
    #[error("token is not valid base64 text")]
    InvalidText,

    /// The token carries a scheme marker this decoder does not know.
    #[error("unknown token scheme marker {0:?}")]
    UnknownScheme(char),

    /// The token names a scheme this build was compiled without.
    #[error("token scheme {0:?} is not available in this build")]
    UnsupportedScheme(&'static str),

    /// The compressed payload could not be inflated.
    #[error("corrupt compressed payload: {0}")]
    Corrupt(String),

    /// The decoded bytes are not a structurally valid descriptor.
    #[error("payload is not a valid session descriptor: {0}")]
    Malformed(String),
}

/// Top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The device/browser cannot capture this media class at all.
    /// Fatal to the offering role, non-fatal to the viewing role.
    #[error("{0} is not supported in this environment")]
    UnsupportedEnvironment(MediaDevice),

    /// The user declined media access.
    #[error("permission denied for {0}")]
    PermissionDenied(MediaDevice),

    /// The device was never captured for this session, so there is
    /// nothing to toggle.
    #[error("{0} was not captured in this session")]
    DeviceNotCaptured(MediaDevice),

    /// Malformed or garbled payload from the remote peer. The session
    /// stays in its current state so the caller may retry.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The peer supplied a structurally valid payload of the wrong kind
    /// (e.g. an offer where an answer was expected).
    #[error("expected {expected} payload, got {got}")]
    UnexpectedPayload {
        expected: DescriptorKind,
        got: DescriptorKind,
    },

    /// No connected signal within the overall session deadline.
    #[error("negotiation timed out")]
    NegotiationTimeout,

    /// The underlying transport reported an error.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Operation invoked in a state that does not permit it.
    #[error("cannot {op} while session is {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
}

impl EngineError {
    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }
}
