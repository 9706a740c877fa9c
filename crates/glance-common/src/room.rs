//! Human-shareable room codes for the relay store.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of digits in a room code.
pub const ROOM_CODE_DIGITS: usize = 6;

/// A fixed-width numeric room code, e.g. `493028`.
///
/// Room codes are the short identifier a person reads aloud or types in;
/// the relay store maps them to the session's payload slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(u32);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid room code: expected {ROOM_CODE_DIGITS} digits")]
pub struct InvalidRoomCode;

impl RoomCode {
    /// Generate a random room code using the thread-local RNG.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        // 100000..=999999: always exactly six digits, no leading zero.
        RoomCode(rng.gen_range(100_000..1_000_000))
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for RoomCode {
    type Err = InvalidRoomCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != ROOM_CODE_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidRoomCode);
        }
        s.parse::<u32>().map(RoomCode).map_err(|_| InvalidRoomCode)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = InvalidRoomCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.to_string()
    }
}
