//! Room directory.
//!
//! A room is identified by a short code people can read aloud. The
//! coordinator's network identity is derived from the code by a fixed prefix,
//! so anyone holding the code can reach the room without a lookup service.
//!
//! Followers bind a random personal address instead; it doubles as their
//! participant id and is where they accept channels if they are ever promoted.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use tandem_proto::PeerAddr;
use thiserror::Error;

use crate::env::{Environment, random_base36};

/// Prefix mapping a room code to the coordinator's address.
pub const ROOM_PREFIX: &str = "tandem-room-";

/// Prefix of follower addresses.
pub const PEER_PREFIX: &str = "tandem-peer-";

/// Random characters in a follower address.
const PEER_TOKEN_LEN: usize = 12;

/// Four characters of `[0-9A-Z]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomCode(String);

/// A string that is not a room code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("room codes are {} letters or digits, got {input:?}", RoomCode::LEN)]
pub struct ParseRoomCodeError {
    input: String,
}

impl RoomCode {
    /// Characters in a code.
    pub const LEN: usize = 4;

    /// Random code.
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self(random_base36(env, Self::LEN).to_ascii_uppercase())
    }

    /// Random code distinct from every code in `tried`.
    pub fn generate_excluding<E: Environment>(env: &E, tried: &[RoomCode]) -> Self {
        loop {
            let code = Self::generate(env);
            if !tried.contains(&code) {
                return code;
            }
        }
    }

    /// Code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Coordinator address for this room.
    pub fn to_address(&self) -> PeerAddr {
        code_to_address(self)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ParseRoomCodeError;

    /// Parses user input. Surrounding whitespace and letter case are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == Self::LEN && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(code))
        } else {
            Err(ParseRoomCodeError { input: s.to_owned() })
        }
    }
}

impl Serialize for RoomCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Coordinator address for `code`. Pure and injective.
pub fn code_to_address(code: &RoomCode) -> PeerAddr {
    PeerAddr::new(format!("{ROOM_PREFIX}{code}"))
}

/// Inverse of [`code_to_address`], for display. `None` for non-room addresses.
pub fn address_to_code(addr: &PeerAddr) -> Option<RoomCode> {
    addr.as_str().strip_prefix(ROOM_PREFIX)?.parse().ok()
}

/// Fresh follower address.
pub fn personal_address<E: Environment>(env: &E) -> PeerAddr {
    PeerAddr::new(format!("{PEER_PREFIX}{}", random_base36(env, PEER_TOKEN_LEN)))
}
