//! Protocol messages.
//!
//! Every message is a tagged record `{ "kind": KIND, "payload": {...} }`
//! encoded as CBOR. Followers send commands upstream; the coordinator sends
//! state downstream.
//!
//! | kind             | direction             |
//! |------------------|-----------------------|
//! | `JOIN`           | follower → coordinator |
//! | `NEXT_TURN`      | follower → coordinator |
//! | `CHOOSE_FORFEIT` | follower → coordinator |
//! | `STATE_SYNC`     | coordinator → follower |
//! | `REMOVED`        | coordinator → follower |

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
    ids::ParticipantId,
    state::GameState,
};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Ask the coordinator to admit the sender. Idempotent by `id`.
    Join {
        /// Display name.
        name: String,
        /// Sender's participant id (its network address).
        id: ParticipantId,
    },
    /// Advance to the next player and draw a prompt.
    NextTurn {},
    /// Swap the current prompt for a forfeit.
    ChooseForfeit {},
    /// Full replacement of the follower's mirrored state.
    StateSync {
        /// The coordinator's state after the latest mutation.
        state: GameState,
    },
    /// The recipient has been removed from the session.
    Removed {},
}

/// Envelope probe used to tell unknown kinds apart from corrupt payloads.
#[derive(Deserialize)]
struct KindProbe {
    kind: String,
}

impl Message {
    /// Every kind tag this build understands.
    pub const KINDS: [&'static str; 5] =
        ["JOIN", "NEXT_TURN", "CHOOSE_FORFEIT", "STATE_SYNC", "REMOVED"];

    /// Kind tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "JOIN",
            Self::NextTurn {} => "NEXT_TURN",
            Self::ChooseForfeit {} => "CHOOSE_FORFEIT",
            Self::StateSync { .. } => "STATE_SYNC",
            Self::Removed {} => "REMOVED",
        }
    }

    /// Encode the CBOR envelope.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Cbor(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a CBOR envelope.
    ///
    /// Unknown kinds yield [`ProtocolError::UnknownKind`] so receivers can
    /// log them distinctly from corrupt payloads.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let probe: KindProbe =
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Cbor(e.to_string()))?;

        if !Self::KINDS.contains(&probe.kind.as_str()) {
            return Err(ProtocolError::UnknownKind(probe.kind));
        }

        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Cbor(e.to_string()))
    }

    /// Wrap this message in a frame.
    pub fn into_frame(self) -> Result<Frame> {
        Frame::new(self.to_cbor()?)
    }

    /// Extract a message from a frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::from_cbor(&frame.payload)
    }
}
