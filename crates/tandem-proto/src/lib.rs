//! Wire format for the Tandem session protocol.
//!
//! Every message travels as a frame: a fixed 12-byte header (zero-copy
//! binary) followed by a CBOR envelope `{ kind, payload }`. The header lets a
//! receiver reject foreign or oversized traffic before touching the payload.
//!
//! The replicated [`GameState`] lives here too, since it is carried verbatim
//! inside `STATE_SYNC`.
//!
//! # Security
//!
//! All header parsing uses compile-time verified layouts via `zerocopy`. We
//! enforce a 1 MiB payload limit. Decode failures are values, never panics.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod ids;
pub mod message;
pub mod state;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use ids::{ParticipantId, PeerAddr};
pub use message::Message;
pub use state::{ContentColor, GameState, Participant, Phase, Presence};
