//! Error types.
//!
//! [`SessionError`] is what the UI sees. It carries the session-level
//! taxonomy (address collisions, unreachable rooms, coordinator loss, and the
//! two terminal outcomes) plus locally rejected commands and bad
//! configuration.

use tandem_proto::{ParticipantId, PeerAddr, ProtocolError};
use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Another endpoint is already bound at this address.
    #[error("address {0} is already taken")]
    AddressTaken(PeerAddr),

    /// Nobody is listening at this address.
    #[error("{0} is unreachable")]
    Unreachable(PeerAddr),

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,
}

/// A command rejected before it touched any state.
///
/// Rejected commands never produce a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Starting requires more players.
    #[error("need at least {need} players to start, have {have}")]
    NotEnoughPlayers {
        /// Players currently in the session.
        have: usize,
        /// Minimum required.
        need: usize,
    },

    /// Turn commands require a started session.
    #[error("the session has not started")]
    NotStarted,

    /// The session is already running.
    #[error("the session has already started")]
    AlreadyStarted,

    /// Only the coordinator can do this.
    #[error("only the host can do that")]
    NotCoordinator,

    /// The follower has not been admitted yet.
    #[error("not yet admitted to the session")]
    NotAttached,

    /// No participant with this id.
    #[error("no participant {0}")]
    UnknownParticipant(ParticipantId),

    /// The coordinator cannot remove itself.
    #[error("the host cannot remove themselves")]
    CannotKickSelf,

    /// No content is configured for this category.
    #[error("unknown category {0:?}")]
    UnknownCategory(String),

    /// Names must contain something other than whitespace.
    #[error("name must not be empty")]
    EmptyName,

    /// Turn-order enforcement is on and it is someone else's turn.
    #[error("it is not your turn")]
    NotYourTurn,
}

/// Invalid configuration or content catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `min_players` below the protocol floor of two.
    #[error("min_players must be at least 2, got {0}")]
    MinPlayersTooLow(usize),

    /// Rejoin delay window is inverted.
    #[error("rejoin delay window is inverted: {min_ms}ms > {max_ms}ms")]
    InvertedRejoinWindow {
        /// Lower bound in milliseconds.
        min_ms: u128,
        /// Upper bound in milliseconds.
        max_ms: u128,
    },

    /// Room creation needs at least one attempt.
    #[error("room_code_attempts must be at least 1")]
    NoRoomCodeAttempts,

    /// The catalog defines no categories.
    #[error("content catalog is empty")]
    EmptyCatalog,

    /// A category lacks prompts or forfeits.
    #[error("category {category:?} has no {pool}")]
    EmptyPool {
        /// Category name.
        category: String,
        /// `"prompts"` or `"forfeits"`.
        pool: &'static str,
    },

    /// A configured category collides with the aggregate category.
    #[error("category name {0:?} is reserved")]
    ReservedCategory(String),

    /// Catalog JSON could not be parsed.
    #[error("invalid catalog: {0}")]
    Catalog(String),
}

/// Errors surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The room address is bound by someone else.
    #[error("room address {0} is taken")]
    AddressTaken(PeerAddr),

    /// No coordinator answered at the room address.
    #[error("could not reach {0}")]
    Unreachable(PeerAddr),

    /// The coordinator vanished and migration is under way.
    #[error("connection to the host was lost; reconnecting")]
    CoordinatorLost,

    /// The coordinator vanished and nobody can take over.
    #[error("the session ended: no participant could take over hosting")]
    NoSuccessor,

    /// This participant was removed by the coordinator.
    #[error("you were removed from the session")]
    Removed,

    /// A frame could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] ProtocolError),

    /// The command was rejected locally.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// How a caller should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorProperties {
    /// The session is over for this participant.
    pub is_terminal: bool,
    /// Trying again (possibly with fresh input) can succeed.
    pub is_retryable: bool,
}

impl SessionError {
    /// Classify this error.
    pub fn properties(&self) -> ErrorProperties {
        match self {
            Self::AddressTaken(_) | Self::Unreachable(_) | Self::CoordinatorLost => {
                ErrorProperties { is_terminal: false, is_retryable: true }
            },
            Self::NoSuccessor | Self::Removed => {
                ErrorProperties { is_terminal: true, is_retryable: false }
            },
            Self::MalformedMessage(_) | Self::Command(_) | Self::Config(_) => {
                ErrorProperties { is_terminal: false, is_retryable: false }
            },
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AddressTaken(addr) => Self::AddressTaken(addr),
            TransportError::Unreachable(addr) => Self::Unreachable(addr),
            TransportError::Closed => Self::CoordinatorLost,
        }
    }
}
