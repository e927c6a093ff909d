//! Presentation sink.
//!
//! The protocol never renders anything. It reports what happened as
//! [`PresentationEvent`]s inside its actions and the driver forwards them to a
//! [`Presentation`] implementation.

use std::fmt;

use tandem_proto::{GameState, Participant};

/// Receiver of everything a UI needs to show.
pub trait Presentation: Send {
    /// The replicated state changed.
    fn on_state_changed(&mut self, state: &GameState);

    /// The player list changed.
    fn on_membership_changed(&mut self, players: &[Participant]);

    /// Something worth telling the user happened.
    fn on_notice(&mut self, notice: &Notice);

    /// The session is over for this participant.
    fn on_removed(&mut self, reason: RemovalReason);
}

/// One presentation callback, as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationEvent {
    /// See [`Presentation::on_state_changed`].
    StateChanged(GameState),
    /// See [`Presentation::on_membership_changed`].
    MembershipChanged(Vec<Participant>),
    /// See [`Presentation::on_notice`].
    Notice(Notice),
    /// See [`Presentation::on_removed`].
    Removed(RemovalReason),
}

impl PresentationEvent {
    /// Invoke the matching callback on `sink`.
    pub fn dispatch(&self, sink: &mut dyn Presentation) {
        match self {
            Self::StateChanged(state) => sink.on_state_changed(state),
            Self::MembershipChanged(players) => sink.on_membership_changed(players),
            Self::Notice(notice) => sink.on_notice(notice),
            Self::Removed(reason) => sink.on_removed(*reason),
        }
    }
}

/// Human-readable session notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A participant was admitted.
    PlayerJoined {
        /// Display name.
        name: String,
    },
    /// A participant disconnected or never came back after a migration.
    PlayerLeft {
        /// Display name.
        name: String,
    },
    /// The coordinator removed a participant.
    PlayerRemoved {
        /// Display name.
        name: String,
    },
    /// The channel to the coordinator closed unexpectedly.
    CoordinatorLost {
        /// Former coordinator's display name, if known.
        name: Option<String>,
    },
    /// Waiting to reconnect to the elected successor.
    Reconnecting {
        /// Successor's display name.
        to: String,
    },
    /// Re-admitted after a migration.
    Rejoined {
        /// New coordinator's display name.
        host: String,
    },
    /// This participant took over as coordinator.
    BecameCoordinator,
    /// Nobody could take over; the session is over.
    SessionEnded,
    /// This participant was removed by the coordinator.
    Removed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayerJoined { name } => write!(f, "{name} joined"),
            Self::PlayerLeft { name } => write!(f, "{name} left"),
            Self::PlayerRemoved { name } => write!(f, "{name} was removed"),
            Self::CoordinatorLost { name: Some(name) } => {
                write!(f, "lost connection to the host ({name})")
            },
            Self::CoordinatorLost { name: None } => f.write_str("lost connection to the host"),
            Self::Reconnecting { to } => write!(f, "{to} is taking over; reconnecting"),
            Self::Rejoined { host } => write!(f, "back in the game, now hosted by {host}"),
            Self::BecameCoordinator => f.write_str("the host left; you are hosting now"),
            Self::SessionEnded => f.write_str("the session has ended"),
            Self::Removed => f.write_str("you were removed from the session"),
        }
    }
}

/// Why a participant's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// Removed by the coordinator, explicitly or by omission from a sync.
    Kicked,
    /// The coordinator left and no remaining participant could take over.
    NoSuccessor,
}

impl RemovalReason {
    /// The one notice that accompanies this outcome.
    pub fn notice(self) -> Notice {
        match self {
            Self::Kicked => Notice::Removed,
            Self::NoSuccessor => Notice::SessionEnded,
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kicked => f.write_str("removed"),
            Self::NoSuccessor => f.write_str("session ended"),
        }
    }
}
