//! Replicated game state.
//!
//! [`GameState`] is the single record the coordinator owns and broadcasts in
//! full. Followers replace their mirror wholesale on every sync; nothing in
//! this module merges or diffs.

use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, PeerAddr};

/// How a participant is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    /// Puppeted from the coordinator's own interface. Has no channel, cannot
    /// coordinate, and does not survive the coordinator.
    Local,
    /// Reachable at its own network address.
    Remote(PeerAddr),
}

/// One entry in the turn order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Unique within the player list.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Local puppet or remote peer.
    pub presence: Presence,
}

impl Participant {
    /// Remote participant identified by its network address.
    pub fn remote(addr: PeerAddr, name: impl Into<String>) -> Self {
        Self { id: ParticipantId::from(&addr), name: name.into(), presence: Presence::Remote(addr) }
    }

    /// Local participant with a coordinator-minted identifier.
    pub fn local(id: ParticipantId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), presence: Presence::Local }
    }

    /// True for coordinator-puppeted entries.
    pub fn is_local(&self) -> bool {
        matches!(self.presence, Presence::Local)
    }

    /// Network address, if the participant has one.
    pub fn address(&self) -> Option<&PeerAddr> {
        match &self.presence {
            Presence::Remote(addr) => Some(addr),
            Presence::Local => None,
        }
    }
}

/// Turn phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Lobby; the session has not started.
    #[default]
    Idle,
    /// The current player faces a prompt.
    Prompt,
    /// The current player declined the prompt and faces a forfeit.
    Forfeit,
}

/// Presentation tag travelling with the current card. The protocol never
/// interprets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentColor {
    /// No card on the table.
    #[default]
    Neutral,
    /// Prompt card styling.
    Prompt,
    /// Forfeit card styling.
    Forfeit,
}

/// Authoritative session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Turn order; new participants are appended.
    pub players: Vec<Participant>,
    /// Index into `players` of whose turn it is.
    pub current_player_index: usize,
    /// Turn phase.
    pub phase: Phase,
    /// Card text; `Some` exactly when `phase` is not [`Phase::Idle`].
    pub current_content: Option<String>,
    /// Card styling tag.
    pub content_color: ContentColor,
    /// Active content category.
    pub category: String,
}

impl GameState {
    /// Empty lobby for the given category.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            players: Vec::new(),
            current_player_index: 0,
            phase: Phase::Idle,
            current_content: None,
            content_color: ContentColor::Neutral,
            category: category.into(),
        }
    }

    /// Position of `id` in the turn order.
    pub fn position(&self, id: &ParticipantId) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    /// True if `id` is in the player list.
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.position(id).is_some()
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Participant whose turn it is, if any.
    pub fn current_player(&self) -> Option<&Participant> {
        self.players.get(self.current_player_index)
    }

    /// True once the session has started.
    pub fn is_started(&self) -> bool {
        self.phase != Phase::Idle
    }
}
