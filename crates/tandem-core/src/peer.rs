//! Peer state machine.
//!
//! A [`Peer`] is one participant: coordinator, follower, or terminated. It is
//! a pure state machine in the action pattern:
//! - [`Peer::handle`] accepts a [`PeerEvent`]
//! - and returns `Result<Vec<PeerAction>, SessionError>`
//! - the driver executes the actions (send frames, open channels, arm timers,
//!   update the UI) and feeds the results back as events
//!
//! The driver must deliver events one at a time. That is the only
//! serialization the protocol needs: every write to the game state and to the
//! channel set happens inside a single `handle` call.
//!
//! # Roles
//!
//! ```text
//!                       promotion
//!  ┌──────────┐ <─────────────────────── ┌──────────┐
//!  │Coordinator│                         │ Follower │
//!  └──────────┘                          └──────────┘
//!                                              │ removed / no successor
//!                                              ↓
//!                                        ┌────────────┐
//!                                        │ Terminated │
//!                                        └────────────┘
//! ```

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use tandem_proto::{Frame, GameState, Message, Participant, ParticipantId, PeerAddr};
use tracing::{info, warn};

use crate::{
    config::ProtocolConfig,
    content::ContentProvider,
    coordinator::Coordinator,
    env::Environment,
    error::{CommandError, SessionError, TransportError},
    follower::{Follower, MigrationState, Transition},
    membership,
    presentation::{PresentationEvent, RemovalReason},
};

/// Driver-assigned channel handle, unique per peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Timers a peer can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Close a kicked channel once `REMOVED` had time to arrive.
    KickGrace(ChannelId),
    /// Reconnect to the elected successor. `attempt` discards stale firings.
    Rejoin {
        /// Migration attempt this timer belongs to.
        attempt: u32,
    },
    /// Promoted coordinator gives up on followers that never came back.
    RejoinWindow,
}

/// Commands issued by the local UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Leave the lobby and draw the first prompt. Coordinator only.
    StartSession,
    /// Move to the next player.
    AdvanceTurn,
    /// Swap the current prompt for a forfeit.
    ChooseForfeit,
    /// Remove a participant. Coordinator only.
    Kick(ParticipantId),
    /// Add a player sharing the coordinator's device. Coordinator only.
    AddLocalPlayer(String),
    /// Switch the content category. Coordinator only.
    SelectCategory(String),
}

/// Inputs to [`Peer::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The local UI issued a command.
    Command(Command),
    /// A listener accepted an incoming channel.
    Accepted {
        /// New channel.
        channel: ChannelId,
        /// Dialer's identity.
        remote: PeerAddr,
    },
    /// An outgoing channel requested by [`PeerAction::Connect`] opened.
    Connected {
        /// New channel.
        channel: ChannelId,
        /// Identity dialed.
        remote: PeerAddr,
    },
    /// An outgoing channel requested by [`PeerAction::Connect`] failed.
    ConnectFailed {
        /// Identity dialed.
        remote: PeerAddr,
        /// Why.
        error: TransportError,
    },
    /// A frame arrived.
    Received {
        /// Channel it arrived on.
        channel: ChannelId,
        /// Encoded frame.
        frame: Bytes,
    },
    /// A channel closed, from either end.
    Closed {
        /// Closed channel.
        channel: ChannelId,
    },
    /// A timer armed with [`PeerAction::StartTimer`] expired.
    TimerFired(Timer),
}

/// Effects for the driver to carry out, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAction {
    /// Send an encoded frame. Fire-and-forget.
    Send {
        /// Target channel.
        channel: ChannelId,
        /// Encoded frame.
        frame: Bytes,
    },
    /// Close a channel.
    Close {
        /// Channel to close.
        channel: ChannelId,
    },
    /// Open a channel to `remote`; report back with `Connected` or
    /// `ConnectFailed`.
    Connect {
        /// Identity to dial.
        remote: PeerAddr,
    },
    /// Start accepting channels on this peer's own address.
    Listen,
    /// Arm a timer, replacing any armed timer with the same key.
    StartTimer {
        /// Timer key.
        timer: Timer,
        /// Delay.
        after: Duration,
    },
    /// Disarm a timer.
    CancelTimer {
        /// Timer key.
        timer: Timer,
    },
    /// Forward to the presentation sink.
    Present(PresentationEvent),
}

/// Which role a peer currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    /// Owns the authoritative state.
    Coordinator,
    /// Mirrors the coordinator.
    Follower,
    /// Session over.
    Terminated,
}

/// Read-only view of a peer for UIs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// Own participant id.
    pub id: ParticipantId,
    /// Current role.
    pub role: RoleKind,
    /// Authoritative state or last mirrored state.
    pub state: Option<GameState>,
    /// Follower migration state.
    pub migration: Option<MigrationState>,
    /// Why the session ended, once it has.
    pub terminated: Option<RemovalReason>,
}

/// Everything both roles share.
pub(crate) struct Context<E> {
    pub env: E,
    pub config: ProtocolConfig,
    pub content: Arc<dyn ContentProvider>,
    /// This participant as it appears in the player list.
    pub me: Participant,
}

enum Role {
    Coordinator(Coordinator),
    Follower(Follower),
    Terminated { reason: RemovalReason, last_state: Option<GameState> },
}

/// One participant in a session.
pub struct Peer<E> {
    ctx: Context<E>,
    role: Role,
}

impl<E: Environment> Peer<E> {
    /// Create the coordinator of a new room bound at `address`.
    ///
    /// Returns the initial presentation actions.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a blank name, or an unknown category.
    pub fn host(
        env: E,
        config: ProtocolConfig,
        content: Arc<dyn ContentProvider>,
        address: PeerAddr,
        name: &str,
        category: &str,
    ) -> Result<(Self, Vec<PeerAction>), SessionError> {
        config.validate()?;
        let name = membership::normalize_name(name).ok_or(CommandError::EmptyName)?;
        if !content.has_category(category) {
            return Err(CommandError::UnknownCategory(category.to_owned()).into());
        }

        let me = Participant::remote(address, name);
        let mut state = GameState::new(category);
        state.players.push(me.clone());

        info!(participant = %me.id, category, "hosting new session");
        let coordinator = Coordinator::new(state);
        let actions = coordinator.presented();
        let ctx = Context { env, config, content, me };
        Ok((Self { ctx, role: Role::Coordinator(coordinator) }, actions))
    }

    /// Create a follower bound at `address` that will join `coordinator`.
    ///
    /// The driver opens the first channel itself and reports it with
    /// [`PeerEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Invalid configuration or a blank name.
    pub fn join(
        env: E,
        config: ProtocolConfig,
        content: Arc<dyn ContentProvider>,
        address: PeerAddr,
        name: &str,
        coordinator: PeerAddr,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let name = membership::normalize_name(name).ok_or(CommandError::EmptyName)?;
        let me = Participant::remote(address, name);

        info!(participant = %me.id, coordinator = %coordinator, "joining session");
        let ctx = Context { env, config, content, me };
        Ok(Self { ctx, role: Role::Follower(Follower::new(coordinator)) })
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Only [`PeerEvent::Command`] can fail; network and timer events that
    /// cannot be applied are logged and dropped.
    pub fn handle(&mut self, event: PeerEvent) -> Result<Vec<PeerAction>, SessionError> {
        if let PeerEvent::Command(command) = event {
            return self.command(command);
        }

        let actions = match &mut self.role {
            Role::Coordinator(coordinator) => coordinator.handle(&self.ctx, event),
            Role::Follower(follower) => {
                let (mut actions, transition) = follower.handle(&self.ctx, event);
                if let Some(transition) = transition {
                    actions.extend(self.transition(transition));
                }
                actions
            },
            Role::Terminated { .. } => Vec::new(),
        };
        Ok(actions)
    }

    fn command(&mut self, command: Command) -> Result<Vec<PeerAction>, SessionError> {
        match &mut self.role {
            Role::Coordinator(coordinator) => Ok(coordinator.command(&self.ctx, command)?),
            Role::Follower(follower) => follower.command(&self.ctx, command),
            Role::Terminated { reason: RemovalReason::Kicked, .. } => Err(SessionError::Removed),
            Role::Terminated { reason: RemovalReason::NoSuccessor, .. } => {
                Err(SessionError::NoSuccessor)
            },
        }
    }

    fn transition(&mut self, transition: Transition) -> Vec<PeerAction> {
        let Role::Follower(follower) = &mut self.role else {
            return Vec::new();
        };

        match transition {
            Transition::Promote(state) => {
                let (coordinator, actions) = Coordinator::promoted(&self.ctx, state);
                self.role = Role::Coordinator(coordinator);
                actions
            },
            Transition::Terminate(reason) => {
                let mut actions = follower.teardown();
                let last_state = follower.take_mirror();
                info!(participant = %self.ctx.me.id, %reason, "session over");
                actions.push(PeerAction::Present(PresentationEvent::Notice(reason.notice())));
                actions.push(PeerAction::Present(PresentationEvent::Removed(reason)));
                self.role = Role::Terminated { reason, last_state };
                actions
            },
        }
    }

    /// Own participant id.
    pub fn id(&self) -> &ParticipantId {
        &self.ctx.me.id
    }

    /// Own display name.
    pub fn name(&self) -> &str {
        &self.ctx.me.name
    }

    /// Own network address.
    pub fn address(&self) -> Option<&PeerAddr> {
        self.ctx.me.address()
    }

    /// Current role.
    pub fn role(&self) -> RoleKind {
        match self.role {
            Role::Coordinator(_) => RoleKind::Coordinator,
            Role::Follower(_) => RoleKind::Follower,
            Role::Terminated { .. } => RoleKind::Terminated,
        }
    }

    /// Authoritative state, or the follower's mirror.
    pub fn state(&self) -> Option<&GameState> {
        match &self.role {
            Role::Coordinator(coordinator) => Some(coordinator.state()),
            Role::Follower(follower) => follower.mirror(),
            Role::Terminated { last_state, .. } => last_state.as_ref(),
        }
    }

    /// Follower migration state.
    pub fn migration(&self) -> Option<MigrationState> {
        match &self.role {
            Role::Follower(follower) => Some(follower.migration()),
            Role::Terminated { .. } => Some(MigrationState::Terminated),
            Role::Coordinator(_) => None,
        }
    }

    /// Why the session ended, once it has.
    pub fn termination(&self) -> Option<RemovalReason> {
        match self.role {
            Role::Terminated { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Read-only view.
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            id: self.ctx.me.id.clone(),
            role: self.role(),
            state: self.state().cloned(),
            migration: self.migration(),
            terminated: self.termination(),
        }
    }
}

/// Encode a message as a frame, logging instead of failing.
pub(crate) fn encode(message: Message) -> Option<Bytes> {
    let kind = message.kind();
    match message.into_frame() {
        Ok(frame) => Some(frame.to_bytes()),
        Err(error) => {
            warn!(kind, %error, "failed to encode message");
            None
        },
    }
}

/// Decode a received frame.
pub(crate) fn decode(bytes: &[u8]) -> Result<Message, SessionError> {
    let frame = Frame::decode(bytes)?;
    Ok(Message::from_frame(&frame)?)
}
