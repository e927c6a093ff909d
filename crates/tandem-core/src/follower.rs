//! Follower role and host migration.
//!
//! A follower mirrors the coordinator's [`GameState`] and forwards turn
//! commands to it. When the channel to the coordinator closes it runs the
//! migration state machine:
//!
//! ```text
//!              channel closed / connect failed
//! ┌──────────┐ ───────────────────────────────> ┌─────────────────┐
//! │ Attached │                                  │ CoordinatorLost │
//! └──────────┘ <──────────┐                     └─────────────────┘
//!                         │ connected              │     │      │
//!                   ┌───────────┐  successor is    │     │      │ no successor
//!                   │ Rejoining │ <────────────────┘     │      ↓
//!                   └───────────┘  someone else          │  ┌────────────┐
//!                                                        │  │ Terminated │
//!                        successor is self               ↓  └────────────┘
//!                                         ┌──────────────────────┐
//!                                         │ BecomingCoordinator  │
//!                                         └──────────────────────┘
//! ```
//!
//! Each pass through `CoordinatorLost` removes the lost (or unreachable)
//! coordinator from the mirror before picking the next candidate, so the
//! candidate list shrinks on every failure and the loop ends in finitely many
//! steps.

use std::time::Instant;

use tandem_proto::{GameState, Message, ParticipantId, PeerAddr, Phase};
use tracing::{debug, info, warn};

use crate::{
    env::Environment,
    error::{CommandError, SessionError},
    membership,
    peer::{ChannelId, Command, Context, PeerAction, PeerEvent, Timer, decode, encode},
    presentation::{Notice, PresentationEvent, RemovalReason},
};

/// Follower-side migration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationState {
    /// Connected to (or connecting to) a live coordinator.
    Attached,
    /// The coordinator is gone and a successor is being chosen.
    CoordinatorLost,
    /// This participant was elected and is taking over.
    BecomingCoordinator,
    /// Waiting to reconnect to the elected successor.
    Rejoining,
    /// The session is over.
    Terminated,
}

/// Role change requested by the follower.
#[derive(Debug)]
pub(crate) enum Transition {
    /// Take over with the last mirrored state.
    Promote(GameState),
    /// End the session.
    Terminate(RemovalReason),
}

pub(crate) struct Follower {
    /// Address of the coordinator currently followed or being dialed.
    coordinator: PeerAddr,
    channel: Option<ChannelId>,
    mirror: Option<GameState>,
    /// Own id appeared in a sync on the current channel.
    seen_self: bool,
    /// The current coordinator has acknowledged our JOIN.
    acknowledged: bool,
    state: MigrationState,
    migrating_since: Option<Instant>,
    attempt: u32,
}

type Step = (Vec<PeerAction>, Option<Transition>);

impl Follower {
    pub(crate) fn new(coordinator: PeerAddr) -> Self {
        Self {
            coordinator,
            channel: None,
            mirror: None,
            seen_self: false,
            acknowledged: false,
            state: MigrationState::Attached,
            migrating_since: None,
            attempt: 0,
        }
    }

    pub(crate) fn mirror(&self) -> Option<&GameState> {
        self.mirror.as_ref()
    }

    pub(crate) fn take_mirror(&mut self) -> Option<GameState> {
        self.mirror.take()
    }

    pub(crate) fn migration(&self) -> MigrationState {
        self.state
    }

    /// Abandon any pending reconnect and close the open channel.
    pub(crate) fn teardown(&mut self) -> Vec<PeerAction> {
        let mut actions = Vec::new();
        if self.state == MigrationState::Rejoining {
            actions.push(PeerAction::CancelTimer { timer: Timer::Rejoin { attempt: self.attempt } });
        }
        if let Some(channel) = self.channel.take() {
            actions.push(PeerAction::Close { channel });
        }
        self.state = MigrationState::Terminated;
        actions
    }

    pub(crate) fn command<E: Environment>(
        &self,
        ctx: &Context<E>,
        command: Command,
    ) -> Result<Vec<PeerAction>, SessionError> {
        let message = match command {
            Command::AdvanceTurn => Message::NextTurn {},
            Command::ChooseForfeit => Message::ChooseForfeit {},
            Command::StartSession
            | Command::Kick(_)
            | Command::AddLocalPlayer(_)
            | Command::SelectCategory(_) => return Err(CommandError::NotCoordinator.into()),
        };

        if self.state != MigrationState::Attached {
            return Err(SessionError::CoordinatorLost);
        }
        let (Some(channel), true) = (self.channel, self.acknowledged) else {
            return Err(CommandError::NotAttached.into());
        };
        let mirror = self.mirror.as_ref().ok_or(CommandError::NotAttached)?;
        if mirror.phase == Phase::Idle {
            return Err(CommandError::NotStarted.into());
        }
        if ctx.config.enforce_turn_order
            && mirror.current_player().is_some_and(|p| p.id != ctx.me.id)
        {
            return Err(CommandError::NotYourTurn.into());
        }

        debug!(kind = message.kind(), coordinator = %self.coordinator, "forwarding command");
        Ok(encode(message).map(|frame| vec![PeerAction::Send { channel, frame }]).unwrap_or_default())
    }

    pub(crate) fn handle<E: Environment>(&mut self, ctx: &Context<E>, event: PeerEvent) -> Step {
        match event {
            PeerEvent::Connected { channel, remote } => (self.connected(ctx, channel, &remote), None),
            PeerEvent::ConnectFailed { remote, error } => {
                if self.state == MigrationState::Rejoining && remote == self.coordinator {
                    info!(%remote, %error, "successor unreachable");
                    self.elect(ctx, &remote)
                } else {
                    debug!(%remote, %error, "ignoring stale connect failure");
                    (Vec::new(), None)
                }
            },
            PeerEvent::Received { channel, frame } if Some(channel) == self.channel => {
                match decode(&frame) {
                    Ok(message) => self.received(ctx, message),
                    Err(error) => {
                        warn!(%channel, %error, "dropping frame");
                        (Vec::new(), None)
                    },
                }
            },
            PeerEvent::Closed { channel } if Some(channel) == self.channel => {
                self.channel = None;
                let lost = self.coordinator.clone();
                let name = self
                    .mirror
                    .as_ref()
                    .and_then(|m| m.participant(&ParticipantId::from(&lost)))
                    .map(|p| p.name.clone());

                info!(coordinator = %lost, acknowledged = self.acknowledged, "coordinator lost");
                if self.migrating_since.is_none() {
                    self.migrating_since = Some(ctx.env.now());
                }
                let (mut actions, transition) = self.elect(ctx, &lost);
                actions.insert(
                    0,
                    PeerAction::Present(PresentationEvent::Notice(Notice::CoordinatorLost { name })),
                );
                (actions, transition)
            },
            PeerEvent::TimerFired(Timer::Rejoin { attempt }) => {
                if self.state == MigrationState::Rejoining && attempt == self.attempt {
                    debug!(successor = %self.coordinator, attempt, "dialing successor");
                    (vec![PeerAction::Connect { remote: self.coordinator.clone() }], None)
                } else {
                    (Vec::new(), None)
                }
            },
            PeerEvent::Accepted { channel, remote } => {
                warn!(%channel, %remote, "follower does not accept channels; closing");
                (vec![PeerAction::Close { channel }], None)
            },
            PeerEvent::Received { channel, .. } | PeerEvent::Closed { channel } => {
                debug!(%channel, "ignoring event on stale channel");
                (Vec::new(), None)
            },
            PeerEvent::TimerFired(_) | PeerEvent::Command(_) => (Vec::new(), None),
        }
    }

    fn connected<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        channel: ChannelId,
        remote: &PeerAddr,
    ) -> Vec<PeerAction> {
        let expected = remote == &self.coordinator
            && match self.state {
                MigrationState::Attached => self.channel.is_none(),
                MigrationState::Rejoining => true,
                _ => false,
            };
        if !expected {
            debug!(%channel, %remote, "closing unexpected channel");
            return vec![PeerAction::Close { channel }];
        }

        self.channel = Some(channel);
        self.seen_self = false;
        self.acknowledged = false;
        self.state = MigrationState::Attached;

        info!(%channel, coordinator = %remote, "connected; sending JOIN");
        let join = Message::Join { name: ctx.me.name.clone(), id: ctx.me.id.clone() };
        encode(join).map(|frame| vec![PeerAction::Send { channel, frame }]).unwrap_or_default()
    }

    fn received<E: Environment>(&mut self, ctx: &Context<E>, message: Message) -> Step {
        match message {
            Message::StateSync { state } => self.sync(ctx, state),
            Message::Removed {} => {
                info!(participant = %ctx.me.id, "removed by coordinator");
                (Vec::new(), Some(Transition::Terminate(RemovalReason::Kicked)))
            },
            Message::Join { .. } | Message::NextTurn {} | Message::ChooseForfeit {} => {
                warn!(kind = message.kind(), "unexpected message for follower");
                (Vec::new(), None)
            },
        }
    }

    fn sync<E: Environment>(&mut self, ctx: &Context<E>, state: GameState) -> Step {
        let present = state.contains(&ctx.me.id);
        if self.seen_self && !present {
            info!(participant = %ctx.me.id, "dropped from player list; treating as removed");
            return (Vec::new(), Some(Transition::Terminate(RemovalReason::Kicked)));
        }

        let mut actions = Vec::new();
        if present {
            self.seen_self = true;
            if !self.acknowledged {
                self.acknowledged = true;
                if let Some(since) = self.migrating_since.take() {
                    let host = state
                        .participant(&ParticipantId::from(&self.coordinator))
                        .map_or_else(|| self.coordinator.to_string(), |p| p.name.clone());
                    info!(
                        coordinator = %self.coordinator,
                        elapsed_ms = ctx.env.now().saturating_duration_since(since).as_millis(),
                        "rejoined after migration"
                    );
                    actions.push(PeerAction::Present(PresentationEvent::Notice(Notice::Rejoined {
                        host,
                    })));
                }
            }
        }

        let membership_changed =
            self.mirror.as_ref().is_none_or(|old| old.players != state.players);
        debug!(phase = ?state.phase, index = state.current_player_index, "applied sync");
        actions.push(PeerAction::Present(PresentationEvent::StateChanged(state.clone())));
        if membership_changed {
            actions.push(PeerAction::Present(PresentationEvent::MembershipChanged(
                state.players.clone(),
            )));
        }
        self.mirror = Some(state);
        (actions, None)
    }

    /// Drop `lost` from the mirror and pick who coordinates next.
    fn elect<E: Environment>(&mut self, ctx: &Context<E>, lost: &PeerAddr) -> Step {
        self.state = MigrationState::CoordinatorLost;
        self.acknowledged = false;
        self.seen_self = false;

        let Some(mirror) = self.mirror.as_mut() else {
            info!(coordinator = %lost, "lost coordinator before any sync");
            return (Vec::new(), Some(Transition::Terminate(RemovalReason::NoSuccessor)));
        };
        membership::remove(mirror, &ParticipantId::from(lost));

        let Some(successor) = membership::successor(mirror).cloned() else {
            info!(coordinator = %lost, "no successor");
            return (Vec::new(), Some(Transition::Terminate(RemovalReason::NoSuccessor)));
        };

        if successor.id == ctx.me.id {
            self.state = MigrationState::BecomingCoordinator;
            info!(participant = %ctx.me.id, "elected as successor");
            return match self.mirror.take() {
                Some(state) => (Vec::new(), Some(Transition::Promote(state))),
                None => (Vec::new(), Some(Transition::Terminate(RemovalReason::NoSuccessor))),
            };
        }

        let Some(address) = successor.address().cloned() else {
            return (Vec::new(), Some(Transition::Terminate(RemovalReason::NoSuccessor)));
        };
        self.state = MigrationState::Rejoining;
        self.coordinator = address;
        self.attempt += 1;
        let delay = ctx.env.random_duration(ctx.config.rejoin_delay_min, ctx.config.rejoin_delay_max);

        info!(
            successor = %successor.id,
            attempt = self.attempt,
            delay_ms = delay.as_millis(),
            "rejoining successor"
        );
        let actions = vec![
            PeerAction::StartTimer { timer: Timer::Rejoin { attempt: self.attempt }, after: delay },
            PeerAction::Present(PresentationEvent::Notice(Notice::Reconnecting {
                to: successor.name,
            })),
        ];
        (actions, None)
    }
}
