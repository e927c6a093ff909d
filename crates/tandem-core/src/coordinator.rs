//! Coordinator role.
//!
//! The coordinator owns the authoritative [`GameState`] and the set of open
//! follower channels. Every successful mutation is followed by a full
//! `STATE_SYNC` broadcast to every open channel; followers never see diffs.
//!
//! Channels are bound to a participant when their `JOIN` is processed. A
//! channel that closes before joining changes nothing. A channel being kicked
//! is flagged so its close does not count as a second departure.

use std::collections::{BTreeMap, BTreeSet};

use tandem_proto::{GameState, Message, Participant, ParticipantId, PeerAddr};
use tracing::{debug, info, warn};

use crate::{
    env::Environment,
    error::CommandError,
    membership,
    peer::{ChannelId, Command, Context, PeerAction, PeerEvent, Timer, decode, encode},
    presentation::{Notice, PresentationEvent},
    turn,
};

/// One open follower channel.
#[derive(Debug)]
struct Link {
    remote: PeerAddr,
    participant: Option<ParticipantId>,
    kicking: bool,
}

pub(crate) struct Coordinator {
    state: GameState,
    channels: BTreeMap<ChannelId, Link>,
    /// Participants inherited on promotion that have not re-joined yet.
    awaiting: BTreeSet<ParticipantId>,
    /// Kicked participants. A later JOIN from one of them is answered with
    /// `REMOVED` instead of admission.
    kicked: BTreeSet<ParticipantId>,
}

impl Coordinator {
    pub(crate) fn new(state: GameState) -> Self {
        Self { state, channels: BTreeMap::new(), awaiting: BTreeSet::new(), kicked: BTreeSet::new() }
    }

    /// Take over from a lost coordinator with the last mirrored state.
    pub(crate) fn promoted<E: Environment>(
        ctx: &Context<E>,
        mut state: GameState,
    ) -> (Self, Vec<PeerAction>) {
        let dropped = membership::drop_locals(&mut state);
        membership::clamp_turn(&mut state);

        let awaiting: BTreeSet<ParticipantId> = state
            .players
            .iter()
            .filter(|p| p.id != ctx.me.id)
            .map(|p| p.id.clone())
            .collect();

        info!(
            participant = %ctx.me.id,
            dropped_locals = dropped.len(),
            awaiting = awaiting.len(),
            "promoted to coordinator"
        );

        let mut actions = vec![PeerAction::Listen];
        if !awaiting.is_empty() {
            actions.push(PeerAction::StartTimer {
                timer: Timer::RejoinWindow,
                after: ctx.config.rejoin_window(),
            });
        }
        actions.push(PeerAction::Present(PresentationEvent::Notice(Notice::BecameCoordinator)));

        let coordinator =
            Self { state, channels: BTreeMap::new(), awaiting, kicked: BTreeSet::new() };
        actions.extend(coordinator.presented());
        (coordinator, actions)
    }

    pub(crate) fn state(&self) -> &GameState {
        &self.state
    }

    /// Presentation of the current state and player list, without a broadcast.
    pub(crate) fn presented(&self) -> Vec<PeerAction> {
        vec![
            PeerAction::Present(PresentationEvent::StateChanged(self.state.clone())),
            PeerAction::Present(PresentationEvent::MembershipChanged(self.state.players.clone())),
        ]
    }

    pub(crate) fn command<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        command: Command,
    ) -> Result<Vec<PeerAction>, CommandError> {
        let content = ctx.content.as_ref();
        match command {
            Command::StartSession => {
                turn::start(&mut self.state, content, &ctx.env, ctx.config.min_players)?;
                info!(players = self.state.players.len(), "session started");
                Ok(self.broadcast())
            },
            Command::AdvanceTurn => {
                self.check_local_turn(ctx)?;
                turn::next_turn(&mut self.state, content, &ctx.env)?;
                debug!(index = self.state.current_player_index, "advanced turn");
                Ok(self.broadcast())
            },
            Command::ChooseForfeit => {
                self.check_local_turn(ctx)?;
                turn::choose_forfeit(&mut self.state, content, &ctx.env)?;
                debug!(index = self.state.current_player_index, "forfeit drawn");
                Ok(self.broadcast())
            },
            Command::Kick(id) => self.kick(ctx, &id),
            Command::AddLocalPlayer(name) => {
                let name = membership::normalize_name(&name).ok_or(CommandError::EmptyName)?;
                let id = membership::mint_local_id(&ctx.env, &self.state);
                info!(participant = %id, %name, "local player added");
                membership::admit(&mut self.state, Participant::local(id, name.clone()));
                Ok(self.membership_changed(Notice::PlayerJoined { name }))
            },
            Command::SelectCategory(category) => {
                if !ctx.content.has_category(&category) {
                    return Err(CommandError::UnknownCategory(category));
                }
                debug!(%category, "category selected");
                self.state.category = category;
                Ok(self.broadcast())
            },
        }
    }

    pub(crate) fn handle<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        event: PeerEvent,
    ) -> Vec<PeerAction> {
        match event {
            PeerEvent::Accepted { channel, remote } => self.accepted(channel, remote),
            PeerEvent::Received { channel, frame } => match decode(&frame) {
                Ok(message) => self.received(ctx, channel, message),
                Err(error) => {
                    warn!(%channel, %error, "dropping frame");
                    Vec::new()
                },
            },
            PeerEvent::Closed { channel } => self.closed(channel),
            PeerEvent::TimerFired(timer) => self.timer_fired(timer),
            PeerEvent::Connected { channel, remote } => {
                warn!(%channel, %remote, "coordinator does not dial; closing");
                vec![PeerAction::Close { channel }]
            },
            PeerEvent::ConnectFailed { .. } | PeerEvent::Command(_) => Vec::new(),
        }
    }

    fn accepted(&mut self, channel: ChannelId, remote: PeerAddr) -> Vec<PeerAction> {
        debug!(%channel, %remote, "channel accepted");
        self.channels.insert(channel, Link { remote, participant: None, kicking: false });

        encode(Message::StateSync { state: self.state.clone() })
            .map(|frame| vec![PeerAction::Send { channel, frame }])
            .unwrap_or_default()
    }

    fn received<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        channel: ChannelId,
        message: Message,
    ) -> Vec<PeerAction> {
        let Some(link) = self.channels.get(&channel) else {
            warn!(%channel, kind = message.kind(), "message on unknown channel");
            return Vec::new();
        };
        if link.kicking {
            debug!(%channel, kind = message.kind(), "ignoring message from kicked channel");
            return Vec::new();
        }

        match message {
            Message::Join { name, id } => self.join(ctx, channel, &name, id),
            Message::NextTurn {} | Message::ChooseForfeit {} => {
                self.remote_turn(ctx, channel, &message)
            },
            Message::StateSync { .. } | Message::Removed {} => {
                warn!(%channel, kind = message.kind(), "unexpected message for coordinator");
                Vec::new()
            },
        }
    }

    fn join<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        channel: ChannelId,
        name: &str,
        id: ParticipantId,
    ) -> Vec<PeerAction> {
        let Some(link) = self.channels.get(&channel) else {
            return Vec::new();
        };
        if id.as_str() != link.remote.as_str() {
            warn!(%channel, %id, remote = %link.remote, "JOIN id does not match channel; dropping");
            return Vec::new();
        }
        let remote = link.remote.clone();
        if self.kicked.contains(&id) {
            info!(%channel, participant = %id, "kicked participant tried to re-join");
            return self.remove_channel(ctx, channel);
        }
        let Some(name) = membership::normalize_name(name) else {
            warn!(%channel, %id, "JOIN with empty name; dropping");
            return Vec::new();
        };
        if self.state.participant(&id).is_some_and(Participant::is_local) {
            warn!(%channel, %id, "JOIN for a local participant id; dropping");
            return Vec::new();
        }

        // A re-join on a fresh channel takes over the binding.
        for other in self.channels.values_mut() {
            if other.participant.as_ref() == Some(&id) {
                other.participant = None;
            }
        }
        if let Some(link) = self.channels.get_mut(&channel) {
            link.participant = Some(id.clone());
        }
        self.awaiting.remove(&id);

        if membership::admit(&mut self.state, Participant::remote(remote, name.clone())) {
            info!(participant = %id, %name, "participant joined");
            self.membership_changed(Notice::PlayerJoined { name })
        } else {
            debug!(participant = %id, "participant re-joined");
            self.broadcast()
        }
    }

    fn remote_turn<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        channel: ChannelId,
        message: &Message,
    ) -> Vec<PeerAction> {
        let sender = self.channels.get(&channel).and_then(|l| l.participant.clone());
        let Some(sender) = sender else {
            warn!(%channel, kind = message.kind(), "turn command before JOIN; dropping");
            return Vec::new();
        };

        if ctx.config.enforce_turn_order
            && self.state.current_player().map(|p| &p.id) != Some(&sender)
        {
            warn!(participant = %sender, kind = message.kind(), "not their turn; dropping");
            return Vec::new();
        }

        let content = ctx.content.as_ref();
        let result = match message {
            Message::ChooseForfeit {} => turn::choose_forfeit(&mut self.state, content, &ctx.env),
            _ => turn::next_turn(&mut self.state, content, &ctx.env),
        };

        match result {
            Ok(()) => {
                debug!(
                    participant = %sender,
                    kind = message.kind(),
                    phase = ?self.state.phase,
                    index = self.state.current_player_index,
                    "applied turn command"
                );
                self.broadcast()
            },
            Err(error) => {
                warn!(participant = %sender, kind = message.kind(), %error, "dropping turn command");
                Vec::new()
            },
        }
    }

    fn closed(&mut self, channel: ChannelId) -> Vec<PeerAction> {
        let Some(link) = self.channels.remove(&channel) else {
            return Vec::new();
        };
        if link.kicking {
            debug!(%channel, "kicked channel closed");
            return Vec::new();
        }
        let Some(id) = link.participant else {
            debug!(%channel, remote = %link.remote, "channel closed before JOIN");
            return Vec::new();
        };

        self.awaiting.remove(&id);
        match membership::remove(&mut self.state, &id) {
            Some(gone) => {
                info!(participant = %id, name = %gone.name, "participant left");
                self.membership_changed(Notice::PlayerLeft { name: gone.name })
            },
            None => Vec::new(),
        }
    }

    fn kick<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        id: &ParticipantId,
    ) -> Result<Vec<PeerAction>, CommandError> {
        if id == &ctx.me.id {
            return Err(CommandError::CannotKickSelf);
        }
        let gone = membership::remove(&mut self.state, id)
            .ok_or_else(|| CommandError::UnknownParticipant(id.clone()))?;
        self.awaiting.remove(id);
        if !gone.is_local() {
            self.kicked.insert(id.clone());
        }

        let bound = self
            .channels
            .iter()
            .find(|(_, link)| link.participant.as_ref() == Some(id) && !link.kicking)
            .map(|(&channel, _)| channel);
        let mut actions =
            bound.map(|channel| self.remove_channel(ctx, channel)).unwrap_or_default();

        info!(participant = %id, name = %gone.name, local = gone.is_local(), "participant kicked");
        actions.extend(self.membership_changed(Notice::PlayerRemoved { name: gone.name }));
        Ok(actions)
    }

    /// Send `REMOVED` on `channel` and close it once the grace period ends.
    fn remove_channel<E: Environment>(
        &mut self,
        ctx: &Context<E>,
        channel: ChannelId,
    ) -> Vec<PeerAction> {
        let Some(link) = self.channels.get_mut(&channel) else {
            return Vec::new();
        };
        link.kicking = true;
        let mut actions = Vec::new();
        if let Some(frame) = encode(Message::Removed {}) {
            actions.push(PeerAction::Send { channel, frame });
        }
        actions.push(PeerAction::StartTimer {
            timer: Timer::KickGrace(channel),
            after: ctx.config.kick_grace,
        });
        actions
    }

    fn timer_fired(&mut self, timer: Timer) -> Vec<PeerAction> {
        match timer {
            Timer::KickGrace(channel) => match self.channels.get(&channel) {
                Some(link) if link.kicking => {
                    self.channels.remove(&channel);
                    vec![PeerAction::Close { channel }]
                },
                _ => Vec::new(),
            },
            Timer::RejoinWindow => self.prune_ghosts(),
            Timer::Rejoin { .. } => Vec::new(),
        }
    }

    /// Remove inherited participants that never re-joined.
    fn prune_ghosts(&mut self) -> Vec<PeerAction> {
        let ghosts = std::mem::take(&mut self.awaiting);
        let pruned: Vec<Participant> =
            ghosts.iter().filter_map(|id| membership::remove(&mut self.state, id)).collect();
        if pruned.is_empty() {
            return Vec::new();
        }

        info!(pruned = pruned.len(), "pruned participants that did not re-join");
        let mut actions: Vec<PeerAction> = pruned
            .into_iter()
            .map(|p| PeerAction::Present(PresentationEvent::Notice(Notice::PlayerLeft { name: p.name })))
            .collect();
        actions.push(PeerAction::Present(PresentationEvent::MembershipChanged(
            self.state.players.clone(),
        )));
        actions.extend(self.broadcast());
        actions
    }

    /// Turn commands from this device may only move a local or own turn.
    fn check_local_turn<E: Environment>(&self, ctx: &Context<E>) -> Result<(), CommandError> {
        if !ctx.config.enforce_turn_order {
            return Ok(());
        }
        match self.state.current_player() {
            Some(p) if p.is_local() || p.id == ctx.me.id => Ok(()),
            Some(_) => Err(CommandError::NotYourTurn),
            None => Ok(()),
        }
    }

    fn membership_changed(&self, notice: Notice) -> Vec<PeerAction> {
        let mut actions = vec![
            PeerAction::Present(PresentationEvent::Notice(notice)),
            PeerAction::Present(PresentationEvent::MembershipChanged(self.state.players.clone())),
        ];
        actions.extend(self.broadcast());
        actions
    }

    /// Full state to every open channel, then to the local UI.
    fn broadcast(&self) -> Vec<PeerAction> {
        let mut actions = Vec::new();
        if let Some(frame) = encode(Message::StateSync { state: self.state.clone() }) {
            // Keys are collected first so the send list is a stable snapshot.
            let channels: Vec<ChannelId> = self.channels.keys().copied().collect();
            actions.extend(
                channels.into_iter().map(|channel| PeerAction::Send { channel, frame: frame.clone() }),
            );
        }
        actions.push(PeerAction::Present(PresentationEvent::StateChanged(self.state.clone())));
        actions
    }
}
