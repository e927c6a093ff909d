//! Reference model of one room.
//!
//! A deliberately simple, obviously-correct description of what the room
//! should look like after a sequence of operations. Model-based tests apply
//! the same operations to the model and to a [`crate::scenario::World`] and
//! compare results.
//!
//! The model covers membership and turns with every actor connected. Crashes
//! and migrations are checked with invariants instead.

/// Actor index. Actor 0 hosts the room.
pub type ActorId = u8;

/// One operation in a generated sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Actor joins the room.
    Join {
        /// Joining actor.
        actor: ActorId,
    },
    /// The host starts the session.
    Start,
    /// The host adds a player on its own device.
    AddLocal,
    /// Actor ends the current turn.
    Advance {
        /// Issuing actor.
        actor: ActorId,
    },
    /// Actor swaps the prompt for a forfeit.
    Forfeit {
        /// Issuing actor.
        actor: ActorId,
    },
    /// The host removes the player at this position, modulo the player count.
    Kick {
        /// Position in the player list.
        position: u8,
    },
    /// Let virtual time pass.
    Elapse {
        /// Milliseconds.
        millis: u16,
    },
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// No such actor.
    InvalidActor,
    /// The actor is already in the room or was removed from it.
    AlreadyJoined,
    /// The actor is not in the room.
    NotMember,
    /// The session is already running.
    AlreadyStarted,
    /// Too few players to start.
    NotEnoughPlayers,
    /// The session has not started.
    NotStarted,
    /// The host tried to remove itself.
    CannotKickSelf,
}

/// Outcome of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Applied.
    Ok,
    /// Rejected.
    Error(OperationError),
}

impl OperationResult {
    /// True if the operation was applied.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// True if the operation was rejected.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

/// Phase as the model sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPhase {
    /// Waiting to start.
    Idle,
    /// A prompt is showing.
    Prompt,
    /// A forfeit is showing.
    Forfeit,
}

/// One entry in the model's player list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPlayer {
    /// Display name.
    pub name: String,
    /// Owning actor, `None` for local players.
    pub actor: Option<ActorId>,
}

/// Reference room.
#[derive(Debug, Clone)]
pub struct ModelRoom {
    actors: usize,
    min_players: usize,
    players: Vec<ModelPlayer>,
    phase: ModelPhase,
    index: usize,
    /// Actors that joined at some point, removed ones included.
    joined: Vec<bool>,
    locals: usize,
}

impl ModelRoom {
    /// Room hosted by actor 0 with `actors` actors in total.
    pub fn new(actors: usize, min_players: usize) -> Self {
        let mut joined = vec![false; actors];
        if let Some(host) = joined.first_mut() {
            *host = true;
        }
        Self {
            actors,
            min_players,
            players: vec![ModelPlayer { name: actor_name(0), actor: Some(0) }],
            phase: ModelPhase::Idle,
            index: 0,
            joined,
            locals: 0,
        }
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match self.try_apply(op) {
            Ok(()) => OperationResult::Ok,
            Err(error) => OperationResult::Error(error),
        }
    }

    fn try_apply(&mut self, op: &Operation) -> Result<(), OperationError> {
        match op {
            Operation::Join { actor } => {
                let slot = self.joined.get_mut(usize::from(*actor)).ok_or(OperationError::InvalidActor)?;
                if *slot {
                    return Err(OperationError::AlreadyJoined);
                }
                *slot = true;
                self.players.push(ModelPlayer { name: actor_name(*actor), actor: Some(*actor) });
                Ok(())
            },
            Operation::Start => {
                if self.phase != ModelPhase::Idle {
                    return Err(OperationError::AlreadyStarted);
                }
                if self.players.len() < self.min_players {
                    return Err(OperationError::NotEnoughPlayers);
                }
                self.phase = ModelPhase::Prompt;
                Ok(())
            },
            Operation::AddLocal => {
                self.players.push(ModelPlayer { name: local_name(self.locals), actor: None });
                self.locals += 1;
                Ok(())
            },
            Operation::Advance { actor } => {
                self.check_turn(*actor)?;
                self.index = (self.index + 1) % self.players.len();
                self.phase = ModelPhase::Prompt;
                Ok(())
            },
            Operation::Forfeit { actor } => {
                self.check_turn(*actor)?;
                self.phase = ModelPhase::Forfeit;
                Ok(())
            },
            Operation::Kick { position } => {
                let position = usize::from(*position) % self.players.len();
                if self.players[position].actor == Some(0) {
                    return Err(OperationError::CannotKickSelf);
                }
                self.players.remove(position);
                if self.index >= self.players.len() {
                    self.index = 0;
                }
                Ok(())
            },
            Operation::Elapse { .. } => Ok(()),
        }
    }

    fn check_turn(&self, actor: ActorId) -> Result<(), OperationError> {
        if usize::from(actor) >= self.actors {
            return Err(OperationError::InvalidActor);
        }
        if !self.is_member(actor) {
            return Err(OperationError::NotMember);
        }
        if self.phase == ModelPhase::Idle {
            return Err(OperationError::NotStarted);
        }
        Ok(())
    }

    /// True if `actor` is currently in the player list.
    pub fn is_member(&self, actor: ActorId) -> bool {
        self.players.iter().any(|p| p.actor == Some(actor))
    }

    /// True if `actor` joined at some point, removed or not.
    pub fn has_joined(&self, actor: ActorId) -> bool {
        self.joined.get(usize::from(actor)).copied().unwrap_or(false)
    }

    /// Player list in turn order.
    pub fn players(&self) -> &[ModelPlayer] {
        &self.players
    }

    /// Current player index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current phase.
    pub fn phase(&self) -> ModelPhase {
        self.phase
    }
}

/// Display name used for actor `actor`.
pub fn actor_name(actor: ActorId) -> String {
    format!("P{actor}")
}

/// Display name of the `n`th local player.
pub fn local_name(n: usize) -> String {
    format!("L{n}")
}
