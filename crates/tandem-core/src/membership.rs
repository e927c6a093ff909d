//! Membership rules over the player list.
//!
//! Admission is idempotent by id and appends, so turn order is arrival
//! order. Removal keeps the turn index addressing a real player by resetting
//! it to the first player when it falls off the end.

use tandem_proto::{GameState, Participant, ParticipantId};

use crate::env::{Environment, random_base36};

/// Prefix of coordinator-minted ids for local players.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Random characters after [`LOCAL_ID_PREFIX`].
const LOCAL_ID_LEN: usize = 9;

/// Append `participant` unless its id is already present.
///
/// Returns `true` if the player list changed.
pub fn admit(state: &mut GameState, participant: Participant) -> bool {
    if state.contains(&participant.id) {
        return false;
    }
    state.players.push(participant);
    true
}

/// Remove the participant with `id`, if present, and repair the turn index.
pub fn remove(state: &mut GameState, id: &ParticipantId) -> Option<Participant> {
    let position = state.position(id)?;
    let removed = state.players.remove(position);
    clamp_turn(state);
    Some(removed)
}

/// Reset the turn index to the first player if it no longer addresses one.
pub fn clamp_turn(state: &mut GameState) {
    if state.current_player_index >= state.players.len() {
        state.current_player_index = 0;
    }
}

/// Drop every local participant. Returns what was dropped, in order.
pub fn drop_locals(state: &mut GameState) -> Vec<Participant> {
    let (locals, remotes): (Vec<_>, Vec<_>) =
        std::mem::take(&mut state.players).into_iter().partition(Participant::is_local);
    state.players = remotes;
    clamp_turn(state);
    locals
}

/// First participant that can act as coordinator.
pub fn successor(state: &GameState) -> Option<&Participant> {
    state.players.iter().find(|p| !p.is_local())
}

/// Fresh local participant id not present in `state`.
pub fn mint_local_id<E: Environment>(env: &E, state: &GameState) -> ParticipantId {
    loop {
        let token = random_base36(env, LOCAL_ID_LEN);
        let id = ParticipantId::new(format!("{LOCAL_ID_PREFIX}{token}"));
        if !state.contains(&id) {
            return id;
        }
    }
}

/// Trim a display name, rejecting blank ones.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
