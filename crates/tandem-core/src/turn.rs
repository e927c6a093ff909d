//! Turn state machine.
//!
//! ```text
//!          start                 choose_forfeit
//! ┌──────┐ ─────> ┌────────┐ ─────────────────> ┌─────────┐
//! │ Idle │        │ Prompt │                    │ Forfeit │
//! └──────┘        └────────┘ <───────────────── └─────────┘
//!                   │    ^       next_turn
//!                   └────┘
//!                  next_turn
//! ```
//!
//! `next_turn` always moves to the following player; `choose_forfeit` keeps
//! the current player. Every transition draws a fresh card from the active
//! category. These functions only touch the [`GameState`]; broadcasting is
//! the caller's job.

use tandem_proto::{ContentColor, GameState, Phase};

use crate::{
    content::{ContentPool, ContentProvider},
    env::Environment,
    error::CommandError,
};

/// `Idle -> Prompt`. The turn index is left where it is.
///
/// # Errors
///
/// - [`CommandError::AlreadyStarted`] outside `Idle`
/// - [`CommandError::NotEnoughPlayers`] with fewer than `min_players`
/// - [`CommandError::UnknownCategory`] if the category has no content
pub fn start<E: Environment>(
    state: &mut GameState,
    content: &dyn ContentProvider,
    env: &E,
    min_players: usize,
) -> Result<(), CommandError> {
    if state.is_started() {
        return Err(CommandError::AlreadyStarted);
    }
    if state.players.len() < min_players {
        return Err(CommandError::NotEnoughPlayers {
            have: state.players.len(),
            need: min_players,
        });
    }

    let card = pool(state, content)?.draw_prompt(env);
    show(state, Phase::Prompt, card, ContentColor::Prompt)
}

/// `Prompt | Forfeit -> Prompt` for the next player in turn order.
///
/// # Errors
///
/// [`CommandError::NotStarted`] in `Idle`.
pub fn next_turn<E: Environment>(
    state: &mut GameState,
    content: &dyn ContentProvider,
    env: &E,
) -> Result<(), CommandError> {
    if !state.is_started() {
        return Err(CommandError::NotStarted);
    }

    let card = pool(state, content)?.draw_prompt(env);
    let count = state.players.len().max(1);
    state.current_player_index = (state.current_player_index + 1) % count;
    show(state, Phase::Prompt, card, ContentColor::Prompt)
}

/// `Prompt -> Forfeit` for the same player.
///
/// Repeating it while already in `Forfeit` draws a fresh forfeit.
///
/// # Errors
///
/// [`CommandError::NotStarted`] in `Idle`.
pub fn choose_forfeit<E: Environment>(
    state: &mut GameState,
    content: &dyn ContentProvider,
    env: &E,
) -> Result<(), CommandError> {
    if !state.is_started() {
        return Err(CommandError::NotStarted);
    }

    let card = pool(state, content)?.draw_forfeit(env);
    show(state, Phase::Forfeit, card, ContentColor::Forfeit)
}

fn pool<'a>(
    state: &GameState,
    content: &'a dyn ContentProvider,
) -> Result<&'a ContentPool, CommandError> {
    content
        .prompts_and_forfeits(&state.category)
        .ok_or_else(|| CommandError::UnknownCategory(state.category.clone()))
}

fn show(
    state: &mut GameState,
    phase: Phase,
    card: Option<String>,
    color: ContentColor,
) -> Result<(), CommandError> {
    // Providers guarantee non-empty pools; an empty one is a broken provider.
    let card = card.ok_or_else(|| CommandError::UnknownCategory(state.category.clone()))?;
    state.phase = phase;
    state.current_content = Some(card);
    state.content_color = color;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use tandem_proto::{Participant, PeerAddr};

    use super::*;
    use crate::{
        content::{Catalog, ContentPool},
        env::SystemEnv,
    };

    fn catalog() -> Catalog {
        let mut categories = BTreeMap::new();
        categories.insert(
            "friends".to_owned(),
            ContentPool::new(vec!["prompt".into()], vec!["forfeit".into()]),
        );
        Catalog::new(categories).unwrap()
    }

    fn lobby(players: usize) -> GameState {
        let mut state = GameState::new("friends");
        for i in 0..players {
            state.players.push(Participant::remote(PeerAddr::new(format!("p{i}")), format!("P{i}")));
        }
        state
    }

    #[test]
    fn start_requires_two_players() {
        let mut state = lobby(1);
        let result = start(&mut state, &catalog(), &SystemEnv, 2);
        assert_eq!(result, Err(CommandError::NotEnoughPlayers { have: 1, need: 2 }));
        assert_eq!(state, lobby(1));
    }

    #[test]
    fn start_draws_prompt_for_first_player() {
        let mut state = lobby(3);
        start(&mut state, &catalog(), &SystemEnv, 2).unwrap();
        assert_eq!(state.phase, Phase::Prompt);
        assert_eq!(state.current_player_index, 0);
        assert_eq!(state.current_content.as_deref(), Some("prompt"));
        assert_eq!(state.content_color, ContentColor::Prompt);

        assert_eq!(start(&mut state, &catalog(), &SystemEnv, 2), Err(CommandError::AlreadyStarted));
    }

    #[test]
    fn idle_rejects_turn_commands() {
        let mut state = lobby(3);
        assert_eq!(next_turn(&mut state, &catalog(), &SystemEnv), Err(CommandError::NotStarted));
        assert_eq!(
            choose_forfeit(&mut state, &catalog(), &SystemEnv),
            Err(CommandError::NotStarted)
        );
        assert_eq!(state.current_content, None);
    }

    #[test]
    fn example_walkthrough() {
        let (content, env) = (catalog(), SystemEnv);
        let mut state = lobby(3);

        start(&mut state, &content, &env, 2).unwrap();
        assert_eq!((state.phase, state.current_player_index), (Phase::Prompt, 0));

        next_turn(&mut state, &content, &env).unwrap();
        assert_eq!((state.phase, state.current_player_index), (Phase::Prompt, 1));

        choose_forfeit(&mut state, &content, &env).unwrap();
        assert_eq!((state.phase, state.current_player_index), (Phase::Forfeit, 1));
        assert_eq!(state.current_content.as_deref(), Some("forfeit"));
        assert_eq!(state.content_color, ContentColor::Forfeit);

        next_turn(&mut state, &content, &env).unwrap();
        assert_eq!((state.phase, state.current_player_index), (Phase::Prompt, 2));

        next_turn(&mut state, &content, &env).unwrap();
        assert_eq!((state.phase, state.current_player_index), (Phase::Prompt, 0));
    }

    #[test]
    fn repeated_forfeit_redraws() {
        let (content, env) = (catalog(), SystemEnv);
        let mut state = lobby(2);
        start(&mut state, &content, &env, 2).unwrap();
        choose_forfeit(&mut state, &content, &env).unwrap();
        choose_forfeit(&mut state, &content, &env).unwrap();
        assert_eq!((state.phase, state.current_player_index), (Phase::Forfeit, 0));
    }

    #[test]
    fn unknown_category_is_rejected_without_mutation() {
        let mut state = lobby(2);
        state.category = "gone".into();
        let before = state.clone();
        assert_eq!(
            start(&mut state, &catalog(), &SystemEnv, 2),
            Err(CommandError::UnknownCategory("gone".into()))
        );
        assert_eq!(state, before);
    }

    proptest! {
        #[test]
        fn index_arithmetic(players in 2usize..8, steps in proptest::collection::vec(any::<bool>(), 0..40)) {
            let (content, env) = (catalog(), SystemEnv);
            let mut state = lobby(players);
            start(&mut state, &content, &env, 2).unwrap();
            let mut expected = 0usize;

            for forfeit in steps {
                if forfeit {
                    choose_forfeit(&mut state, &content, &env).unwrap();
                    prop_assert_eq!(state.phase, Phase::Forfeit);
                } else {
                    next_turn(&mut state, &content, &env).unwrap();
                    expected = (expected + 1) % players;
                    prop_assert_eq!(state.phase, Phase::Prompt);
                }
                prop_assert_eq!(state.current_player_index, expected);
                prop_assert!(state.current_content.is_some());
            }
        }
    }
}
