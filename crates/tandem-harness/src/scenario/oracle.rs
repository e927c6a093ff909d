//! Reusable oracles.
//!
//! Each helper returns an [`OracleFn`]; combine them with [`all_of`].

use tandem_core::{Notice, RemovalReason, RoleKind};

use crate::scenario::{OracleFn, World};

/// Every oracle must pass. Reports the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// Exactly one live peer is coordinator.
pub fn single_coordinator() -> OracleFn {
    Box::new(|world| match world.coordinators().as_slice() {
        [_] => Ok(()),
        found => Err(format!("expected one coordinator, found {found:?}")),
    })
}

/// `name` is the live coordinator.
pub fn coordinator_is(name: &'static str) -> OracleFn {
    Box::new(move |world| {
        let found = world.coordinators();
        if found == [name] { Ok(()) } else { Err(format!("expected {name} to coordinate, found {found:?}")) }
    })
}

/// Every live, non-terminated peer holds the same state.
pub fn states_converged() -> OracleFn {
    Box::new(|world| {
        let mut states = world
            .live()
            .filter(|(_, peer)| peer.role() != RoleKind::Terminated)
            .map(|(name, peer)| (name, peer.state()));
        let Some((first, expected)) = states.next() else {
            return Ok(());
        };
        for (name, state) in states {
            if state != expected {
                return Err(format!("{name} holds {state:?} but {first} holds {expected:?}"));
            }
        }
        Ok(())
    })
}

/// The coordinator's player list, by display name, in order.
pub fn players_are(expected: &'static [&'static str]) -> OracleFn {
    Box::new(move |world| {
        let coordinator = world.coordinators().first().copied().ok_or("no coordinator")?;
        let players: Vec<&str> = world
            .state(coordinator)
            .map(|s| s.players.iter().map(|p| p.name.as_str()).collect())
            .unwrap_or_default();
        if players == expected {
            Ok(())
        } else {
            Err(format!("expected players {expected:?}, found {players:?}"))
        }
    })
}

/// `name` ended its session for `reason` and was told exactly once.
pub fn terminated(name: &'static str, reason: RemovalReason) -> OracleFn {
    Box::new(move |world| {
        let peer = world.peer(name).ok_or_else(|| format!("no peer {name}"))?;
        if peer.termination() != Some(reason) {
            return Err(format!("{name}: expected {reason:?}, found {:?}", peer.termination()));
        }
        let removals = world.presentation(name).map(|p| p.removals()).unwrap_or_default();
        if removals == [reason] {
            Ok(())
        } else {
            Err(format!("{name}: expected one removal, presented {removals:?}"))
        }
    })
}

/// `name` was shown `notice` exactly `times` times.
pub fn notice_count(name: &'static str, notice: Notice, times: usize) -> OracleFn {
    Box::new(move |world| {
        let seen = world.presentation(name).map_or(0, |p| p.count(&notice));
        if seen == times {
            Ok(())
        } else {
            Err(format!("{name}: expected {notice:?} {times} time(s), saw {seen}"))
        }
    })
}

/// The current player index always points into the player list.
pub fn index_in_bounds() -> OracleFn {
    Box::new(|world| {
        for (name, peer) in world.live() {
            if let Some(state) = peer.state() {
                if !state.players.is_empty() && state.current_player_index >= state.players.len() {
                    return Err(format!(
                        "{name}: index {} out of bounds for {} players",
                        state.current_player_index,
                        state.players.len()
                    ));
                }
            }
        }
        Ok(())
    })
}

/// No timers left armed once the world settled.
pub fn quiescent() -> OracleFn {
    Box::new(|world| match world.pending_timers() {
        0 => Ok(()),
        n => Err(format!("{n} timer(s) still armed")),
    })
}
