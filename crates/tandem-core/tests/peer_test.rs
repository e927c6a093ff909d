//! Peer state machine tests driven by hand-built events.

use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
use tandem_core::{
    Catalog, ChannelId, Command, CommandError, ContentPool, MigrationState, Notice, Peer,
    PeerAction, PeerEvent, PresentationEvent, ProtocolConfig, RemovalReason, RoleKind,
    SessionError, SystemEnv, Timer, TransportError,
};
use tandem_proto::{Frame, GameState, Message, Participant, ParticipantId, PeerAddr, Phase};

fn catalog() -> Arc<Catalog> {
    let mut categories = BTreeMap::new();
    categories.insert(
        "friends".to_owned(),
        ContentPool::new(vec!["prompt".into()], vec!["forfeit".into()]),
    );
    Arc::new(Catalog::new(categories).unwrap())
}

fn addr(name: &str) -> PeerAddr {
    PeerAddr::new(format!("tandem-peer-{name}"))
}

fn host() -> Peer<SystemEnv> {
    let (peer, _) = Peer::host(
        SystemEnv,
        ProtocolConfig::default(),
        catalog(),
        PeerAddr::new("tandem-room-ABCD"),
        "Host",
        "friends",
    )
    .unwrap();
    peer
}

fn follower(name: &str, coordinator: &PeerAddr) -> Peer<SystemEnv> {
    Peer::join(SystemEnv, ProtocolConfig::default(), catalog(), addr(name), name, coordinator.clone())
        .unwrap()
}

fn frame(message: Message) -> Bytes {
    message.into_frame().unwrap().to_bytes()
}

fn sent(actions: &[PeerAction]) -> Vec<(ChannelId, Message)> {
    actions
        .iter()
        .filter_map(|a| match a {
            PeerAction::Send { channel, frame } => {
                let frame = Frame::decode(frame).unwrap();
                Some((*channel, Message::from_frame(&frame).unwrap()))
            },
            _ => None,
        })
        .collect()
}

fn notices(actions: &[PeerAction]) -> Vec<Notice> {
    actions
        .iter()
        .filter_map(|a| match a {
            PeerAction::Present(PresentationEvent::Notice(n)) => Some(n.clone()),
            _ => None,
        })
        .collect()
}

fn removals(actions: &[PeerAction]) -> Vec<RemovalReason> {
    actions
        .iter()
        .filter_map(|a| match a {
            PeerAction::Present(PresentationEvent::Removed(r)) => Some(*r),
            _ => None,
        })
        .collect()
}

fn ids(state: &GameState) -> Vec<&str> {
    state.players.iter().map(|p| p.id.as_str()).collect()
}

/// Accept a channel from `name` on the host and deliver its JOIN.
fn admit(host: &mut Peer<SystemEnv>, channel: u64, name: &str) -> Vec<PeerAction> {
    let channel = ChannelId(channel);
    host.handle(PeerEvent::Accepted { channel, remote: addr(name) }).unwrap();
    let join = Message::Join { name: name.into(), id: ParticipantId::from(&addr(name)) };
    host.handle(PeerEvent::Received { channel, frame: frame(join) }).unwrap()
}

/// Mirror of `[host, names...]` as a follower would see it.
fn mirror(host: &PeerAddr, names: &[&str]) -> GameState {
    let mut state = GameState::new("friends");
    state.players.push(Participant::remote(host.clone(), "Host"));
    for name in names {
        state.players.push(Participant::remote(addr(name), *name));
    }
    state
}

/// Connect `peer` to its coordinator on `channel` and deliver `state`.
fn attach(peer: &mut Peer<SystemEnv>, coordinator: &PeerAddr, channel: u64, state: GameState) {
    let channel = ChannelId(channel);
    let actions =
        peer.handle(PeerEvent::Connected { channel, remote: coordinator.clone() }).unwrap();
    assert!(matches!(sent(&actions).as_slice(), [(_, Message::Join { .. })]));
    let sync = Message::StateSync { state };
    peer.handle(PeerEvent::Received { channel, frame: frame(sync) }).unwrap();
}

#[test]
fn accept_sends_current_state_before_join() {
    let mut host = host();
    let actions =
        host.handle(PeerEvent::Accepted { channel: ChannelId(1), remote: addr("ana") }).unwrap();

    match sent(&actions).as_slice() {
        [(ChannelId(1), Message::StateSync { state })] => assert_eq!(state.players.len(), 1),
        other => panic!("unexpected sends: {other:?}"),
    }
}

#[test]
fn join_is_admitted_once_and_broadcast() {
    let mut host = host();
    let actions = admit(&mut host, 1, "ana");
    assert_eq!(notices(&actions), [Notice::PlayerJoined { name: "ana".into() }]);
    assert!(matches!(sent(&actions).as_slice(), [(ChannelId(1), Message::StateSync { .. })]));

    let again = Message::Join { name: "ana".into(), id: ParticipantId::from(&addr("ana")) };
    let actions =
        host.handle(PeerEvent::Received { channel: ChannelId(1), frame: frame(again) }).unwrap();
    assert!(notices(&actions).is_empty());
    assert_eq!(host.state().unwrap().players.len(), 2);
}

#[test]
fn join_with_foreign_id_is_dropped() {
    let mut host = host();
    host.handle(PeerEvent::Accepted { channel: ChannelId(1), remote: addr("ana") }).unwrap();
    let forged = Message::Join { name: "bo".into(), id: ParticipantId::from(&addr("bo")) };
    let actions =
        host.handle(PeerEvent::Received { channel: ChannelId(1), frame: frame(forged) }).unwrap();

    assert!(actions.is_empty());
    assert_eq!(host.state().unwrap().players.len(), 1);
}

#[test]
fn start_with_one_player_is_rejected_without_broadcast() {
    let mut host = host();
    let result = host.handle(PeerEvent::Command(Command::StartSession));
    assert_eq!(
        result,
        Err(SessionError::Command(CommandError::NotEnoughPlayers { have: 1, need: 2 }))
    );
    assert_eq!(host.state().unwrap().phase, Phase::Idle);
}

#[test]
fn remote_turn_commands_apply_and_broadcast() {
    let mut host = host();
    admit(&mut host, 1, "ana");
    admit(&mut host, 2, "bo");
    host.handle(PeerEvent::Command(Command::StartSession)).unwrap();

    let actions = host
        .handle(PeerEvent::Received { channel: ChannelId(2), frame: frame(Message::NextTurn {}) })
        .unwrap();
    let state = host.state().unwrap();
    assert_eq!((state.phase, state.current_player_index), (Phase::Prompt, 1));
    assert_eq!(sent(&actions).len(), 2);

    host.handle(PeerEvent::Received {
        channel: ChannelId(1),
        frame: frame(Message::ChooseForfeit {}),
    })
    .unwrap();
    let state = host.state().unwrap();
    assert_eq!((state.phase, state.current_player_index), (Phase::Forfeit, 1));
}

#[test]
fn turn_commands_before_start_are_dropped() {
    let mut host = host();
    admit(&mut host, 1, "ana");
    let actions = host
        .handle(PeerEvent::Received { channel: ChannelId(1), frame: frame(Message::NextTurn {}) })
        .unwrap();
    assert!(actions.is_empty());
    assert_eq!(host.state().unwrap().phase, Phase::Idle);
}

#[test]
fn disconnect_removes_player_and_clamps_index() {
    let mut host = host();
    admit(&mut host, 1, "ana");
    admit(&mut host, 2, "bo");
    host.handle(PeerEvent::Command(Command::StartSession)).unwrap();
    host.handle(PeerEvent::Command(Command::AdvanceTurn)).unwrap();
    host.handle(PeerEvent::Command(Command::AdvanceTurn)).unwrap();
    assert_eq!(host.state().unwrap().current_player_index, 2);

    let actions = host.handle(PeerEvent::Closed { channel: ChannelId(2) }).unwrap();
    assert_eq!(notices(&actions), [Notice::PlayerLeft { name: "bo".into() }]);
    assert_eq!(host.state().unwrap().current_player_index, 0);
    assert!(matches!(sent(&actions).as_slice(), [(ChannelId(1), Message::StateSync { .. })]));
}

#[test]
fn close_before_join_changes_nothing() {
    let mut host = host();
    host.handle(PeerEvent::Accepted { channel: ChannelId(1), remote: addr("ana") }).unwrap();
    let actions = host.handle(PeerEvent::Closed { channel: ChannelId(1) }).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn kick_sends_removed_then_closes_after_grace() {
    let mut host = host();
    admit(&mut host, 1, "ana");
    admit(&mut host, 2, "bo");

    let actions = host
        .handle(PeerEvent::Command(Command::Kick(ParticipantId::from(&addr("ana")))))
        .unwrap();
    let sends = sent(&actions);
    assert!(sends.contains(&(ChannelId(1), Message::Removed {})));
    assert!(actions.contains(&PeerAction::StartTimer {
        timer: Timer::KickGrace(ChannelId(1)),
        after: ProtocolConfig::default().kick_grace,
    }));
    assert_eq!(notices(&actions), [Notice::PlayerRemoved { name: "ana".into() }]);

    let actions =
        host.handle(PeerEvent::TimerFired(Timer::KickGrace(ChannelId(1)))).unwrap();
    assert_eq!(actions, [PeerAction::Close { channel: ChannelId(1) }]);

    // The close that follows is not a second departure.
    let actions = host.handle(PeerEvent::Closed { channel: ChannelId(1) }).unwrap();
    assert!(actions.is_empty());
    assert_eq!(ids(host.state().unwrap()).len(), 2);
}

#[test]
fn kick_close_racing_grace_is_silent() {
    let mut host = host();
    admit(&mut host, 1, "ana");
    host.handle(PeerEvent::Command(Command::Kick(ParticipantId::from(&addr("ana"))))).unwrap();

    let actions = host.handle(PeerEvent::Closed { channel: ChannelId(1) }).unwrap();
    assert!(actions.is_empty());
    let actions =
        host.handle(PeerEvent::TimerFired(Timer::KickGrace(ChannelId(1)))).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn kick_rules() {
    let mut host = host();
    let me = host.id().clone();
    assert_eq!(
        host.handle(PeerEvent::Command(Command::Kick(me))),
        Err(SessionError::Command(CommandError::CannotKickSelf))
    );
    let ghost = ParticipantId::new("nobody");
    assert_eq!(
        host.handle(PeerEvent::Command(Command::Kick(ghost.clone()))),
        Err(SessionError::Command(CommandError::UnknownParticipant(ghost)))
    );
}

#[test]
fn local_players_are_added_and_kicked_directly() {
    let mut host = host();
    host.handle(PeerEvent::Command(Command::AddLocalPlayer("  Cy ".into()))).unwrap();
    let local = host.state().unwrap().players[1].clone();
    assert!(local.is_local());
    assert_eq!(local.name, "Cy");

    let actions = host.handle(PeerEvent::Command(Command::Kick(local.id))).unwrap();
    assert!(sent(&actions).is_empty());
    assert_eq!(notices(&actions), [Notice::PlayerRemoved { name: "Cy".into() }]);

    assert_eq!(
        host.handle(PeerEvent::Command(Command::AddLocalPlayer("   ".into()))),
        Err(SessionError::Command(CommandError::EmptyName))
    );
}

#[test]
fn category_selection_accepts_mix_only_known() {
    let mut host = host();
    host.handle(PeerEvent::Command(Command::SelectCategory("mix".into()))).unwrap();
    assert_eq!(host.state().unwrap().category, "mix");
    assert_eq!(
        host.handle(PeerEvent::Command(Command::SelectCategory("nope".into()))),
        Err(SessionError::Command(CommandError::UnknownCategory("nope".into())))
    );
}

#[test]
fn follower_forwards_turn_commands_once_admitted() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut ana = follower("ana", &room);
    assert_eq!(
        ana.handle(PeerEvent::Command(Command::AdvanceTurn)),
        Err(SessionError::Command(CommandError::NotAttached))
    );

    let mut state = mirror(&room, &["ana", "bo"]);
    attach(&mut ana, &room, 7, state.clone());
    assert_eq!(
        ana.handle(PeerEvent::Command(Command::AdvanceTurn)),
        Err(SessionError::Command(CommandError::NotStarted))
    );

    state.phase = Phase::Prompt;
    state.current_content = Some("prompt".into());
    ana.handle(PeerEvent::Received {
        channel: ChannelId(7),
        frame: frame(Message::StateSync { state }),
    })
    .unwrap();

    let actions = ana.handle(PeerEvent::Command(Command::ChooseForfeit)).unwrap();
    assert_eq!(sent(&actions), [(ChannelId(7), Message::ChooseForfeit {})]);
    assert_eq!(
        ana.handle(PeerEvent::Command(Command::StartSession)),
        Err(SessionError::Command(CommandError::NotCoordinator))
    );
}

#[test]
fn removed_terminates_once() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut ana = follower("ana", &room);
    attach(&mut ana, &room, 7, mirror(&room, &["ana"]));

    let actions = ana
        .handle(PeerEvent::Received { channel: ChannelId(7), frame: frame(Message::Removed {}) })
        .unwrap();
    assert_eq!(notices(&actions), [Notice::Removed]);
    assert_eq!(removals(&actions), [RemovalReason::Kicked]);
    assert!(actions.contains(&PeerAction::Close { channel: ChannelId(7) }));
    assert_eq!(ana.role(), RoleKind::Terminated);

    let actions = ana.handle(PeerEvent::Closed { channel: ChannelId(7) }).unwrap();
    assert!(actions.is_empty());
    assert_eq!(ana.handle(PeerEvent::Command(Command::AdvanceTurn)), Err(SessionError::Removed));
}

#[test]
fn omission_from_sync_counts_as_removal() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut ana = follower("ana", &room);
    attach(&mut ana, &room, 7, mirror(&room, &["ana", "bo"]));

    let actions = ana
        .handle(PeerEvent::Received {
            channel: ChannelId(7),
            frame: frame(Message::StateSync { state: mirror(&room, &["bo"]) }),
        })
        .unwrap();
    assert_eq!(removals(&actions), [RemovalReason::Kicked]);
    assert_eq!(ana.migration(), Some(MigrationState::Terminated));
}

#[test]
fn first_successor_promotes_itself() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut ana = follower("ana", &room);
    let mut state = mirror(&room, &["ana", "bo"]);
    state.players.insert(1, Participant::local(ParticipantId::new("local-xyz"), "Cy"));
    attach(&mut ana, &room, 7, state);

    let actions = ana.handle(PeerEvent::Closed { channel: ChannelId(7) }).unwrap();
    assert_eq!(ana.role(), RoleKind::Coordinator);
    assert!(actions.contains(&PeerAction::Listen));
    assert!(actions.contains(&PeerAction::StartTimer {
        timer: Timer::RejoinWindow,
        after: ProtocolConfig::default().rejoin_window(),
    }));
    assert_eq!(
        notices(&actions),
        [Notice::CoordinatorLost { name: Some("Host".into()) }, Notice::BecameCoordinator]
    );
    assert_eq!(ids(ana.state().unwrap()), [addr("ana").as_str(), addr("bo").as_str()]);
}

#[test]
fn later_follower_rejoins_successor_and_skips_unreachable_ones() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut cy = follower("cy", &room);
    attach(&mut cy, &room, 7, mirror(&room, &["ana", "bo", "cy"]));

    let actions = cy.handle(PeerEvent::Closed { channel: ChannelId(7) }).unwrap();
    assert_eq!(cy.migration(), Some(MigrationState::Rejoining));
    assert!(notices(&actions).contains(&Notice::Reconnecting { to: "ana".into() }));
    assert!(actions.iter().any(|a| matches!(
        a,
        PeerAction::StartTimer { timer: Timer::Rejoin { attempt: 1 }, .. }
    )));

    let actions = cy.handle(PeerEvent::TimerFired(Timer::Rejoin { attempt: 1 })).unwrap();
    assert_eq!(actions, [PeerAction::Connect { remote: addr("ana") }]);

    // ana went down with the host; bo is next.
    let actions = cy
        .handle(PeerEvent::ConnectFailed {
            remote: addr("ana"),
            error: TransportError::Unreachable(addr("ana")),
        })
        .unwrap();
    assert!(notices(&actions).contains(&Notice::Reconnecting { to: "bo".into() }));

    // A stale timer from the first attempt does nothing.
    assert!(cy.handle(PeerEvent::TimerFired(Timer::Rejoin { attempt: 1 })).unwrap().is_empty());
    let actions = cy.handle(PeerEvent::TimerFired(Timer::Rejoin { attempt: 2 })).unwrap();
    assert_eq!(actions, [PeerAction::Connect { remote: addr("bo") }]);

    let actions =
        cy.handle(PeerEvent::Connected { channel: ChannelId(8), remote: addr("bo") }).unwrap();
    assert!(matches!(sent(&actions).as_slice(), [(ChannelId(8), Message::Join { .. })]));
    assert_eq!(cy.migration(), Some(MigrationState::Attached));

    let mut converged = mirror(&room, &["bo", "cy"]);
    converged.players.remove(0);
    let actions = cy
        .handle(PeerEvent::Received {
            channel: ChannelId(8),
            frame: frame(Message::StateSync { state: converged }),
        })
        .unwrap();
    assert_eq!(notices(&actions), [Notice::Rejoined { host: "bo".into() }]);
}

#[test]
fn only_locals_left_ends_the_session_once() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut ana = follower("ana", &room);
    let mut state = mirror(&room, &[]);
    state.players.push(Participant::local(ParticipantId::new("local-xyz"), "Cy"));
    attach(&mut ana, &room, 7, state);

    let actions = ana.handle(PeerEvent::Closed { channel: ChannelId(7) }).unwrap();
    assert_eq!(notices(&actions), [
        Notice::CoordinatorLost { name: Some("Host".into()) },
        Notice::SessionEnded
    ]);
    assert_eq!(removals(&actions), [RemovalReason::NoSuccessor]);
    assert_eq!(ana.termination(), Some(RemovalReason::NoSuccessor));
    assert!(ana.handle(PeerEvent::Closed { channel: ChannelId(7) }).unwrap().is_empty());
}

#[test]
fn promoted_coordinator_prunes_ghosts() {
    let room = PeerAddr::new("tandem-room-ABCD");
    let mut ana = follower("ana", &room);
    attach(&mut ana, &room, 7, mirror(&room, &["ana", "bo", "cy"]));
    ana.handle(PeerEvent::Closed { channel: ChannelId(7) }).unwrap();

    admit(&mut ana, 1, "cy");
    let actions = ana.handle(PeerEvent::TimerFired(Timer::RejoinWindow)).unwrap();
    assert_eq!(notices(&actions), [Notice::PlayerLeft { name: "bo".into() }]);
    assert_eq!(ids(ana.state().unwrap()), [addr("ana").as_str(), addr("cy").as_str()]);
    assert!(matches!(sent(&actions).as_slice(), [(ChannelId(1), Message::StateSync { .. })]));
}

#[test]
fn turn_order_enforcement_drops_out_of_turn_commands() {
    let config = ProtocolConfig { enforce_turn_order: true, ..ProtocolConfig::default() };
    let (mut host, _) = Peer::host(
        SystemEnv,
        config,
        catalog(),
        PeerAddr::new("tandem-room-ABCD"),
        "Host",
        "friends",
    )
    .unwrap();
    admit(&mut host, 1, "ana");
    host.handle(PeerEvent::Command(Command::StartSession)).unwrap();

    // Host's turn; ana may not advance it.
    let actions = host
        .handle(PeerEvent::Received { channel: ChannelId(1), frame: frame(Message::NextTurn {}) })
        .unwrap();
    assert!(actions.is_empty());

    host.handle(PeerEvent::Command(Command::AdvanceTurn)).unwrap();
    assert_eq!(
        host.handle(PeerEvent::Command(Command::AdvanceTurn)),
        Err(SessionError::Command(CommandError::NotYourTurn))
    );
    host.handle(PeerEvent::Received { channel: ChannelId(1), frame: frame(Message::NextTurn {}) })
        .unwrap();
    assert_eq!(host.state().unwrap().current_player_index, 0);
}
