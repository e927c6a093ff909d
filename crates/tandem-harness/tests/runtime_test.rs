//! End-to-end tests: real session tasks over the in-process transport, on
//! tokio's paused clock.

use std::{sync::Arc, time::Duration};

use tandem_app::{AppError, Runtime, SessionHandle};
use tandem_core::{
    MigrationState, Notice, PeerSnapshot, ProtocolConfig, RemovalReason, RoleKind, RoomCode,
    SessionError, Transport,
};
use tandem_harness::{MemoryNetwork, RecordingPresentation, SAMPLE_CATEGORY, SampleContent, SimEnv};
use tandem_proto::PeerAddr;

fn runtime(net: &Arc<MemoryNetwork>, seed: u64) -> Runtime<MemoryNetwork, SimEnv> {
    Runtime::new(
        Arc::clone(net),
        SimEnv::with_seed(seed),
        ProtocolConfig::default(),
        Arc::new(SampleContent::new()),
    )
}

/// Poll `handle` until `check` holds, for up to thirty virtual seconds.
async fn eventually(handle: &SessionHandle, check: impl Fn(&PeerSnapshot) -> bool) -> PeerSnapshot {
    for _ in 0..600 {
        let snapshot = handle.snapshot().await.unwrap();
        if check(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never held for {}", handle.id());
}

fn names(snapshot: &PeerSnapshot) -> Vec<String> {
    snapshot
        .state
        .as_ref()
        .map(|s| s.players.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_default()
}

struct Room {
    net: Arc<MemoryNetwork>,
    host: SessionHandle,
    followers: Vec<(SessionHandle, RecordingPresentation)>,
}

async fn room(followers: &[&str]) -> Room {
    let net = Arc::new(MemoryNetwork::new());
    let host = runtime(&net, 1)
        .host("Hana", SAMPLE_CATEGORY, Box::new(RecordingPresentation::new()))
        .await
        .unwrap();
    let code = host.room().unwrap().clone();

    let mut joined = Vec::new();
    for (seed, name) in (2..).zip(followers) {
        let presentation = RecordingPresentation::new();
        let handle = runtime(&net, seed).join(&code, name, Box::new(presentation.clone())).await.unwrap();
        joined.push((handle, presentation));
        let expected = joined.len() + 1;
        eventually(&host, |s| names(s).len() == expected).await;
    }
    Room { net, host, followers: joined }
}

#[tokio::test(start_paused = true)]
async fn followers_mirror_the_host() {
    let room = room(&["Ana", "Bo"]).await;
    room.host.start_session().await.unwrap();

    for (follower, _) in &room.followers {
        let snapshot = eventually(follower, |s| s.state.as_ref().is_some_and(|st| st.is_started())).await;
        assert_eq!(snapshot.role, RoleKind::Follower);
        assert_eq!(names(&snapshot), ["Hana", "Ana", "Bo"]);
    }

    let (bo, _) = &room.followers[1];
    bo.advance_turn().await.unwrap();
    let host = eventually(&room.host, |s| s.state.as_ref().is_some_and(|st| st.current_player_index == 1)).await;
    eventually(bo, |s| s.state == host.state).await;
}

#[tokio::test(start_paused = true)]
async fn host_crash_migrates_to_first_follower() {
    let room = room(&["Ana", "Bo"]).await;
    room.host.start_session().await.unwrap();
    let (ana, ana_view) = &room.followers[0];
    let (bo, bo_view) = &room.followers[1];
    eventually(bo, |s| s.state.as_ref().is_some_and(|st| st.is_started())).await;

    let code = room.host.room().unwrap().clone();
    room.net.crash(&code.to_address());
    room.host.shutdown();

    let ana_snapshot = eventually(ana, |s| s.role == RoleKind::Coordinator).await;
    assert_eq!(ana_view.count(&Notice::BecameCoordinator), 1);

    let bo_snapshot = eventually(bo, |s| {
        s.migration == Some(MigrationState::Attached) && names(s) == ["Ana", "Bo"]
    })
    .await;
    assert_eq!(bo_view.count(&Notice::Rejoined { host: "Ana".into() }), 1);
    assert_eq!(names(&ana_snapshot).first().map(String::as_str), Some("Ana"));

    // The new coordinator keeps running the session.
    bo.advance_turn().await.unwrap();
    let state = bo_snapshot.state.unwrap();
    let next = (state.current_player_index + 1) % state.players.len();
    eventually(ana, |s| s.state.as_ref().is_some_and(|st| st.current_player_index == next)).await;
}

#[tokio::test(start_paused = true)]
async fn kicked_follower_is_told_once_and_rejects_commands() {
    let room = room(&["Ana", "Bo"]).await;
    let (bo, bo_view) = &room.followers[1];

    room.host.kick(bo.id().clone()).await.unwrap();
    let snapshot = eventually(bo, |s| s.role == RoleKind::Terminated).await;
    assert_eq!(snapshot.terminated, Some(RemovalReason::Kicked));
    assert_eq!(bo_view.removals(), [RemovalReason::Kicked]);

    let error = bo.advance_turn().await.unwrap_err();
    assert_eq!(error, AppError::Session(SessionError::Removed));
    assert!(!room.net.is_bound(&PeerAddr::new(bo.id().as_str())));

    let host = eventually(&room.host, |s| names(s) == ["Hana", "Ana"]).await;
    eventually(&room.followers[0].0, |s| s.state == host.state).await;
}

#[tokio::test(start_paused = true)]
async fn joining_an_unknown_room_is_unreachable() {
    let net = Arc::new(MemoryNetwork::new());
    let code = "ZZZZ".parse().unwrap();
    let result = runtime(&net, 9).join(&code, "Ana", Box::new(RecordingPresentation::new())).await;
    assert!(matches!(result, Err(AppError::Session(SessionError::Unreachable(_)))));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_session() {
    let room = room(&[]).await;
    room.host.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(room.host.snapshot().await.unwrap_err(), AppError::Stopped);
}

#[tokio::test(start_paused = true)]
async fn taken_room_code_is_replaced_by_a_fresh_one() {
    let net = Arc::new(MemoryNetwork::new());
    let taken = RoomCode::generate_excluding(&SimEnv::with_seed(4), &[]);
    let _squatter = net.listen(&taken.to_address()).await.unwrap();

    let host = runtime(&net, 4)
        .host("Hana", SAMPLE_CATEGORY, Box::new(RecordingPresentation::new()))
        .await
        .unwrap();

    let code = host.room().unwrap().clone();
    assert_ne!(code, taken);
    assert!(net.is_bound(&code.to_address()));

    let ana = runtime(&net, 5).join(&code, "Ana", Box::new(RecordingPresentation::new())).await.unwrap();
    eventually(&ana, |s| names(s) == ["Hana", "Ana"]).await;
}

#[tokio::test(start_paused = true)]
async fn room_code_attempts_run_out() {
    let net = Arc::new(MemoryNetwork::new());
    let taken = RoomCode::generate_excluding(&SimEnv::with_seed(4), &[]);
    let _squatter = net.listen(&taken.to_address()).await.unwrap();

    let config = ProtocolConfig { room_code_attempts: 1, ..ProtocolConfig::default() };
    let runtime =
        Runtime::new(Arc::clone(&net), SimEnv::with_seed(4), config, Arc::new(SampleContent::new()));
    let error = runtime
        .host("Hana", SAMPLE_CATEGORY, Box::new(RecordingPresentation::new()))
        .await
        .err()
        .unwrap();

    assert_eq!(error, AppError::Session(SessionError::AddressTaken(taken.to_address())));
}
