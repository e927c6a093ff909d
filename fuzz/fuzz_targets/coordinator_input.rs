//! Arbitrary frames from a follower channel must never crash a coordinator
//! or break its state invariants.

#![no_main]

use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tandem_core::{
    Catalog, ChannelId, ContentPool, Peer, PeerEvent, ProtocolConfig, SystemEnv,
};
use tandem_proto::{Frame, PeerAddr};

fuzz_target!(|data: &[u8]| {
    let mut categories = BTreeMap::new();
    categories.insert("friends".to_owned(), ContentPool::new(vec!["p".into()], vec!["f".into()]));
    let catalog = Arc::new(Catalog::new(categories).expect("valid catalog"));

    let (mut peer, _) = Peer::host(
        SystemEnv,
        ProtocolConfig::default(),
        catalog,
        PeerAddr::new("tandem-room-FUZZ"),
        "Host",
        "friends",
    )
    .expect("valid host");

    let channel = ChannelId(1);
    let remote = PeerAddr::new("tandem-peer-fuzz");
    let _ = peer.handle(PeerEvent::Accepted { channel, remote });

    // Payloads are split at every 0xFF byte and framed, so the CBOR layer
    // sees arbitrary input.
    for chunk in data.split(|b| *b == 0xFF) {
        let frame = match Frame::new(Bytes::copy_from_slice(chunk)) {
            Ok(frame) => frame.to_bytes(),
            Err(_) => Bytes::copy_from_slice(chunk),
        };
        let _ = peer.handle(PeerEvent::Received { channel, frame });
    }
    let _ = peer.handle(PeerEvent::Closed { channel });

    let state = peer.state().expect("coordinator has state");
    assert!(state.players.is_empty() || state.current_player_index < state.players.len());
});
