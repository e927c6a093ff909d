//! In-process switchboard transport.
//!
//! [`MemoryNetwork`] connects endpoints inside one process by identity. Each
//! channel is a pair of unbounded queues plus a shared close flag, so frames
//! arrive in order and a close from either end is seen by both.
//!
//! [`MemoryNetwork::crash`] simulates an endpoint vanishing: its binding is
//! released and every channel it holds closes at once.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use tandem_core::{
    error::TransportError,
    transport::{Channel, ChannelReceiver, ChannelSender, Listener, Transport},
};
use tandem_proto::PeerAddr;
use tokio::sync::{mpsc, watch};
use tracing::debug;

type MemoryChannel = Channel<MemorySender, MemoryReceiver>;

/// Shared in-process network. Clones share the same switchboard.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    bindings: HashMap<PeerAddr, Binding>,
    /// Every channel end an address holds, for [`MemoryNetwork::crash`].
    endpoints: HashMap<PeerAddr, Vec<MemorySender>>,
    next_binding: u64,
}

struct Binding {
    id: u64,
    incoming: mpsc::UnboundedSender<MemoryChannel>,
}

impl MemoryNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if something is bound at `addr`.
    pub fn is_bound(&self, addr: &PeerAddr) -> bool {
        self.registry().bindings.contains_key(addr)
    }

    /// Drop `addr` off the network: release its binding and close every
    /// channel it holds.
    pub fn crash(&self, addr: &PeerAddr) {
        let mut registry = self.registry();
        registry.bindings.remove(addr);
        let ends = registry.endpoints.remove(addr).unwrap_or_default();
        drop(registry);

        debug!(%addr, channels = ends.len(), "crashing endpoint");
        for end in ends {
            end.close();
        }
    }
}

#[async_trait]
impl Transport for MemoryNetwork {
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;
    type Listener = MemoryListener;

    async fn listen(&self, addr: &PeerAddr) -> Result<Self::Listener, TransportError> {
        let mut registry = self.registry();
        if registry.bindings.contains_key(addr) {
            return Err(TransportError::AddressTaken(addr.clone()));
        }

        let (incoming, accepted) = mpsc::unbounded_channel();
        registry.next_binding += 1;
        let id = registry.next_binding;
        registry.bindings.insert(addr.clone(), Binding { id, incoming });

        debug!(%addr, "bound");
        Ok(MemoryListener { addr: addr.clone(), id, accepted, network: self.clone() })
    }

    async fn connect(
        &self,
        local: &PeerAddr,
        remote: &PeerAddr,
    ) -> Result<MemoryChannel, TransportError> {
        let mut registry = self.registry();
        let Some(binding) = registry.bindings.get(remote) else {
            return Err(TransportError::Unreachable(remote.clone()));
        };

        let (near, far) = pair(local, remote);
        let (near_sender, far_sender) = (near.sender.clone(), far.sender.clone());
        if binding.incoming.send(far).is_err() {
            return Err(TransportError::Unreachable(remote.clone()));
        }

        for (addr, end) in [(local, near_sender), (remote, far_sender)] {
            let ends = registry.endpoints.entry(addr.clone()).or_default();
            ends.retain(|e| !e.is_closed());
            ends.push(end);
        }

        debug!(%local, %remote, "connected");
        Ok(near)
    }
}

/// Both ends of a fresh channel between `a` and `b`.
fn pair(a: &PeerAddr, b: &PeerAddr) -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let (closed, _) = watch::channel(false);
    let closed = Arc::new(closed);

    let end = |remote: &PeerAddr, tx, rx| Channel {
        remote: remote.clone(),
        sender: MemorySender { tx, closed: Arc::clone(&closed) },
        receiver: MemoryReceiver { rx, closed: closed.subscribe() },
    };
    (end(b, a_tx, a_rx), end(a, b_tx, b_rx))
}

/// A bound address.
pub struct MemoryListener {
    addr: PeerAddr,
    id: u64,
    accepted: mpsc::UnboundedReceiver<MemoryChannel>,
    network: MemoryNetwork,
}

#[async_trait]
impl Listener<MemorySender, MemoryReceiver> for MemoryListener {
    async fn accept(&mut self) -> Option<MemoryChannel> {
        self.accepted.recv().await
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let mut registry = self.network.registry();
        if registry.bindings.get(&self.addr).is_some_and(|b| b.id == self.id) {
            registry.bindings.remove(&self.addr);
        }
    }
}

/// Sending half of an in-memory channel.
#[derive(Clone)]
pub struct MemorySender {
    tx: mpsc::UnboundedSender<Bytes>,
    closed: Arc<watch::Sender<bool>>,
}

impl MemorySender {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl ChannelSender for MemorySender {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Receiving half of an in-memory channel.
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<Bytes>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl ChannelReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Option<Bytes> {
        loop {
            // Frames queued before the close are still delivered.
            if *self.closed.borrow() {
                return self.rx.try_recv().ok();
            }
            tokio::select! {
                biased;
                frame = self.rx.recv() => return frame,
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return self.rx.try_recv().ok();
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PeerAddr {
        PeerAddr::new(s)
    }

    #[tokio::test]
    async fn connect_requires_a_binding() {
        let net = MemoryNetwork::new();
        let result = net.connect(&addr("a"), &addr("b")).await;
        assert_eq!(result.err(), Some(TransportError::Unreachable(addr("b"))));
    }

    #[tokio::test]
    async fn duplicate_bind_is_rejected_until_released() {
        let net = MemoryNetwork::new();
        let listener = net.listen(&addr("room")).await.unwrap();
        assert_eq!(
            net.listen(&addr("room")).await.err(),
            Some(TransportError::AddressTaken(addr("room")))
        );

        drop(listener);
        assert!(!net.is_bound(&addr("room")));
        assert!(net.listen(&addr("room")).await.is_ok());
    }

    #[tokio::test]
    async fn frames_arrive_in_order_both_ways() {
        let net = MemoryNetwork::new();
        let mut listener = net.listen(&addr("host")).await.unwrap();
        let mut dialer = net.connect(&addr("guest"), &addr("host")).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();
        assert_eq!(accepted.remote, addr("guest"));
        assert_eq!(dialer.remote, addr("host"));

        for i in 0..3u8 {
            dialer.sender.send(Bytes::from(vec![i])).unwrap();
        }
        for i in 0..3u8 {
            assert_eq!(accepted.receiver.recv().await, Some(Bytes::from(vec![i])));
        }

        accepted.sender.send(Bytes::from_static(b"back")).unwrap();
        assert_eq!(dialer.receiver.recv().await, Some(Bytes::from_static(b"back")));
    }

    #[tokio::test]
    async fn close_is_seen_by_both_ends_after_pending_frames() {
        let net = MemoryNetwork::new();
        let mut listener = net.listen(&addr("host")).await.unwrap();
        let mut dialer = net.connect(&addr("guest"), &addr("host")).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();

        accepted.sender.send(Bytes::from_static(b"last")).unwrap();
        accepted.sender.close();

        assert_eq!(dialer.receiver.recv().await, Some(Bytes::from_static(b"last")));
        assert_eq!(dialer.receiver.recv().await, None);
        assert_eq!(accepted.receiver.recv().await, None);
        assert_eq!(dialer.sender.send(Bytes::new()), Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn crash_unbinds_and_closes_channels() {
        let net = MemoryNetwork::new();
        let mut listener = net.listen(&addr("host")).await.unwrap();
        let mut dialer = net.connect(&addr("guest"), &addr("host")).await.unwrap();
        let _accepted = listener.accept().await.unwrap();

        net.crash(&addr("host"));
        assert!(!net.is_bound(&addr("host")));
        assert_eq!(dialer.receiver.recv().await, None);
        assert!(listener.accept().await.is_none());
        assert!(net.connect(&addr("guest"), &addr("host")).await.is_err());
    }
}
