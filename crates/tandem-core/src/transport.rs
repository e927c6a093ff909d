//! Transport abstraction for identity-addressed channels.
//!
//! Abstracts over transports that connect two participants by network
//! identity and carry whole frames in order. The in-process switchboard in
//! `tandem-app` implements it for local play and simulation.

use async_trait::async_trait;
use bytes::Bytes;
use tandem_proto::PeerAddr;

use crate::error::TransportError;

/// Abstract transport for ordered, reliable, message-oriented channels.
///
/// This trait models a peer-to-peer rendezvous network:
/// - An endpoint binds a network identity and accepts channels on it
/// - Any endpoint that knows an identity can open a channel to it
/// - Each channel is a bidirectional pipe of whole frames
///
/// NOTE: Delivery is not acknowledged. A frame sent just before the channel
/// closes may be lost with no notification beyond the close itself.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sending half of a channel.
    type Sender: ChannelSender;

    /// Receiving half of a channel.
    type Receiver: ChannelReceiver;

    /// Bound address accepting incoming channels.
    type Listener: Listener<Self::Sender, Self::Receiver>;

    /// Bind `addr`.
    ///
    /// Fails with [`TransportError::AddressTaken`] if the identity is already
    /// bound. The binding is released when the listener is dropped.
    async fn listen(&self, addr: &PeerAddr) -> Result<Self::Listener, TransportError>;

    /// Open a channel from `local` to `remote`.
    ///
    /// Fails with [`TransportError::Unreachable`] if nothing is bound at
    /// `remote`.
    async fn connect(
        &self,
        local: &PeerAddr,
        remote: &PeerAddr,
    ) -> Result<Channel<Self::Sender, Self::Receiver>, TransportError>;
}

/// Incoming side of a bound address.
#[async_trait]
pub trait Listener<S, R>: Send + 'static {
    /// Wait for the next incoming channel.
    ///
    /// Returns `None` once the binding is gone. Not restartable.
    async fn accept(&mut self) -> Option<Channel<S, R>>;
}

/// Sending half of a channel.
pub trait ChannelSender: Clone + Send + Sync + 'static {
    /// Queue one frame. Fire-and-forget.
    fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the channel in both directions.
    fn close(&self);
}

/// Receiving half of a channel.
#[async_trait]
pub trait ChannelReceiver: Send + 'static {
    /// Next frame, or `None` once the channel has closed.
    async fn recv(&mut self) -> Option<Bytes>;
}

/// An open channel.
#[derive(Debug)]
pub struct Channel<S, R> {
    /// Identity of the other endpoint.
    pub remote: PeerAddr,
    /// Sending half.
    pub sender: S,
    /// Receiving half.
    pub receiver: R,
}
