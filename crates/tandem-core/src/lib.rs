//! Tandem protocol core logic
//!
//! Pure state machine logic for replicated game state and host migration,
//! completely decoupled from I/O.
//!
//! # Architecture
//!
//! A [`Peer`] is a deterministic state machine isolated from I/O, time,
//! randomness, and scheduling. All external effects are supplied explicitly by
//! the caller through [`Environment`] and [`PeerEvent`]s.
//!
//! State transitions produce declarative [`PeerAction`]s that describe
//! intended effects rather than executing them directly. A runtime or test
//! harness is responsible for interpreting and executing these actions and
//! for delivering events one at a time.
//!
//! # Components
//!
//! - [`peer`]: Peer state machine (coordinator, follower, terminated)
//! - [`follower`]: Host migration state machine
//! - [`turn`]: Turn state machine (idle, prompt, forfeit)
//! - [`membership`]: Join, leave, and successor rules
//! - [`room`]: Room codes and their network addresses
//! - [`content`]: Prompt and forfeit catalogs
//! - [`presentation`]: UI sink and notices
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Transport abstraction (channels)
//! - [`config`]: Protocol configuration
//! - [`error`]: Error types

pub mod config;
pub mod content;
mod coordinator;
pub mod env;
pub mod error;
pub mod follower;
pub mod membership;
pub mod peer;
pub mod presentation;
pub mod room;
pub mod transport;
pub mod turn;

pub use config::ProtocolConfig;
pub use content::{Catalog, ContentPool, ContentProvider, MIX_CATEGORY};
pub use env::{Environment, SystemEnv};
pub use error::{CommandError, ConfigError, SessionError, TransportError};
pub use follower::MigrationState;
pub use peer::{
    ChannelId, Command, Peer, PeerAction, PeerEvent, PeerSnapshot, RoleKind, Timer,
};
pub use presentation::{Notice, Presentation, PresentationEvent, RemovalReason};
pub use room::RoomCode;
pub use transport::{Channel, ChannelReceiver, ChannelSender, Listener, Transport};
