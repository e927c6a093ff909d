//! Application layer for Tandem
//!
//! Async runtime that drives one [`tandem_core::Peer`] per session over any
//! [`tandem_core::Transport`], plus an in-process transport for local play and
//! tests.
//!
//! # Components
//!
//! - [`Runtime`]: Opens and joins rooms
//! - [`SessionHandle`]: Commands, snapshots, and shutdown for a running session
//! - [`MemoryNetwork`]: In-process switchboard implementing the transport
//! - [`AppError`]: Errors returned by session handles

mod error;
mod memory;
mod runtime;

pub use error::AppError;
pub use memory::{MemoryListener, MemoryNetwork, MemoryReceiver, MemorySender};
pub use runtime::{Runtime, SessionHandle};
