//! Terminal shell for Tandem
//!
//! A thin layer over [`tandem_app::Runtime`] that provides terminal-specific
//! I/O. All protocol logic lives in [`tandem_core`].
//!
//! - `tandem demo`: a scripted room over the in-process network that loses its
//!   host halfway through
//! - `tandem play`: pass-the-device play driven by slash commands

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod args;
pub mod commands;
pub mod demo;
pub mod error;
pub mod play;
pub mod render;

pub use args::ProtocolArgs;
pub use commands::Command;
pub use demo::{DemoSettings, demo};
pub use error::CliError;
pub use play::{PlaySettings, play};
pub use render::{SharedWriter, TerminalPresentation};
