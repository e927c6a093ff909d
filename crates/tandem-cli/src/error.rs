//! CLI errors.

use std::{io, path::PathBuf};

use tandem_app::AppError;
use tandem_core::ConfigError;
use thiserror::Error;

/// Anything that stops the `tandem` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Terminal I/O failed.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The catalog file could not be read.
    #[error("cannot read catalog {path}: {source}")]
    CatalogFile {
        /// File given on the command line.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Configuration or catalog content is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The session rejected a request or stopped.
    #[error(transparent)]
    Session(#[from] AppError),

    /// No player with this display name.
    #[error("no player called {0:?}")]
    NoSuchPlayer(String),

    /// A hosted session came back without a room code.
    #[error("session has no room code")]
    NoRoomCode,

    /// The demo waited too long for the room to settle.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}
