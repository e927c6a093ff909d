//! Runtime errors.

use tandem_core::SessionError;
use thiserror::Error;

/// Errors returned by a [`crate::SessionHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// The protocol rejected the request.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The session task is gone.
    #[error("session runtime has stopped")]
    Stopped,
}

impl AppError {
    /// The protocol error, if this is one.
    pub fn session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(err) => Some(err),
            Self::Stopped => None,
        }
    }
}
