//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames and messages.
///
/// Every decode failure is non-fatal to a session: the receiver drops the
/// offending frame, logs it, and keeps the channel open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fewer bytes than the frame header or declared payload require.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Header magic does not match [`crate::FrameHeader::MAGIC`].
    #[error("bad frame magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Header version is not one we speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Declared or actual payload exceeds [`crate::FrameHeader::MAX_PAYLOAD_SIZE`].
    #[error("payload of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The envelope names a kind this build does not know.
    #[error("unknown message kind {0:?}")]
    UnknownKind(String),

    /// CBOR encoding or decoding failed.
    #[error("cbor: {0}")]
    Cbor(String),
}
