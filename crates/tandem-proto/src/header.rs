//! Fixed-size frame header.
//!
//! Twelve bytes, big-endian, parsed without copying through `zerocopy`:
//!
//! ```text
//! 0      4   5   6      8              12
//! +------+---+---+------+---------------+
//! | TDM1 | v | f | rsvd | payload_size  |
//! +------+---+---+------+---------------+
//! ```

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::network_endian::U32,
};

use crate::errors::{ProtocolError, Result};

/// Frame header preceding every CBOR payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    flags: u8,
    reserved: [u8; 2],
    payload_size: U32,
}

impl FrameHeader {
    /// Encoded size of the header in bytes.
    pub const SIZE: usize = 12;

    /// Magic bytes identifying a Tandem frame.
    pub const MAGIC: [u8; 4] = *b"TDM1";

    /// Wire format version.
    pub const VERSION: u8 = 1;

    /// Upper bound on payload size (1 MiB). A full `GameState` for a small
    /// group is a few hundred bytes; anything near this limit is garbage.
    pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

    /// Create a header for a payload of `payload_size` bytes.
    pub fn new(payload_size: usize) -> Result<Self> {
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            flags: 0,
            reserved: [0; 2],
            payload_size: U32::new(payload_size as u32),
        })
    }

    /// Parse and validate a header from the front of `bytes`.
    ///
    /// Trailing bytes after the header are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let prefix = bytes
            .get(..Self::SIZE)
            .ok_or(ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() })?;

        let header = Self::ref_from_bytes(prefix)
            .map_err(|_| ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() })?;

        header.validate()?;
        Ok(header)
    }

    /// Serialize to a fixed-size array.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Declared payload size in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_size.get() as usize
    }

    /// Wire format version.
    pub fn version(&self) -> u8 {
        self.version
    }

    fn validate(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(ProtocolError::BadMagic(self.magic));
        }
        if self.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        if self.payload_size() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload_size(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }
}
