//! A header plus its CBOR payload.

use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// One unit on a channel.
///
/// Channels preserve message boundaries, so a frame always arrives whole.
/// The header still declares the payload length; a mismatch means the peer
/// is broken and the frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Validated header.
    pub header: FrameHeader,
    /// CBOR envelope bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame around `payload`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`FrameHeader::MAX_PAYLOAD_SIZE`].
    pub fn new(payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let header = FrameHeader::new(payload.len())?;
        Ok(Self { header, payload })
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut Vec<u8>) {
        dst.reserve(FrameHeader::SIZE + self.payload.len());
        dst.extend_from_slice(&self.header.to_bytes());
        dst.extend_from_slice(&self.payload);
    }

    /// Encoded frame as a standalone buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(FrameHeader::SIZE + self.payload.len());
        self.encode(&mut buf);
        Bytes::from(buf)
    }

    /// Decode exactly one frame from `bytes`.
    ///
    /// # Errors
    ///
    /// Header validation errors, or [`ProtocolError::Truncated`] if the
    /// buffer length disagrees with the declared payload size.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;
        let expected = FrameHeader::SIZE + header.payload_size();

        if bytes.len() != expected {
            return Err(ProtocolError::Truncated { expected, actual: bytes.len() });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..]);
        Ok(Self { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encodes_header_then_payload() {
        let frame = Frame::new(vec![0xa0]).unwrap();
        assert_eq!(&frame.to_bytes()[..], &hex!("54444d31 01 00 0000 00000001 a0")[..]);
    }

    #[test]
    fn rejects_short_payload() {
        let bytes = hex!("54444d31 01 00 0000 00000004 a0a0");
        assert_eq!(Frame::decode(&bytes), Err(ProtocolError::Truncated { expected: 16, actual: 14 }));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let bytes = hex!("54444d31 01 00 0000 00000001 a0 ff");
        assert!(matches!(Frame::decode(&bytes), Err(ProtocolError::Truncated { .. })));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = Frame::decode(&bytes);
        }

        #[test]
        fn decode_inverts_encode(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let frame = Frame::new(payload).unwrap();
            prop_assert_eq!(Frame::decode(&frame.to_bytes()).unwrap(), frame);
        }
    }
}
