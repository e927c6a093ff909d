//! Arbitrary CBOR payloads through the message decoder.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tandem_proto::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = Message::from_cbor(data) {
        let kind = message.kind();
        assert!(Message::KINDS.contains(&kind));
        let bytes = message.to_cbor().expect("decoded message must encode");
        assert_eq!(Message::from_cbor(&bytes).expect("round trip"), message);
    }
});
