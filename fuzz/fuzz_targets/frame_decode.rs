//! Arbitrary bytes through the frame decoder. Anything that decodes must
//! re-encode to the same frame.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tandem_proto::Frame;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        let reencoded = frame.to_bytes();
        let again = Frame::decode(&reencoded).expect("re-encoded frame must decode");
        assert_eq!(frame, again);
    }
});
