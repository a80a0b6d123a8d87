//! Fuzz target for StompFrame::decode_all
//!
//! Feeds arbitrary bytes to the STOMP decoder to find:
//! - Parser crashes or panics
//! - Length arithmetic overflows on `content-length`
//! - Escapes that slip past validation
//!
//! # Invariants
//!
//! - Decoding NEVER panics; malformed input returns an error
//! - Every decoded frame encodes again without error

#![no_main]

use libfuzzer_sys::fuzz_target;
use vetlink_proto::StompFrame;

fuzz_target!(|data: &[u8]| {
    let Ok(frames) = StompFrame::decode_all(data) else {
        return;
    };

    for frame in frames {
        let mut buf = Vec::new();
        assert!(frame.encode(&mut buf).is_ok(), "decoded frame failed to encode: {frame:?}");
        let _ = StompFrame::decode(&buf);
    }
});
