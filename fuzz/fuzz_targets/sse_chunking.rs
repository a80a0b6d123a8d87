//! Fuzz target for SseDecoder chunk boundaries
//!
//! The notification stream arrives in arbitrary network chunks. Splitting
//! the same bytes differently must never change what the decoder emits.
//!
//! # Strategy
//!
//! - Arbitrary bytes, including `\r`, `\r\n`, NUL and invalid UTF-8
//! - Arbitrary split points, including empty chunks and splits inside
//!   `\r\n`
//!
//! # Invariants
//!
//! - Feeding whole or chunked yields identical events
//! - The last `retry` hint is identical
//! - A line over the limit is rejected by both feeds alike
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vetlink_proto::SseDecoder;

#[derive(Debug, Clone, Arbitrary)]
struct Chunked {
    bytes: Vec<u8>,
    splits: Vec<u16>,
}

fuzz_target!(|input: Chunked| {
    let mut whole = SseDecoder::new().with_max_line(256);
    let Ok(expected) = whole.feed(&input.bytes) else {
        return;
    };

    let mut points: Vec<usize> =
        input.splits.iter().map(|s| usize::from(*s) % (input.bytes.len() + 1)).collect();
    points.sort_unstable();

    let mut chunked = SseDecoder::new().with_max_line(256);
    let mut events = Vec::new();
    let mut start = 0;
    for point in points.into_iter().chain(std::iter::once(input.bytes.len())) {
        let decoded = chunked.feed(&input.bytes[start..point]);
        events.extend(decoded.expect("chunked feed rejected input the whole feed accepted"));
        start = point;
    }

    assert_eq!(events, expected);
    assert_eq!(chunked.take_retry(), whole.take_retry());
});
