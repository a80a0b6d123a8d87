//! Fuzz target for event-stream body classification
//!
//! Stream bodies come from a proxy chain that may inject HTML error pages or
//! truncated JSON.
//!
//! # Invariants
//!
//! - Classification NEVER panics; non-object bodies return an error
//! - A connect frame's unread count saturates instead of wrapping

#![no_main]

use libfuzzer_sys::fuzz_target;
use vetlink_proto::{NotificationKind, StreamPayload};

fuzz_target!(|data: &str| {
    let _ = StreamPayload::parse_generic(data);

    for kind in [NotificationKind::Notice, NotificationKind::Reservation, NotificationKind::Vaccination] {
        if let Ok(push) = StreamPayload::parse_named(kind, data) {
            assert_eq!(push.kind, Some(kind));
        }
    }
});
