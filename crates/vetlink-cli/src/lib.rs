//! Command-line client for the clinic backend.
//!
//! Runs the shared [`vetlink_app::Runtime`] with a [`LiveDriver`]: commands
//! come from stdin, chat and notification updates are printed as lines.
//!
//! # Commands
//!
//! - `/room <id>`: open a chat room
//! - `/leave`: close the room
//! - `/more`: load older messages
//! - `/read`: mark the room read
//! - `/ack <id>`, `/ackall`: mark notifications read
//! - `/quit`: exit
//!
//! Any other line is sent to the open room.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod live;
pub mod printer;

pub use live::{LiveDriver, LiveError};
pub use printer::Printer;
