//! Sans-IO core of the vetlink real-time clients.
//!
//! # Components
//!
//! - [`Environment`]: time abstraction so the same state machines run on a
//!   wall clock in production and on a virtual clock in simulation
//! - [`ReconnectPolicy`] / [`Backoff`]: one backoff rule for every transport
//! - [`Link`]: connection lifecycle with generations and retry scheduling
//! - [`StompSession`]: STOMP handshake and heart-beat state machine
//! - [`DedupFilter`]: time-windowed duplicate suppression
//!
//! Nothing in this crate performs I/O. Methods take the current time and
//! return actions; drivers execute them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod dedup;
pub mod env;
pub mod error;
pub mod link;
pub mod reconnect;
pub mod session;

pub use dedup::{DedupConfig, DedupFilter};
pub use env::Environment;
pub use error::ConnectionError;
pub use link::{ConnectionState, Link, LinkFailure};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use session::{SessionAction, SessionConfig, SessionPhase, StompSession};
