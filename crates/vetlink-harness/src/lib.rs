//! Deterministic simulation harness for vetlink.
//!
//! Runs the production [`vetlink_app::Runtime`] against an in-memory backend
//! on a virtual clock. The backend speaks the same STOMP and event-stream
//! protocols as the real one, can be told to fail on cue, and can inject
//! seeded random faults for chaos runs.
//!
//! # Invariant Testing
//!
//! Every rendered frame is checked against an [`InvariantRegistry`]. A
//! violation surfaces as an error from the runtime call that rendered it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_backend;
pub mod sim_driver;

pub use invariants::{
    IdleWithoutRoom, Invariant, InvariantRegistry, InvariantResult, MessagesBelongToRoom,
    MessagesOrdered, Violation, ViewSnapshot,
};
pub use scenario::{SIM_USER, Simulation};
pub use sim_backend::{BackendStats, FaultConfig, SharedBackend, SimBackend};
pub use sim_driver::{SimDriver, SimDriverError};
