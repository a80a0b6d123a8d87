//! Application layer for vetlink
//!
//! The logged-in user's session, a typed event bus, and a generic runtime
//! that executes the client state machines through a platform driver. The
//! same runtime runs against the live backend and in deterministic
//! simulation.
//!
//! # Components
//!
//! - [`AppSession`]: explicit user context owning both real-time sessions
//! - [`EventBus`]: typed publish/subscribe of [`AppNotification`]s
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: generic orchestration loop using a Driver
//! - [`Command`]: user intents, parsed from text input

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bus;
mod driver;
mod input;
mod runtime;
mod session;
mod view;

pub use bus::{AppNotification, BusReceiver, DEFAULT_BUS_CAPACITY, Delivery, EventBus};
pub use driver::Driver;
pub use input::{Command, DriverEvent};
pub use runtime::Runtime;
pub use session::{AppConfig, AppSession, UserProfile};
pub use view::View;
