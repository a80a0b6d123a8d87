//! Scripted end-to-end scenarios.
//!
//! A [`Simulation`] wires one logged-in [`AppSession`] to a [`SimBackend`]
//! through the production [`Runtime`], on a clock that only moves when the
//! test says so.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    sync::{MutexGuard, PoisonError},
    time::Duration,
};

use vetlink_app::{AppConfig, AppSession, BusReceiver, Command, Runtime, UserProfile};
use vetlink_core::{Environment, env::test_utils::MockEnv};
use vetlink_proto::{RoomId, UserId};

use crate::{
    invariants::ViewSnapshot,
    sim_backend::{SharedBackend, SimBackend},
    sim_driver::{SimDriver, SimDriverError},
};

/// User every simulation logs in as.
pub const SIM_USER: UserId = 9;

/// Upper bound on cycles per [`Simulation::settle`]. A run that needs more
/// is looping.
pub const MAX_SETTLE_CYCLES: usize = 10_000;

/// One user's client running against an in-memory backend.
pub struct Simulation {
    runtime: Runtime<SimDriver, MockEnv>,
    env: MockEnv,
    backend: SharedBackend,
    bus: BusReceiver,
}

impl Simulation {
    /// Log in against `backend` with default configuration.
    pub fn new(backend: SimBackend) -> Self {
        Self::with_config(backend, AppConfig::default())
    }

    /// Log in against `backend`.
    pub fn with_config(backend: SimBackend, config: AppConfig) -> Self {
        let env = MockEnv::new();
        let backend = backend.shared();
        let user = UserProfile { user_id: SIM_USER, display_name: "Sim Owner".to_string() };
        let session = AppSession::login(env.clone(), user, config);
        let bus = session.subscribe();
        let runtime = Runtime::new(SimDriver::new(backend.clone()), session);
        Self { runtime, env, backend, bus }
    }

    /// Open the notification stream and process everything that follows.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant fails or the run does not settle.
    pub async fn start(&mut self) -> Result<(), SimDriverError> {
        self.runtime.start().await?;
        self.settle().await
    }

    /// Issue a user command and process everything that follows.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant fails or the run does not settle.
    pub async fn command(&mut self, command: Command) -> Result<(), SimDriverError> {
        self.runtime.driver_mut().inject_command(command);
        self.settle().await
    }

    /// Shorthand for [`Command::EnterRoom`].
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant fails or the run does not settle.
    pub async fn enter_room(&mut self, room_id: RoomId) -> Result<(), SimDriverError> {
        self.command(Command::EnterRoom(room_id)).await
    }

    /// Move the clock, fire due timers and process everything that follows.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant fails or the run does not settle.
    pub async fn advance(&mut self, duration: Duration) -> Result<(), SimDriverError> {
        self.env.advance(duration);
        self.runtime.tick().await?;
        self.settle().await
    }

    /// Process queued inputs until none remain.
    ///
    /// # Errors
    ///
    /// Returns an error if an invariant fails or the inputs never run dry.
    pub async fn settle(&mut self) -> Result<(), SimDriverError> {
        for _ in 0..MAX_SETTLE_CYCLES {
            if !self.runtime.driver().has_pending() {
                return Ok(());
            }
            if self.runtime.process_cycle().await? {
                return Ok(());
            }
        }
        Err(SimDriverError(format!("still busy after {MAX_SETTLE_CYCLES} cycles")))
    }

    /// Log out and release every handle.
    pub async fn shutdown(&mut self) {
        self.runtime.shutdown().await;
    }

    /// The backend, locked.
    pub fn backend(&self) -> MutexGuard<'_, SimBackend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session under test.
    pub fn session(&self) -> &AppSession<MockEnv> {
        self.runtime.session()
    }

    /// The driver.
    pub fn driver(&self) -> &SimDriver {
        self.runtime.driver()
    }

    /// Most recent rendered frame.
    pub fn frame(&self) -> Option<&ViewSnapshot> {
        self.runtime.driver().last_frame()
    }

    /// Bus subscription opened at login.
    pub fn bus(&mut self) -> &mut BusReceiver {
        &mut self.bus
    }

    /// Simulated time since login.
    pub fn elapsed(&self) -> Duration {
        self.env.now().elapsed_since_start()
    }
}
