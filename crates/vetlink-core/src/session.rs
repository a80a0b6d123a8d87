//! STOMP session state machine.
//!
//! Runs the CONNECT/CONNECTED handshake, enforces the handshake timeout and
//! the negotiated heart-beats, and turns broker ERROR frames into a close.
//! Like every state machine in this workspace it performs no I/O: methods
//! take time as input and return [`SessionAction`]s for the driver.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  CONNECT  ┌──────────────────┐  CONNECTED  ┌─────────────┐
//! │ Idle │──────────>│ AwaitingConnected│────────────>│ Established │
//! └──────┘           └──────────────────┘             └─────────────┘
//!                            │                               │
//!                            │ timeout/ERROR                 │ ERROR/timeout/DISCONNECT
//!                            ↓                               ↓
//!                       ┌────────┐                      ┌────────┐
//!                       │ Closed │                      │ Closed │
//!                       └────────┘                      └────────┘
//! ```

use std::{ops::Sub, time::Duration};

use tracing::debug;
use vetlink_proto::{HeartBeat, StompCommand, StompFrame};

use crate::error::ConnectionError;

/// Time allowed between sending CONNECT and receiving CONNECTED.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Heart-beat offered to the broker in both directions.
pub const DEFAULT_HEART_BEAT: HeartBeat = HeartBeat::new(10_000, 10_000);

/// Receipt id requested on DISCONNECT.
pub const DISCONNECT_RECEIPT: &str = "disconnect";

/// Missed inbound heart-beat intervals tolerated before the broker is
/// considered gone.
pub const DEFAULT_HEARTBEAT_TOLERANCE: u32 = 3;

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send this frame to the broker
    SendFrame(StompFrame),
    /// Send a bare end-of-line heart-beat
    SendHeartbeat,
    /// Close the transport
    Close {
        /// Why the session ended
        reason: String,
    },
}

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport open, CONNECT not sent
    Idle,
    /// CONNECT sent, waiting for CONNECTED
    AwaitingConnected,
    /// Broker accepted the session
    Established,
    /// Session over
    Closed,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Virtual host sent in the CONNECT `host` header
    pub host: String,
    /// Heart-beat offered to the broker
    pub heart_beat: HeartBeat,
    /// Timeout for the handshake
    pub handshake_timeout: Duration,
    /// Missed inbound intervals tolerated
    pub heartbeat_tolerance: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            heart_beat: DEFAULT_HEART_BEAT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_tolerance: DEFAULT_HEARTBEAT_TOLERANCE,
        }
    }
}

/// STOMP session over one transport.
///
/// Generic over the instant type so the simulation harness can drive it on
/// virtual time.
#[derive(Debug, Clone)]
pub struct StompSession<I> {
    phase: SessionPhase,
    config: SessionConfig,
    started_at: I,
    last_received: I,
    last_sent: I,
    outgoing: Option<Duration>,
    incoming: Option<Duration>,
    server: Option<String>,
}

impl<I> StompSession<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a session in [`SessionPhase::Idle`].
    pub fn new(now: I, config: SessionConfig) -> Self {
        Self {
            phase: SessionPhase::Idle,
            config,
            started_at: now,
            last_received: now,
            last_sent: now,
            outgoing: None,
            incoming: None,
            server: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether frames may be sent.
    pub fn is_established(&self) -> bool {
        self.phase == SessionPhase::Established
    }

    /// Broker identification from CONNECTED, if any.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Negotiated heart-beat intervals `(outgoing, incoming)`.
    pub fn heartbeats(&self) -> (Option<Duration>, Option<Duration>) {
        (self.outgoing, self.incoming)
    }

    /// Send CONNECT.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not in [`SessionPhase::Idle`]
    pub fn begin(&mut self, now: I) -> Result<Vec<SessionAction>, ConnectionError> {
        if self.phase != SessionPhase::Idle {
            return Err(ConnectionError::InvalidState { phase: self.phase, operation: "begin" });
        }

        self.phase = SessionPhase::AwaitingConnected;
        self.started_at = now;
        self.last_received = now;
        self.last_sent = now;

        let frame = StompFrame::connect(&self.config.host, self.config.heart_beat);
        Ok(vec![SessionAction::SendFrame(frame)])
    }

    /// Process an inbound frame.
    ///
    /// MESSAGE and RECEIPT frames are accepted silently while established;
    /// routing their bodies is the caller's job.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if the phase does not accept the
    ///   command
    pub fn handle_frame(
        &mut self,
        frame: &StompFrame,
        now: I,
    ) -> Result<Vec<SessionAction>, ConnectionError> {
        self.last_received = now;

        match (self.phase, frame.command) {
            (SessionPhase::AwaitingConnected, StompCommand::Connected) => {
                let server = frame.heart_beat().unwrap_or(HeartBeat::DISABLED);
                let (outgoing, incoming) = self.config.heart_beat.negotiate(server);

                self.outgoing = outgoing;
                self.incoming = incoming;
                self.server = frame.header("server").map(str::to_string);
                self.phase = SessionPhase::Established;
                self.last_sent = now;

                debug!(
                    version = frame.header("version").unwrap_or("1.0"),
                    ?outgoing,
                    ?incoming,
                    "stomp session established"
                );
                Ok(vec![])
            },

            (SessionPhase::Established, StompCommand::Message | StompCommand::Receipt) => {
                Ok(vec![])
            },

            (SessionPhase::AwaitingConnected | SessionPhase::Established, StompCommand::Error) => {
                let reason = frame
                    .header("message")
                    .map(str::to_string)
                    .or_else(|| frame.body_str().ok().map(str::to_string))
                    .unwrap_or_else(|| "broker error".to_string());

                self.phase = SessionPhase::Closed;
                Ok(vec![SessionAction::Close { reason: format!("broker error: {reason}") }])
            },

            (phase, command) => Err(ConnectionError::UnexpectedFrame { phase, command }),
        }
    }

    /// Record an inbound end-of-line heart-beat.
    pub fn handle_heartbeat(&mut self, now: I) {
        self.last_received = now;
    }

    /// Record that something was written to the transport.
    pub fn record_sent(&mut self, now: I) {
        self.last_sent = now;
    }

    /// Timeout reason, if the handshake or the inbound heart-beat expired.
    pub fn check_timeout(&self, now: I) -> Option<ConnectionError> {
        match self.phase {
            SessionPhase::AwaitingConnected => {
                let elapsed = now - self.started_at;
                (elapsed > self.config.handshake_timeout)
                    .then_some(ConnectionError::HandshakeTimeout { elapsed })
            },
            SessionPhase::Established => {
                let interval = self.incoming?;
                let elapsed = now - self.last_received;
                let limit = interval.saturating_mul(self.config.heartbeat_tolerance.max(1));
                (elapsed > limit).then_some(ConnectionError::HeartbeatTimeout { elapsed })
            },
            SessionPhase::Idle | SessionPhase::Closed => None,
        }
    }

    /// Periodic maintenance: timeouts and outbound heart-beats.
    pub fn tick(&mut self, now: I) -> Vec<SessionAction> {
        if let Some(err) = self.check_timeout(now) {
            self.phase = SessionPhase::Closed;
            return vec![SessionAction::Close { reason: err.to_string() }];
        }

        match (self.phase, self.outgoing) {
            (SessionPhase::Established, Some(interval)) if now - self.last_sent >= interval => {
                self.last_sent = now;
                vec![SessionAction::SendHeartbeat]
            },
            _ => vec![],
        }
    }

    /// Graceful shutdown. Sends DISCONNECT if the session was established.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        let was_established = self.phase == SessionPhase::Established;
        self.phase = SessionPhase::Closed;

        if was_established {
            vec![SessionAction::SendFrame(StompFrame::disconnect(DISCONNECT_RECEIPT))]
        } else {
            vec![]
        }
    }

    /// Mark the session closed without sending anything.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn connected(heart_beat: &str) -> StompFrame {
        StompFrame::new(StompCommand::Connected)
            .with_header("version", "1.2")
            .with_header("heart-beat", heart_beat)
    }

    fn established(t0: Instant) -> StompSession<Instant> {
        let mut session = StompSession::new(t0, SessionConfig::default());
        session.begin(t0).unwrap();
        session.handle_frame(&connected("10000,10000"), t0).unwrap();
        session
    }

    #[test]
    fn begin_sends_connect() {
        let t0 = Instant::now();
        let mut session = StompSession::new(t0, SessionConfig::default());

        let actions = session.begin(t0).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            SessionAction::SendFrame(frame) if frame.command == StompCommand::Connect
        ));
        assert_eq!(session.phase(), SessionPhase::AwaitingConnected);
        assert!(session.begin(t0).is_err());
    }

    #[test]
    fn connected_negotiates_heartbeats() {
        let t0 = Instant::now();
        let session = established(t0);

        assert!(session.is_established());
        assert_eq!(
            session.heartbeats(),
            (Some(Duration::from_secs(10)), Some(Duration::from_secs(10)))
        );
    }

    #[test]
    fn handshake_times_out() {
        let t0 = Instant::now();
        let mut session = StompSession::new(t0, SessionConfig::default());
        session.begin(t0).unwrap();

        assert!(session.tick(t0 + Duration::from_secs(5)).is_empty());
        let actions = session.tick(t0 + Duration::from_secs(11));
        assert!(matches!(&actions[..], [SessionAction::Close { reason }] if reason.contains("handshake")));
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn outbound_heartbeat_after_interval() {
        let t0 = Instant::now();
        let mut session = established(t0);

        assert!(session.tick(t0 + Duration::from_secs(9)).is_empty());
        session.handle_heartbeat(t0 + Duration::from_secs(9));
        assert_eq!(session.tick(t0 + Duration::from_secs(10)), vec![SessionAction::SendHeartbeat]);
        assert!(session.tick(t0 + Duration::from_secs(11)).is_empty());
    }

    #[test]
    fn silent_broker_times_out() {
        let t0 = Instant::now();
        let mut session = established(t0);

        session.handle_heartbeat(t0 + Duration::from_secs(20));
        assert!(session.check_timeout(t0 + Duration::from_secs(45)).is_none());

        let actions = session.tick(t0 + Duration::from_secs(51));
        assert!(matches!(&actions[..], [SessionAction::Close { reason }] if reason.contains("heart-beat")));
    }

    #[test]
    fn disabled_heartbeats_never_time_out() {
        let t0 = Instant::now();
        let mut session = StompSession::new(t0, SessionConfig::default());
        session.begin(t0).unwrap();
        session.handle_frame(&connected("0,0"), t0).unwrap();

        assert!(session.tick(t0 + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn error_frame_closes() {
        let t0 = Instant::now();
        let mut session = established(t0);
        let error = StompFrame::new(StompCommand::Error).with_header("message", "access denied");

        let actions = session.handle_frame(&error, t0).unwrap();
        assert!(matches!(&actions[..], [SessionAction::Close { reason }] if reason.contains("access denied")));
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn message_before_connected_rejected() {
        let t0 = Instant::now();
        let mut session = StompSession::new(t0, SessionConfig::default());
        session.begin(t0).unwrap();

        let err = session.handle_frame(&StompFrame::new(StompCommand::Message), t0).unwrap_err();
        assert!(matches!(err, ConnectionError::UnexpectedFrame { command: StompCommand::Message, .. }));
    }

    #[test]
    fn disconnect_only_when_established() {
        let t0 = Instant::now();
        let mut idle = StompSession::new(t0, SessionConfig::default());
        assert!(idle.disconnect().is_empty());

        let mut session = established(t0);
        let actions = session.disconnect();
        assert!(matches!(
            &actions[..],
            [SessionAction::SendFrame(frame)] if frame.command == StompCommand::Disconnect
        ));
    }
}
