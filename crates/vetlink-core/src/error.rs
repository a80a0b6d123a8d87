//! Error types for the vetlink session core.
//!
//! Session errors are values, not panics: the owning client decides whether
//! an error tears the transport down, schedules a retry, or is only logged.

use std::time::Duration;

use thiserror::Error;
use vetlink_proto::{ProtocolError, StompCommand};

use crate::session::SessionPhase;

/// Errors raised by the STOMP session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not valid in the current phase
    #[error("invalid state transition: cannot {operation} from {phase:?}")]
    InvalidState {
        /// Phase when the error occurred
        phase: SessionPhase,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Frame arrived that the current phase does not accept
    #[error("unexpected {command} frame in phase {phase:?}")]
    UnexpectedFrame {
        /// Phase when the frame arrived
        phase: SessionPhase,
        /// Command of the unexpected frame
        command: StompCommand,
    },

    /// CONNECTED did not arrive in time
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Broker went silent past its negotiated heart-beat
    #[error("heart-beat timeout after {elapsed:?}")]
    HeartbeatTimeout {
        /// Time since the last inbound byte
        elapsed: Duration,
    },

    /// Broker sent an ERROR frame
    #[error("broker error: {0}")]
    Broker(String),

    /// Frame could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport failed
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if reconnecting may succeed.
    ///
    /// Protocol violations never heal on retry; timeouts, transport failures
    /// and broker errors (which close the socket) usually do.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::Broker(_)
                | Self::Transport(_)
        )
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
