//! Session state model.

use chrono::{DateTime, Utc};

/// Lifecycle state of the messaging session.
///
/// Exactly one value is current at any time. The manager is the only writer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session, or the session was torn down.
    #[default]
    Disconnected,
    /// A pairing code was requested or issued and is waiting to be scanned.
    Connecting,
    /// The session is paired and can relay messages.
    Connected,
    /// The last pairing code lapsed without being scanned.
    Expired,
    /// The provider rejected the session (e.g. authentication failure).
    Error(String),
}

impl SessionState {
    /// Whether the session can relay messages.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// Lowercase tag for the state, without the error reason.
    pub fn tag(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Expired => "expired",
            SessionState::Error(_) => "error",
        }
    }

    /// The failure reason when in the `Error` state.
    pub fn error_reason(&self) -> Option<&str> {
        match self {
            SessionState::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Error(reason) => write!(f, "error ({reason})"),
            other => f.write_str(other.tag()),
        }
    }
}

/// Point-in-time view of the session returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Current state.
    pub state: SessionState,
    /// When the last transition was observed.
    pub last_update: DateTime<Utc>,
}
