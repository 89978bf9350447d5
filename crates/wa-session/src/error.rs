//! Lifecycle errors.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by [`crate::LifecycleManager`] operations.
///
/// `Clone` because a single pairing outcome is shared by every caller that
/// joined the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A pairing code was requested while the session is connected.
    #[error("session is already connected")]
    AlreadyConnected,

    /// The operation needs a connected session.
    #[error("session is not connected")]
    NotConnected,

    /// No pairing code arrived before the handshake deadline.
    #[error("timed out after {}s waiting for a pairing code", waited.as_secs())]
    PairingTimeout { waited: Duration },

    /// The provider failed to tear the session down.
    #[error("failed to disconnect session: {0}")]
    DisconnectFailed(String),

    /// The provider failed to deliver a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The provider failed to start the session or dropped it mid-handshake.
    #[error("failed to start session: {0}")]
    ProviderStart(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LifecycleError::PairingTimeout {
            waited: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 30s waiting for a pairing code"
        );

        let err = LifecycleError::SendFailed("bad number".to_string());
        assert_eq!(err.to_string(), "failed to send message: bad number");
    }
}
