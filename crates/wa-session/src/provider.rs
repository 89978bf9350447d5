//! Messaging session provider abstraction.
//!
//! The provider wraps the external messaging client. The lifecycle manager is
//! its only caller and learns about pairing progress through the event
//! stream returned by [`SessionProvider::subscribe`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Size of the provider event buffer.
pub const EVENT_BUFFER_SIZE: usize = 64;

/// Lifecycle events emitted by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A fresh pairing code is available for scanning.
    PairingCodeIssued(String),
    /// The pairing code was scanned and the session is usable.
    Ready,
    /// The provider refused to authenticate the session.
    AuthFailure(String),
    /// The session dropped.
    Disconnected(String),
}

impl ProviderEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderEvent::PairingCodeIssued(_) => "pairing_code_issued",
            ProviderEvent::Ready => "ready",
            ProviderEvent::AuthFailure(_) => "auth_failure",
            ProviderEvent::Disconnected(_) => "disconnected",
        }
    }
}

/// Errors reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider could not be reached.
    #[error("provider unreachable: {0}")]
    Transport(String),

    /// The provider answered but refused the request.
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Any other provider-side failure.
    #[error("{0}")]
    Other(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capabilities of the external messaging session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Begin establishing the session. Pairing codes follow as events.
    async fn start(&self) -> ProviderResult<()>;

    /// Whether the provider itself reports a live connection.
    async fn is_connected(&self) -> bool;

    /// Send `body` to an already-normalized `address`.
    async fn send(&self, address: &str, body: &str) -> ProviderResult<()>;

    /// Tear the session down.
    async fn destroy(&self) -> ProviderResult<()>;

    /// Subscribe to lifecycle events, delivered in emission order.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
