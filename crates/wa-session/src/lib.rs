//! Lifecycle management for a single paired messaging session.
//!
//! The session has to be paired out of band (a user scans a short-lived code)
//! before messages can be relayed through it. [`LifecycleManager`] owns the
//! session state machine, caches the current pairing code, and makes sure only
//! one pairing handshake is ever in flight. The messaging client itself sits
//! behind the [`SessionProvider`] trait; [`HttpBridgeProvider`] is the
//! implementation used in production.

pub mod address;
pub mod bridge;
pub mod error;
pub mod manager;
pub mod pairing;
pub mod provider;
pub mod state;

pub use address::{DEFAULT_ADDRESS_SUFFIX, normalize_recipient};
pub use bridge::{BridgeConfig, HttpBridgeProvider};
pub use error::{LifecycleError, LifecycleResult};
pub use manager::{LifecycleConfig, LifecycleManager};
pub use pairing::{DEFAULT_PAIRING_TTL, PairingArtifact, PairingCache};
pub use provider::{ProviderError, ProviderEvent, ProviderResult, SessionProvider};
pub use state::{SessionState, SessionStatus};
