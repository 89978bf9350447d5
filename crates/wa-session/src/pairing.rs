//! Pairing code cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How long an issued pairing code stays valid.
pub const DEFAULT_PAIRING_TTL: Duration = Duration::from_secs(90);

/// A pairing code together with its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingArtifact {
    /// Opaque code the user scans.
    pub code: String,
    /// When the provider issued the code.
    pub issued_at: DateTime<Utc>,
    /// `issued_at + ttl`.
    pub expires_at: DateTime<Utc>,
}

impl PairingArtifact {
    /// Build an artifact issued at `issued_at` that lives for `ttl`.
    pub fn issue(code: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            code: code.into(),
            issued_at,
            expires_at,
        }
    }

    /// Whether the code has lapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Holds at most one pairing artifact.
///
/// Expiry is lazy: an artifact past its `expires_at` is reported as absent
/// even though it is still stored.
#[derive(Debug, Default)]
pub struct PairingCache {
    current: Option<PairingArtifact>,
}

impl PairingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached artifact.
    pub fn set(&mut self, artifact: PairingArtifact) {
        self.current = Some(artifact);
    }

    /// The cached artifact if it is still valid now.
    pub fn get(&self) -> Option<PairingArtifact> {
        self.get_at(Utc::now())
    }

    /// The cached artifact if it is still valid at `now`.
    pub fn get_at(&self, now: DateTime<Utc>) -> Option<PairingArtifact> {
        self.current
            .as_ref()
            .filter(|artifact| !artifact.is_expired_at(now))
            .cloned()
    }

    /// Drop the cached artifact.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Drop the cached artifact only if it is `artifact`.
    ///
    /// Returns true when something was cleared.
    pub fn clear_if(&mut self, artifact: &PairingArtifact) -> bool {
        if self.current.as_ref() == Some(artifact) {
            self.current = None;
            true
        } else {
            false
        }
    }
}
