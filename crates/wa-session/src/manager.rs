//! Session lifecycle manager.
//!
//! The manager owns the session state machine and the pairing code cache.
//! All mutation goes through one async mutex and the lock is never held
//! across a provider call. Provider events are ingested by a background task
//! started in [`LifecycleManager::new`].
//!
//! Pairing is single-flight: the first caller that finds no valid code spawns
//! a pairing task and every concurrent caller awaits the same shared outcome.
//! The task owns the handshake deadline, so the timeout fires even if every
//! HTTP caller has gone away.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, info, warn};
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::address::{DEFAULT_ADDRESS_SUFFIX, normalize_recipient};
use crate::error::{LifecycleError, LifecycleResult};
use crate::pairing::{DEFAULT_PAIRING_TTL, PairingArtifact, PairingCache};
use crate::provider::{ProviderEvent, SessionProvider};
use crate::state::{SessionState, SessionStatus};

/// How long a pairing request waits for the provider to issue a code.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

type PairingOutcome = LifecycleResult<PairingArtifact>;
type InFlight = Shared<BoxFuture<'static, PairingOutcome>>;

/// Lifecycle manager configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Validity window of an issued pairing code.
    pub pairing_ttl: Duration,
    /// Deadline for the provider to issue a code after a request.
    pub handshake_timeout: Duration,
    /// Suffix appended to bare recipients.
    pub address_suffix: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pairing_ttl: DEFAULT_PAIRING_TTL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
        }
    }
}

struct Inner {
    state: SessionState,
    last_update: DateTime<Utc>,
    pairing: PairingCache,
    /// Resolves the pending pairing request. Taken exactly once.
    waiter: Option<oneshot::Sender<PairingOutcome>>,
    in_flight: Option<InFlight>,
    /// Set once `start()` has been issued and cleared when the session ends.
    session_started: bool,
    tearing_down: bool,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            last_update: Utc::now(),
            pairing: PairingCache::new(),
            waiter: None,
            in_flight: None,
            session_started: false,
            tearing_down: false,
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!("session state {} -> {}", self.state, next);
        }
        self.state = next;
        self.last_update = Utc::now();
    }

    fn resolve_waiter(&mut self, outcome: PairingOutcome) {
        if let Some(waiter) = self.waiter.take() {
            // Err means the request already timed out; nothing to deliver.
            let _ = waiter.send(outcome);
        }
    }
}

struct Core {
    provider: Arc<dyn SessionProvider>,
    config: LifecycleConfig,
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
}

impl Core {
    /// Start a pairing attempt. Caller holds the lock and has checked that
    /// nothing is in flight.
    fn begin_pairing(self: &Arc<Self>, inner: &mut Inner) -> InFlight {
        if let SessionState::Error(reason) = &inner.state {
            debug!("clearing previous session error: {reason}");
            inner.transition(SessionState::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        inner.waiter = Some(tx);
        let needs_start = !inner.session_started;
        inner.session_started = true;
        inner.transition(SessionState::Connecting);

        let task = tokio::spawn(Arc::clone(self).run_pairing(rx, needs_start));
        let in_flight = async move {
            task.await.unwrap_or_else(|err| {
                Err(LifecycleError::ProviderStart(format!(
                    "pairing task failed: {err}"
                )))
            })
        }
        .boxed()
        .shared();

        inner.in_flight = Some(in_flight.clone());
        in_flight
    }

    async fn run_pairing(
        self: Arc<Self>,
        rx: oneshot::Receiver<PairingOutcome>,
        needs_start: bool,
    ) -> PairingOutcome {
        if needs_start {
            info!("starting messaging session");
            if let Err(err) = self.provider.start().await {
                warn!("provider failed to start session: {err}");
                let mut inner = self.inner.lock().await;
                inner.waiter = None;
                inner.in_flight = None;
                inner.session_started = false;
                inner.pairing.clear();
                inner.transition(SessionState::Disconnected);
                return Err(LifecycleError::ProviderStart(err.to_string()));
            }
        }

        let waited = self.config.handshake_timeout;
        let outcome = match tokio::time::timeout(waited, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(LifecycleError::ProviderStart(
                "pairing request was abandoned".to_string(),
            )),
            Err(_) => Err(LifecycleError::PairingTimeout { waited }),
        };

        let mut inner = self.inner.lock().await;
        inner.in_flight = None;
        if let Err(LifecycleError::PairingTimeout { .. }) = outcome {
            warn!("no pairing code issued within {}s", waited.as_secs());
            inner.waiter = None;
            let reverts = matches!(
                inner.state,
                SessionState::Connecting | SessionState::Expired
            );
            if inner.pairing.get().is_none() && reverts {
                inner.session_started = false;
                inner.transition(SessionState::Disconnected);
            }
        }
        outcome
    }

    /// Apply a provider event. Returns the new artifact for pairing events.
    async fn apply_event(&self, event: ProviderEvent) -> Option<PairingArtifact> {
        debug!("provider event: {}", event.kind());
        let mut inner = self.inner.lock().await;
        match event {
            ProviderEvent::PairingCodeIssued(code) => {
                let artifact = PairingArtifact::issue(code, Utc::now(), self.config.pairing_ttl);
                info!("pairing code issued, valid until {}", artifact.expires_at);
                inner.pairing.set(artifact.clone());
                inner.transition(SessionState::Connecting);
                inner.resolve_waiter(Ok(artifact.clone()));
                Some(artifact)
            }
            ProviderEvent::Ready => {
                inner.pairing.clear();
                inner.transition(SessionState::Connected);
                inner.resolve_waiter(Err(LifecycleError::AlreadyConnected));
                None
            }
            ProviderEvent::AuthFailure(reason) => {
                warn!("provider authentication failed: {reason}");
                inner.pairing.clear();
                inner.session_started = false;
                inner.transition(SessionState::Error(reason.clone()));
                inner.resolve_waiter(Err(LifecycleError::ProviderStart(reason)));
                None
            }
            ProviderEvent::Disconnected(reason) => {
                info!("provider disconnected: {reason}");
                inner.pairing.clear();
                inner.session_started = false;
                inner.transition(SessionState::Disconnected);
                inner.resolve_waiter(Err(LifecycleError::ProviderStart(reason)));
                None
            }
        }
    }

    /// Clear `artifact` once its TTL has elapsed, if it is still the live one.
    async fn expire_pairing(&self, artifact: &PairingArtifact) {
        let mut inner = self.inner.lock().await;
        if !inner.pairing.clear_if(artifact) {
            return;
        }
        debug!("pairing code issued at {} expired", artifact.issued_at);
        if inner.state == SessionState::Connecting && inner.in_flight.is_none() {
            inner.session_started = false;
            inner.transition(SessionState::Expired);
        }
    }
}

async fn run_event_loop(core: Arc<Core>, mut events: broadcast::Receiver<ProviderEvent>) {
    let mut armed: Option<(PairingArtifact, Instant)> = None;

    loop {
        let deadline = armed.as_ref().map(|(_, at)| *at);
        let expiry = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = core.shutdown.cancelled() => {
                debug!("session event loop shutting down");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    armed = core.apply_event(event).await.and_then(|artifact| {
                        let at = Instant::now().checked_add(core.config.pairing_ttl)?;
                        Some((artifact, at))
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("session event stream lagged, {skipped} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("provider event stream closed");
                    break;
                }
            },
            _ = expiry => {
                if let Some((artifact, _)) = armed.take() {
                    core.expire_pairing(&artifact).await;
                }
            }
        }
    }
}

/// Owner of the session state machine.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct LifecycleManager {
    core: Arc<Core>,
}

impl LifecycleManager {
    /// Create a manager and start ingesting `provider` events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(provider: Arc<dyn SessionProvider>, config: LifecycleConfig) -> Self {
        let events = provider.subscribe();
        let core = Arc::new(Core {
            provider,
            config,
            inner: Mutex::new(Inner::new()),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(run_event_loop(Arc::clone(&core), events));
        Self { core }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.core.config
    }

    /// Get a pairing code for the user to scan.
    ///
    /// Returns the cached code while it is valid. Otherwise starts the
    /// session if needed and waits for the provider to issue a code, up to
    /// the handshake timeout. Concurrent callers share one attempt.
    pub async fn request_pairing_code(&self) -> LifecycleResult<PairingArtifact> {
        let attempt = {
            let mut inner = self.core.inner.lock().await;
            if inner.state.is_connected() {
                return Err(LifecycleError::AlreadyConnected);
            }
            if let Some(artifact) = inner.pairing.get() {
                debug!("reusing cached pairing code");
                return Ok(artifact);
            }
            if let Some(in_flight) = inner.in_flight.clone() {
                debug!("joining in-flight pairing request");
                in_flight
            } else {
                self.core.begin_pairing(&mut inner)
            }
        };
        attempt.await
    }

    /// Current state and the time of the last transition.
    pub async fn get_status(&self) -> SessionStatus {
        let inner = self.core.inner.lock().await;
        SessionStatus {
            state: inner.state.clone(),
            last_update: inner.last_update,
        }
    }

    /// Tear down a connected session.
    ///
    /// The state ends up `Disconnected` whether or not the provider teardown
    /// succeeds; a failed teardown is still reported as `DisconnectFailed`.
    /// If provider events moved the session out of `Connected` while the
    /// teardown ran, that newer state is kept.
    pub async fn disconnect(&self) -> LifecycleResult<()> {
        {
            let mut inner = self.core.inner.lock().await;
            if !inner.state.is_connected() || inner.tearing_down {
                return Err(LifecycleError::NotConnected);
            }
            inner.tearing_down = true;
        }

        info!("tearing down messaging session");
        let result = self.core.provider.destroy().await;

        let mut inner = self.core.inner.lock().await;
        inner.tearing_down = false;
        if inner.state.is_connected() {
            inner.session_started = false;
            inner.pairing.clear();
            inner.transition(SessionState::Disconnected);
        } else {
            // A provider event moved the session on while destroy() ran.
            debug!("session is {} after teardown, leaving it", inner.state);
        }

        result.map_err(|err| {
            warn!("provider teardown failed: {err}");
            LifecycleError::DisconnectFailed(err.to_string())
        })
    }

    /// Relay a message through the connected session.
    ///
    /// A send failure leaves the session state untouched.
    pub async fn send_message(&self, recipient: &str, body: &str) -> LifecycleResult<()> {
        if !self.core.inner.lock().await.state.is_connected() {
            return Err(LifecycleError::NotConnected);
        }

        let address = normalize_recipient(recipient, &self.core.config.address_suffix);
        self.core
            .provider
            .send(&address, body)
            .await
            .map_err(|err| {
                warn!("provider failed to send message: {err}");
                LifecycleError::SendFailed(err.to_string())
            })
    }

    /// Whether the provider itself reports a live connection.
    pub async fn provider_connected(&self) -> bool {
        self.core.provider.is_connected().await
    }

    /// Stop ingesting provider events.
    pub fn shutdown(&self) {
        self.core.shutdown.cancel();
    }
}
