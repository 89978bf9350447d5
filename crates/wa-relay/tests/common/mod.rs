//! Test utilities and common setup.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, header};
use serde_json::Value;
use tokio::sync::broadcast;
use tower::ServiceExt;
use wa_relay::api::{self, AppState};
use wa_relay::auth::AuthState;
use wa_session::{
    LifecycleConfig, LifecycleManager, ProviderError, ProviderEvent, ProviderResult,
    SessionProvider,
};

pub const TEST_TOKEN: &str = "test-token-for-integration-tests";

/// Scriptable provider standing in for the messaging bridge.
#[derive(Default)]
pub struct FakeBehavior {
    /// Emit this code the given time after `start()`.
    pub issue_on_start: Option<(String, Duration)>,
    pub fail_send: bool,
    pub fail_destroy: bool,
}

pub struct FakeProvider {
    events: broadcast::Sender<ProviderEvent>,
    behavior: FakeBehavior,
    starts: AtomicUsize,
    destroys: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeProvider {
    pub fn new(behavior: FakeBehavior) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            events,
            behavior,
            starts: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Publish an event as the bridge would.
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn start(&self) -> ProviderResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some((code, delay)) = self.behavior.issue_on_start.clone() {
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(ProviderEvent::PairingCodeIssued(code));
            });
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        false
    }

    async fn send(&self, address: &str, body: &str) -> ProviderResult<()> {
        if self.behavior.fail_send {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "invalid wid".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), body.to_string()));
        Ok(())
    }

    async fn destroy(&self) -> ProviderResult<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_destroy {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<FakeProvider>,
    pub lifecycle: LifecycleManager,
}

impl TestApp {
    /// Mark the session as paired.
    pub async fn connect(&self) {
        self.provider.emit(ProviderEvent::Ready);
        self.wait_for_state("connected").await;
    }

    /// Wait until the manager has applied pending provider events.
    pub async fn wait_for_state(&self, expected: &str) {
        for _ in 0..200 {
            if self.lifecycle.get_status().await.state.tag() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {expected}");
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Create a test application with the default behavior.
pub fn test_app() -> TestApp {
    test_app_with(FakeBehavior::default())
}

pub fn test_app_with(behavior: FakeBehavior) -> TestApp {
    let provider = FakeProvider::new(behavior);
    let lifecycle = LifecycleManager::new(provider.clone(), LifecycleConfig::default());
    let state = AppState::new(lifecycle.clone(), AuthState::new(TEST_TOKEN));

    TestApp {
        router: api::create_router(state),
        provider,
        lifecycle,
    }
}

/// Build an authenticated request.
pub fn authed(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"));

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
