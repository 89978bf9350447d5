//! HTTP bridge provider.
//!
//! The messaging client runs in a companion bridge process. This provider
//! drives it over a small JSON API and turns its Server-Sent Events stream
//! into [`ProviderEvent`]s.
//!
//! | Capability   | Bridge call               |
//! |--------------|---------------------------|
//! | start        | `POST /session/start`     |
//! | is_connected | `GET /session/state`      |
//! | send         | `POST /messages`          |
//! | destroy      | `DELETE /session`         |
//! | events       | `GET /events` (SSE)       |

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::provider::{
    EVENT_BUFFER_SIZE, ProviderError, ProviderEvent, ProviderResult, SessionProvider,
};

/// Bridge connection settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge, e.g. `http://127.0.0.1:3100`.
    pub base_url: String,
    /// Bearer key sent with every request, if the bridge requires one.
    pub api_key: Option<String>,
    /// Timeout for command requests. Does not apply to the event stream.
    pub request_timeout: Duration,
    /// Pause before reconnecting a dropped event stream.
    pub reconnect_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3100".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    #[serde(default)]
    connected: bool,
}

/// [`SessionProvider`] backed by the HTTP bridge.
pub struct HttpBridgeProvider {
    client: reqwest::Client,
    config: BridgeConfig,
    events: broadcast::Sender<ProviderEvent>,
    pump: CancellationToken,
}

impl HttpBridgeProvider {
    pub fn new(config: BridgeConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("building HTTP client: {e}")))?;
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        Ok(Self {
            client,
            config,
            events,
            pump: CancellationToken::new(),
        })
    }

    /// Spawn the task that forwards bridge events to subscribers.
    ///
    /// The task reconnects whenever the stream drops and runs until
    /// [`HttpBridgeProvider::stop`] is called.
    pub fn spawn_event_pump(&self) -> JoinHandle<()> {
        let pump = EventPump {
            client: self.client.clone(),
            url: self.url("events"),
            api_key: self.config.api_key.clone(),
            events: self.events.clone(),
            reconnect_delay: self.config.reconnect_delay,
            cancel: self.pump.clone(),
        };
        tokio::spawn(pump.run())
    }

    /// Stop the event pump.
    pub fn stop(&self) {
        self.pump.cancel();
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, self.url(path))
            .timeout(self.config.request_timeout);
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> ProviderResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .ok()
            .map(|body| error_message(&body))
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| status.to_string());
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SessionProvider for HttpBridgeProvider {
    async fn start(&self) -> ProviderResult<()> {
        self.execute(self.request(reqwest::Method::POST, "session/start"))
            .await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let response = match self
            .execute(self.request(reqwest::Method::GET, "session/state"))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("bridge state check failed: {e}");
                return false;
            }
        };

        response
            .json::<StateResponse>()
            .await
            .map(|state| state.connected)
            .unwrap_or(false)
    }

    async fn send(&self, address: &str, body: &str) -> ProviderResult<()> {
        let request = self
            .request(reqwest::Method::POST, "messages")
            .json(&SendRequest { to: address, body });
        self.execute(request).await?;
        Ok(())
    }

    async fn destroy(&self) -> ProviderResult<()> {
        self.execute(self.request(reqwest::Method::DELETE, "session"))
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

struct EventPump {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    events: broadcast::Sender<ProviderEvent>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
}

impl EventPump {
    async fn run(self) {
        loop {
            if !self.forward_stream().await {
                return;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
            debug!("reconnecting to bridge event stream");
        }
    }

    /// Forward one connection's worth of events. Returns false once cancelled.
    async fn forward_stream(&self) -> bool {
        let mut request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let mut source = match EventSource::new(request) {
            Ok(source) => source,
            Err(e) => {
                warn!("cannot open bridge event stream: {e}");
                return !self.cancel.is_cancelled();
            }
        };

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    source.close();
                    return false;
                }
                next = source.next() => next,
            };

            match next {
                None => return true,
                Some(Ok(SseEvent::Open)) => info!("connected to bridge event stream"),
                Some(Ok(SseEvent::Message(message))) => {
                    match parse_bridge_event(&message.event, &message.data) {
                        // No subscribers yet is fine; events are not replayed.
                        Some(event) => {
                            let _ = self.events.send(event);
                        }
                        None => debug!("ignoring bridge event {:?}", message.event),
                    }
                }
                Some(Err(e)) => {
                    warn!("bridge event stream error: {e}");
                    source.close();
                    return true;
                }
            }
        }
    }
}

/// Map a bridge SSE message onto a provider event.
///
/// Payloads may be JSON objects (`{"code": ...}`, `{"reason": ...}`), JSON
/// strings, or raw text.
pub fn parse_bridge_event(event: &str, data: &str) -> Option<ProviderEvent> {
    match event {
        "qr" => payload_field(data, "code").map(ProviderEvent::PairingCodeIssued),
        "ready" => Some(ProviderEvent::Ready),
        "auth_failure" => Some(ProviderEvent::AuthFailure(
            payload_field(data, "reason").unwrap_or_else(|| "authentication failed".to_string()),
        )),
        "disconnected" => Some(ProviderEvent::Disconnected(
            payload_field(data, "reason").unwrap_or_else(|| "disconnected".to_string()),
        )),
        _ => None,
    }
}

fn payload_field(data: &str, key: &str) -> Option<String> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }

    let value = match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => map.get(key).and_then(Value::as_str).map(str::to_string),
        Ok(Value::String(text)) => Some(text),
        _ => Some(data.to_string()),
    };
    value.filter(|v| !v.is_empty())
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
