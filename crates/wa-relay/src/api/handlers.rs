//! Route handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use wa_session::LifecycleError;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider_connected: bool,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider_connected: state.lifecycle.provider_connected().await,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    pub status: &'static str,
    pub qrcode: String,
    pub expires_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// `GET /whatsapp/qrcode`: hand out a pairing code, starting the session if
/// needed.
pub async fn get_qrcode(State(state): State<AppState>) -> ApiResult<Json<QrCodeResponse>> {
    let outcome = state.lifecycle.request_pairing_code().await;
    let last_update = state.lifecycle.get_status().await.last_update;

    match outcome {
        Ok(artifact) => Ok(Json(QrCodeResponse {
            status: "connecting",
            qrcode: artifact.code,
            expires_at: artifact.expires_at,
            last_update,
        })),
        Err(err) => {
            debug!("pairing code request failed: {err}");
            Err(ApiError::from(err).with_last_update(last_update))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// `connected` or `disconnected`.
    pub status: &'static str,
    /// Exact lifecycle state.
    pub state: &'static str,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /whatsapp/status`. Never starts a session.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.lifecycle.get_status().await;
    Json(StatusResponse {
        status: if status.state.is_connected() {
            "connected"
        } else {
            "disconnected"
        },
        state: status.state.tag(),
        last_update: status.last_update,
        error: status.state.error_reason().map(str::to_string),
    })
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// `POST /whatsapp/disconnect`.
pub async fn disconnect(State(state): State<AppState>) -> ApiResult<Json<DisconnectResponse>> {
    state.lifecycle.disconnect().await?;
    info!("session disconnected on request");
    Ok(Json(DisconnectResponse {
        status: "success",
        message: "Disconnected successfully",
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: &'static str,
}

/// `POST /send-message`.
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<Json<SendMessageResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request(format!("invalid request body: {}", rejection.body_text()))
            .with_success_flag()
    })?;

    let (number, message) = match (non_empty(request.number), non_empty(request.message)) {
        (Some(number), Some(message)) => (number, message),
        _ => {
            return Err(
                ApiError::bad_request("number and message are required").with_success_flag(),
            );
        }
    };

    state
        .lifecycle
        .send_message(&number, &message)
        .await
        .map_err(|err| {
            let api_error = if err == LifecycleError::NotConnected {
                ApiError::service_unavailable(err.to_string())
            } else {
                ApiError::from(err)
            };
            api_error.with_success_flag()
        })?;

    Ok(Json(SendMessageResponse {
        success: true,
        message: "Message sent successfully",
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
