//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use wa_session::LifecycleError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by a handler.
///
/// Every error body carries `status: "error"` and an `error` message. Some
/// routes add `lastUpdate` or a `success: false` flag.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    last_update: Option<DateTime<Utc>>,
    success_flag: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    status: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_update: Option<DateTime<Utc>>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            last_update: None,
            success_flag: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attach the session's last transition time.
    pub fn with_last_update(mut self, last_update: DateTime<Utc>) -> Self {
        self.last_update = Some(last_update);
        self
    }

    /// Add `success: false` to the body.
    pub fn with_success_flag(mut self) -> Self {
        self.success_flag = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        let status = match &err {
            LifecycleError::AlreadyConnected | LifecycleError::NotConnected => {
                StatusCode::BAD_REQUEST
            }
            LifecycleError::PairingTimeout { .. }
            | LifecycleError::DisconnectFailed(_)
            | LifecycleError::SendFailed(_)
            | LifecycleError::ProviderStart(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: self.success_flag.then_some(false),
            status: "error",
            error: self.message,
            last_update: self.last_update,
        });
        (self.status, body).into_response()
    }
}
