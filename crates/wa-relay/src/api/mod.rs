//! HTTP facade over the session lifecycle.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use handlers::{
    DisconnectResponse, HealthResponse, QrCodeResponse, SendMessageRequest, SendMessageResponse,
    StatusResponse,
};
pub use routes::create_router;
pub use state::AppState;
