//! Shared-secret bearer authentication.

mod error;
mod middleware;

pub use error::{AuthError, AuthErrorResponse};
pub use middleware::{AuthState, auth_middleware};
