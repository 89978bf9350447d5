//! Application state shared across handlers.

use wa_session::LifecycleManager;

use crate::auth::AuthState;

#[derive(Clone)]
pub struct AppState {
    /// The single messaging session.
    pub lifecycle: LifecycleManager,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(lifecycle: LifecycleManager, auth: AuthState) -> Self {
        Self { lifecycle, auth }
    }
}
