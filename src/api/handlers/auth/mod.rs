//! Auth handlers and supporting modules.
//!
//! Sessions are anchored on rotating refresh tokens. A login mints a token
//! lineage; each refresh retires the presented token and issues a successor
//! in the same lineage. Presenting a retired token again is treated as
//! credential theft: the whole lineage is revoked and a CRITICAL alert goes
//! out, while the caller sees the same 401 as for any bad token.
//!
//! The [`activity`] middleware wraps the auth surface and writes the audit
//! trail plus failed-attempt counts consumed by alerting.

pub(crate) mod activity;
pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod refresh;
pub(crate) mod register;
pub(crate) mod sessions;
mod state;
pub(crate) mod types;
mod utils;

pub use activity::ActivityMonitor;
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::state::{AuthConfig, AuthState};
    use crate::directory::MemoryUserDirectory;
    use crate::guard::MemoryAlertDispatcher;
    use crate::token::{MemoryTokenStore, Sha256Hasher, TokenService};

    /// Fully in-memory auth state for handler tests.
    pub(crate) fn auth_state() -> Arc<AuthState> {
        let hasher = Arc::new(Sha256Hasher);
        let tokens = TokenService::new(
            Arc::new(MemoryTokenStore::new()),
            hasher.clone(),
            Arc::new(MemoryAlertDispatcher::new()),
        );
        let directory = Arc::new(MemoryUserDirectory::new(hasher));
        Arc::new(AuthState::new(AuthConfig::new(), tokens, directory))
    }
}
