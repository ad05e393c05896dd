//! Auth state and token lifetime configuration.

use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::token::TokenService;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const MIN_ACCESS_TOKEN_TTL_SECONDS: i64 = 60;
const MIN_REFRESH_TOKEN_TTL_SECONDS: i64 = 300;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    /// Clamp lifetimes to sane floors and keep the refresh window longer
    /// than the access window.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.access_token_ttl_seconds = self
            .access_token_ttl_seconds
            .max(MIN_ACCESS_TOKEN_TTL_SECONDS);
        self.refresh_token_ttl_seconds = self
            .refresh_token_ttl_seconds
            .max(MIN_REFRESH_TOKEN_TTL_SECONDS)
            .max(self.access_token_ttl_seconds.saturating_add(1));
        self
    }

    #[must_use]
    pub const fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    directory: Arc<dyn UserDirectory>,
}

impl AuthState {
    pub fn new(config: AuthConfig, tokens: TokenService, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            config: config.normalize(),
            tokens,
            directory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub(super) fn directory(&self) -> &dyn UserDirectory {
        self.directory.as_ref()
    }
}
