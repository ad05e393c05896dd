use crate::token::store::StoreError;
use thiserror::Error;

/// Failure modes of the token lifecycle.
///
/// `ReplayDetected` exists for internal side effects (lineage revocation,
/// alerting) only; responses must collapse it into the same shape as
/// `InvalidToken`/`Unauthorized` so a caller cannot learn that a reuse was
/// specifically noticed. `is_client_fault` is the boundary for that mapping.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token reuse detected")]
    ReplayDetected,
    #[error("unauthorized")]
    Unauthorized,
    #[error("token store failure")]
    Store(#[from] StoreError),
}

impl TokenError {
    /// True for every kind a client can cause with a bad or stale token;
    /// false only for store failures, which surface as a generic internal
    /// error.
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn store_errors_are_not_client_fault() {
        let err = TokenError::Store(StoreError::Backend(anyhow!("connection refused")));
        assert!(!err.is_client_fault());
    }

    #[test]
    fn replay_is_client_fault() {
        assert!(TokenError::ReplayDetected.is_client_fault());
        assert!(TokenError::InvalidToken.is_client_fault());
        assert!(TokenError::TokenExpired.is_client_fault());
        assert!(TokenError::TokenRevoked.is_client_fault());
        assert!(TokenError::Unauthorized.is_client_fault());
    }
}
