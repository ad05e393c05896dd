//! Refresh-token lifecycle: issuance, validation, rotation, revocation.
//!
//! A token is issued at login and rooted in a fresh lineage. Refreshing it
//! retires the presented record exactly once (a conditional update at the
//! store) and mints a successor in the same lineage. A record observed as
//! already rotated at the moment of use is treated as a replay: the whole
//! lineage is revoked and an alert goes out, while the caller receives the
//! same error as for any invalid token.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

pub mod error;
pub mod hasher;
pub mod model;
pub mod service;
pub mod store;
pub mod sweeper;

pub use error::TokenError;
pub use hasher::{Argon2Hasher, CredentialHasher, Sha256Hasher};
pub use model::{RefreshTokenRecord, TokenState};
pub use service::{ClientInfo, TokenService};
pub use store::{MemoryTokenStore, PgTokenStore, StoreError, TokenStore};
pub use sweeper::{SweeperConfig, spawn_sweeper};

/// Create the random secret half of a token.
/// The raw value is only returned to the client; the store keeps a hash.
pub fn generate_secret() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token secret")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Wire format of a refresh token: the public handle and the secret half,
/// joined by a single dot.
#[must_use]
pub fn compose_refresh_token(jti: Uuid, secret: &str) -> String {
    format!("{jti}.{secret}")
}

/// Split a presented refresh token into `(jti, secret)`.
/// Returns `None` for anything that cannot possibly match a stored record,
/// so malformed input never reaches the store.
#[must_use]
pub fn parse_refresh_token(presented: &str) -> Option<(Uuid, &str)> {
    let (jti, secret) = presented.split_once('.')?;
    if secret.is_empty() {
        return None;
    }
    let jti = Uuid::parse_str(jti).ok()?;
    Some((jti, secret))
}
