//! # Sesio (Session Token Authority)
//!
//! `sesio` issues, validates, rotates, and revokes long-lived refresh
//! credentials, and tracks the failed-authentication activity that rides
//! alongside them.
//!
//! ## Token Model
//!
//! A refresh token travels as `"{jti}.{secret}"`. The `jti` is a public
//! handle; the secret half is random and only its hash is ever stored.
//! Every login roots a new lineage (token family); each refresh retires the
//! presented token exactly once and mints a successor inside the same
//! lineage.
//!
//! - **One-time use:** a rotated record can never be rotated again. The flip
//!   is a single conditional update at the store, so concurrent refreshes
//!   cannot both win.
//! - **Replay defense:** presenting an already-rotated token revokes the
//!   entire lineage and raises a security alert. The caller sees the same
//!   error as for any invalid token.
//! - **Access tokens** are opaque, short-lived, and never persisted; replay
//!   revocation does not reach back to them, their TTL bounds the exposure.
//!
//! ## Failed-Attempt Tracking
//!
//! Login and registration outcomes are audited, and failures are counted per
//! `(source address, claimed identity)` inside a fixed window. Crossing the
//! configured thresholds dispatches HIGH then CRITICAL alerts. The default
//! counter store is process-local memory: with several instances behind a
//! balancer each instance counts independently, so thresholds fire later
//! than the fleet-wide total suggests.
//!
//! ## Storage
//!
//! Records live in `PostgreSQL` when a DSN is configured, or in an in-memory
//! store for development and tests. Both back the same store interface; the
//! rotation compare-and-set behaves identically in each.

pub mod api;
pub mod cli;
pub mod directory;
pub mod guard;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
