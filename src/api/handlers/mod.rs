//! API handlers for the session token authority.
//!
//! This module organizes the service's route handlers: the auth surface
//! (registration, login, token rotation, session management) and health.

pub mod auth;
pub mod health;
