//! Security alert dispatch.
//!
//! Dispatchers are synchronous from the caller's point of view; anything
//! that does I/O spawns it onto the runtime. A failed delivery is logged and
//! dropped, never surfaced to the request that raised the alert.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, warn};
use url::Url;

use crate::APP_USER_AGENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    High,
    Critical,
}

impl AlertSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Fan out a security alert. Implementations must not block the caller.
pub trait AlertDispatcher: Send + Sync {
    fn send(&self, severity: AlertSeverity, message: &str, context: Value);
}

/// Default dispatcher: alerts land in the service log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAlertDispatcher;

impl AlertDispatcher for LogAlertDispatcher {
    fn send(&self, severity: AlertSeverity, message: &str, context: Value) {
        match severity {
            AlertSeverity::High => {
                warn!(severity = severity.as_str(), %context, "{message}");
            }
            AlertSeverity::Critical => {
                error!(severity = severity.as_str(), %context, "{message}");
            }
        }
    }
}

/// POSTs alerts as JSON to a configured endpoint (pager bridge, chat hook).
#[derive(Clone, Debug)]
pub struct WebhookAlertDispatcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookAlertDispatcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .context("failed to build alert webhook client")?;
        Ok(Self { client, endpoint })
    }
}

impl AlertDispatcher for WebhookAlertDispatcher {
    fn send(&self, severity: AlertSeverity, message: &str, context: Value) {
        let payload = serde_json::json!({
            "severity": severity.as_str(),
            "message": message,
            "context": context,
            "raised_at": Utc::now().to_rfc3339(),
        });
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            match client.post(endpoint.clone()).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("alert webhook delivered");
                }
                Ok(response) => {
                    error!(status = %response.status(), "alert webhook rejected");
                }
                Err(err) => {
                    error!("alert webhook delivery failed: {err}");
                }
            }
        });
    }
}

/// Captures alerts in memory so tests can assert on dispatch counts.
#[derive(Debug, Default)]
pub struct MemoryAlertDispatcher {
    sent: Mutex<Vec<(AlertSeverity, String, Value)>>,
}

impl MemoryAlertDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<(AlertSeverity, String, Value)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count_of(&self, severity: AlertSeverity) -> usize {
        self.sent()
            .iter()
            .filter(|(sent, _, _)| *sent == severity)
            .count()
    }
}

impl AlertDispatcher for MemoryAlertDispatcher {
    fn send(&self, severity: AlertSeverity, message: &str, context: Value) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((severity, message.to_string(), context));
    }
}
