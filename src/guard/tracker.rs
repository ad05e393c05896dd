//! Failed-authentication tracking per `(source address, claimed identity)`.
//!
//! Counts live behind [`AttemptStore`] so a distributed backend can be
//! plugged in; the default is process-local memory, which under-counts when
//! several instances run behind a balancer (each instance only sees its own
//! share). Counts use a fixed window anchored at the first failure and a
//! success clears the pair outright.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::guard::alert::{AlertDispatcher, AlertSeverity};

pub const DEFAULT_WINDOW_SECONDS: i64 = 900;
pub const DEFAULT_HIGH_THRESHOLD: u32 = 5;
pub const DEFAULT_CRITICAL_THRESHOLD: u32 = 10;

#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    window_seconds: i64,
    high_threshold: u32,
    critical_threshold: u32,
}

impl TrackerConfig {
    /// Default policy: 15 minute window, HIGH at 5 failures, CRITICAL at 10.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_window_seconds(mut self, seconds: i64) -> Self {
        self.window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_high_threshold(mut self, threshold: u32) -> Self {
        self.high_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_critical_threshold(mut self, threshold: u32) -> Self {
        self.critical_threshold = threshold;
        self
    }

    /// Clamp to a usable policy: a window of at least one second and
    /// thresholds of at least one, with CRITICAL never below HIGH.
    #[must_use]
    pub fn normalize(self) -> Self {
        let window_seconds = self.window_seconds.max(1);
        let high_threshold = self.high_threshold.max(1);
        let critical_threshold = self.critical_threshold.max(high_threshold);
        Self {
            window_seconds,
            high_threshold,
            critical_threshold,
        }
    }

    #[must_use]
    pub const fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    #[must_use]
    pub const fn high_threshold(&self) -> u32 {
        self.high_threshold
    }

    #[must_use]
    pub const fn critical_threshold(&self) -> u32 {
        self.critical_threshold
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter storage for one deployment. `record_failure` returns the count
/// inside the current window, including the failure just recorded.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn record_failure(&self, source: &str, identity: &str, now: DateTime<Utc>) -> u32;
    async fn clear(&self, source: &str, identity: &str);
}

#[derive(Debug, Clone, Copy)]
struct AttemptWindow {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Process-local counter map. Stale windows are pruned on every write, so
/// the map never outgrows the set of pairs failing within one window.
#[derive(Debug)]
pub struct MemoryAttemptStore {
    window: Duration,
    entries: Mutex<HashMap<(String, String), AttemptWindow>>,
}

impl MemoryAttemptStore {
    #[must_use]
    pub fn new(window_seconds: i64) -> Self {
        Self {
            window: Duration::seconds(window_seconds.max(1)),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn record_failure(&self, source: &str, identity: &str, now: DateTime<Utc>) -> u32 {
        let mut entries = self.entries.lock().await;
        let window = self.window;
        entries.retain(|_, entry| now.signed_duration_since(entry.window_start) < window);

        let entry = entries
            .entry((source.to_string(), identity.to_string()))
            .or_insert(AttemptWindow {
                count: 0,
                window_start: now,
            });
        entry.count = entry.count.saturating_add(1);
        entry.count
    }

    async fn clear(&self, source: &str, identity: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(&(source.to_string(), identity.to_string()));
    }
}

/// Applies the alert policy on top of an [`AttemptStore`].
#[derive(Clone)]
pub struct FailedAttemptTracker {
    store: Arc<dyn AttemptStore>,
    alerts: Arc<dyn AlertDispatcher>,
    config: TrackerConfig,
}

impl FailedAttemptTracker {
    #[must_use]
    pub fn new(
        store: Arc<dyn AttemptStore>,
        alerts: Arc<dyn AlertDispatcher>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            alerts,
            config: config.normalize(),
        }
    }

    /// Count one failure and dispatch an alert when the pair crosses a
    /// threshold. Returns the count inside the current window.
    pub async fn record_failure(&self, source: &str, identity: &str) -> u32 {
        let count = self.store.record_failure(source, identity, Utc::now()).await;
        let context = json!({
            "source": source,
            "identity": identity,
            "count": count,
        });
        if count >= self.config.critical_threshold() {
            self.alerts.send(
                AlertSeverity::Critical,
                "repeated authentication failures",
                context,
            );
        } else if count >= self.config.high_threshold() {
            self.alerts.send(
                AlertSeverity::High,
                "repeated authentication failures",
                context,
            );
        }
        count
    }

    /// A successful authentication clears the pair's counter.
    pub async fn record_success(&self, source: &str, identity: &str) {
        self.store.clear(source, identity).await;
    }
}
