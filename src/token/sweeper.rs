//! Periodic purge of expired refresh-token records.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::token::service::TokenService;

pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 3600;

/// Sweep cadence. Expired records stay readable until a sweep removes them,
/// so the interval trades storage growth against audit retention.
#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    interval_seconds: u64,
}

impl SweeperConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub const fn with_interval_seconds(mut self, interval_seconds: u64) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.interval_seconds = self.interval_seconds.max(1);
        self
    }

    #[must_use]
    pub const fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::new().normalize()
    }
}

/// Run the sweep loop until the process exits. One pass runs immediately,
/// then every `interval_seconds`.
pub fn spawn_sweeper(service: TokenService, config: SweeperConfig) -> JoinHandle<()> {
    let config = config.normalize();
    tokio::spawn(async move {
        loop {
            match service.sweep_expired().await {
                Ok(0) => debug!("token sweep found nothing to purge"),
                Ok(purged) => info!(purged, "purged expired refresh tokens"),
                Err(err) => error!("token sweep failed: {err}"),
            }
            sleep(Duration::from_secs(config.interval_seconds())).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::alert::MemoryAlertDispatcher;
    use crate::token::hasher::Sha256Hasher;
    use crate::token::service::ClientInfo;
    use crate::token::store::MemoryTokenStore;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn config_defaults_and_clamp() {
        let config = SweeperConfig::default();
        assert_eq!(config.interval_seconds(), DEFAULT_SWEEP_INTERVAL_SECONDS);

        let config = SweeperConfig::new().with_interval_seconds(0).normalize();
        assert_eq!(config.interval_seconds(), 1);
    }

    #[tokio::test]
    async fn sweeper_purges_expired_records() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = TokenService::new(
            store.clone(),
            Arc::new(Sha256Hasher),
            Arc::new(MemoryAlertDispatcher::new()),
        );
        service
            .issue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "secret",
                -10,
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);

        let handle = spawn_sweeper(service, SweeperConfig::new().with_interval_seconds(3600));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len().await, 0);
        handle.abort();
    }
}
