use crate::{
    api,
    api::handlers::auth::AuthConfig,
    guard::{AlertDispatcher, LogAlertDispatcher, TrackerConfig, WebhookAlertDispatcher},
    token::SweeperConfig,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub auth_config: AuthConfig,
    pub sweeper_config: SweeperConfig,
    pub tracker_config: TrackerConfig,
    pub webhook_url: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the alert webhook URL is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let alerts: Arc<dyn AlertDispatcher> = match args.webhook_url {
        Some(raw) => {
            let endpoint = Url::parse(&raw).context("Invalid alert webhook URL")?;
            Arc::new(WebhookAlertDispatcher::new(endpoint)?)
        }
        None => Arc::new(LogAlertDispatcher),
    };

    api::new(
        args.port,
        args.dsn,
        args.auth_config,
        args.tracker_config,
        args.sweeper_config,
        alerts,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::TrackerConfig;
    use crate::token::SweeperConfig;

    #[tokio::test]
    async fn rejects_malformed_webhook_url() {
        let args = Args {
            port: 0,
            dsn: None,
            auth_config: AuthConfig::new(),
            sweeper_config: SweeperConfig::new(),
            tracker_config: TrackerConfig::new(),
            webhook_url: Some("not a url".to_string()),
        };

        let err = execute(args).await.unwrap_err();
        assert!(err.to_string().contains("Invalid alert webhook URL"));
    }
}
