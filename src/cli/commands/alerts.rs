use clap::{Arg, ArgMatches, Command};

use crate::guard::TrackerConfig;

pub const ARG_ATTEMPT_WINDOW: &str = "failed-attempt-window-seconds";
pub const ARG_HIGH_THRESHOLD: &str = "alert-high-threshold";
pub const ARG_CRITICAL_THRESHOLD: &str = "alert-critical-threshold";
pub const ARG_WEBHOOK_URL: &str = "alert-webhook-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub window_seconds: i64,
    pub high_threshold: u32,
    pub critical_threshold: u32,
    pub webhook_url: Option<String>,
}

impl Options {
    /// Parse alerting arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let window_seconds = matches
            .get_one::<i64>(ARG_ATTEMPT_WINDOW)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_ATTEMPT_WINDOW}"))?;
        let high_threshold = matches
            .get_one::<u32>(ARG_HIGH_THRESHOLD)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_HIGH_THRESHOLD}"))?;
        let critical_threshold = matches
            .get_one::<u32>(ARG_CRITICAL_THRESHOLD)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_CRITICAL_THRESHOLD}")
            })?;

        // Empty env vars come through as empty strings.
        let webhook_url = matches
            .get_one::<String>(ARG_WEBHOOK_URL)
            .cloned()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            window_seconds,
            high_threshold,
            critical_threshold,
            webhook_url,
        })
    }

    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::new()
            .with_window_seconds(self.window_seconds)
            .with_high_threshold(self.high_threshold)
            .with_critical_threshold(self.critical_threshold)
            .normalize()
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ATTEMPT_WINDOW)
                .long(ARG_ATTEMPT_WINDOW)
                .help("Window for counting failed authentication attempts in seconds")
                .env("SESIO_FAILED_ATTEMPT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_HIGH_THRESHOLD)
                .long(ARG_HIGH_THRESHOLD)
                .help("Failures per (source, identity) that raise a HIGH alert")
                .env("SESIO_ALERT_HIGH_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_CRITICAL_THRESHOLD)
                .long(ARG_CRITICAL_THRESHOLD)
                .help("Failures per (source, identity) that raise a CRITICAL alert")
                .env("SESIO_ALERT_CRITICAL_THRESHOLD")
                .default_value("10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_WEBHOOK_URL)
                .long(ARG_WEBHOOK_URL)
                .help("Webhook endpoint that receives alerts as JSON (logged when unset)")
                .env("SESIO_ALERT_WEBHOOK_URL"),
        )
}
