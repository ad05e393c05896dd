use clap::{Arg, ArgMatches, Command};

use crate::api::handlers::auth::AuthConfig;
use crate::token::SweeperConfig;

pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_SWEEP_INTERVAL: &str = "sweep-interval-seconds";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
}

impl Options {
    /// Parse token lifetime arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let access_token_ttl_seconds = matches
            .get_one::<i64>(ARG_ACCESS_TOKEN_TTL)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_ACCESS_TOKEN_TTL}"))?;
        let refresh_token_ttl_seconds = matches
            .get_one::<i64>(ARG_REFRESH_TOKEN_TTL)
            .copied()
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_REFRESH_TOKEN_TTL}")
            })?;
        let sweep_interval_seconds = matches
            .get_one::<u64>(ARG_SWEEP_INTERVAL)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_SWEEP_INTERVAL}"))?;

        Ok(Self {
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            sweep_interval_seconds,
        })
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_access_token_ttl_seconds(self.access_token_ttl_seconds)
            .with_refresh_token_ttl_seconds(self.refresh_token_ttl_seconds)
            .normalize()
    }

    #[must_use]
    pub fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig::new()
            .with_interval_seconds(self.sweep_interval_seconds)
            .normalize()
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token TTL in seconds")
                .env("SESIO_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token TTL in seconds")
                .env("SESIO_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL)
                .long(ARG_SWEEP_INTERVAL)
                .help("Interval between expired-token sweeps in seconds")
                .env("SESIO_SWEEP_INTERVAL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
}
