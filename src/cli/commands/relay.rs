use anyhow::{anyhow, Context};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_RELAY_URL: &str = "relay-url";
pub const ARG_RELAY_TIMEOUT_SECONDS: &str = "relay-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: Url,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse relay arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the relay URL is missing, malformed, or not http(s).
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let raw = matches
            .get_one::<String>(ARG_RELAY_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_RELAY_URL}"))?;

        // The URL may embed a webhook secret, keep it out of the error message.
        let url = Url::parse(raw.trim()).context("invalid relay URL")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("relay URL must use http or https"));
        }

        Ok(Self {
            url,
            timeout_seconds: matches
                .get_one::<u64>(ARG_RELAY_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RELAY_URL)
                .long(ARG_RELAY_URL)
                .help("Webhook URL that opens the door, called with POST on every granted passcode")
                .env("PASSGATE_RELAY_URL")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_RELAY_TIMEOUT_SECONDS)
                .long(ARG_RELAY_TIMEOUT_SECONDS)
                .help("Timeout for the relay webhook call in seconds")
                .env("PASSGATE_RELAY_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
