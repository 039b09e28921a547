use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_SECRET: &str = "admin-secret";

#[derive(Debug, Clone)]
pub struct Options {
    pub admin_secret: SecretString,
}

impl Options {
    /// Parse admin arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the admin secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_ADMIN_SECRET)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_ADMIN_SECRET}"))?;

        Ok(Self {
            admin_secret: SecretString::from(secret.as_str()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_ADMIN_SECRET)
            .long(ARG_ADMIN_SECRET)
            .help("Bearer secret required by POST /add_passcode")
            .env("PASSGATE_ADMIN_SECRET")
            .hide_env_values(true)
            .required(true),
    )
}
