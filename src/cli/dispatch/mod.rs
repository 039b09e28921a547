//! Command-line argument dispatch.
//!
//! Parses validated CLI arguments and maps them to the action to run, which
//! for now is always the HTTP server with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{admin, database, lockout, relay};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(5000);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let admin_opts = admin::Options::parse(matches)?;
    let relay_opts = relay::Options::parse(matches)?;
    let lockout_opts = lockout::Options::parse(matches);
    let database_opts = database::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        admin_secret: admin_opts.admin_secret,
        relay_url: relay_opts.url,
        relay_timeout_seconds: relay_opts.timeout_seconds,
        max_attempts: lockout_opts.max_attempts,
        lockout_seconds: lockout_opts.lockout_seconds,
        max_tracked_clients: lockout_opts.max_tracked_clients,
        trust_forwarded: lockout_opts.trust_forwarded,
        db_connect_attempts: database_opts.connect_attempts,
        db_connect_delay_seconds: database_opts.connect_delay_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn matches_from(args: &[&str]) -> clap::ArgMatches {
        let mut argv = vec![
            "passgate",
            "--dsn",
            "postgres://user@localhost:5432/passgate",
        ];
        argv.extend_from_slice(args);
        crate::cli::commands::new().get_matches_from(argv)
    }

    fn without_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("PASSGATE_ADMIN_SECRET", None::<&str>),
                ("PASSGATE_RELAY_URL", None::<&str>),
                ("PASSGATE_MAX_ATTEMPTS", None::<&str>),
                ("PASSGATE_LOCKOUT_SECONDS", None::<&str>),
                ("PASSGATE_TRUST_FORWARDED", None::<&str>),
            ],
            f,
        );
    }

    #[test]
    fn builds_server_action() {
        without_env(|| {
            let matches = matches_from(&[
                "--admin-secret",
                "s3cret",
                "--relay-url",
                "https://relay.tld/hooks/open",
                "--max-attempts",
                "5",
                "--trust-forwarded",
            ]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert_eq!(args.port, 5000);
                assert_eq!(args.admin_secret.expose_secret(), "s3cret");
                assert_eq!(args.relay_url.as_str(), "https://relay.tld/hooks/open");
                assert_eq!(args.max_attempts, 5);
                assert_eq!(args.lockout_seconds, 60);
                assert!(args.trust_forwarded);
            }
        });
    }

    #[test]
    fn blank_admin_secret_rejected() {
        without_env(|| {
            let matches = matches_from(&[
                "--admin-secret",
                "  ",
                "--relay-url",
                "https://relay.tld/hooks/open",
            ]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --admin-secret"));
            }
        });
    }

    #[test]
    fn relay_url_must_be_http() {
        without_env(|| {
            let matches = matches_from(&[
                "--admin-secret",
                "s3cret",
                "--relay-url",
                "ftp://relay.tld/open",
            ]);
            let result = handler(&matches);
            assert!(result.is_err());

            let matches = matches_from(&["--admin-secret", "s3cret", "--relay-url", "not a url"]);
            assert!(handler(&matches).is_err());
        });
    }
}
