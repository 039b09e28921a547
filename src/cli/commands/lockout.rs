use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_MAX_ATTEMPTS: &str = "max-attempts";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_MAX_TRACKED_CLIENTS: &str = "max-tracked-clients";
pub const ARG_TRUST_FORWARDED: &str = "trust-forwarded";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub max_attempts: u32,
    pub lockout_seconds: u64,
    pub max_tracked_clients: usize,
    pub trust_forwarded: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            max_attempts: matches
                .get_one::<u32>(ARG_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(3),
            lockout_seconds: matches
                .get_one::<u64>(ARG_LOCKOUT_SECONDS)
                .copied()
                .unwrap_or(60),
            max_tracked_clients: matches
                .get_one::<u64>(ARG_MAX_TRACKED_CLIENTS)
                .map_or(10_000, |v| usize::try_from(*v).unwrap_or(usize::MAX)),
            trust_forwarded: matches.get_flag(ARG_TRUST_FORWARDED),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Failed attempts allowed before a client is locked out")
                .env("PASSGATE_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lockout duration in seconds")
                .env("PASSGATE_LOCKOUT_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_TRACKED_CLIENTS)
                .long(ARG_MAX_TRACKED_CLIENTS)
                .help("Upper bound on clients with tracked failures")
                .env("PASSGATE_MAX_TRACKED_CLIENTS")
                .default_value("10000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_FORWARDED)
                .long(ARG_TRUST_FORWARDED)
                .help("Identify clients by X-Forwarded-For / X-Real-IP (only behind a trusted proxy)")
                .env("PASSGATE_TRUST_FORWARDED")
                .action(ArgAction::SetTrue),
        )
}
