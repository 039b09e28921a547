use clap::{Arg, ArgMatches, Command};

pub const ARG_DB_CONNECT_ATTEMPTS: &str = "db-connect-attempts";
pub const ARG_DB_CONNECT_DELAY_SECONDS: &str = "db-connect-delay-seconds";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub connect_attempts: u32,
    pub connect_delay_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            connect_attempts: matches
                .get_one::<u32>(ARG_DB_CONNECT_ATTEMPTS)
                .copied()
                .unwrap_or(10),
            connect_delay_seconds: matches
                .get_one::<u64>(ARG_DB_CONNECT_DELAY_SECONDS)
                .copied()
                .unwrap_or(5),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DB_CONNECT_ATTEMPTS)
                .long(ARG_DB_CONNECT_ATTEMPTS)
                .help("Database connection attempts at startup before giving up")
                .env("PASSGATE_DB_CONNECT_ATTEMPTS")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_CONNECT_DELAY_SECONDS)
                .long(ARG_DB_CONNECT_DELAY_SECONDS)
                .help("Seconds to wait between database connection attempts")
                .env("PASSGATE_DB_CONNECT_DELAY_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}
